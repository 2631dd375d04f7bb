//! HTTP clients for hosted chat models.

pub mod gemini;
pub mod openai;

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};

pub use gemini::{GeminiChatModel, GeminiConfig};
pub use openai::{OpenAiChatModel, OpenAiConfig};

const USER_AGENT: &str = "deepskill/0.1";

/// First retry waits this long; each further retry doubles it.
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Sends the request built by `build`, retrying rate limits, server errors
/// and transport failures with exponential backoff. Non-retryable HTTP errors
/// and the last failure are returned with the response body attached.
pub(crate) async fn send_with_retry<F>(
    provider: &str,
    max_retries: u32,
    build: F,
) -> anyhow::Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let backoff = INITIAL_BACKOFF * 2u32.saturating_pow(attempt);
        match build().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) if is_retryable(response.status()) && attempt < max_retries => {
                tracing::warn!(provider, status = %response.status(), attempt, "retrying model request");
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                tracing::error!(provider, %status, body = %body, "model API error");
                anyhow::bail!("{provider} API error: {status} - {body}");
            }
            Err(e) if attempt < max_retries => {
                tracing::warn!(provider, error = %e, attempt, "model request failed, retrying");
            }
            Err(e) => return Err(e.into()),
        }
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}
