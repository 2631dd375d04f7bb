use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use deepskill_core::llm::{LanguageModel, LlmRequest, LlmResponse};
use deepskill_core::messaging::{AgentMessage, MessageContent, MessageMetadata, MessageRole, ToolCall};
use deepskill_core::persistence::{Checkpointer, InMemoryCheckpointer};
use deepskill_core::store::InMemoryStore;
use deepskill_toolkit::{CompositeBackend, StateBackend, StoreBackend};
use serde_json::{json, Value};

use super::{backend_factory, AgentError, ConfigurableAgentBuilder, RunConfig, SubAgentConfig};

/// Replays queued responses and records every request it receives.
#[derive(Default)]
struct ScriptedModel {
    responses: Mutex<VecDeque<AgentMessage>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedModel {
    fn new(responses: Vec<AgentMessage>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::default(),
        })
    }

    fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
        self.requests.lock().unwrap().push(request);
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| AgentMessage::agent("done"));
        Ok(LlmResponse::new(next))
    }
}

fn call(id: &str, name: &str, args: Value) -> AgentMessage {
    AgentMessage {
        role: MessageRole::Agent,
        content: MessageContent::Text(String::new()),
        metadata: Some(MessageMetadata {
            tool_calls: vec![ToolCall {
                id: id.into(),
                name: name.into(),
                args,
            }],
            ..MessageMetadata::default()
        }),
    }
}

#[tokio::test]
async fn tool_round_then_response_is_checkpointed() {
    let model = ScriptedModel::new(vec![
        call("c1", "write_file", json!({"file_path": "/notes.md", "content": "hello"})),
        AgentMessage::agent("saved"),
    ]);
    let checkpointer = Arc::new(InMemoryCheckpointer::new());
    let agent = ConfigurableAgentBuilder::new("You take notes.")
        .with_model(model.clone())
        .with_checkpointer(checkpointer.clone())
        .build()
        .unwrap();

    let state = agent
        .invoke_text("write a note", &RunConfig::new("t1"))
        .await
        .unwrap();

    let roles: Vec<_> = state.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![MessageRole::User, MessageRole::Agent, MessageRole::Tool, MessageRole::Agent]
    );
    let tool_message = &state.messages[2];
    assert_eq!(tool_message.tool_call_id(), Some("c1"));
    assert_eq!(tool_message.content.to_text(), "Updated file /notes.md");
    assert_eq!(state.files["/notes.md"].text(), "hello");

    let saved = checkpointer
        .load_state(&"t1".to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved, state);

    let first = &model.requests()[0];
    assert!(first.system_prompt.starts_with("You take notes."));
    assert!(first.tools.iter().any(|t| t.name == "write_todos"));
}

#[tokio::test]
async fn threads_resume_from_their_checkpoint() {
    let model = ScriptedModel::new(vec![
        AgentMessage::agent("first answer"),
        AgentMessage::agent("second answer"),
        AgentMessage::agent("other thread"),
    ]);
    let agent = ConfigurableAgentBuilder::new("")
        .with_model(model.clone())
        .with_checkpointer(Arc::new(InMemoryCheckpointer::new()))
        .build()
        .unwrap();

    agent.invoke_text("one", &RunConfig::new("a")).await.unwrap();
    let resumed = agent.invoke_text("two", &RunConfig::new("a")).await.unwrap();
    assert_eq!(resumed.messages.len(), 4);
    assert_eq!(model.requests()[1].messages.len(), 3);

    let fresh = agent.invoke_text("hi", &RunConfig::new("b")).await.unwrap();
    assert_eq!(fresh.messages.len(), 2);
    assert_eq!(agent.list_threads().await.unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn recursion_limit_stops_endless_tool_loops() {
    let looping: Vec<_> = (0..20)
        .map(|i| call(&format!("c{i}"), "ls", json!({"path": "/"})))
        .collect();
    let checkpointer = Arc::new(InMemoryCheckpointer::new());
    let agent = ConfigurableAgentBuilder::new("")
        .with_model(ScriptedModel::new(looping))
        .with_checkpointer(checkpointer.clone())
        .with_recursion_limit(5)
        .build()
        .unwrap();

    let err = agent.invoke_text("loop", &RunConfig::new("t")).await.unwrap_err();
    assert!(matches!(err, AgentError::RecursionLimit(5)));

    // Three model calls and two tool rounds fit in five steps.
    let saved = checkpointer.load_state(&"t".to_string()).await.unwrap().unwrap();
    let tool_results = saved
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::Tool)
        .count();
    assert_eq!(tool_results, 2);
}

#[tokio::test]
async fn unknown_tools_and_tool_failures_become_error_results() {
    let model = ScriptedModel::new(vec![
        call("c1", "teleport", json!({})),
        call("c2", "write_file", json!({"oops": true})),
        AgentMessage::agent("gave up"),
    ]);
    let agent = ConfigurableAgentBuilder::new("")
        .with_model(model)
        .build()
        .unwrap();

    let state = agent.invoke_text("go", &RunConfig::new("t")).await.unwrap();
    let errors: Vec<_> = state
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::Tool)
        .map(|m| m.content.to_text())
        .collect();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].starts_with("Error: tool 'teleport' is not available"));
    assert!(errors[1].starts_with("Error: "));
    assert_eq!(state.last_message().unwrap().content.to_text(), "gave up");
}

#[tokio::test]
async fn general_purpose_subagent_runs_through_task() {
    let model = ScriptedModel::new(vec![
        call(
            "c1",
            "task",
            json!({"description": "count files", "subagent_type": "general-purpose"}),
        ),
        AgentMessage::agent("sub-agent result"),
        AgentMessage::agent("final"),
    ]);
    let agent = ConfigurableAgentBuilder::new("")
        .with_model(model.clone())
        .build()
        .unwrap();
    assert!(agent.tool_names().contains(&"task".to_string()));

    let state = agent.invoke_text("delegate", &RunConfig::new("t")).await.unwrap();
    assert_eq!(state.messages[2].content.to_text(), "sub-agent result");
    assert_eq!(state.last_message().unwrap().content.to_text(), "final");

    // The sub-agent starts from its own, empty history.
    let sub_request = &model.requests()[1];
    assert_eq!(sub_request.messages.len(), 1);
    assert_eq!(sub_request.messages[0].content.to_text(), "count files");
    assert!(!sub_request.tools.iter().any(|t| t.name == "task"));
}

#[tokio::test]
async fn task_tool_exists_only_with_subagents() {
    let model = ScriptedModel::new(vec![]);
    let agent = ConfigurableAgentBuilder::new("")
        .with_model(model)
        .with_auto_general_purpose(false)
        .with_subagent_config(
            SubAgentConfig::new("search-agent", "Research", "You search.").with_tools(vec![]),
        )
        .build()
        .unwrap();
    assert!(agent.tool_names().contains(&"task".to_string()));

    let without_subagents = ConfigurableAgentBuilder::new("")
        .with_model(ScriptedModel::new(vec![]))
        .with_auto_general_purpose(false)
        .build()
        .unwrap();
    assert!(!without_subagents.tool_names().contains(&"task".to_string()));
}

#[tokio::test]
async fn routed_backend_sends_memories_to_the_store() {
    let store = Arc::new(InMemoryStore::new());
    let model = ScriptedModel::new(vec![
        call("c1", "write_file", json!({"file_path": "/memories/prefs.md", "content": "likes tea"})),
        AgentMessage::agent("remembered"),
    ]);
    let agent = ConfigurableAgentBuilder::new("")
        .with_model(model)
        .with_store(store.clone())
        .with_long_term_memory(true)
        .with_backend(backend_factory(|ctx| {
            let mut composite = CompositeBackend::new(Arc::new(StateBackend::new(ctx.state.clone())));
            if let Some(store) = &ctx.store {
                composite = composite.with_route(
                    "/memories/",
                    Arc::new(StoreBackend::new(store.clone(), ctx.assistant_id.clone())),
                );
            }
            Arc::new(composite)
        }))
        .build()
        .unwrap();

    let state = agent.invoke_text("remember", &RunConfig::new("t")).await.unwrap();
    assert!(state.files.is_empty());
    assert_eq!(store.len(), 1);
}
