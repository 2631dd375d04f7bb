//! Schema-driven tool system.
//!
//! Tools describe themselves with a JSON-schema subset that providers
//! translate into their native function-calling format, and execute with a
//! [`ToolContext`] that exposes the thread's state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::messaging::{AgentMessage, MessageContent, MessageMetadata, MessageRole};
use crate::state::{AgentStateSnapshot, StateDiff};

/// JSON Schema definition for tool parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameterSchema {
    #[serde(rename = "type")]
    pub schema_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, ToolParameterSchema>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ToolParameterSchema>>,

    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Extra keywords (minimum, pattern, ...)
    #[serde(flatten)]
    pub additional: HashMap<String, Value>,
}

impl ToolParameterSchema {
    fn typed(schema_type: &str, description: Option<String>) -> Self {
        Self {
            schema_type: schema_type.to_string(),
            description,
            properties: None,
            required: None,
            items: None,
            enum_values: None,
            default: None,
            additional: HashMap::new(),
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::typed("string", Some(description.into()))
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::typed("integer", Some(description.into()))
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::typed("number", Some(description.into()))
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::typed("boolean", Some(description.into()))
    }

    /// String restricted to a fixed set of values.
    pub fn string_enum<I, S>(description: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Self::string(description);
        schema.enum_values = Some(
            values
                .into_iter()
                .map(|v| Value::String(v.into()))
                .collect(),
        );
        schema
    }

    pub fn array(description: impl Into<String>, items: ToolParameterSchema) -> Self {
        let mut schema = Self::typed("array", Some(description.into()));
        schema.items = Some(Box::new(items));
        schema
    }

    pub fn object<I, K>(properties: I, required: &[&str]) -> Self
    where
        I: IntoIterator<Item = (K, ToolParameterSchema)>,
        K: Into<String>,
    {
        let mut schema = Self::typed("object", None);
        schema.properties = Some(
            properties
                .into_iter()
                .map(|(name, prop)| (name.into(), prop))
                .collect(),
        );
        schema.required = Some(required.iter().map(|s| s.to_string()).collect());
        schema
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Complete schema definition for a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameterSchema,
}

impl ToolSchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameterSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    pub fn no_params(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(
            name,
            description,
            ToolParameterSchema::object(Vec::<(String, ToolParameterSchema)>::new(), &[]),
        )
    }
}

/// Context handed to tool implementations.
#[derive(Clone)]
pub struct ToolContext {
    /// Snapshot taken before the tool round started.
    pub state: Arc<AgentStateSnapshot>,

    /// Live state for tools that mutate the thread state directly.
    pub state_handle: Option<Arc<RwLock<AgentStateSnapshot>>>,

    pub tool_call_id: Option<String>,
}

impl ToolContext {
    pub fn new(state: Arc<AgentStateSnapshot>) -> Self {
        Self {
            state,
            state_handle: None,
            tool_call_id: None,
        }
    }

    pub fn with_mutable_state(
        state: Arc<AgentStateSnapshot>,
        state_handle: Arc<RwLock<AgentStateSnapshot>>,
    ) -> Self {
        Self {
            state,
            state_handle: Some(state_handle),
            tool_call_id: None,
        }
    }

    pub fn with_call_id(mut self, call_id: Option<String>) -> Self {
        self.tool_call_id = call_id;
        self
    }

    fn response(&self, content: MessageContent) -> AgentMessage {
        AgentMessage {
            role: MessageRole::Tool,
            content,
            metadata: self.tool_call_id.as_ref().map(|id| MessageMetadata {
                tool_call_id: Some(id.clone()),
                ..MessageMetadata::default()
            }),
        }
    }

    pub fn text_response(&self, content: impl Into<String>) -> AgentMessage {
        self.response(MessageContent::Text(content.into()))
    }

    pub fn json_response(&self, content: Value) -> AgentMessage {
        self.response(MessageContent::Json(content))
    }
}

/// Result of a tool invocation
#[derive(Debug, Clone)]
pub enum ToolResult {
    Message(AgentMessage),

    /// Response plus a state delta the runtime applies after the tool round.
    WithStateUpdate {
        message: AgentMessage,
        state_diff: StateDiff,
    },
}

impl ToolResult {
    pub fn text(ctx: &ToolContext, content: impl Into<String>) -> Self {
        Self::Message(ctx.text_response(content))
    }

    pub fn json(ctx: &ToolContext, content: Value) -> Self {
        Self::Message(ctx.json_response(content))
    }

    pub fn with_state(message: AgentMessage, state_diff: StateDiff) -> Self {
        Self::WithStateUpdate {
            message,
            state_diff,
        }
    }

    pub fn message(&self) -> &AgentMessage {
        match self {
            Self::Message(message) | Self::WithStateUpdate { message, .. } => message,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<ToolResult>;
}

pub type ToolBox = Arc<dyn Tool>;

/// Name-indexed tool set. Registering a tool with an existing name replaces it.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolBox>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: ToolBox) -> &mut Self {
        let name = tool.schema().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "replaced previously registered tool");
        }
        self
    }

    pub fn register_all<I>(&mut self, tools: I) -> &mut Self
    where
        I: IntoIterator<Item = ToolBox>,
    {
        for tool in tools {
            self.register(tool);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolBox> {
        self.tools.get(name)
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo(&'static str);

    #[async_trait]
    impl Tool for Echo {
        fn schema(&self) -> ToolSchema {
            ToolSchema::new(
                "echo",
                self.0,
                ToolParameterSchema::object(
                    [("text", ToolParameterSchema::string("Text to echo"))],
                    &["text"],
                ),
            )
        }

        async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<ToolResult> {
            Ok(ToolResult::text(&ctx, args["text"].as_str().unwrap_or("")))
        }
    }

    #[test]
    fn object_schema_serializes_as_json_schema() {
        let value = serde_json::to_value(Echo("first").schema().parameters).unwrap();
        assert_eq!(value["type"], "object");
        assert_eq!(value["properties"]["text"]["type"], "string");
        assert_eq!(value["required"], json!(["text"]));
        assert!(value.get("items").is_none());
    }

    #[test]
    fn registry_replaces_tools_with_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo("first")));
        registry.register(Arc::new(Echo("second")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("echo").unwrap().schema().description, "second");
    }

    #[tokio::test]
    async fn context_attaches_call_id_to_responses() {
        let ctx = ToolContext::new(Arc::new(AgentStateSnapshot::default()))
            .with_call_id(Some("call-1".into()));
        let result = Echo("e")
            .execute(json!({"text": "hello"}), ctx)
            .await
            .unwrap();
        let message = result.message();
        assert_eq!(message.content.as_text(), Some("hello"));
        assert_eq!(message.tool_call_id(), Some("call-1"));
    }
}
