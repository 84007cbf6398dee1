//! The AG-UI run input envelope and wire message types.
//!
//! Clients send both snake_case and camelCase key spellings; the serde
//! aliases here accept either. Serialization always produces snake_case,
//! matching what the protocol's reference clients post.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The request envelope for one AG-UI run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunAgentInput {
    /// Conversation identity; generated when absent.
    #[serde(default, alias = "threadId", skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Run identity; generated when absent.
    #[serde(default, alias = "runId", skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Prior conversation messages in wire form.
    #[serde(default)]
    pub messages: Vec<InputMessage>,
    /// User-visible shared state document.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub state: Map<String, Value>,
    /// Client-declared tool specs, advertised to the model but executed
    /// client-side.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ClientToolSpec>,
    /// Context objects, passed through opaquely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    /// Additional properties forwarded to the agent, passed through
    /// opaquely.
    #[serde(
        default,
        alias = "forwardedProps",
        skip_serializing_if = "Option::is_none"
    )]
    pub forwarded_props: Option<Value>,
    /// The run that spawned this run, if any.
    #[serde(
        default,
        alias = "parentRunId",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_run_id: Option<String>,
}

/// A message in AG-UI wire form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputMessage {
    /// Client-assigned message id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Role string; unknown roles degrade to `user` during conversion.
    #[serde(default = "default_role")]
    pub role: String,
    /// Message content: a string, `null`, or an array of content parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// Tool calls announced by an assistant message.
    #[serde(default, alias = "toolCalls", skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<InputToolCall>,
    /// The assistant call a tool-role message responds to.
    #[serde(
        default,
        alias = "toolCallId",
        skip_serializing_if = "Option::is_none"
    )]
    pub tool_call_id: Option<String>,
    /// Legacy backend-rendering correlation id.
    #[serde(
        default,
        alias = "actionExecutionId",
        skip_serializing_if = "Option::is_none"
    )]
    pub action_execution_id: Option<String>,
    /// Legacy backend-rendering result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Unrecognized fields, preserved for the snapshot mirror.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_role() -> String {
    "user".to_string()
}

impl InputMessage {
    /// Create a message with the given role and string content.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(Value::String(content.into())),
            ..Self::default()
        }
    }

    /// Flatten the content field to plain text. Content-part arrays
    /// (`input_text` / `text` items) are concatenated; `null` becomes
    /// the empty string.
    #[must_use]
    pub fn content_text(&self) -> String {
        match &self.content {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(parts)) => parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect(),
            _ => String::new(),
        }
    }

    /// The tool-call id this message answers, preferring the explicit
    /// field over the legacy backend-rendering id.
    #[must_use]
    pub fn result_call_id(&self) -> Option<&str> {
        self.tool_call_id
            .as_deref()
            .or(self.action_execution_id.as_deref())
    }
}

/// A tool call entry on an assistant wire message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputToolCall {
    /// Identity of the call.
    pub id: String,
    /// Call kind; always `function`.
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    /// The function payload.
    pub function: FunctionPayload,
}

fn default_call_type() -> String {
    "function".to_string()
}

impl InputToolCall {
    /// Create a new function tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            call_type: default_call_type(),
            function: FunctionPayload {
                name: name.into(),
                arguments,
            },
        }
    }
}

/// The function payload of a wire tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionPayload {
    /// Function name.
    pub name: String,
    /// Arguments, usually a JSON-encoded string.
    #[serde(default)]
    pub arguments: Value,
}

/// A client-declared tool spec from the run input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientToolSpec {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's parameters.
    #[serde(default)]
    pub parameters: Value,
}
