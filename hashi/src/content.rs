//! Internal message and content-item types consumed by and produced from
//! the inner agent.
//!
//! Content is a closed tagged union; the event bridge dispatches on the
//! tag. Function-call arguments may arrive either as a raw JSON string
//! (streaming form) or as a structured object, so [`FunctionCall`] keeps
//! them as a [`Value`] and normalizes on access.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message providing instructions.
    System,
    /// User message.
    User,
    /// Assistant (model) message.
    Assistant,
    /// Tool result message.
    Tool,
    /// Developer message (treated like a system message by providers).
    Developer,
}

impl Role {
    /// Get the string representation of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::Developer => "developer",
        }
    }

    /// Parse a wire role string, defaulting unknown values to `User`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "system" => Self::System,
            "assistant" => Self::Assistant,
            "tool" => Self::Tool,
            "developer" => Self::Developer,
            _ => Self::User,
        }
    }
}

/// A function call made by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Unique identifier correlating this call with its result.
    pub call_id: String,
    /// Name of the function being called.
    pub name: String,
    /// Arguments, either a raw JSON string or a structured object.
    pub arguments: Value,
}

impl FunctionCall {
    /// Create a new function call.
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Parse the arguments into an object, handling both the raw-string
    /// and structured forms. Returns `None` when the arguments are
    /// missing or not (yet) a complete JSON object.
    #[must_use]
    pub fn parse_arguments(&self) -> Option<Map<String, Value>> {
        parse_object(&self.arguments)
    }

    /// Get the arguments as a JSON string, serializing structured values.
    #[must_use]
    pub fn arguments_string(&self) -> String {
        match &self.arguments {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }

    /// Returns `true` if there is any argument payload at all.
    #[must_use]
    pub fn has_arguments(&self) -> bool {
        match &self.arguments {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Object(map) => !map.is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        }
    }
}

/// Parse a [`Value`] that may be a JSON-encoded string or an object into
/// an object map.
#[must_use]
pub fn parse_object(value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

/// Serialize a tool result payload for transport. Strings pass through
/// unquoted; everything else is JSON-encoded.
#[must_use]
pub fn stringify_result(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// A single content item within an [`AgentMessage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Content {
    /// Visible text content.
    Text {
        /// The text.
        text: String,
    },

    /// Model reasoning text (not shown to end users).
    TextReasoning {
        /// The reasoning text.
        text: String,
    },

    /// A function call, possibly streamed across multiple items.
    FunctionCall(FunctionCall),

    /// The result of an executed function call.
    FunctionResult {
        /// The call this result answers.
        call_id: String,
        /// Result payload.
        result: Value,
    },

    /// A request to approve a function call before execution.
    FunctionApprovalRequest {
        /// Identity of the approval request.
        id: String,
        /// The call awaiting approval.
        function_call: FunctionCall,
    },

    /// The user's response to an approval request.
    FunctionApprovalResponse {
        /// Identity of the approval request being answered.
        id: String,
        /// Whether execution was approved.
        approved: bool,
        /// The call being approved, possibly with user-edited arguments.
        function_call: FunctionCall,
        /// Extra payload attached during reconstruction.
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        additional_properties: Map<String, Value>,
    },

    /// Inline binary or structured data, carried through opaquely.
    Data {
        /// The payload.
        payload: Value,
    },

    /// A URI reference, carried through opaquely.
    Uri {
        /// The URI.
        uri: String,
        /// Optional media type.
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },

    /// A provider-hosted file reference, carried through opaquely.
    HostedFile {
        /// The provider's file identifier.
        file_id: String,
    },

    /// Token usage information.
    Usage {
        /// Input token count.
        #[serde(skip_serializing_if = "Option::is_none")]
        input_tokens: Option<u64>,
        /// Output token count.
        #[serde(skip_serializing_if = "Option::is_none")]
        output_tokens: Option<u64>,
    },
}

impl Content {
    /// Create a text content item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a function call content item.
    pub fn function_call(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self::FunctionCall(FunctionCall::new(call_id, name, arguments))
    }

    /// Create a function result content item.
    pub fn function_result(call_id: impl Into<String>, result: impl Into<Value>) -> Self {
        Self::FunctionResult {
            call_id: call_id.into(),
            result: result.into(),
        }
    }

    /// Create an approval request content item.
    pub fn approval_request(id: impl Into<String>, function_call: FunctionCall) -> Self {
        Self::FunctionApprovalRequest {
            id: id.into(),
            function_call,
        }
    }

    /// Create an approval response content item.
    pub fn approval_response(
        id: impl Into<String>,
        approved: bool,
        function_call: FunctionCall,
    ) -> Self {
        Self::FunctionApprovalResponse {
            id: id.into(),
            approved,
            function_call,
            additional_properties: Map::new(),
        }
    }

    /// Returns the text if this is a text item.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Returns the function call if this is a call item.
    #[must_use]
    pub const fn as_function_call(&self) -> Option<&FunctionCall> {
        match self {
            Self::FunctionCall(call) => Some(call),
            _ => None,
        }
    }

    /// Returns `true` if this is a non-empty text item.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { text } if !text.is_empty())
    }

    /// Returns `true` if this is a function call item.
    #[must_use]
    pub const fn is_function_call(&self) -> bool {
        matches!(self, Self::FunctionCall(_))
    }
}

/// A message in the inner agent's conversation format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Role of the message author.
    pub role: Role,
    /// Ordered content items.
    pub contents: Vec<Content>,
    /// Wire message id, when the client supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Extra payload attached during normalization.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_properties: Map<String, Value>,
}

impl AgentMessage {
    /// Create a message with the given role and contents.
    #[must_use]
    pub fn new(role: Role, contents: Vec<Content>) -> Self {
        Self {
            role,
            contents,
            message_id: None,
            additional_properties: Map::new(),
        }
    }

    /// Create a system message.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![Content::text(text)])
    }

    /// Create a user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Content::text(text)])
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![Content::text(text)])
    }

    /// Create a tool message carrying a single function result.
    pub fn tool_result(call_id: impl Into<String>, result: impl Into<Value>) -> Self {
        Self::new(Role::Tool, vec![Content::function_result(call_id, result)])
    }

    /// Attach a wire message id.
    #[must_use]
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Concatenated text of all text content items.
    #[must_use]
    pub fn text_content(&self) -> String {
        self.contents
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// Returns `true` if any content item is a function call.
    #[must_use]
    pub fn has_function_calls(&self) -> bool {
        self.contents.iter().any(Content::is_function_call)
    }
}
