//! AG-UI protocol event types.
//!
//! Every event carries a `type` discriminant in SCREAMING_SNAKE_CASE and
//! camelCase payload keys, matching the AG-UI wire format consumed by UI
//! clients over Server-Sent Events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An AG-UI protocol event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum Event {
    /// A run has started.
    RunStarted(RunStartedEvent),
    /// A run has finished normally.
    RunFinished(RunFinishedEvent),
    /// A run failed; the message is the only diagnostic the client gets.
    RunError(RunErrorEvent),
    /// An assistant text message has opened.
    TextMessageStart(TextMessageStartEvent),
    /// An incremental chunk of an open text message.
    TextMessageContent(TextMessageContentEvent),
    /// The open text message has closed.
    TextMessageEnd(TextMessageEndEvent),
    /// A tool call has started streaming.
    ToolCallStart(ToolCallStartEvent),
    /// An incremental chunk of a tool call's JSON arguments.
    ToolCallArgs(ToolCallArgsEvent),
    /// The tool call's argument stream has ended.
    ToolCallEnd(ToolCallEndEvent),
    /// The result of an executed tool call.
    ToolCallResult(ToolCallResultEvent),
    /// A full snapshot of the shared state document.
    StateSnapshot(StateSnapshotEvent),
    /// An incremental JSON-Patch update to the shared state document.
    StateDelta(StateDeltaEvent),
    /// A snapshot of the full message history.
    MessagesSnapshot(MessagesSnapshotEvent),
    /// An application-defined event.
    Custom(CustomEvent),
}

impl Event {
    /// The wire name of this event, used as the SSE `event:` field.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RunStarted(_) => "RUN_STARTED",
            Self::RunFinished(_) => "RUN_FINISHED",
            Self::RunError(_) => "RUN_ERROR",
            Self::TextMessageStart(_) => "TEXT_MESSAGE_START",
            Self::TextMessageContent(_) => "TEXT_MESSAGE_CONTENT",
            Self::TextMessageEnd(_) => "TEXT_MESSAGE_END",
            Self::ToolCallStart(_) => "TOOL_CALL_START",
            Self::ToolCallArgs(_) => "TOOL_CALL_ARGS",
            Self::ToolCallEnd(_) => "TOOL_CALL_END",
            Self::ToolCallResult(_) => "TOOL_CALL_RESULT",
            Self::StateSnapshot(_) => "STATE_SNAPSHOT",
            Self::StateDelta(_) => "STATE_DELTA",
            Self::MessagesSnapshot(_) => "MESSAGES_SNAPSHOT",
            Self::Custom(_) => "CUSTOM",
        }
    }

    /// Returns `true` if this event terminates a run.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::RunFinished(_) | Self::RunError(_))
    }
}

/// Emitted once at the start of every run, before any other event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStartedEvent {
    /// Conversation identity spanning multiple runs.
    pub thread_id: String,
    /// Identity of this run.
    pub run_id: String,
}

impl RunStartedEvent {
    /// Create a new run-started event.
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Event {
        Event::RunStarted(Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
        })
    }
}

/// Emitted once when a run completes normally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFinishedEvent {
    /// Conversation identity spanning multiple runs.
    pub thread_id: String,
    /// Identity of this run.
    pub run_id: String,
    /// Optional structured result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl RunFinishedEvent {
    /// Create a new run-finished event.
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Event {
        Event::RunFinished(Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            result: None,
        })
    }
}

/// Emitted when a run fails; always followed by stream termination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunErrorEvent {
    /// Human-readable error description.
    pub message: String,
    /// Optional machine-readable error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl RunErrorEvent {
    /// Create a new run-error event.
    pub fn new(message: impl Into<String>) -> Event {
        Event::RunError(Self {
            message: message.into(),
            code: None,
        })
    }
}

/// Opens a streaming text message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessageStartEvent {
    /// Identity of the message being streamed.
    pub message_id: String,
    /// Role of the message author.
    pub role: String,
}

impl TextMessageStartEvent {
    /// Create a new text-message-start event with the assistant role.
    pub fn new(message_id: impl Into<String>) -> Event {
        Event::TextMessageStart(Self {
            message_id: message_id.into(),
            role: "assistant".to_string(),
        })
    }
}

/// An incremental chunk of an open text message. `delta` is never empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessageContentEvent {
    /// Identity of the message being streamed.
    pub message_id: String,
    /// The text chunk.
    pub delta: String,
}

impl TextMessageContentEvent {
    /// Create a new text-message-content event.
    pub fn new(message_id: impl Into<String>, delta: impl Into<String>) -> Event {
        Event::TextMessageContent(Self {
            message_id: message_id.into(),
            delta: delta.into(),
        })
    }
}

/// Closes a streaming text message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessageEndEvent {
    /// Identity of the message being closed.
    pub message_id: String,
}

impl TextMessageEndEvent {
    /// Create a new text-message-end event.
    pub fn new(message_id: impl Into<String>) -> Event {
        Event::TextMessageEnd(Self {
            message_id: message_id.into(),
        })
    }
}

/// Announces a new streaming tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallStartEvent {
    /// Identity of the tool call.
    pub tool_call_id: String,
    /// Name of the tool being called.
    pub tool_call_name: String,
    /// The assistant message this call is anchored to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
}

impl ToolCallStartEvent {
    /// Create a new tool-call-start event.
    pub fn new(
        tool_call_id: impl Into<String>,
        tool_call_name: impl Into<String>,
        parent_message_id: Option<String>,
    ) -> Event {
        Event::ToolCallStart(Self {
            tool_call_id: tool_call_id.into(),
            tool_call_name: tool_call_name.into(),
            parent_message_id,
        })
    }
}

/// An incremental chunk of a tool call's JSON argument string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallArgsEvent {
    /// Identity of the tool call.
    pub tool_call_id: String,
    /// The argument chunk.
    pub delta: String,
}

impl ToolCallArgsEvent {
    /// Create a new tool-call-args event.
    pub fn new(tool_call_id: impl Into<String>, delta: impl Into<String>) -> Event {
        Event::ToolCallArgs(Self {
            tool_call_id: tool_call_id.into(),
            delta: delta.into(),
        })
    }
}

/// Closes a streaming tool call's argument stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallEndEvent {
    /// Identity of the tool call.
    pub tool_call_id: String,
}

impl ToolCallEndEvent {
    /// Create a new tool-call-end event.
    pub fn new(tool_call_id: impl Into<String>) -> Event {
        Event::ToolCallEnd(Self {
            tool_call_id: tool_call_id.into(),
        })
    }
}

/// Delivers the result of an executed tool call as a tool-role message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResultEvent {
    /// Identity of the result message.
    pub message_id: String,
    /// The tool call this result answers.
    pub tool_call_id: String,
    /// Serialized result payload.
    pub content: String,
    /// Always `"tool"`.
    pub role: String,
}

impl ToolCallResultEvent {
    /// Create a new tool-call-result event.
    pub fn new(
        message_id: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Event {
        Event::ToolCallResult(Self {
            message_id: message_id.into(),
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            role: "tool".to_string(),
        })
    }
}

/// A full snapshot of the shared state document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshotEvent {
    /// The complete state document.
    pub snapshot: Value,
}

impl StateSnapshotEvent {
    /// Create a new state-snapshot event from the current state document.
    #[must_use]
    pub fn new(state: &Map<String, Value>) -> Event {
        Event::StateSnapshot(Self {
            snapshot: Value::Object(state.clone()),
        })
    }
}

/// A JSON-Patch (RFC 6902) operation applied to the state document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonPatchOp {
    /// The patch operation; only `replace` is emitted.
    pub op: String,
    /// Pointer to the state key, e.g. `/recipe`.
    pub path: String,
    /// The replacement value.
    pub value: Value,
}

impl JsonPatchOp {
    /// Create a `replace` operation for a top-level state key.
    #[must_use]
    pub fn replace(state_key: &str, value: Value) -> Self {
        Self {
            op: "replace".to_string(),
            path: format!("/{state_key}"),
            value,
        }
    }
}

/// An incremental JSON-Patch update to the shared state document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDeltaEvent {
    /// The patch operations, applied in order.
    pub delta: Vec<JsonPatchOp>,
}

impl StateDeltaEvent {
    /// Create a single-operation `replace` delta for a top-level state key.
    #[must_use]
    pub fn replace(state_key: &str, value: Value) -> Event {
        Event::StateDelta(Self {
            delta: vec![JsonPatchOp::replace(state_key, value)],
        })
    }
}

/// A snapshot of the full message history in AG-UI wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesSnapshotEvent {
    /// The messages, in conversation order.
    pub messages: Vec<Value>,
}

impl MessagesSnapshotEvent {
    /// Create a new messages-snapshot event.
    #[must_use]
    pub fn new(messages: Vec<Value>) -> Event {
        Event::MessagesSnapshot(Self { messages })
    }
}

/// An application-defined event. Names used by the bridge:
/// `PredictState` and `function_approval_request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomEvent {
    /// Event name.
    pub name: String,
    /// Arbitrary payload.
    pub value: Value,
}

impl CustomEvent {
    /// Create a new custom event.
    pub fn new(name: impl Into<String>, value: Value) -> Event {
        Event::Custom(Self {
            name: name.into(),
            value,
        })
    }
}
