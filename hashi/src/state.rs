//! Shared-state helpers: schema defaults, state-context injection, and
//! structured-output extraction.

use serde_json::{Map, Value};

use crate::content::{AgentMessage, Content, Role};

/// Marker prefix identifying an injected state-context system message.
const STATE_CONTEXT_PREFIX: &str = "Current state of the application:";

/// Fill missing state keys with schema-appropriate defaults: array types
/// get `[]`, everything else `{}`.
pub fn apply_schema_defaults(state: &mut Map<String, Value>, schema: &Map<String, Value>) {
    for (key, key_schema) in schema {
        if state.contains_key(key) {
            continue;
        }
        let default = if key_schema.get("type").and_then(Value::as_str) == Some("array") {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        };
        state.insert(key.clone(), default);
    }
}

/// Build the system message that makes the current state visible to the
/// model. Returns `None` when state or schema is empty.
#[must_use]
pub fn state_context_message(
    state: &Map<String, Value>,
    schema: &Map<String, Value>,
) -> Option<AgentMessage> {
    if state.is_empty() || schema.is_empty() {
        return None;
    }
    let state_json =
        serde_json::to_string_pretty(&Value::Object(state.clone())).unwrap_or_default();
    Some(AgentMessage::system(format!(
        "{STATE_CONTEXT_PREFIX}\n{state_json}\n\n\
         When modifying state, you MUST include ALL existing data plus your changes.\n\
         For example, if adding one new item to a list, include ALL existing items PLUS the new item.\n\
         Never replace existing data - always preserve and append or merge."
    )))
}

/// Returns `true` if the message is an injected state-context message.
#[must_use]
pub fn is_state_context_message(message: &AgentMessage) -> bool {
    message.role == Role::System
        && message
            .contents
            .iter()
            .any(|c| matches!(c, Content::Text { text } if text.starts_with(STATE_CONTEXT_PREFIX)))
}

/// Insert the state-context message directly before a trailing user
/// message. Leaves the list untouched when the last message is not from
/// the user or no context message is warranted.
#[must_use]
pub fn inject_state_context(
    mut messages: Vec<AgentMessage>,
    state: &Map<String, Value>,
    schema: &Map<String, Value>,
) -> Vec<AgentMessage> {
    let Some(context) = state_context_message(state, schema) else {
        return messages;
    };
    if messages.last().is_none_or(|m| m.role != Role::User) {
        return messages;
    }
    messages.retain(|m| !is_state_context_message(m));
    let insert_at = messages.len().saturating_sub(1);
    messages.insert(insert_at, context);
    messages
}

/// Pick the state updates out of a structured-output response. With a
/// schema, only schema keys count; without one, every key except
/// `message` is state.
#[must_use]
pub fn extract_structured_updates(
    response: &Map<String, Value>,
    schema: &Map<String, Value>,
) -> Map<String, Value> {
    let mut updates = Map::new();
    for (key, value) in response {
        let is_state_key = if schema.is_empty() {
            key != "message"
        } else {
            schema.contains_key(key)
        };
        if is_state_key {
            updates.insert(key.clone(), value.clone());
        }
    }
    updates
}
