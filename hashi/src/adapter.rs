//! Message format conversion between AG-UI wire form and the inner
//! agent's conversation format.
//!
//! Conversion is paired with two sanitizers that keep downstream model
//! providers happy: tool-ordering sanitization (every announced tool
//! call gets exactly one result before the next user turn) and
//! deduplication. Tool-role messages whose content is an approval
//! payload are reconstructed into approval-response content on the
//! original function call, merging any user-edited arguments.

use std::collections::HashSet;
use std::hash::{DefaultHasher, Hash, Hasher};

use serde_json::{Map, Value, json};
use tracing::{debug, info};
use uuid::Uuid;

use crate::content::{AgentMessage, Content, FunctionCall, Role, stringify_result};
use crate::input::InputMessage;

/// Result placed on tool calls the user abandoned by sending a new
/// message.
pub const SKIPPED_RESULT: &str = "Tool execution skipped - user provided follow-up message";

/// Name of the synthetic client-side confirmation tool.
pub const CONFIRM_CHANGES_TOOL: &str = "confirm_changes";

/// The outcome of normalizing raw wire messages.
#[derive(Debug, Clone)]
pub struct NormalizedMessages {
    /// Messages in inner-agent form, sanitized and deduplicated.
    pub messages: Vec<AgentMessage>,
    /// Wire-form mirror used to assemble `MessagesSnapshot` events.
    pub snapshot: Vec<Value>,
}

/// Normalize raw AG-UI messages into provider and snapshot forms.
#[must_use]
pub fn normalize_input_messages(raw: &[InputMessage]) -> NormalizedMessages {
    let mut raw = raw.to_vec();
    let messages = wire_to_internal(&mut raw);
    let messages = sanitize_tool_history(messages);
    let messages = deduplicate_messages(messages);
    let snapshot = snapshot_messages(&raw);
    NormalizedMessages { messages, snapshot }
}

/// Convert AG-UI wire messages to inner-agent messages.
///
/// `raw` is mutable because approval reconstruction writes merged
/// arguments back into the originating assistant tool call so the
/// snapshot mirror stays in sync.
pub fn wire_to_internal(raw: &mut [InputMessage]) -> Vec<AgentMessage> {
    let mut result: Vec<AgentMessage> = Vec::new();

    for idx in 0..raw.len() {
        let msg = raw[idx].clone();

        if Role::parse(&msg.role) == Role::Tool {
            convert_tool_message(&msg, &mut result, raw);
            continue;
        }

        // Legacy backend-rendering payloads carry the correlation id in
        // actionExecutionId instead of a proper tool role.
        if msg.action_execution_id.is_some() || msg.extra.contains_key("actionName") {
            let call_id = msg
                .tool_call_id
                .as_deref()
                .or(msg.action_execution_id.as_deref())
                .unwrap_or_default();
            let payload = msg
                .result
                .clone()
                .or_else(|| msg.content.clone())
                .unwrap_or_else(|| Value::String(String::new()));
            let mut converted = AgentMessage::tool_result(call_id, payload);
            converted.message_id.clone_from(&msg.id);
            result.push(converted);
            continue;
        }

        if !msg.tool_calls.is_empty() {
            let mut contents = Vec::new();
            let text = msg.content_text();
            if !text.is_empty() {
                contents.push(Content::text(text));
            }
            for tc in &msg.tool_calls {
                if tc.call_type == "function" {
                    contents.push(Content::function_call(
                        tc.id.clone(),
                        tc.function.name.clone(),
                        tc.function.arguments.clone(),
                    ));
                }
            }
            let mut converted = AgentMessage::new(Role::Assistant, contents);
            converted.message_id.clone_from(&msg.id);
            result.push(converted);
            continue;
        }

        let mut converted = AgentMessage::new(
            Role::parse(&msg.role),
            vec![Content::text(msg.content_text())],
        );
        converted.message_id.clone_from(&msg.id);
        result.push(converted);
    }

    result
}

/// Convert a tool-role wire message, reinterpreting approval payloads.
fn convert_tool_message(
    msg: &InputMessage,
    result: &mut Vec<AgentMessage>,
    raw: &mut [InputMessage],
) {
    let tool_call_id = msg.result_call_id().unwrap_or_default().to_string();
    let payload = msg
        .content
        .clone()
        .or_else(|| msg.result.clone())
        .unwrap_or_else(|| Value::String(String::new()));

    let parsed = parse_payload_object(&payload);
    let is_approval = parsed
        .as_ref()
        .is_some_and(|p| p.contains_key("accepted"));

    let Some(parsed) = parsed.filter(|_| is_approval) else {
        let mut converted = AgentMessage::tool_result(tool_call_id, payload);
        converted.message_id.clone_from(&msg.id);
        result.push(converted);
        return;
    };

    let accepted = parsed
        .get("accepted")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    debug!(call_id = %tool_call_id, accepted, "approval payload received");

    let approval_call_id =
        resolve_approval_call_id(&tool_call_id, &parsed, result).unwrap_or(tool_call_id.clone());

    // The framework re-executes the approved tool, so any stale result
    // for this call id must go before the approval content lands.
    let has_match = find_matching_call(result, &approval_call_id).is_some();
    if has_match {
        result.retain(|m| {
            !(m.role == Role::Tool
                && m.contents.iter().any(
                    |c| matches!(c, Content::FunctionResult { call_id, .. } if *call_id == approval_call_id),
                ))
        });
    }

    let Some((msg_idx, content_idx)) = find_matching_call(result, &approval_call_id) else {
        // No matching function call: a confirm_changes acknowledgement.
        let payload_text = match payload {
            Value::String(s) => s,
            other => serde_json::to_string(&other).unwrap_or_default(),
        };
        let mut converted = AgentMessage::new(Role::User, vec![Content::text(payload_text)]);
        converted
            .additional_properties
            .insert("is_tool_result".to_string(), Value::Bool(true));
        converted
            .additional_properties
            .insert("tool_call_id".to_string(), Value::String(tool_call_id));
        converted.message_id.clone_from(&msg.id);
        result.push(converted);
        return;
    };

    let original_call = match &result[msg_idx].contents[content_idx] {
        Content::FunctionCall(call) => call.clone(),
        _ => return,
    };
    let original_args = original_call.parse_arguments();

    let mut modified: Map<String, Value> = parsed.clone();
    modified.remove("accepted");
    let filtered = filter_modified_args(&modified, original_args.as_ref());

    let mut state_args: Option<Map<String, Value>> = None;
    let mut func_call_for_approval = original_call.clone();

    if !filtered.is_empty() {
        let mut merged = original_args.clone().unwrap_or_default();
        for (key, value) in &filtered {
            merged.insert(key.clone(), value.clone());
        }

        if let Some(Value::Array(approved_steps)) = filtered.get("steps")
            && let Some(Value::Array(original_steps)) =
                original_args.as_ref().and_then(|o| o.get("steps"))
        {
            merged.insert(
                "steps".to_string(),
                merge_steps(original_steps, approved_steps),
            );
        }

        info!(call_id = %approval_call_id, keys = ?filtered.keys().collect::<Vec<_>>(),
              "using modified arguments from approval");

        // Keep the original tool call and the snapshot mirror in sync
        // with the approved arguments.
        let updated_args = if original_call.arguments.is_string() {
            Value::String(serde_json::to_string(&merged).unwrap_or_default())
        } else {
            Value::Object(merged.clone())
        };
        if let Content::FunctionCall(call) = &mut result[msg_idx].contents[content_idx] {
            call.arguments = updated_args.clone();
        }
        update_tool_call_arguments(raw, &approval_call_id, &merged);

        func_call_for_approval = FunctionCall::new(
            original_call.call_id.clone(),
            original_call.name.clone(),
            updated_args,
        );
        state_args = Some(merged);
    }

    let mut additional = Map::new();
    if let Some(args) = state_args {
        additional.insert("ag_ui_state_args".to_string(), Value::Object(args));
    }
    let mut converted = AgentMessage::new(
        Role::User,
        vec![Content::FunctionApprovalResponse {
            id: approval_call_id,
            approved: accepted,
            function_call: func_call_for_approval,
            additional_properties: additional,
        }],
    );
    converted.message_id.clone_from(&msg.id);
    result.push(converted);
}

/// Parse a tool-result payload into an object, handling both encoded
/// strings and structured objects.
fn parse_payload_object(payload: &Value) -> Option<Map<String, Value>> {
    match payload {
        Value::String(s) if !s.is_empty() => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        Value::Object(map) => Some(map.clone()),
        _ => None,
    }
}

/// Resolve the real function-call id an approval payload answers.
///
/// Preference order: an explicit `function_call_id` in the payload, the
/// id recorded in the matching (or confirm) call's own arguments, then
/// the single non-confirm sibling when there is exactly one.
fn resolve_approval_call_id(
    tool_call_id: &str,
    parsed: &Map<String, Value>,
    result: &[AgentMessage],
) -> Option<String> {
    if let Some(explicit) = non_empty_str(parsed.get("function_call_id")) {
        return Some(explicit);
    }

    for prev in result {
        if prev.role != Role::Assistant {
            continue;
        }
        let mut direct_call = None;
        let mut confirm_call = None;
        let mut siblings = Vec::new();
        for content in &prev.contents {
            let Content::FunctionCall(call) = content else {
                continue;
            };
            if call.call_id == tool_call_id {
                direct_call = Some(call);
            }
            if call.name == CONFIRM_CHANGES_TOOL && call.call_id == tool_call_id {
                confirm_call = Some(call);
            } else if call.name != CONFIRM_CHANGES_TOOL {
                siblings.push(call);
            }
        }

        if let Some(call) = direct_call
            && let Some(args) = call.parse_arguments()
            && let Some(explicit) = non_empty_str(args.get("function_call_id"))
        {
            return Some(explicit);
        }

        let Some(confirm) = confirm_call else {
            continue;
        };
        if let Some(args) = confirm.parse_arguments()
            && let Some(explicit) = non_empty_str(args.get("function_call_id"))
        {
            return Some(explicit);
        }
        if siblings.len() == 1 && !siblings[0].call_id.is_empty() {
            return Some(siblings[0].call_id.clone());
        }
    }

    None
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Locate the assistant function call a given id refers to, skipping
/// the synthetic confirmation tool.
fn find_matching_call(result: &[AgentMessage], call_id: &str) -> Option<(usize, usize)> {
    for (msg_idx, msg) in result.iter().enumerate() {
        if msg.role != Role::Assistant {
            continue;
        }
        for (content_idx, content) in msg.contents.iter().enumerate() {
            if let Content::FunctionCall(call) = content
                && call.call_id == call_id
                && call.name != CONFIRM_CHANGES_TOOL
            {
                return Some((msg_idx, content_idx));
            }
        }
    }
    None
}

/// Keep only the modified keys that exist in the original arguments.
fn filter_modified_args(
    modified: &Map<String, Value>,
    original: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    let Some(original) = original.filter(|o| !o.is_empty()) else {
        return Map::new();
    };
    modified
        .iter()
        .filter(|(key, _)| original.contains_key(*key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Merge approved step statuses into the original step list, preserving
/// its order and length. Steps the user did not return come back
/// disabled.
fn merge_steps(original_steps: &[Value], approved_steps: &[Value]) -> Value {
    let mut approved_by_description: Map<String, Value> = Map::new();
    for step in approved_steps {
        if let Value::Object(obj) = step
            && let Some(desc) = non_empty_str(obj.get("description"))
        {
            approved_by_description.insert(desc, step.clone());
        }
    }

    let merged = original_steps
        .iter()
        .map(|orig| {
            let Value::Object(orig_obj) = orig else {
                return orig.clone();
            };
            let description = orig_obj
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let status = approved_by_description
                .get(description)
                .and_then(|s| s.get("status"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or("disabled");
            let mut updated = orig_obj.clone();
            updated.insert("status".to_string(), Value::String(status.to_string()));
            Value::Object(updated)
        })
        .collect();
    Value::Array(merged)
}

/// Write merged arguments back into the raw wire message that announced
/// the call, preserving the string-vs-object encoding it used.
fn update_tool_call_arguments(raw: &mut [InputMessage], call_id: &str, merged: &Map<String, Value>) {
    for msg in raw {
        for tc in &mut msg.tool_calls {
            if tc.id != call_id {
                continue;
            }
            tc.function.arguments = if tc.function.arguments.is_string() {
                Value::String(serde_json::to_string(merged).unwrap_or_default())
            } else {
                Value::Object(merged.clone())
            };
            return;
        }
    }
}

/// Normalize tool ordering and inject synthetic results for AG-UI edge
/// cases.
#[must_use]
pub fn sanitize_tool_history(messages: Vec<AgentMessage>) -> Vec<AgentMessage> {
    let mut sanitized: Vec<AgentMessage> = Vec::new();
    let mut pending: Option<Vec<String>> = None;
    let mut pending_confirm: Option<String> = None;

    for msg in messages {
        match msg.role {
            Role::Assistant => {
                let ids: Vec<String> = msg
                    .contents
                    .iter()
                    .filter_map(Content::as_function_call)
                    .filter(|c| !c.call_id.is_empty())
                    .map(|c| c.call_id.clone())
                    .collect();
                let confirm = msg
                    .contents
                    .iter()
                    .filter_map(Content::as_function_call)
                    .find(|c| c.name == CONFIRM_CHANGES_TOOL && !c.call_id.is_empty())
                    .map(|c| c.call_id.clone());
                sanitized.push(msg);
                pending = if ids.is_empty() { None } else { Some(ids) };
                pending_confirm = confirm;
            }
            Role::User => {
                let mut approval_ids: HashSet<String> = HashSet::new();
                let mut approval_accepted: Option<bool> = None;
                for content in &msg.contents {
                    if let Content::FunctionApprovalResponse {
                        approved,
                        function_call,
                        ..
                    } = content
                    {
                        if !function_call.call_id.is_empty() {
                            approval_ids.insert(function_call.call_id.clone());
                        }
                        approval_accepted =
                            Some(approval_accepted.is_none_or(|prior| prior) && *approved);
                    }
                }

                if !approval_ids.is_empty()
                    && let Some(p) = &mut pending
                {
                    p.retain(|id| !approval_ids.contains(id));
                    info!(ids = ?approval_ids, "approval responses cover pending tool calls");
                }

                if let (Some(confirm_id), Some(accepted)) = (pending_confirm.clone(), approval_accepted)
                {
                    info!(call_id = %confirm_id, "injecting synthetic confirm_changes result");
                    sanitized.push(confirm_result(&confirm_id, accepted));
                    if let Some(p) = &mut pending {
                        p.retain(|id| *id != confirm_id);
                    }
                    pending_confirm = None;
                }

                if let Some(confirm_id) = pending_confirm.clone() {
                    let user_text = msg.text_content();
                    if let Ok(Value::Object(parsed)) = serde_json::from_str::<Value>(&user_text)
                        && parsed.contains_key("accepted")
                    {
                        let accepted = parsed
                            .get("accepted")
                            .and_then(Value::as_bool)
                            .unwrap_or(false);
                        info!(call_id = %confirm_id, "user message is a confirm_changes response");
                        sanitized.push(confirm_result(&confirm_id, accepted));
                        if let Some(p) = &mut pending {
                            p.retain(|id| *id != confirm_id);
                        }
                        pending_confirm = None;
                        continue;
                    }
                }

                if let Some(p) = &pending
                    && !p.is_empty()
                {
                    info!(
                        count = p.len(),
                        "user message arrived with pending tool calls; injecting synthetic results"
                    );
                    for call_id in p {
                        sanitized.push(AgentMessage::tool_result(
                            call_id.clone(),
                            SKIPPED_RESULT,
                        ));
                    }
                    pending = None;
                }

                sanitized.push(msg);
                pending_confirm = None;
            }
            Role::Tool => {
                let Some(p) = &mut pending else {
                    debug!("dropping stale tool message (no pending tool calls)");
                    continue;
                };
                let answered: Option<String> = msg
                    .contents
                    .iter()
                    .find_map(|c| match c {
                        Content::FunctionResult { call_id, .. }
                            if !call_id.is_empty() && p.contains(call_id) =>
                        {
                            Some(call_id.clone())
                        }
                        _ => None,
                    });
                if let Some(call_id) = answered {
                    p.retain(|id| *id != call_id);
                    if pending_confirm.as_deref() == Some(call_id.as_str()) {
                        pending_confirm = None;
                    }
                    sanitized.push(msg);
                } else {
                    debug!("dropping stale tool message (unmatched call id)");
                }
            }
            Role::System | Role::Developer => {
                sanitized.push(msg);
                pending = None;
                pending_confirm = None;
            }
        }
    }

    sanitized
}

fn confirm_result(call_id: &str, accepted: bool) -> AgentMessage {
    AgentMessage::tool_result(call_id, if accepted { "Confirmed" } else { "Rejected" })
}

#[derive(Hash, PartialEq, Eq)]
enum DedupKey {
    ToolResult(String),
    AssistantCalls(Vec<String>),
    Other(Role, u64),
}

/// Remove duplicate messages while preserving order. A duplicate tool
/// result replaces an earlier empty one; everything else keeps the
/// first occurrence.
#[must_use]
pub fn deduplicate_messages(messages: Vec<AgentMessage>) -> Vec<AgentMessage> {
    let mut seen: std::collections::HashMap<DedupKey, usize> = std::collections::HashMap::new();
    let mut unique: Vec<AgentMessage> = Vec::new();

    for msg in messages {
        let key = dedup_key(&msg);

        if let Some(&existing_idx) = seen.get(&key) {
            if let DedupKey::ToolResult(call_id) = &key {
                let existing_empty = unique[existing_idx]
                    .contents
                    .first()
                    .is_some_and(|c| matches!(c, Content::FunctionResult { result, .. }
                        if result.is_null() || result.as_str() == Some("")));
                let new_nonempty = msg.contents.first().is_some_and(
                    |c| matches!(c, Content::FunctionResult { result, .. }
                        if !(result.is_null() || result.as_str() == Some(""))),
                );
                if existing_empty && new_nonempty {
                    info!(call_id = %call_id, "replacing empty tool result with populated duplicate");
                    unique[existing_idx] = msg;
                    continue;
                }
            }
            debug!("skipping duplicate message");
            continue;
        }

        seen.insert(key, unique.len());
        unique.push(msg);
    }

    unique
}

fn dedup_key(msg: &AgentMessage) -> DedupKey {
    if msg.role == Role::Tool
        && let Some(Content::FunctionResult { call_id, .. }) = msg.contents.first()
    {
        return DedupKey::ToolResult(call_id.clone());
    }

    if msg.role == Role::Assistant && msg.has_function_calls() {
        let mut ids: Vec<String> = msg
            .contents
            .iter()
            .filter_map(Content::as_function_call)
            .map(|c| c.call_id.clone())
            .collect();
        ids.sort();
        return DedupKey::AssistantCalls(ids);
    }

    let mut hasher = DefaultHasher::new();
    serde_json::to_string(&msg.contents)
        .unwrap_or_default()
        .hash(&mut hasher);
    DedupKey::Other(msg.role, hasher.finish())
}

/// Convert inner-agent messages back to AG-UI wire form for snapshot
/// assembly. Function-call arguments are string-encoded.
#[must_use]
pub fn internal_to_wire(messages: &[AgentMessage]) -> Vec<Value> {
    let mut result = Vec::new();
    for msg in messages {
        let mut content_text = String::new();
        let mut tool_calls = Vec::new();
        let mut tool_result_call_id: Option<String> = None;

        for content in &msg.contents {
            match content {
                Content::Text { text } => content_text.push_str(text),
                Content::FunctionCall(call) => tool_calls.push(json!({
                    "id": call.call_id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments_string(),
                    },
                })),
                Content::FunctionResult { call_id, result } => {
                    tool_result_call_id = Some(call_id.clone());
                    content_text = stringify_result(result);
                }
                _ => {}
            }
        }

        let mut obj = Map::new();
        obj.insert(
            "id".to_string(),
            Value::String(
                msg.message_id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
            ),
        );
        obj.insert(
            "role".to_string(),
            Value::String(msg.role.as_str().to_string()),
        );
        obj.insert("content".to_string(), Value::String(content_text));
        if !tool_calls.is_empty() {
            obj.insert("tool_calls".to_string(), Value::Array(tool_calls));
        }
        if let Some(call_id) = tool_result_call_id {
            obj.insert("toolCallId".to_string(), Value::String(call_id));
            obj.insert("role".to_string(), Value::String("tool".to_string()));
        }
        result.push(Value::Object(obj));
    }
    result
}

/// Normalize raw wire messages for `MessagesSnapshot` emission: stable
/// ids, flattened content, string-encoded tool-call arguments, and the
/// camelCase `toolCallId` key on tool messages.
#[must_use]
pub fn snapshot_messages(raw: &[InputMessage]) -> Vec<Value> {
    let mut result = Vec::new();
    for msg in raw {
        let role = Role::parse(&msg.role);
        let mut obj = Map::new();
        obj.insert(
            "id".to_string(),
            Value::String(
                msg.id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
            ),
        );
        obj.insert(
            "role".to_string(),
            Value::String(role.as_str().to_string()),
        );
        obj.insert(
            "content".to_string(),
            Value::String(msg.content_text()),
        );

        if !msg.tool_calls.is_empty() {
            let calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    let arguments = match &tc.function.arguments {
                        Value::String(s) => s.clone(),
                        Value::Null => String::new(),
                        other => serde_json::to_string(other).unwrap_or_default(),
                    };
                    json!({
                        "id": tc.id,
                        "type": tc.call_type,
                        "function": {
                            "name": tc.function.name,
                            "arguments": arguments,
                        },
                    })
                })
                .collect();
            obj.insert("tool_calls".to_string(), Value::Array(calls));
        }

        if role == Role::Tool {
            obj.insert(
                "toolCallId".to_string(),
                Value::String(msg.result_call_id().unwrap_or_default().to_string()),
            );
        }

        for (key, value) in &msg.extra {
            obj.entry(key.clone()).or_insert_with(|| value.clone());
        }

        result.push(Value::Object(obj));
    }
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(messages: Value) -> Vec<InputMessage> {
        serde_json::from_value(messages).unwrap()
    }

    mod conversion {
        use super::*;

        #[test]
        fn plain_messages_map_by_role() {
            let mut raw = wire(json!([
                {"id": "m1", "role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "system", "content": "rules"}
            ]));
            let converted = wire_to_internal(&mut raw);
            assert_eq!(converted[0].role, Role::User);
            assert_eq!(converted[0].message_id.as_deref(), Some("m1"));
            assert_eq!(converted[1].role, Role::Assistant);
            assert_eq!(converted[2].role, Role::System);
        }

        #[test]
        fn assistant_tool_calls_become_function_calls() {
            let mut raw = wire(json!([
                {"role": "assistant", "content": "calling", "tool_calls": [
                    {"id": "c1", "type": "function",
                     "function": {"name": "search", "arguments": "{\"q\":\"x\"}"}}
                ]}
            ]));
            let converted = wire_to_internal(&mut raw);
            assert_eq!(converted[0].contents.len(), 2);
            let call = converted[0].contents[1].as_function_call().unwrap();
            assert_eq!(call.call_id, "c1");
            assert_eq!(call.name, "search");
        }

        #[test]
        fn tool_message_becomes_function_result() {
            let mut raw = wire(json!([
                {"role": "tool", "toolCallId": "c1", "content": "42"}
            ]));
            let converted = wire_to_internal(&mut raw);
            assert_eq!(converted[0].role, Role::Tool);
            match &converted[0].contents[0] {
                Content::FunctionResult { call_id, result } => {
                    assert_eq!(call_id, "c1");
                    assert_eq!(result, &json!("42"));
                }
                other => panic!("unexpected content: {other:?}"),
            }
        }

        #[test]
        fn legacy_action_payload_maps_to_tool_result() {
            let mut raw = wire(json!([
                {"role": "user", "actionExecutionId": "a1", "result": "rendered"}
            ]));
            let converted = wire_to_internal(&mut raw);
            assert_eq!(converted[0].role, Role::Tool);
            match &converted[0].contents[0] {
                Content::FunctionResult { call_id, .. } => assert_eq!(call_id, "a1"),
                other => panic!("unexpected content: {other:?}"),
            }
        }
    }

    mod approval_reconstruction {
        use super::*;

        fn approval_turn(approval_content: &str) -> Vec<InputMessage> {
            wire(json!([
                {"role": "user", "content": "refund please"},
                {"role": "assistant", "tool_calls": [
                    {"id": "C1", "type": "function",
                     "function": {"name": "refund",
                                  "arguments": "{\"amount\":50,\"steps\":[{\"description\":\"Step A\",\"status\":\"enabled\"},{\"description\":\"Step B\",\"status\":\"enabled\"}]}"}},
                    {"id": "CONFIRM", "type": "function",
                     "function": {"name": "confirm_changes",
                                  "arguments": "{\"function_call_id\":\"C1\",\"function_name\":\"refund\"}"}}
                ]},
                {"role": "tool", "toolCallId": "CONFIRM", "content": approval_content}
            ]))
        }

        #[test]
        fn approval_resolves_to_original_call() {
            let mut raw = approval_turn(r#"{"accepted":true}"#);
            let converted = wire_to_internal(&mut raw);
            let last = converted.last().unwrap();
            assert_eq!(last.role, Role::User);
            match &last.contents[0] {
                Content::FunctionApprovalResponse {
                    approved,
                    function_call,
                    ..
                } => {
                    assert!(*approved);
                    assert_eq!(function_call.call_id, "C1");
                    assert_eq!(function_call.name, "refund");
                }
                other => panic!("unexpected content: {other:?}"),
            }
        }

        #[test]
        fn edited_steps_merge_by_description() {
            let mut raw = approval_turn(
                r#"{"accepted":true,"steps":[{"description":"Step A","status":"enabled"}]}"#,
            );
            let converted = wire_to_internal(&mut raw);
            let last = converted.last().unwrap();
            let Content::FunctionApprovalResponse {
                function_call,
                additional_properties,
                ..
            } = &last.contents[0]
            else {
                panic!("expected approval response");
            };

            let state_args = additional_properties["ag_ui_state_args"]
                .as_object()
                .unwrap();
            let steps = state_args["steps"].as_array().unwrap();
            assert_eq!(steps.len(), 2);
            assert_eq!(steps[0]["status"], "enabled");
            assert_eq!(steps[1]["status"], "disabled");

            // Execution arguments carry the merged form too.
            let merged = function_call.parse_arguments().unwrap();
            assert_eq!(merged["amount"], 50);
            assert_eq!(merged["steps"].as_array().unwrap().len(), 2);
        }

        #[test]
        fn merged_args_written_back_to_wire_mirror() {
            let mut raw = approval_turn(
                r#"{"accepted":true,"steps":[{"description":"Step B","status":"enabled"}]}"#,
            );
            let _ = wire_to_internal(&mut raw);
            let args = raw[1].tool_calls[0].function.arguments.as_str().unwrap();
            let parsed: Value = serde_json::from_str(args).unwrap();
            assert_eq!(parsed["steps"][0]["status"], "disabled");
            assert_eq!(parsed["steps"][1]["status"], "enabled");
        }

        #[test]
        fn unknown_keys_in_payload_are_dropped() {
            let mut raw = approval_turn(r#"{"accepted":true,"amount":75,"bogus":1}"#);
            let converted = wire_to_internal(&mut raw);
            let Content::FunctionApprovalResponse { function_call, .. } =
                &converted.last().unwrap().contents[0]
            else {
                panic!("expected approval response");
            };
            let args = function_call.parse_arguments().unwrap();
            assert_eq!(args["amount"], 75);
            assert!(!args.contains_key("bogus"));
        }

        #[test]
        fn stale_result_for_approved_call_is_removed() {
            let mut raw = wire(json!([
                {"role": "assistant", "tool_calls": [
                    {"id": "C1", "type": "function",
                     "function": {"name": "refund", "arguments": "{\"amount\":50}"}}
                ]},
                {"role": "tool", "toolCallId": "C1", "content": "old result"},
                {"role": "tool", "toolCallId": "C1", "content": "{\"accepted\":true}"}
            ]));
            let converted = wire_to_internal(&mut raw);
            assert!(!converted.iter().any(|m| m.role == Role::Tool));
        }

        #[test]
        fn approval_without_matching_call_is_confirmation_text() {
            let mut raw = wire(json!([
                {"role": "tool", "toolCallId": "X", "content": "{\"accepted\":true,\"steps\":[]}"}
            ]));
            let converted = wire_to_internal(&mut raw);
            let msg = &converted[0];
            assert_eq!(msg.role, Role::User);
            assert_eq!(msg.additional_properties["is_tool_result"], true);
            assert!(msg.text_content().contains("accepted"));
        }
    }

    mod sanitization {
        use super::*;

        fn assistant_with_calls(ids: &[&str]) -> AgentMessage {
            AgentMessage::new(
                Role::Assistant,
                ids.iter()
                    .map(|id| Content::function_call(*id, "search", Value::Null))
                    .collect(),
            )
        }

        #[test]
        fn user_follow_up_injects_skipped_results() {
            let messages = vec![
                assistant_with_calls(&["c1", "c2"]),
                AgentMessage::user("actually, never mind"),
            ];
            let sanitized = sanitize_tool_history(messages);
            assert_eq!(sanitized.len(), 4);
            assert_eq!(sanitized[1].role, Role::Tool);
            assert_eq!(sanitized[2].role, Role::Tool);
            match &sanitized[1].contents[0] {
                Content::FunctionResult { result, .. } => {
                    assert_eq!(result, &json!(SKIPPED_RESULT));
                }
                other => panic!("unexpected content: {other:?}"),
            }
            assert_eq!(sanitized[3].role, Role::User);
        }

        #[test]
        fn answered_calls_do_not_get_synthetic_results() {
            let messages = vec![
                assistant_with_calls(&["c1"]),
                AgentMessage::tool_result("c1", "done"),
                AgentMessage::user("thanks"),
            ];
            let sanitized = sanitize_tool_history(messages);
            assert_eq!(sanitized.len(), 3);
        }

        #[test]
        fn stale_tool_messages_are_dropped() {
            let messages = vec![
                AgentMessage::user("hi"),
                AgentMessage::tool_result("ghost", "noise"),
            ];
            let sanitized = sanitize_tool_history(messages);
            assert_eq!(sanitized.len(), 1);
        }

        #[test]
        fn confirm_changes_ack_replaced_with_synthetic_result() {
            let confirm = AgentMessage::new(
                Role::Assistant,
                vec![Content::function_call(
                    "confirm-1",
                    CONFIRM_CHANGES_TOOL,
                    Value::Null,
                )],
            );
            let ack = AgentMessage::user(r#"{"accepted":true}"#);
            let sanitized = sanitize_tool_history(vec![confirm, ack]);
            assert_eq!(sanitized.len(), 2);
            match &sanitized[1].contents[0] {
                Content::FunctionResult { call_id, result } => {
                    assert_eq!(call_id, "confirm-1");
                    assert_eq!(result, &json!("Confirmed"));
                }
                other => panic!("unexpected content: {other:?}"),
            }
        }

        #[test]
        fn rejected_ack_produces_rejected_result() {
            let confirm = AgentMessage::new(
                Role::Assistant,
                vec![Content::function_call(
                    "confirm-1",
                    CONFIRM_CHANGES_TOOL,
                    Value::Null,
                )],
            );
            let ack = AgentMessage::user(r#"{"accepted":false}"#);
            let sanitized = sanitize_tool_history(vec![confirm, ack]);
            match &sanitized[1].contents[0] {
                Content::FunctionResult { result, .. } => assert_eq!(result, &json!("Rejected")),
                other => panic!("unexpected content: {other:?}"),
            }
        }

        #[test]
        fn approval_response_covers_pending_call() {
            let messages = vec![
                assistant_with_calls(&["c1"]),
                AgentMessage::new(
                    Role::User,
                    vec![Content::approval_response(
                        "c1",
                        true,
                        FunctionCall::new("c1", "search", Value::Null),
                    )],
                ),
            ];
            let sanitized = sanitize_tool_history(messages);
            // No synthetic skipped result; the framework executes the call.
            assert_eq!(sanitized.len(), 2);
        }
    }

    mod deduplication {
        use super::*;

        #[test]
        fn duplicate_tool_results_collapse() {
            let messages = vec![
                AgentMessage::tool_result("c1", "result"),
                AgentMessage::tool_result("c1", "result again"),
            ];
            let unique = deduplicate_messages(messages);
            assert_eq!(unique.len(), 1);
            match &unique[0].contents[0] {
                Content::FunctionResult { result, .. } => assert_eq!(result, &json!("result")),
                other => panic!("unexpected content: {other:?}"),
            }
        }

        #[test]
        fn empty_tool_result_replaced_by_populated_duplicate() {
            let messages = vec![
                AgentMessage::tool_result("c1", ""),
                AgentMessage::tool_result("c1", "data"),
            ];
            let unique = deduplicate_messages(messages);
            assert_eq!(unique.len(), 1);
            match &unique[0].contents[0] {
                Content::FunctionResult { result, .. } => assert_eq!(result, &json!("data")),
                other => panic!("unexpected content: {other:?}"),
            }
        }

        #[test]
        fn duplicate_assistant_call_sets_collapse() {
            let call_set = || {
                AgentMessage::new(
                    Role::Assistant,
                    vec![
                        Content::function_call("c1", "a", Value::Null),
                        Content::function_call("c2", "b", Value::Null),
                    ],
                )
            };
            let unique = deduplicate_messages(vec![call_set(), call_set()]);
            assert_eq!(unique.len(), 1);
        }

        #[test]
        fn distinct_text_messages_survive() {
            let unique = deduplicate_messages(vec![
                AgentMessage::user("one"),
                AgentMessage::user("two"),
                AgentMessage::user("one"),
            ]);
            assert_eq!(unique.len(), 2);
        }
    }

    mod wire_round_trip {
        use super::*;

        #[test]
        fn canonical_history_is_stable_under_normalization() {
            let raw = wire(json!([
                {"id": "m1", "role": "user", "content": "hi"},
                {"id": "m2", "role": "assistant", "content": "hello"}
            ]));
            let normalized = normalize_input_messages(&raw);
            let wire_again = internal_to_wire(&normalized.messages);
            assert_eq!(wire_again[0]["role"], "user");
            assert_eq!(wire_again[0]["content"], "hi");
            assert_eq!(wire_again[0]["id"], "m1");
            assert_eq!(wire_again[1]["role"], "assistant");
            assert_eq!(wire_again[1]["content"], "hello");
        }

        #[test]
        fn tool_result_round_trips_with_camel_case_key() {
            let messages = vec![AgentMessage::tool_result("c1", json!({"ok": true}))];
            let wire_form = internal_to_wire(&messages);
            assert_eq!(wire_form[0]["role"], "tool");
            assert_eq!(wire_form[0]["toolCallId"], "c1");
            assert_eq!(wire_form[0]["content"], r#"{"ok":true}"#);
        }
    }

    mod snapshot_format {
        use super::*;

        #[test]
        fn content_parts_flattened() {
            let raw = wire(json!([
                {"role": "user", "content": [
                    {"type": "input_text", "text": "Hello "},
                    {"type": "text", "text": "World"}
                ]}
            ]));
            let snapshot = snapshot_messages(&raw);
            assert_eq!(snapshot[0]["content"], "Hello World");
            assert!(snapshot[0]["id"].as_str().is_some());
        }

        #[test]
        fn tool_call_arguments_string_encoded() {
            let raw = wire(json!([
                {"role": "assistant", "tool_calls": [
                    {"id": "c1", "type": "function",
                     "function": {"name": "search", "arguments": {"q": "x"}}}
                ]}
            ]));
            let snapshot = snapshot_messages(&raw);
            assert_eq!(
                snapshot[0]["tool_calls"][0]["function"]["arguments"],
                r#"{"q":"x"}"#
            );
        }

        #[test]
        fn tool_messages_get_camel_case_call_id() {
            let raw = wire(json!([
                {"role": "tool", "tool_call_id": "c9", "content": "ok"}
            ]));
            let snapshot = snapshot_messages(&raw);
            assert_eq!(snapshot[0]["toolCallId"], "c9");
        }

        #[test]
        fn null_content_becomes_empty_string() {
            let raw = wire(json!([
                {"role": "assistant", "content": null}
            ]));
            let snapshot = snapshot_messages(&raw);
            assert_eq!(snapshot[0]["content"], "");
        }
    }
}
