//! Human-in-the-loop approval resolution.
//!
//! Turn N pauses the run after an approval request; turn N+1 arrives
//! with approval responses reconstructed by the message adapter. Before
//! the inner agent runs again, approved calls execute, rejected calls
//! get a sentinel result, and every approval content is replaced
//! in-place by the corresponding function result so providers see a
//! well-formed tool exchange.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::content::{AgentMessage, Content, Role};
use crate::error::ToolError;
use crate::event::{Event, TextMessageContentEvent, TextMessageEndEvent, TextMessageStartEvent};
use crate::predictive::PredictiveState;
use crate::tool::ToolRegistry;

/// Result injected when the user rejects a call.
pub const REJECTED_RESULT: &str = "Error: Tool call invocation was rejected by user.";

/// Result injected when an approved call fails to execute.
pub const FAILED_RESULT: &str = "Error: Tool call invocation failed.";

/// Strategy for generating confirmation messages during approval flows.
///
/// Agents provide a custom strategy to produce domain-specific wording;
/// [`DefaultConfirmationStrategy`] covers the rest.
pub trait ConfirmationStrategy: Send + Sync {
    /// Message shown when the user approves function execution.
    fn on_approval_accepted(&self, steps: &[Value]) -> String;

    /// Message shown when the user rejects function execution.
    fn on_approval_rejected(&self, steps: &[Value]) -> String;

    /// Message shown when the user confirms predictive state changes.
    fn on_state_confirmed(&self) -> String;

    /// Message shown when the user rejects predictive state changes.
    fn on_state_rejected(&self) -> String;
}

/// Generic confirmation messages suitable for most agents.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfirmationStrategy;

impl ConfirmationStrategy for DefaultConfirmationStrategy {
    fn on_approval_accepted(&self, steps: &[Value]) -> String {
        let enabled: Vec<&Value> = steps
            .iter()
            .filter(|s| s.get("status").and_then(Value::as_str) == Some("enabled"))
            .collect();

        let mut message = format!("Executing {} approved steps:\n\n", enabled.len());
        for (i, step) in enabled.iter().enumerate() {
            let description = step
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("Step");
            message.push_str(&format!("{}. {description}\n", i + 1));
        }
        message.push_str("\nAll steps completed successfully!");
        message
    }

    fn on_approval_rejected(&self, _steps: &[Value]) -> String {
        "No problem! What would you like me to change about the plan?".to_string()
    }

    fn on_state_confirmed(&self) -> String {
        "Changes confirmed and applied successfully!".to_string()
    }

    fn on_state_rejected(&self) -> String {
        "No problem! What would you like me to change?".to_string()
    }
}

/// An approval response collected from the normalized messages.
#[derive(Debug, Clone)]
pub struct CollectedApproval {
    /// The approval id.
    pub id: String,
    /// Whether the user approved.
    pub approved: bool,
    /// The function call to (re-)execute.
    pub function_call: crate::content::FunctionCall,
    /// Extra payload from reconstruction (`ag_ui_state_args`).
    pub additional_properties: Map<String, Value>,
}

/// Collect approval responses from messages, keyed by approval id with
/// the last occurrence winning.
#[must_use]
pub fn collect_approvals(messages: &[AgentMessage]) -> Vec<CollectedApproval> {
    let mut collected: Vec<CollectedApproval> = Vec::new();
    for msg in messages {
        for content in &msg.contents {
            if let Content::FunctionApprovalResponse {
                id,
                approved,
                function_call,
                additional_properties,
            } = content
            {
                collected.retain(|a| a.id != *id);
                collected.push(CollectedApproval {
                    id: id.clone(),
                    approved: *approved,
                    function_call: function_call.clone(),
                    additional_properties: additional_properties.clone(),
                });
            }
        }
    }
    collected
}

/// State updates implied by approved, state-binding approvals.
///
/// The merged `ag_ui_state_args` form wins over the raw call arguments
/// so user edits take effect; the raw arguments are the fallback when no
/// merge happened.
#[must_use]
pub fn approved_state_updates(
    approvals: &[CollectedApproval],
    predictive: &PredictiveState,
) -> Map<String, Value> {
    let mut updates = Map::new();
    for approval in approvals {
        if !approval.approved {
            continue;
        }
        let args = approval
            .additional_properties
            .get("ag_ui_state_args")
            .cloned()
            .unwrap_or_else(|| approval.function_call.arguments.clone());
        if let Some((state_key, state_value)) =
            predictive.extract_state_value(&approval.function_call.name, &args)
        {
            info!(key = %state_key, "approved state update");
            updates.insert(state_key, state_value);
        }
    }
    updates
}

/// Execute approved calls and replace every approval content in-place
/// with the corresponding function result, flipping the message role to
/// `tool`. Rejected approvals get [`REJECTED_RESULT`]; execution
/// failures degrade to [`FAILED_RESULT`] without aborting the run.
pub async fn resolve_approvals(messages: &mut Vec<AgentMessage>, tools: &ToolRegistry) {
    let approvals = collect_approvals(messages);
    if approvals.is_empty() {
        return;
    }

    let mut results: Map<String, Value> = Map::new();
    for approval in &approvals {
        let call_id = if approval.function_call.call_id.is_empty() {
            approval.id.clone()
        } else {
            approval.function_call.call_id.clone()
        };
        let result = if approval.approved {
            execute_approved(approval, tools).await
        } else {
            info!(call_id = %call_id, "tool call rejected by user");
            Value::String(REJECTED_RESULT.to_string())
        };
        results.insert(approval.id.clone(), result);
    }

    replace_approvals_with_results(messages, &results);
    dedupe_tool_results(messages);
}

async fn execute_approved(approval: &CollectedApproval, tools: &ToolRegistry) -> Value {
    let name = &approval.function_call.name;
    if !tools.contains(name) {
        warn!(tool = %name, "approved tool not in merged tool set");
        return Value::String(FAILED_RESULT.to_string());
    }
    match tools
        .execute(name, approval.function_call.arguments_string())
        .await
    {
        Ok(output) => Value::String(output),
        Err(ToolError::DeclarationOnly(_)) => {
            debug!(tool = %name, "approved tool is declaration-only");
            Value::String(FAILED_RESULT.to_string())
        }
        Err(err) => {
            warn!(tool = %name, error = %err, "approved tool execution failed");
            Value::String(FAILED_RESULT.to_string())
        }
    }
}

/// In-place content replacement: approval requests become their function
/// calls again (or vanish when the call already exists), approval
/// responses become function results on a tool-role message.
fn replace_approvals_with_results(messages: &mut [AgentMessage], results: &Map<String, Value>) {
    for msg in messages {
        let existing_call_ids: HashSet<String> = msg
            .contents
            .iter()
            .filter_map(Content::as_function_call)
            .map(|c| c.call_id.clone())
            .collect();

        let mut replaced = Vec::with_capacity(msg.contents.len());
        let mut became_tool = false;
        for content in msg.contents.drain(..) {
            match content {
                Content::FunctionApprovalRequest { function_call, .. } => {
                    if existing_call_ids.contains(&function_call.call_id) {
                        // The call already exists; dropping the request
                        // avoids a duplicate.
                        continue;
                    }
                    replaced.push(Content::FunctionCall(function_call));
                }
                Content::FunctionApprovalResponse {
                    id,
                    function_call,
                    approved,
                    ..
                } => {
                    let call_id = if function_call.call_id.is_empty() {
                        id.clone()
                    } else {
                        function_call.call_id.clone()
                    };
                    let result = results.get(&id).cloned().unwrap_or_else(|| {
                        Value::String(if approved {
                            FAILED_RESULT.to_string()
                        } else {
                            REJECTED_RESULT.to_string()
                        })
                    });
                    replaced.push(Content::function_result(call_id, result));
                    became_tool = true;
                }
                other => replaced.push(other),
            }
        }
        msg.contents = replaced;
        if became_tool {
            msg.role = Role::Tool;
        }
    }
}

/// Drop later function results that share a call id with an earlier one.
fn dedupe_tool_results(messages: &mut Vec<AgentMessage>) {
    let mut seen: HashSet<String> = HashSet::new();
    for msg in messages.iter_mut() {
        msg.contents.retain(|content| match content {
            Content::FunctionResult { call_id, .. } if !call_id.is_empty() => {
                seen.insert(call_id.clone())
            }
            _ => true,
        });
    }
    messages.retain(|msg| !(msg.role == Role::Tool && msg.contents.is_empty()));
}

/// Check if the last message is a confirm-changes acknowledgement: a
/// reconstructed tool result whose payload carries both `accepted` and
/// `steps`.
#[must_use]
pub fn is_confirm_changes_response(messages: &[AgentMessage]) -> bool {
    let Some(last) = messages.last() else {
        return false;
    };
    if last
        .additional_properties
        .get("is_tool_result")
        .and_then(Value::as_bool)
        != Some(true)
    {
        return false;
    }
    for content in &last.contents {
        if let Content::Text { text } = content {
            match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(parsed)) => {
                    if parsed.contains_key("accepted") && parsed.contains_key("steps") {
                        return true;
                    }
                }
                _ => debug!("confirm_changes payload is not valid JSON"),
            }
        }
    }
    false
}

/// Events for a confirm-changes acknowledgement: one informational text
/// message whose wording comes from the confirmation strategy.
///
/// Empty `steps` means the user confirmed (or rejected) predictive state
/// changes rather than a step-based plan.
#[must_use]
pub fn confirmation_events(
    messages: &[AgentMessage],
    strategy: &dyn ConfirmationStrategy,
) -> Vec<Event> {
    let approval_text = messages
        .last()
        .map(AgentMessage::text_content)
        .unwrap_or_default();

    let message = match serde_json::from_str::<Value>(&approval_text) {
        Ok(Value::Object(parsed)) => {
            let accepted = parsed
                .get("accepted")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let steps = parsed
                .get("steps")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            match (steps.is_empty(), accepted) {
                (true, true) => strategy.on_state_confirmed(),
                (true, false) => strategy.on_state_rejected(),
                (false, true) => strategy.on_approval_accepted(&steps),
                (false, false) => strategy.on_approval_rejected(&steps),
            }
        }
        _ => {
            debug!("unparseable confirmation payload");
            "Acknowledged.".to_string()
        }
    };

    let message_id = Uuid::new_v4().to_string();
    vec![
        TextMessageStartEvent::new(message_id.clone()),
        TextMessageContentEvent::new(message_id.clone(), message),
        TextMessageEndEvent::new(message_id),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::content::FunctionCall;
    use crate::predictive::{PredictStateBinding, PredictStateConfig};
    use crate::tool::{ApprovalMode, Tool};
    use serde_json::json;

    #[derive(serde::Deserialize, schemars::JsonSchema)]
    struct RefundArgs {
        amount: i64,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("refund failed")]
    struct RefundError;

    struct RefundTool;

    impl Tool for RefundTool {
        const NAME: &'static str = "refund";

        type Error = RefundError;
        type Args = RefundArgs;
        type Output = String;

        fn approval_mode(&self) -> ApprovalMode {
            ApprovalMode::AlwaysRequire
        }

        async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
            if args.amount < 0 {
                return Err(RefundError);
            }
            Ok(format!("refunded {}", args.amount))
        }
    }

    fn approval_message(approved: bool, arguments: Value) -> AgentMessage {
        AgentMessage::new(
            Role::User,
            vec![Content::approval_response(
                "C1",
                approved,
                FunctionCall::new("C1", "refund", arguments),
            )],
        )
    }

    mod resolution {
        use super::*;

        #[tokio::test]
        async fn approved_call_executes_and_replaces_content() {
            let tools = ToolRegistry::new().with_tool(RefundTool);
            let mut messages = vec![approval_message(true, json!({"amount": 50}))];
            resolve_approvals(&mut messages, &tools).await;

            assert_eq!(messages[0].role, Role::Tool);
            match &messages[0].contents[0] {
                Content::FunctionResult { call_id, result } => {
                    assert_eq!(call_id, "C1");
                    assert_eq!(result, &json!("\"refunded 50\""));
                }
                other => panic!("unexpected content: {other:?}"),
            }
        }

        #[tokio::test]
        async fn rejected_call_gets_sentinel_result() {
            let tools = ToolRegistry::new().with_tool(RefundTool);
            let mut messages = vec![approval_message(false, json!({"amount": 50}))];
            resolve_approvals(&mut messages, &tools).await;

            match &messages[0].contents[0] {
                Content::FunctionResult { result, .. } => {
                    assert_eq!(result, &json!(REJECTED_RESULT));
                }
                other => panic!("unexpected content: {other:?}"),
            }
        }

        #[tokio::test]
        async fn failing_execution_degrades_to_sentinel() {
            let tools = ToolRegistry::new().with_tool(RefundTool);
            let mut messages = vec![approval_message(true, json!({"amount": -1}))];
            resolve_approvals(&mut messages, &tools).await;

            match &messages[0].contents[0] {
                Content::FunctionResult { result, .. } => {
                    assert_eq!(result, &json!(FAILED_RESULT));
                }
                other => panic!("unexpected content: {other:?}"),
            }
        }

        #[tokio::test]
        async fn unknown_tool_degrades_to_sentinel() {
            let tools = ToolRegistry::new();
            let mut messages = vec![approval_message(true, json!({"amount": 1}))];
            resolve_approvals(&mut messages, &tools).await;

            match &messages[0].contents[0] {
                Content::FunctionResult { result, .. } => {
                    assert_eq!(result, &json!(FAILED_RESULT));
                }
                other => panic!("unexpected content: {other:?}"),
            }
        }

        #[tokio::test]
        async fn duplicate_results_for_same_call_are_dropped() {
            let tools = ToolRegistry::new().with_tool(RefundTool);
            let mut messages = vec![
                AgentMessage::tool_result("C1", "already answered"),
                approval_message(true, json!({"amount": 50})),
            ];
            resolve_approvals(&mut messages, &tools).await;
            let result_count = messages
                .iter()
                .flat_map(|m| &m.contents)
                .filter(|c| matches!(c, Content::FunctionResult { call_id, .. } if call_id == "C1"))
                .count();
            assert_eq!(result_count, 1);
        }

        #[tokio::test]
        async fn approval_request_restored_to_function_call() {
            let tools = ToolRegistry::new();
            let mut messages = vec![AgentMessage::new(
                Role::Assistant,
                vec![Content::approval_request(
                    "A1",
                    FunctionCall::new("C1", "refund", json!({"amount": 1})),
                )],
            )];
            // No responses anywhere: nothing to execute, requests intact.
            resolve_approvals(&mut messages, &tools).await;
            assert!(matches!(
                messages[0].contents[0],
                Content::FunctionApprovalRequest { .. }
            ));

            // With a response present, the request collapses back to its call.
            messages.push(approval_message(false, json!({"amount": 1})));
            resolve_approvals(&mut messages, &tools).await;
            assert!(matches!(
                messages[0].contents[0],
                Content::FunctionCall(_)
            ));
        }
    }

    mod state_updates {
        use super::*;

        fn predictive() -> PredictiveState {
            let mut config = PredictStateConfig::new();
            config.insert(
                "order".to_string(),
                PredictStateBinding::whole("refund"),
            );
            PredictiveState::new(config)
        }

        #[test]
        fn merged_args_take_precedence() {
            let mut msg = approval_message(true, json!({"amount": 50}));
            if let Content::FunctionApprovalResponse {
                additional_properties,
                ..
            } = &mut msg.contents[0]
            {
                additional_properties.insert(
                    "ag_ui_state_args".to_string(),
                    json!({"amount": 75}),
                );
            }
            let approvals = collect_approvals(&[msg]);
            let updates = approved_state_updates(&approvals, &predictive());
            assert_eq!(updates["order"], json!({"amount": 75}));
        }

        #[test]
        fn raw_args_are_the_fallback() {
            let approvals = collect_approvals(&[approval_message(true, json!({"amount": 50}))]);
            let updates = approved_state_updates(&approvals, &predictive());
            assert_eq!(updates["order"], json!({"amount": 50}));
        }

        #[test]
        fn rejected_approvals_update_nothing() {
            let approvals = collect_approvals(&[approval_message(false, json!({"amount": 50}))]);
            assert!(approved_state_updates(&approvals, &predictive()).is_empty());
        }
    }

    mod confirmation {
        use super::*;

        fn ack_message(payload: &str) -> AgentMessage {
            let mut msg = AgentMessage::new(Role::User, vec![Content::text(payload)]);
            msg.additional_properties
                .insert("is_tool_result".to_string(), Value::Bool(true));
            msg
        }

        #[test]
        fn detects_confirm_changes_payload() {
            let messages = vec![ack_message(r#"{"accepted":true,"steps":[]}"#)];
            assert!(is_confirm_changes_response(&messages));
        }

        #[test]
        fn plain_tool_results_are_not_confirmations() {
            let messages = vec![ack_message(r#"{"accepted":true}"#)];
            assert!(!is_confirm_changes_response(&messages));
            assert!(!is_confirm_changes_response(&[AgentMessage::user("hi")]));
        }

        #[test]
        fn empty_steps_is_state_confirmation() {
            let messages = vec![ack_message(r#"{"accepted":true,"steps":[]}"#)];
            let events = confirmation_events(&messages, &DefaultConfirmationStrategy);
            assert_eq!(events.len(), 3);
            match &events[1] {
                Event::TextMessageContent(content) => {
                    assert_eq!(content.delta, "Changes confirmed and applied successfully!");
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }

        #[test]
        fn enabled_steps_are_listed() {
            let messages = vec![ack_message(
                r#"{"accepted":true,"steps":[
                    {"description":"Step A","status":"enabled"},
                    {"description":"Step B","status":"disabled"}
                ]}"#,
            )];
            let events = confirmation_events(&messages, &DefaultConfirmationStrategy);
            match &events[1] {
                Event::TextMessageContent(content) => {
                    assert!(content.delta.contains("Executing 1 approved steps"));
                    assert!(content.delta.contains("1. Step A"));
                    assert!(!content.delta.contains("Step B"));
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }

        #[test]
        fn rejection_asks_for_changes() {
            let messages = vec![ack_message(r#"{"accepted":false,"steps":[{"description":"A"}]}"#)];
            let events = confirmation_events(&messages, &DefaultConfirmationStrategy);
            match &events[1] {
                Event::TextMessageContent(content) => {
                    assert!(content.delta.contains("What would you like me to change"));
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }

        #[test]
        fn malformed_payload_is_acknowledged() {
            let messages = vec![ack_message("not json")];
            let events = confirmation_events(&messages, &DefaultConfirmationStrategy);
            match &events[1] {
                Event::TextMessageContent(content) => {
                    assert_eq!(content.delta, "Acknowledged.");
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }
}
