//! Translation of inner-agent content items into AG-UI events.
//!
//! The bridge owns no I/O; given a content item and the run's
//! [`FlowState`], it returns the events to emit and mutates the state so
//! the protocol invariants hold: every `ToolCallStart` gets exactly one
//! `ToolCallEnd`, args only flow between them, and text deltas stay
//! inside a start/end pair.

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::content::{Content, FunctionCall, stringify_result};
use crate::event::{
    CustomEvent, Event, StateSnapshotEvent, TextMessageContentEvent, TextMessageStartEvent,
    ToolCallArgsEvent, ToolCallEndEvent, ToolCallResultEvent, ToolCallStartEvent,
};
use crate::predictive::PredictiveState;

/// A tool call tracked for snapshot assembly, in streaming order.
#[derive(Debug, Clone)]
pub struct ToolCallEntry {
    /// The call id.
    pub id: String,
    /// Tool name; empty until a named chunk arrives.
    pub name: String,
    /// Accumulated argument string.
    pub arguments: String,
}

impl ToolCallEntry {
    fn to_wire(&self) -> Value {
        json!({
            "id": self.id,
            "type": "function",
            "function": {"name": self.name, "arguments": self.arguments},
        })
    }
}

/// Explicit per-run state for a single AG-UI run.
#[derive(Debug, Default)]
pub struct FlowState {
    /// Current open assistant text message, if any.
    pub message_id: Option<String>,
    /// Tool call currently receiving argument chunks.
    pub tool_call_id: Option<String>,
    /// Name of the current tool call.
    pub tool_call_name: Option<String>,
    /// Set when an approval or confirmation pauses the run.
    pub waiting_for_approval: bool,
    /// The user-visible shared state document.
    pub current_state: Map<String, Value>,
    /// Assistant text accumulated for the messages snapshot.
    pub accumulated_text: String,
    /// Tool results emitted this run, in wire form.
    pub tool_results: Vec<Value>,
    tool_calls: Vec<ToolCallEntry>,
    tool_calls_ended: Vec<String>,
}

impl FlowState {
    /// Create a fresh flow state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tool calls seen this run, in streaming order.
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCallEntry] {
        &self.tool_calls
    }

    /// Look up the tool name for a call id.
    #[must_use]
    pub fn tool_name(&self, call_id: &str) -> Option<&str> {
        self.tool_calls
            .iter()
            .find(|entry| entry.id == call_id)
            .map(|entry| entry.name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Record that a `ToolCallEnd` was emitted for this id.
    pub fn mark_ended(&mut self, call_id: &str) {
        if !self.tool_calls_ended.iter().any(|id| id == call_id) {
            self.tool_calls_ended.push(call_id.to_string());
        }
    }

    /// Tool calls that started but never received an end event
    /// (declaration-only client tools).
    #[must_use]
    pub fn pending_without_end(&self) -> Vec<ToolCallEntry> {
        self.tool_calls
            .iter()
            .filter(|entry| !self.tool_calls_ended.iter().any(|id| *id == entry.id))
            .cloned()
            .collect()
    }

    /// Tool calls in wire form for the messages snapshot.
    #[must_use]
    pub fn tool_calls_wire(&self) -> Vec<Value> {
        self.tool_calls.iter().map(ToolCallEntry::to_wire).collect()
    }

    fn ensure_entry(&mut self, call_id: &str, name: &str) {
        if !self.tool_calls.iter().any(|entry| entry.id == call_id) {
            self.tool_calls.push(ToolCallEntry {
                id: call_id.to_string(),
                name: name.to_string(),
                arguments: String::new(),
            });
        }
    }

    fn append_arguments(&mut self, call_id: &str, delta: &str) {
        if let Some(entry) = self.tool_calls.iter_mut().find(|entry| entry.id == call_id) {
            entry.arguments.push_str(delta);
        }
    }
}

/// Converts inner-agent content items to AG-UI events.
#[derive(Debug, Clone, Copy)]
pub struct EventBridge {
    /// Suppress text deltas (structured-output mode).
    pub skip_text: bool,
    /// Whether predictive updates require user confirmation.
    pub require_confirmation: bool,
}

impl EventBridge {
    /// Create a bridge with the given emission flags.
    #[must_use]
    pub const fn new(skip_text: bool, require_confirmation: bool) -> Self {
        Self {
            skip_text,
            require_confirmation,
        }
    }

    /// Emit the events for one content item, mutating flow state.
    pub fn emit_content(
        &self,
        content: &Content,
        flow: &mut FlowState,
        predictive: Option<&mut PredictiveState>,
    ) -> Vec<Event> {
        match content {
            Content::Text { text } => self.emit_text(text, flow),
            Content::FunctionCall(call) => Self::emit_tool_call(call, flow, predictive),
            Content::FunctionResult { call_id, result } => {
                Self::emit_tool_result(call_id, result, flow, predictive)
            }
            Content::FunctionApprovalRequest { id, function_call } => {
                self.emit_approval_request(id, function_call, flow, predictive)
            }
            _ => Vec::new(),
        }
    }

    /// Text deltas open a message on demand and accumulate for the
    /// snapshot. Empty chunks never emit (the protocol forbids empty
    /// deltas).
    fn emit_text(&self, text: &str, flow: &mut FlowState) -> Vec<Event> {
        if text.is_empty() || self.skip_text || flow.waiting_for_approval {
            return Vec::new();
        }

        let mut events = Vec::new();
        if flow.message_id.is_none() {
            let message_id = Uuid::new_v4().to_string();
            debug!(message_id = %message_id, "opening text message");
            events.push(TextMessageStartEvent::new(message_id.clone()));
            flow.message_id = Some(message_id);
        }
        let message_id = flow.message_id.clone().unwrap_or_default();
        events.push(TextMessageContentEvent::new(message_id, text));
        flow.accumulated_text.push_str(text);
        events
    }

    fn emit_tool_call(
        call: &FunctionCall,
        flow: &mut FlowState,
        predictive: Option<&mut PredictiveState>,
    ) -> Vec<Event> {
        let mut events = Vec::new();

        // Streaming chunks may omit the call id; fall back to the call in
        // progress, then to a fresh id.
        let tool_call_id = if call.call_id.is_empty() {
            flow.tool_call_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string())
        } else {
            call.call_id.clone()
        };

        let is_new_call =
            !call.name.is_empty() && flow.tool_call_id.as_deref() != Some(tool_call_id.as_str());
        if is_new_call {
            info!(name = %call.name, call_id = %tool_call_id, "tool call started");
            flow.tool_call_id = Some(tool_call_id.clone());
            flow.tool_call_name = Some(call.name.clone());
            flow.ensure_entry(&tool_call_id, &call.name);
            events.push(ToolCallStartEvent::new(
                tool_call_id.clone(),
                call.name.clone(),
                flow.message_id.clone(),
            ));
        } else {
            flow.tool_call_id = Some(tool_call_id.clone());
        }

        if call.has_arguments() {
            let delta = call.arguments_string();
            events.push(ToolCallArgsEvent::new(tool_call_id.clone(), delta.clone()));
            flow.append_arguments(&tool_call_id, &delta);

            if let Some(engine) = predictive {
                if is_new_call {
                    engine.reset_streaming();
                }
                if let Some(tool_name) = flow.tool_call_name.clone() {
                    events.extend(engine.ingest(&tool_name, &delta));
                }
            }
        } else if is_new_call
            && let Some(engine) = predictive
        {
            engine.reset_streaming();
        }

        events
    }

    fn emit_tool_result(
        call_id: &str,
        result: &Value,
        flow: &mut FlowState,
        predictive: Option<&mut PredictiveState>,
    ) -> Vec<Event> {
        // A result without a call id cannot be correlated; drop it.
        if call_id.is_empty() {
            warn!("function result missing call id; skipping");
            return Vec::new();
        }

        let mut events = Vec::new();
        events.push(ToolCallEndEvent::new(call_id));
        flow.mark_ended(call_id);

        let result_content = stringify_result(result);
        let message_id = Uuid::new_v4().to_string();
        events.push(ToolCallResultEvent::new(
            message_id.clone(),
            call_id,
            result_content.clone(),
        ));
        flow.tool_results.push(json!({
            "id": message_id,
            "role": "tool",
            "toolCallId": call_id,
            "content": result_content,
        }));

        if let Some(engine) = predictive
            && engine.apply_pending(&mut flow.current_state)
        {
            events.push(StateSnapshotEvent::new(&flow.current_state));
        }

        // After a tool result, any subsequent text starts a new message.
        flow.tool_call_id = None;
        flow.tool_call_name = None;
        flow.message_id = None;

        events
    }

    fn emit_approval_request(
        &self,
        request_id: &str,
        function_call: &FunctionCall,
        flow: &mut FlowState,
        predictive: Option<&mut PredictiveState>,
    ) -> Vec<Event> {
        let mut events = Vec::new();
        info!(name = %function_call.name, call_id = %function_call.call_id,
              "function approval requested");

        if let Some(engine) = predictive
            && !function_call.name.is_empty()
            && let Some((state_key, state_value)) =
                engine.extract_state_value(&function_call.name, &function_call.arguments)
        {
            flow.current_state.insert(state_key, state_value);
            events.push(StateSnapshotEvent::new(&flow.current_state));
        }

        if !function_call.call_id.is_empty() {
            events.push(ToolCallEndEvent::new(function_call.call_id.clone()));
            flow.mark_ended(&function_call.call_id);
        }

        let parsed_args = function_call
            .parse_arguments()
            .map_or(Value::Null, Value::Object);
        events.push(CustomEvent::new(
            "function_approval_request",
            json!({
                "id": request_id,
                "function_call": {
                    "call_id": function_call.call_id,
                    "name": function_call.name,
                    "arguments": parsed_args.clone(),
                },
            }),
        ));

        if self.require_confirmation {
            events.extend(confirm_changes_events(
                &function_call.name,
                &function_call.call_id,
                &parsed_args,
                flow.message_id.clone(),
            ));
        }

        flow.waiting_for_approval = true;
        events
    }
}

/// The synthetic `confirm_changes` tool-call triplet that drives the UI
/// approval dialog: Start, Args with the function info and a single
/// enabled step, End.
#[must_use]
pub fn confirm_changes_events(
    function_name: &str,
    function_call_id: &str,
    function_arguments: &Value,
    parent_message_id: Option<String>,
) -> Vec<Event> {
    let confirm_id = Uuid::new_v4().to_string();
    let arguments = if function_arguments.is_object() {
        function_arguments.clone()
    } else {
        json!({})
    };
    let args = json!({
        "function_name": function_name,
        "function_call_id": function_call_id,
        "function_arguments": arguments,
        "steps": [{"description": format!("Execute {function_name}"), "status": "enabled"}],
    });
    vec![
        ToolCallStartEvent::new(
            confirm_id.clone(),
            crate::adapter::CONFIRM_CHANGES_TOOL,
            parent_message_id,
        ),
        ToolCallArgsEvent::new(confirm_id.clone(), args.to_string()),
        ToolCallEndEvent::new(confirm_id),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::predictive::{PredictStateBinding, PredictStateConfig, PredictiveState};
    use serde_json::json;

    fn bridge() -> EventBridge {
        EventBridge::new(false, true)
    }

    fn names(events: &[Event]) -> Vec<&'static str> {
        events.iter().map(Event::name).collect()
    }

    mod text {
        use super::*;

        #[test]
        fn first_chunk_opens_message() {
            let mut flow = FlowState::new();
            let events = bridge().emit_content(&Content::text("hel"), &mut flow, None);
            assert_eq!(names(&events), vec!["TEXT_MESSAGE_START", "TEXT_MESSAGE_CONTENT"]);
            assert!(flow.message_id.is_some());
        }

        #[test]
        fn later_chunks_reuse_message() {
            let mut flow = FlowState::new();
            bridge().emit_content(&Content::text("hel"), &mut flow, None);
            let events = bridge().emit_content(&Content::text("lo"), &mut flow, None);
            assert_eq!(names(&events), vec!["TEXT_MESSAGE_CONTENT"]);
            assert_eq!(flow.accumulated_text, "hello");
        }

        #[test]
        fn empty_chunks_emit_nothing() {
            let mut flow = FlowState::new();
            assert!(bridge().emit_content(&Content::text(""), &mut flow, None).is_empty());
        }

        #[test]
        fn suppressed_in_structured_output_mode() {
            let mut flow = FlowState::new();
            let skipping = EventBridge::new(true, true);
            assert!(skipping.emit_content(&Content::text("x"), &mut flow, None).is_empty());
        }

        #[test]
        fn suppressed_while_waiting_for_approval() {
            let mut flow = FlowState::new();
            flow.waiting_for_approval = true;
            assert!(bridge().emit_content(&Content::text("x"), &mut flow, None).is_empty());
        }
    }

    mod tool_calls {
        use super::*;

        #[test]
        fn named_call_starts_then_streams_args() {
            let mut flow = FlowState::new();
            let start = bridge().emit_content(
                &Content::function_call("c1", "search", json!(r#"{"q":"#)),
                &mut flow,
                None,
            );
            assert_eq!(names(&start), vec!["TOOL_CALL_START", "TOOL_CALL_ARGS"]);

            let more = bridge().emit_content(
                &Content::function_call("c1", "search", json!(r#""x"}"#)),
                &mut flow,
                None,
            );
            assert_eq!(names(&more), vec!["TOOL_CALL_ARGS"]);
            assert_eq!(flow.tool_calls()[0].arguments, r#"{"q":"x"}"#);
        }

        #[test]
        fn chunk_without_id_reuses_current_call() {
            let mut flow = FlowState::new();
            bridge().emit_content(
                &Content::function_call("c1", "search", Value::Null),
                &mut flow,
                None,
            );
            let events = bridge().emit_content(
                &Content::function_call("", "", json!(r#"{"q":1}"#)),
                &mut flow,
                None,
            );
            assert_eq!(names(&events), vec!["TOOL_CALL_ARGS"]);
            assert_eq!(flow.tool_calls()[0].arguments, r#"{"q":1}"#);
        }

        #[test]
        fn start_carries_parent_message_id() {
            let mut flow = FlowState::new();
            bridge().emit_content(&Content::text("thinking"), &mut flow, None);
            let parent = flow.message_id.clone();
            let events = bridge().emit_content(
                &Content::function_call("c1", "search", Value::Null),
                &mut flow,
                None,
            );
            match &events[0] {
                Event::ToolCallStart(start) => {
                    assert_eq!(start.parent_message_id, parent);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }

        #[test]
        fn result_ends_call_and_resets_message_context() {
            let mut flow = FlowState::new();
            bridge().emit_content(&Content::text("calling"), &mut flow, None);
            bridge().emit_content(
                &Content::function_call("c1", "search", json!("{}")),
                &mut flow,
                None,
            );
            let events = bridge().emit_content(
                &Content::function_result("c1", json!({"hits": 3})),
                &mut flow,
                None,
            );
            assert_eq!(names(&events), vec!["TOOL_CALL_END", "TOOL_CALL_RESULT"]);
            assert!(flow.message_id.is_none());
            assert!(flow.tool_call_id.is_none());
            assert_eq!(flow.tool_results.len(), 1);
            assert_eq!(flow.tool_results[0]["toolCallId"], "c1");
            assert!(flow.pending_without_end().is_empty());
        }

        #[test]
        fn result_without_call_id_is_dropped() {
            let mut flow = FlowState::new();
            let events = bridge().emit_content(
                &Content::function_result("", "lost"),
                &mut flow,
                None,
            );
            assert!(events.is_empty());
        }

        #[test]
        fn pending_without_end_reports_unanswered_calls() {
            let mut flow = FlowState::new();
            bridge().emit_content(
                &Content::function_call("c1", "render_chart", json!("{}")),
                &mut flow,
                None,
            );
            let pending = flow.pending_without_end();
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].id, "c1");
        }
    }

    mod predictive_flow {
        use super::*;

        fn engine() -> PredictiveState {
            let mut config = PredictStateConfig::new();
            config.insert(
                "recipe".to_string(),
                PredictStateBinding::whole("update_recipe"),
            );
            PredictiveState::new(config)
        }

        #[test]
        fn args_pipe_through_predictive_engine() {
            let mut flow = FlowState::new();
            let mut engine = engine();
            bridge().emit_content(
                &Content::function_call("c1", "update_recipe", Value::Null),
                &mut flow,
                Some(&mut engine),
            );
            let events = bridge().emit_content(
                &Content::function_call("", "", json!(r#"{"title":"Soup"}"#)),
                &mut flow,
                Some(&mut engine),
            );
            assert!(names(&events).contains(&"STATE_DELTA"));
        }

        #[test]
        fn result_applies_pending_state_and_snapshots() {
            let mut flow = FlowState::new();
            let mut engine = engine();
            bridge().emit_content(
                &Content::function_call("c1", "update_recipe", json!(r#"{"title":"Soup"}"#)),
                &mut flow,
                Some(&mut engine),
            );
            let events = bridge().emit_content(
                &Content::function_result("c1", "ok"),
                &mut flow,
                Some(&mut engine),
            );
            assert_eq!(
                names(&events),
                vec!["TOOL_CALL_END", "TOOL_CALL_RESULT", "STATE_SNAPSHOT"]
            );
            assert_eq!(flow.current_state["recipe"], json!({"title": "Soup"}));
        }
    }

    mod approval {
        use super::*;

        #[test]
        fn approval_request_emits_custom_event_and_confirm_triplet() {
            let mut flow = FlowState::new();
            bridge().emit_content(&Content::text("I need approval"), &mut flow, None);
            let call = FunctionCall::new("C1", "refund", json!({"amount": 50}));
            let events = bridge().emit_content(
                &Content::approval_request("A1", call),
                &mut flow,
                None,
            );
            assert_eq!(
                names(&events),
                vec![
                    "TOOL_CALL_END",
                    "CUSTOM",
                    "TOOL_CALL_START",
                    "TOOL_CALL_ARGS",
                    "TOOL_CALL_END",
                ]
            );
            assert!(flow.waiting_for_approval);

            match &events[1] {
                Event::Custom(custom) => {
                    assert_eq!(custom.name, "function_approval_request");
                    assert_eq!(custom.value["id"], "A1");
                    assert_eq!(custom.value["function_call"]["call_id"], "C1");
                    assert_eq!(custom.value["function_call"]["arguments"]["amount"], 50);
                }
                other => panic!("unexpected event: {other:?}"),
            }

            match &events[3] {
                Event::ToolCallArgs(args) => {
                    let parsed: Value = serde_json::from_str(&args.delta).unwrap();
                    assert_eq!(parsed["function_name"], "refund");
                    assert_eq!(parsed["function_call_id"], "C1");
                    assert_eq!(parsed["steps"][0]["description"], "Execute refund");
                    assert_eq!(parsed["steps"][0]["status"], "enabled");
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }

        #[test]
        fn confirmation_disabled_skips_triplet() {
            let mut flow = FlowState::new();
            let no_confirm = EventBridge::new(false, false);
            let call = FunctionCall::new("C1", "refund", json!({}));
            let events = no_confirm.emit_content(
                &Content::approval_request("A1", call),
                &mut flow,
                None,
            );
            assert_eq!(names(&events), vec!["TOOL_CALL_END", "CUSTOM"]);
            assert!(flow.waiting_for_approval);
        }

        #[test]
        fn predictive_approval_snapshots_extracted_state() {
            let mut config = PredictStateConfig::new();
            config.insert(
                "plan".to_string(),
                PredictStateBinding::new("set_plan", "steps"),
            );
            let mut engine = PredictiveState::new(config);
            let mut flow = FlowState::new();
            let call = FunctionCall::new("C1", "set_plan", json!({"steps": [{"description": "a"}]}));
            let events = bridge().emit_content(
                &Content::approval_request("A1", call),
                &mut flow,
                Some(&mut engine),
            );
            assert_eq!(events[0].name(), "STATE_SNAPSHOT");
            assert_eq!(flow.current_state["plan"], json!([{"description": "a"}]));
        }
    }
}
