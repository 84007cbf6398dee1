//! The per-request run loop.
//!
//! One linear flow per request: initialize state, normalize messages,
//! resolve approvals, stream the inner agent, and finalize. All failure
//! surfaces are in-band events; exactly one of `RunFinished` or
//! `RunError`-then-`RunFinished` terminates every stream.

use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::normalize_input_messages;
use crate::agent::{AgentUpdate, BridgeConfig, RunOptions, StreamingAgent};
use crate::approval::{
    approved_state_updates, collect_approvals, confirmation_events, is_confirm_changes_response,
    resolve_approvals,
};
use crate::bridge::{EventBridge, FlowState, confirm_changes_events};
use crate::content::Content;
use crate::event::{
    CustomEvent, Event, MessagesSnapshotEvent, RunErrorEvent, RunFinishedEvent, RunStartedEvent,
    StateSnapshotEvent, TextMessageContentEvent, TextMessageEndEvent, TextMessageStartEvent,
    ToolCallEndEvent,
};
use crate::input::RunAgentInput;
use crate::predictive::PredictiveState;
use crate::state::{apply_schema_defaults, extract_structured_updates, inject_state_context};
use crate::tool::ToolRegistry;

/// Run the agent over one AG-UI request and yield protocol events.
pub fn run_stream(
    input: RunAgentInput,
    agent: Arc<dyn StreamingAgent>,
    config: BridgeConfig,
) -> impl Stream<Item = Event> + Send {
    stream! {
        let mut thread_id = input
            .thread_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut run_id = input
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // Shared state with schema defaults applied.
        let mut flow = FlowState::new();
        flow.current_state = input.state.clone();
        apply_schema_defaults(&mut flow.current_state, &config.state_schema);

        let mut predictive = if config.predict_state_config.is_empty() {
            None
        } else {
            Some(PredictiveState::new(config.predict_state_config.clone()))
        };

        let normalized = normalize_input_messages(&input.messages);
        let mut messages = normalized.messages;
        let snapshot_messages = normalized.snapshot;

        if messages.is_empty() {
            warn!("no messages in run input");
            yield RunStartedEvent::new(thread_id.clone(), run_id.clone());
            yield RunFinishedEvent::new(thread_id, run_id);
            return;
        }

        // Tool merging: client tools are declaration-only; passing `None`
        // lets the agent use its configured tools.
        let client_tools = ToolRegistry::from_client_specs(&input.tools);
        let server_tools = agent.tools();
        let merged_tools = ToolRegistry::merge(&server_tools, &client_tools);
        let tools_for_execution = merged_tools.clone().unwrap_or_else(|| server_tools.clone());

        // Approval resolution happens before the agent runs so it sees
        // tool results instead of pending approvals. State implied by
        // approved, state-binding calls lands in `current_state` first.
        let approvals = collect_approvals(&messages);
        let mut approved_updates_applied = false;
        if let Some(engine) = &predictive {
            let updates = approved_state_updates(&approvals, engine);
            if !updates.is_empty() {
                for (key, value) in updates {
                    flow.current_state.insert(key, value);
                }
                approved_updates_applied = true;
            }
        }
        resolve_approvals(&mut messages, &tools_for_execution).await;

        // Confirm-changes short-circuit: acknowledge and stop without
        // invoking the agent.
        if is_confirm_changes_response(&messages) {
            info!("confirm_changes response; emitting confirmation and finishing");
            yield RunStartedEvent::new(thread_id.clone(), run_id.clone());
            if approved_updates_applied {
                yield StateSnapshotEvent::new(&flow.current_state);
            }
            for event in confirmation_events(&messages, config.confirmation_strategy.as_ref()) {
                yield event;
            }
            yield RunFinishedEvent::new(thread_id, run_id);
            return;
        }

        if !config.state_schema.is_empty() && !flow.current_state.is_empty() {
            messages = inject_state_context(messages, &flow.current_state, &config.state_schema);
        }

        let skip_text = config.response_format.is_some();
        let bridge = EventBridge::new(skip_text, config.require_confirmation);

        let options = RunOptions {
            tools: merged_tools,
            response_format: config.response_format.clone(),
            metadata: run_metadata(&thread_id, &run_id),
            store: true,
            conversation_id: input.thread_id.clone(),
            extra: Map::new(),
        };

        let mut run_started_emitted = false;
        let mut structured_text = String::new();

        let stream_result = agent.run_stream(messages, options).await;
        match stream_result {
            Ok(mut updates) => {
                while let Some(item) = updates.next().await {
                    let update = match item {
                        Ok(update) => update,
                        Err(err) => {
                            warn!(error = %err, "agent stream failed");
                            if !run_started_emitted {
                                yield RunStartedEvent::new(thread_id.clone(), run_id.clone());
                            }
                            yield RunErrorEvent::new(err.to_string());
                            yield RunFinishedEvent::new(thread_id, run_id);
                            return;
                        }
                    };

                    if !run_started_emitted {
                        // Adopt service-assigned identities, then announce
                        // the run with the final ids.
                        if let Some(conversation_id) = &update.conversation_id {
                            thread_id.clone_from(conversation_id);
                        }
                        if let Some(response_id) = &update.response_id {
                            run_id.clone_from(response_id);
                        }
                        yield RunStartedEvent::new(thread_id.clone(), run_id.clone());
                        for event in startup_state_events(&config, &flow, approved_updates_applied) {
                            yield event;
                        }
                        run_started_emitted = true;
                    }

                    if skip_text {
                        for content in &update.contents {
                            if let Content::Text { text } = content {
                                structured_text.push_str(text);
                            }
                        }
                    }

                    // Tool-only updates still need a message anchor for
                    // the ToolCallStart parent id.
                    if flow.message_id.is_none() && update.has_only_tool_calls() {
                        let message_id = Uuid::new_v4().to_string();
                        debug!(message_id = %message_id, "tool-only response; anchoring message");
                        flow.message_id = Some(message_id.clone());
                        yield TextMessageStartEvent::new(message_id);
                    }

                    for content in &update.contents {
                        for event in bridge.emit_content(content, &mut flow, predictive.as_mut()) {
                            yield event;
                        }
                    }

                    if flow.waiting_for_approval {
                        info!("pausing run for approval response");
                        break;
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "agent failed to start streaming");
                yield RunStartedEvent::new(thread_id.clone(), run_id.clone());
                yield RunErrorEvent::new(err.to_string());
                yield RunFinishedEvent::new(thread_id, run_id);
                return;
            }
        }

        // A silent agent still yields a well-formed run.
        if !run_started_emitted {
            yield RunStartedEvent::new(thread_id.clone(), run_id.clone());
            for event in startup_state_events(&config, &flow, approved_updates_applied) {
                yield event;
            }
        }

        // Structured output: parse the aggregate, surface state keys as
        // one snapshot, then the `message` field as a text triplet.
        if skip_text && !structured_text.is_empty() {
            match serde_json::from_str::<Value>(&structured_text) {
                Ok(Value::Object(response)) => {
                    let updates = extract_structured_updates(&response, &config.state_schema);
                    if !updates.is_empty() {
                        info!(keys = ?updates.keys().collect::<Vec<_>>(),
                              "structured output state updates");
                        for (key, value) in updates {
                            flow.current_state.insert(key, value);
                        }
                        yield StateSnapshotEvent::new(&flow.current_state);
                    }
                    if let Some(message) = response.get("message").and_then(Value::as_str)
                        && !message.is_empty()
                    {
                        let message_id = Uuid::new_v4().to_string();
                        yield TextMessageStartEvent::new(message_id.clone());
                        yield TextMessageContentEvent::new(message_id.clone(), message);
                        yield TextMessageEndEvent::new(message_id);
                    }
                }
                _ => warn!("structured output did not parse as a JSON object"),
            }
        }

        // Declaration-only client tools never produce results; close
        // their calls here. Predictive tools with confirmation required
        // get the confirm_changes triplet instead of executing.
        for entry in flow.pending_without_end() {
            info!(call_id = %entry.id, "closing declaration-only tool call");
            yield ToolCallEndEvent::new(entry.id.clone());
            flow.mark_ended(&entry.id);

            let is_predictive = predictive
                .as_ref()
                .is_some_and(|engine| engine.is_predictive_tool(&entry.name));
            if config.require_confirmation
                && is_predictive
                && let Some(engine) = &predictive
            {
                let args = Value::String(entry.arguments.clone());
                if let Some((state_key, state_value)) =
                    engine.extract_state_value(&entry.name, &args)
                {
                    flow.current_state.insert(state_key, state_value);
                    yield StateSnapshotEvent::new(&flow.current_state);
                }
                let arguments = serde_json::from_str::<Value>(&entry.arguments)
                    .unwrap_or_else(|_| json!({}));
                for event in confirm_changes_events(
                    &entry.name,
                    &entry.id,
                    &arguments,
                    flow.message_id.clone(),
                ) {
                    yield event;
                }
                flow.waiting_for_approval = true;
            }
        }

        if let Some(message_id) = flow.message_id.clone() {
            yield TextMessageEndEvent::new(message_id);
        }

        if should_emit_messages_snapshot(&flow, &config, predictive.as_ref()) {
            yield build_messages_snapshot(&flow, snapshot_messages);
        }

        yield RunFinishedEvent::new(thread_id, run_id);
    }
}

/// Metadata injected into the run options for provider-side correlation.
fn run_metadata(thread_id: &str, run_id: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert(
        "ag_ui_thread_id".to_string(),
        Value::String(thread_id.to_string()),
    );
    metadata.insert(
        "ag_ui_run_id".to_string(),
        Value::String(run_id.to_string()),
    );
    metadata
}

/// Events that directly follow `RunStarted`: the predictive-state
/// announcement and the initial state snapshot.
fn startup_state_events(
    config: &BridgeConfig,
    flow: &FlowState,
    approved_updates_applied: bool,
) -> Vec<Event> {
    let mut events = Vec::new();
    if !config.predict_state_config.is_empty() {
        let value: Vec<Value> = config
            .predict_state_config
            .iter()
            .map(|(state_key, binding)| {
                json!({
                    "state_key": state_key,
                    "tool": binding.tool,
                    "tool_argument": binding.tool_argument,
                })
            })
            .collect();
        events.push(CustomEvent::new("PredictState", Value::Array(value)));
    }
    let schema_snapshot = !config.state_schema.is_empty() && !flow.current_state.is_empty();
    if schema_snapshot || approved_updates_applied {
        events.push(StateSnapshotEvent::new(&flow.current_state));
    }
    events
}

/// The terminal snapshot is suppressed for a predictive tool with
/// confirmation disabled; its state lands via the final `StateSnapshot`
/// instead.
fn should_emit_messages_snapshot(
    flow: &FlowState,
    config: &BridgeConfig,
    predictive: Option<&PredictiveState>,
) -> bool {
    let has_content = !flow.tool_calls().is_empty()
        || !flow.tool_results.is_empty()
        || !flow.accumulated_text.is_empty();
    if !has_content {
        return false;
    }
    if config.require_confirmation {
        return true;
    }
    let Some(engine) = predictive else {
        return true;
    };
    let last_tool_name = flow
        .tool_results
        .last()
        .and_then(|result| result.get("toolCallId"))
        .and_then(Value::as_str)
        .and_then(|call_id| flow.tool_name(call_id));
    match last_tool_name {
        Some(name) if engine.is_predictive_tool(name) => {
            info!(tool = name, "suppressing messages snapshot for predictive tool");
            false
        }
        _ => true,
    }
}

/// Assemble the terminal `MessagesSnapshot`: prior wire messages, the
/// assistant message produced this run, and the emitted tool results.
fn build_messages_snapshot(flow: &FlowState, snapshot_messages: Vec<Value>) -> Event {
    let mut all_messages = snapshot_messages;

    let tool_calls = flow.tool_calls_wire();
    if !tool_calls.is_empty() {
        let mut message = Map::new();
        message.insert(
            "id".to_string(),
            Value::String(
                flow.message_id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
            ),
        );
        message.insert("role".to_string(), Value::String("assistant".to_string()));
        message.insert("tool_calls".to_string(), Value::Array(tool_calls));
        if !flow.accumulated_text.is_empty() {
            message.insert(
                "content".to_string(),
                Value::String(flow.accumulated_text.clone()),
            );
        }
        all_messages.push(Value::Object(message));
    }

    all_messages.extend(flow.tool_results.iter().cloned());

    if !flow.accumulated_text.is_empty() && flow.tool_calls().is_empty() {
        all_messages.push(json!({
            "id": flow.message_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
            "role": "assistant",
            "content": flow.accumulated_text,
        }));
    }

    MessagesSnapshotEvent::new(all_messages)
}
