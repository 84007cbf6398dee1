//! Predictive state updates from streaming tool-call arguments.
//!
//! While a configured tool's JSON arguments stream in, the engine tries
//! a strict parse on every chunk; until the document completes it falls
//! back to a regex over the accumulated text so string-valued bindings
//! can be surfaced mid-stream. Numeric and boolean values are not
//! recoverable mid-stream and are only emitted once the parse succeeds.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::event::{Event, StateDeltaEvent};

/// Binds one state key to a tool argument.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PredictStateBinding {
    /// Name of the tool whose arguments feed the state key.
    pub tool: String,
    /// Argument to bind, or `"*"` for the entire parsed arguments object.
    pub tool_argument: String,
}

impl PredictStateBinding {
    /// Create a binding for a single argument of a tool.
    pub fn new(tool: impl Into<String>, tool_argument: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            tool_argument: tool_argument.into(),
        }
    }

    /// Create a binding for the entire arguments object of a tool.
    pub fn whole(tool: impl Into<String>) -> Self {
        Self::new(tool, "*")
    }
}

/// Maps state keys to the tool arguments that predict them.
pub type PredictStateConfig = BTreeMap<String, PredictStateBinding>;

/// Accumulates streaming tool arguments and produces state deltas.
#[derive(Debug, Default)]
pub struct PredictiveState {
    config: PredictStateConfig,
    streaming_args: String,
    last_emitted: Map<String, Value>,
    delta_count: usize,
    pending_updates: Map<String, Value>,
}

impl PredictiveState {
    /// Create an engine for the given configuration.
    #[must_use]
    pub fn new(config: PredictStateConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Reset the streaming accumulator for a new tool call.
    pub fn reset_streaming(&mut self) {
        self.streaming_args.clear();
        self.delta_count = 0;
    }

    /// Check if a tool feeds any configured state key.
    #[must_use]
    pub fn is_predictive_tool(&self, tool_name: &str) -> bool {
        self.config.values().any(|b| b.tool == tool_name)
    }

    /// Extract the bound state value from complete tool arguments.
    ///
    /// `args` may be a structured object or a JSON-encoded string.
    /// Returns the first matching `(state_key, value)` pair.
    #[must_use]
    pub fn extract_state_value(&self, tool_name: &str, args: &Value) -> Option<(String, Value)> {
        let parsed = crate::content::parse_object(args)?;
        for (state_key, binding) in &self.config {
            if binding.tool != tool_name {
                continue;
            }
            if binding.tool_argument == "*" {
                return Some((state_key.clone(), Value::Object(parsed)));
            }
            if let Some(value) = parsed.get(&binding.tool_argument) {
                return Some((state_key.clone(), value.clone()));
            }
        }
        None
    }

    /// Ingest a streamed argument chunk for the given tool and return the
    /// state deltas it produces.
    pub fn ingest(&mut self, tool_name: &str, chunk: &str) -> Vec<Event> {
        if self.config.is_empty() {
            return Vec::new();
        }

        self.streaming_args.push_str(chunk);
        debug!(
            tool = tool_name,
            accumulated = self.streaming_args.len(),
            "predictive state chunk"
        );

        match serde_json::from_str::<Value>(&self.streaming_args) {
            Ok(Value::Object(parsed)) => self.complete_deltas(tool_name, &parsed),
            Ok(_) => Vec::new(),
            Err(_) => self.partial_deltas(tool_name),
        }
    }

    /// Apply pending updates into the state document, clearing them.
    /// Returns `true` when any key changed.
    pub fn apply_pending(&mut self, current_state: &mut Map<String, Value>) -> bool {
        if self.pending_updates.is_empty() {
            return false;
        }
        for (key, value) in std::mem::take(&mut self.pending_updates) {
            current_state.insert(key, value);
        }
        true
    }

    /// Deltas from a completely parsed arguments object.
    fn complete_deltas(&mut self, tool_name: &str, parsed: &Map<String, Value>) -> Vec<Event> {
        let mut events = Vec::new();
        let bindings: Vec<_> = self
            .config
            .iter()
            .filter(|(_, b)| b.tool == tool_name)
            .map(|(k, b)| (k.clone(), b.clone()))
            .collect();
        for (state_key, binding) in bindings {
            let value = if binding.tool_argument == "*" {
                Value::Object(parsed.clone())
            } else if let Some(value) = parsed.get(&binding.tool_argument) {
                value.clone()
            } else {
                continue;
            };
            if let Some(event) = self.record(&state_key, value) {
                events.push(event);
            }
        }
        events
    }

    /// Deltas recovered from incomplete JSON via regex matching.
    ///
    /// Only string-valued arguments can be recovered this way; the match
    /// runs up to the last unescaped-quote boundary seen so far.
    fn partial_deltas(&mut self, tool_name: &str) -> Vec<Event> {
        let mut events = Vec::new();
        let bindings: Vec<_> = self
            .config
            .iter()
            .filter(|(_, b)| b.tool == tool_name && b.tool_argument != "*")
            .map(|(k, b)| (k.clone(), b.clone()))
            .collect();
        for (state_key, binding) in bindings {
            let pattern = format!(r#""{}":\s*"([^"]*)"#, regex::escape(&binding.tool_argument));
            let Ok(re) = Regex::new(&pattern) else {
                warn!(argument = %binding.tool_argument, "invalid partial-match pattern");
                continue;
            };
            if let Some(captures) = re.captures(&self.streaming_args)
                && let Some(raw) = captures.get(1)
            {
                let partial = unescape_partial(raw.as_str());
                if let Some(event) = self.record(&state_key, Value::String(partial)) {
                    events.push(event);
                }
            }
        }
        events
    }

    /// Record a new value for a state key, deduplicating against the last
    /// emission.
    fn record(&mut self, state_key: &str, value: Value) -> Option<Event> {
        if self.last_emitted.get(state_key) == Some(&value) {
            return None;
        }
        self.delta_count += 1;
        if self.delta_count % 10 == 1 {
            debug!(
                n = self.delta_count,
                key = state_key,
                "emitting state delta"
            );
        }
        self.last_emitted.insert(state_key.to_string(), value.clone());
        self.pending_updates
            .insert(state_key.to_string(), value.clone());
        Some(StateDeltaEvent::replace(state_key, value))
    }
}

/// Undo the JSON string escapes a partial match can contain. The
/// double-backslash goes last so it does not mangle the single-backslash
/// sequences produced by the earlier replacements.
fn unescape_partial(raw: &str) -> String {
    raw.replace("\\n", "\n")
        .replace("\\\"", "\"")
        .replace("\\\\", "\\")
}
