//! The inner-agent interface and the AG-UI agent wrapper.
//!
//! The bridge treats the inner agent as an opaque streaming producer of
//! content updates. Anything that implements [`StreamingAgent`] can be
//! exposed over AG-UI by wrapping it in an [`AgUiAgent`].

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde_json::{Map, Value};

use crate::approval::{ConfirmationStrategy, DefaultConfirmationStrategy};
use crate::content::{AgentMessage, Content};
use crate::error::BridgeError;
use crate::event::Event;
use crate::input::RunAgentInput;
use crate::predictive::PredictStateConfig;
use crate::tool::ToolRegistry;

/// One streamed update from the inner agent.
#[derive(Debug, Clone, Default)]
pub struct AgentUpdate {
    /// Content items in this update.
    pub contents: Vec<Content>,
    /// Service-assigned response id, adopted as the run id when present
    /// on the first update.
    pub response_id: Option<String>,
    /// Service-assigned conversation id, adopted as the thread id when
    /// present on the first update.
    pub conversation_id: Option<String>,
}

impl AgentUpdate {
    /// Create an update from content items.
    #[must_use]
    pub fn new(contents: Vec<Content>) -> Self {
        Self {
            contents,
            ..Self::default()
        }
    }

    /// Create an update carrying a single text chunk.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![Content::text(text)])
    }

    /// Returns `true` if the update has tool calls but no visible text.
    #[must_use]
    pub fn has_only_tool_calls(&self) -> bool {
        let has_call = self.contents.iter().any(Content::is_function_call);
        let has_text = self.contents.iter().any(Content::is_text);
        has_call && !has_text
    }
}

/// Boxed stream of agent updates.
pub type UpdateStream = Pin<Box<dyn Stream<Item = Result<AgentUpdate, BridgeError>> + Send>>;

/// Explicit per-run options handed to the inner agent.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Tool set for this run, or `None` to use the agent's configured
    /// tools.
    pub tools: Option<ToolRegistry>,
    /// JSON Schema for structured output, when the run is in schema mode.
    pub response_format: Option<Value>,
    /// Request metadata forwarded to the provider.
    pub metadata: Map<String, Value>,
    /// Ask the provider to store the conversation server-side.
    pub store: bool,
    /// Provider conversation id to resume, if any.
    pub conversation_id: Option<String>,
    /// Unrecognized options, forwarded opaquely.
    pub extra: Map<String, Value>,
}

/// A streaming agent the bridge can drive.
#[async_trait]
pub trait StreamingAgent: Send + Sync {
    /// The agent's name.
    fn name(&self) -> &str {
        "agent"
    }

    /// Tools configured on the agent itself (server tools).
    fn tools(&self) -> ToolRegistry {
        ToolRegistry::new()
    }

    /// Run the agent over the given messages, streaming updates.
    ///
    /// # Errors
    ///
    /// Implementations surface provider failures as [`BridgeError`];
    /// the orchestrator converts them into in-band `RunError` events.
    async fn run_stream(
        &self,
        messages: Vec<AgentMessage>,
        options: RunOptions,
    ) -> Result<UpdateStream, BridgeError>;
}

/// Configuration for one AG-UI-exposed agent.
#[derive(Clone)]
pub struct BridgeConfig {
    /// JSON-schema properties of the shared state document; empty when
    /// the agent has no shared state.
    pub state_schema: Map<String, Value>,
    /// Predictive-state bindings.
    pub predict_state_config: PredictStateConfig,
    /// Whether predictive updates require user confirmation.
    pub require_confirmation: bool,
    /// JSON Schema for structured output; presence suppresses streamed
    /// text deltas.
    pub response_format: Option<Value>,
    /// Generates the confirmation messages for approval flows.
    pub confirmation_strategy: Arc<dyn ConfirmationStrategy>,
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("state_schema", &self.state_schema.keys().collect::<Vec<_>>())
            .field("predict_state_config", &self.predict_state_config)
            .field("require_confirmation", &self.require_confirmation)
            .field("response_format", &self.response_format.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            state_schema: Map::new(),
            predict_state_config: PredictStateConfig::new(),
            require_confirmation: true,
            response_format: None,
            confirmation_strategy: Arc::new(DefaultConfirmationStrategy),
        }
    }
}

impl BridgeConfig {
    /// Create a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shared-state schema properties.
    #[must_use]
    pub fn with_state_schema(mut self, schema: Map<String, Value>) -> Self {
        self.state_schema = schema;
        self
    }

    /// Set the predictive-state bindings.
    #[must_use]
    pub fn with_predict_state(mut self, config: PredictStateConfig) -> Self {
        self.predict_state_config = config;
        self
    }

    /// Enable or disable the confirmation step for predictive updates.
    #[must_use]
    pub const fn with_confirmation(mut self, require_confirmation: bool) -> Self {
        self.require_confirmation = require_confirmation;
        self
    }

    /// Put the run in structured-output mode with the given schema.
    #[must_use]
    pub fn with_response_format(mut self, schema: Value) -> Self {
        self.response_format = Some(schema);
        self
    }

    /// Replace the confirmation strategy.
    #[must_use]
    pub fn with_confirmation_strategy(mut self, strategy: Arc<dyn ConfirmationStrategy>) -> Self {
        self.confirmation_strategy = strategy;
        self
    }
}

/// Wraps a [`StreamingAgent`] for AG-UI protocol compatibility.
///
/// Each call to [`AgUiAgent::run`] follows a single linear flow:
/// `RunStarted` → content events → `RunFinished`.
#[derive(Clone)]
pub struct AgUiAgent {
    agent: Arc<dyn StreamingAgent>,
    config: BridgeConfig,
    name: String,
    description: String,
}

impl std::fmt::Debug for AgUiAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgUiAgent")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AgUiAgent {
    /// Wrap an agent with the given configuration.
    #[must_use]
    pub fn new(agent: Arc<dyn StreamingAgent>, config: BridgeConfig) -> Self {
        let name = agent.name().to_string();
        Self {
            agent,
            config,
            name,
            description: String::new(),
        }
    }

    /// Set a display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The agent's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The agent's description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The bridge configuration.
    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Run the agent over one AG-UI request, yielding protocol events.
    pub fn run(&self, input: RunAgentInput) -> impl Stream<Item = Event> + Send + use<> {
        crate::orchestrator::run_stream(input, Arc::clone(&self.agent), self.config.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn update_tool_only_detection() {
        let update = AgentUpdate::new(vec![Content::function_call("c1", "t", Value::Null)]);
        assert!(update.has_only_tool_calls());

        let mixed = AgentUpdate::new(vec![
            Content::text("hi"),
            Content::function_call("c1", "t", Value::Null),
        ]);
        assert!(!mixed.has_only_tool_calls());

        assert!(!AgentUpdate::text("hi").has_only_tool_calls());
    }

    #[test]
    fn config_builder_round_trip() {
        let config = BridgeConfig::new()
            .with_confirmation(false)
            .with_response_format(serde_json::json!({"type": "object"}));
        assert!(!config.require_confirmation);
        assert!(config.response_format.is_some());
    }
}
