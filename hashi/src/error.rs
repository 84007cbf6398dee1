//! Error types for the bridge.
//!
//! Once an event stream has started, failures surface in-band as
//! `RunError` events; these types cover everything before that point and
//! the tool-execution seam.

use thiserror::Error;

/// A type alias for `Result<T, BridgeError>`.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors raised while executing a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool with the given name is registered.
    #[error("tool '{0}' not found")]
    NotFound(String),

    /// The tool is declared by the client and must not run server-side.
    #[error("tool '{0}' is declaration-only and executes on the client")]
    DeclarationOnly(String),

    /// The arguments could not be deserialized into the tool's input type.
    #[error("invalid tool arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),

    /// The tool ran but returned an error.
    #[error("tool execution failed: {0}")]
    Execution(String),
}

impl ToolError {
    /// Create an execution error from any displayable source.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }
}

/// The main error type for bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The inner agent's stream produced an error.
    #[error("agent error: {0}")]
    Agent(String),

    /// Error during tool execution.
    #[error("ToolError: {0}")]
    Tool(#[from] ToolError),

    /// JSON serialization/deserialization error.
    #[error("JsonError: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Create an agent error from any displayable source.
    #[must_use]
    pub fn agent(message: impl Into<String>) -> Self {
        Self::Agent(message.into())
    }
}
