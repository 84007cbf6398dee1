//! Hashi bridges streaming AI agents onto the AG-UI protocol.
//!
//! An inner agent produces content updates (text deltas, function calls,
//! results, approval requests) as an async stream; AG-UI clients consume
//! a different, UI-oriented event stream over Server-Sent Events. The
//! run orchestrator in this crate sits between the two: it normalizes
//! incoming message history, drives the agent, and emits a correctly
//! ordered, protocol-valid event stream, including predictive state
//! updates parsed out of partially streamed tool arguments and a
//! human-in-the-loop approval protocol that pauses and resumes runs
//! across requests.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hashi::{AgUiAgent, BridgeConfig};
//!
//! let agent = AgUiAgent::new(Arc::new(my_agent), BridgeConfig::new());
//! let events = agent.run(input); // impl Stream<Item = Event>
//! ```

pub mod adapter;
pub mod agent;
pub mod approval;
pub mod bridge;
pub mod content;
pub mod encoder;
pub mod error;
pub mod event;
pub mod input;
pub mod orchestrator;
pub mod predictive;
pub mod state;
pub mod tool;

pub use agent::{AgUiAgent, AgentUpdate, BridgeConfig, RunOptions, StreamingAgent, UpdateStream};
pub use approval::{ConfirmationStrategy, DefaultConfirmationStrategy};
pub use content::{AgentMessage, Content, FunctionCall, Role};
pub use encoder::EventEncoder;
pub use error::{BridgeError, Result, ToolError};
pub use event::Event;
pub use input::{ClientToolSpec, InputMessage, RunAgentInput};
pub use predictive::{PredictStateBinding, PredictStateConfig, PredictiveState};
pub use tool::{ApprovalMode, Tool, ToolDyn, ToolRegistry, TypedTool};
