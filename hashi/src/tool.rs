//! Tool declaration and execution interfaces.
//!
//! Two layers, mirroring the rest of the crate's trait seams:
//! - [`Tool`] is the typed interface implementors write against, with
//!   parameter schemas generated from the argument type;
//! - [`ToolDyn`] is the object-safe form the orchestrator dispatches on.
//!
//! Client-declared tools from the run input become [`ClientDeclaredTool`]
//! entries: they advertise a schema to the model but refuse server-side
//! execution.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::ToolError;
use crate::input::ClientToolSpec;

/// Whether a tool call must be approved by a human before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Every invocation pauses the run for an approval response.
    AlwaysRequire,
    /// Invocations execute without approval.
    #[default]
    NeverRequire,
}

/// Trait that represents a typed tool.
///
/// The parameter schema is generated from [`Tool::Args`] via `schemars`,
/// so implementors only describe behavior.
pub trait Tool: Send + Sync + 'static {
    /// The name of the tool. This name should be unique.
    const NAME: &'static str;

    /// The error type of the tool.
    type Error: std::error::Error + Send + Sync + 'static;
    /// The arguments type of the tool.
    type Args: DeserializeOwned + JsonSchema + Send;
    /// The output type of the tool.
    type Output: Serialize;

    /// Human-readable description advertised to the model.
    fn description(&self) -> String {
        String::new()
    }

    /// Whether invocations require human approval.
    fn approval_mode(&self) -> ApprovalMode {
        ApprovalMode::NeverRequire
    }

    /// The tool execution method.
    fn call(
        &self,
        args: Self::Args,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

/// Object-safe tool interface used by the registry and orchestrator.
#[async_trait]
pub trait ToolDyn: Send + Sync {
    /// The tool's unique name.
    fn name(&self) -> String;

    /// Human-readable description advertised to the model.
    fn description(&self) -> String {
        String::new()
    }

    /// JSON Schema for the tool's parameters.
    fn parameters(&self) -> Value;

    /// Whether invocations require human approval.
    fn approval_mode(&self) -> ApprovalMode {
        ApprovalMode::NeverRequire
    }

    /// Declaration-only tools are advertised to the model but never
    /// executed server-side.
    fn declaration_only(&self) -> bool {
        false
    }

    /// Execute the tool with JSON-encoded arguments, returning a
    /// JSON-encoded result.
    async fn call(&self, args: String) -> Result<String, ToolError>;
}

/// Adapter that exposes a typed [`Tool`] through [`ToolDyn`].
#[derive(Debug, Clone)]
pub struct TypedTool<T>(pub T);

#[async_trait]
impl<T: Tool> ToolDyn for TypedTool<T> {
    fn name(&self) -> String {
        T::NAME.to_string()
    }

    fn description(&self) -> String {
        self.0.description()
    }

    fn parameters(&self) -> Value {
        schemars::schema_for!(T::Args).to_value()
    }

    fn approval_mode(&self) -> ApprovalMode {
        self.0.approval_mode()
    }

    async fn call(&self, args: String) -> Result<String, ToolError> {
        let args: T::Args = serde_json::from_str(&args)?;
        let output = self
            .0
            .call(args)
            .await
            .map_err(|e| ToolError::execution(e.to_string()))?;
        serde_json::to_string(&output).map_err(ToolError::from)
    }
}

/// A tool declared by the client in the run input.
///
/// Its schema is forwarded to the model so the model can call it; the
/// result is produced client-side on the next turn.
#[derive(Debug, Clone)]
pub struct ClientDeclaredTool {
    spec: ClientToolSpec,
}

impl ClientDeclaredTool {
    /// Wrap a client tool spec.
    #[must_use]
    pub const fn new(spec: ClientToolSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl ToolDyn for ClientDeclaredTool {
    fn name(&self) -> String {
        self.spec.name.clone()
    }

    fn description(&self) -> String {
        self.spec.description.clone().unwrap_or_default()
    }

    fn parameters(&self) -> Value {
        self.spec.parameters.clone()
    }

    fn declaration_only(&self) -> bool {
        true
    }

    async fn call(&self, _args: String) -> Result<String, ToolError> {
        Err(ToolError::DeclarationOnly(self.spec.name.clone()))
    }
}

/// An insertion-ordered collection of tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn ToolDyn>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Build a registry from client tool specs, each registered as
    /// declaration-only.
    #[must_use]
    pub fn from_client_specs(specs: &[ClientToolSpec]) -> Self {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(Arc::new(ClientDeclaredTool::new(spec.clone())));
        }
        registry
    }

    /// Add a tool, replacing any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn ToolDyn>) {
        let name = tool.name();
        self.tools.retain(|t| t.name() != name);
        self.tools.push(tool);
    }

    /// Add a typed tool.
    pub fn register_tool(&mut self, tool: impl Tool) {
        self.register(Arc::new(TypedTool(tool)));
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Tool) -> Self {
        self.register_tool(tool);
        self
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolDyn>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Check if the registry contains a tool with the given name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered tool names in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Iterate tools in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ToolDyn>> {
        self.tools.iter()
    }

    /// Returns `true` if any registered tool requires approval.
    #[must_use]
    pub fn has_approval_tools(&self) -> bool {
        self.tools
            .iter()
            .any(|t| t.approval_mode() == ApprovalMode::AlwaysRequire)
    }

    /// Execute a tool by name with JSON-encoded arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] for unknown names,
    /// [`ToolError::DeclarationOnly`] for client tools, and whatever the
    /// tool itself raises.
    pub async fn execute(&self, name: &str, args: String) -> Result<String, ToolError> {
        let Some(tool) = self.get(name) else {
            return Err(ToolError::NotFound(name.to_string()));
        };
        debug!(tool = name, "executing tool");
        tool.call(args).await
    }

    /// Combine server and client tools for a run, deduplicated by name
    /// with server tools winning.
    ///
    /// Returns `None` when no tool list should be passed to the inner
    /// agent at all: the client declared nothing and no server tool
    /// requires approval, so the agent falls back to its configured
    /// tools.
    #[must_use]
    pub fn merge(server: &Self, client: &Self) -> Option<Self> {
        if client.is_empty() {
            if !server.is_empty() && server.has_approval_tools() {
                debug!(
                    count = server.len(),
                    "no client tools; passing server tools for approval mode"
                );
                return Some(server.clone());
            }
            debug!("no client tools; agent keeps its configured tools");
            return None;
        }

        let unique_client: Vec<_> = client
            .iter()
            .filter(|t| !server.contains(&t.name()))
            .cloned()
            .collect();

        if unique_client.is_empty() {
            if !server.is_empty() && server.has_approval_tools() {
                return Some(server.clone());
            }
            debug!("all client tools duplicate server tools");
            return None;
        }

        let mut combined = server.clone();
        for tool in unique_client {
            combined.tools.push(tool);
        }
        debug!(
            server = server.len(),
            total = combined.len(),
            "merged server and client tools"
        );
        Some(combined)
    }
}
