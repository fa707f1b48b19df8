//! SQL Tools Module
//!
//! Tools are declared in YAML, bound to a database source and handed to
//! agents as named callables. Lookups that miss fall back to a raw query.

pub mod builtin;
pub mod env;
pub mod loader;
pub mod models;
pub mod sql;
pub mod statement;
pub mod toolbox;

pub use builtin::{DescribeTableTool, ListTablesTool, RunQueryTool};
pub use loader::ToolLoader;
pub use models::{ParamType, ParameterConfig, SourceConfig, SourceKind, ToolConfig, ToolsFile, ToolsetConfig};
pub use sql::SqlTool;
pub use toolbox::{DispatchRequest, Toolbox};

use async_trait::async_trait;
use rig::completion::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use thiserror::Error;

use crate::database::QueryOutput;

/// Result from tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub metadata: Option<JsonValue>,
}

impl ToolResult {
    pub fn from_output(output: &QueryOutput) -> Self {
        Self {
            success: true,
            output: output.render(),
            error: None,
            metadata: serde_json::to_value(output).ok(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            metadata: None,
        }
    }
}

/// Errors surfaced to the agent framework
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Execution error: {0}")]
    ExecutionError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<crate::Error> for ToolError {
    fn from(err: crate::Error) -> Self {
        match err {
            crate::Error::Validation(msg) => ToolError::ValidationError(msg),
            crate::Error::Sqlx(e) => ToolError::ExecutionError(e.to_string()),
            crate::Error::Execution(msg) => ToolError::ExecutionError(msg),
            other => ToolError::InternalError(other.to_string()),
        }
    }
}

/// Common trait for all tools exposed to agents
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Get the tool description for the LLM
    fn description(&self) -> &str;

    /// JSON schema of the named arguments
    fn parameters_schema(&self) -> JsonValue;

    /// Execute the tool with named arguments
    async fn execute(&self, args: &Map<String, JsonValue>) -> crate::Result<ToolResult>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Exposes any [`Tool`] through Rig's tool interface
#[derive(Clone)]
pub struct RigToolAdapter {
    tool: Arc<dyn Tool>,
}

impl RigToolAdapter {
    pub fn new(tool: Arc<dyn Tool>) -> Self {
        Self { tool }
    }
}

impl rig::tool::Tool for RigToolAdapter {
    const NAME: &'static str = "sql_tool";

    type Error = ToolError;
    type Args = Map<String, JsonValue>;
    type Output = ToolResult;

    fn name(&self) -> String {
        self.tool.name().to_string()
    }

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        self.tool.definition()
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let tool = self.tool.clone();

        // Boxed async-trait futures aren't Sync, so run them on their own task
        let result = tokio::spawn(async move { tool.execute(&args).await })
            .await
            .map_err(|e| ToolError::InternalError(format!("Task join error: {}", e)))?;

        match result {
            Ok(result) => Ok(result),
            Err(crate::Error::Validation(msg)) => Err(ToolError::ValidationError(msg)),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

/// JSON schema object for a list of declared parameters
pub fn parameters_schema(parameters: &[ParameterConfig]) -> JsonValue {
    let mut properties = Map::new();
    for param in parameters {
        properties.insert(
            param.name.clone(),
            serde_json::json!({
                "type": param.param_type().json_type(),
                "description": param.description,
            }),
        );
    }

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": parameters.iter().map(|p| p.name.clone()).collect::<Vec<_>>(),
    })
}
