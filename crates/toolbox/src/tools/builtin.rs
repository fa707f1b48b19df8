//! Standard tools available on every toolbox with a fallback source.

use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Tool, ToolResult};
use crate::{database::SqlBackend, metrics, Error, Result};

pub const RUN_QUERY: &str = "run_query";
pub const LIST_TABLES: &str = "list_tables";
pub const DESCRIBE_TABLE: &str = "describe_table";

fn string_arg<'a>(args: &'a Map<String, JsonValue>, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::Validation(format!("Missing argument: {}", name)))
}

/// Runs caller-supplied SQL without any validation
pub struct RunQueryTool {
    backend: Arc<dyn SqlBackend>,
}

impl RunQueryTool {
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self { backend }
    }

    pub async fn run(&self, query: &str) -> Result<ToolResult> {
        warn!("Running unvalidated query on {}", self.backend.source_name());
        debug!("Query: {}", query);
        metrics::FALLBACK_QUERIES_TOTAL.inc();

        match self.backend.execute_raw(query).await {
            Ok(output) => {
                metrics::record_invocation(RUN_QUERY, "success");
                Ok(ToolResult::from_output(&output))
            }
            Err(e) => {
                metrics::record_invocation(RUN_QUERY, "error");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Tool for RunQueryTool {
    fn name(&self) -> &str {
        RUN_QUERY
    }

    fn description(&self) -> &str {
        "Run a SQL query on the configured database. Use this only when no more specific tool matches."
    }

    fn parameters_schema(&self) -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The SQL statement to execute"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &Map<String, JsonValue>) -> Result<ToolResult> {
        let query = string_arg(args, "query")?;
        self.run(query).await
    }
}

pub struct ListTablesTool {
    backend: Arc<dyn SqlBackend>,
}

impl ListTablesTool {
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for ListTablesTool {
    fn name(&self) -> &str {
        LIST_TABLES
    }

    fn description(&self) -> &str {
        "List all tables in the current database."
    }

    fn parameters_schema(&self) -> JsonValue {
        json!({ "type": "object", "properties": {}, "required": [] })
    }

    async fn execute(&self, _args: &Map<String, JsonValue>) -> Result<ToolResult> {
        let tables = match self.backend.list_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                metrics::record_invocation(LIST_TABLES, "error");
                return Err(e);
            }
        };
        metrics::record_invocation(LIST_TABLES, "success");

        Ok(ToolResult {
            success: true,
            output: tables.join("\n"),
            error: None,
            metadata: Some(json!(tables)),
        })
    }
}

pub struct DescribeTableTool {
    backend: Arc<dyn SqlBackend>,
}

impl DescribeTableTool {
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for DescribeTableTool {
    fn name(&self) -> &str {
        DESCRIBE_TABLE
    }

    fn description(&self) -> &str {
        "Describe the structure of a table."
    }

    fn parameters_schema(&self) -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "table_name": {
                    "type": "string",
                    "description": "Name of the table, optionally qualified as schema.table"
                }
            },
            "required": ["table_name"]
        })
    }

    async fn execute(&self, args: &Map<String, JsonValue>) -> Result<ToolResult> {
        let table = string_arg(args, "table_name")?;
        match self.backend.describe_table(table).await {
            Ok(output) => {
                metrics::record_invocation(DESCRIBE_TABLE, "success");
                Ok(ToolResult::from_output(&output))
            }
            Err(e) => {
                metrics::record_invocation(DESCRIBE_TABLE, "error");
                Err(e)
            }
        }
    }
}
