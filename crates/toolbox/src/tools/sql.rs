//! Declared SQL tools bound to their source.

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, error};

use super::{
    models::ToolConfig,
    parameters_schema,
    statement::Statement,
    Tool, ToolResult,
};
use crate::{database::SqlBackend, metrics, Result};

/// A tool from configuration, ready to run against its source
#[derive(Clone)]
pub struct SqlTool {
    config: ToolConfig,
    function_name: String,
    statement: Statement,
    backend: Arc<dyn SqlBackend>,
}

impl SqlTool {
    pub fn new(config: ToolConfig, backend: Arc<dyn SqlBackend>) -> Self {
        let statement = Statement::parse(&config.statement);
        Self {
            function_name: config.function_name(),
            config,
            statement,
            backend,
        }
    }

    /// Declared name, as written in the YAML
    pub fn declared_name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    pub fn source_name(&self) -> &str {
        self.backend.source_name()
    }

    pub fn backend(&self) -> Arc<dyn SqlBackend> {
        self.backend.clone()
    }
}

#[async_trait]
impl Tool for SqlTool {
    fn name(&self) -> &str {
        &self.function_name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn parameters_schema(&self) -> JsonValue {
        parameters_schema(&self.config.parameters)
    }

    async fn execute(&self, args: &Map<String, JsonValue>) -> Result<ToolResult> {
        debug!("Invoking tool {} with {:?}", self.config.name, args);

        let binds = match self.statement.bind(&self.config.parameters, args) {
            Ok(binds) => binds,
            Err(e) => {
                metrics::record_invocation(&self.config.name, "invalid");
                return Err(e);
            }
        };

        match self.backend.execute(&self.statement.sql, &binds).await {
            Ok(output) => {
                metrics::record_invocation(&self.config.name, "success");
                Ok(ToolResult::from_output(&output))
            }
            Err(e) => {
                error!("Tool {} failed: {}", self.config.name, e);
                metrics::record_invocation(&self.config.name, "error");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SqliteBackend;
    use crate::tools::models::ParameterConfig;
    use serde_json::json;

    async fn hotel_backend() -> Arc<dyn SqlBackend> {
        let backend = SqliteBackend::in_memory("hotels");
        backend
            .execute_raw("CREATE TABLE Hotel (id INTEGER PRIMARY KEY, name TEXT, city TEXT)")
            .await
            .unwrap();
        backend
            .execute_raw("INSERT INTO Hotel VALUES (1, 'Hilton', 'Basel'), (2, 'Marriott', 'Zurich')")
            .await
            .unwrap();
        Arc::new(backend)
    }

    fn search_by_id() -> ToolConfig {
        ToolConfig {
            name: "search-hotel-by-id".to_string(),
            kind: "sqlite-sql".to_string(),
            source: "hotels".to_string(),
            description: "Find a hotel by id".to_string(),
            parameters: vec![ParameterConfig {
                name: "id".to_string(),
                type_name: "integer".to_string(),
                description: "Hotel id".to_string(),
            }],
            statement: "SELECT name, city FROM Hotel WHERE id = $1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_execute_binds_parameters() {
        let tool = SqlTool::new(search_by_id(), hotel_backend().await);
        assert_eq!(tool.name(), "search_hotel_by_id");
        assert_eq!(tool.declared_name(), "search-hotel-by-id");

        let args = json!({"id": 2}).as_object().cloned().unwrap();
        let result = tool.execute(&args).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, r#"[{"city":"Zurich","name":"Marriott"}]"#);
        assert_eq!(result.metadata.unwrap()["columns"], json!(["name", "city"]));
    }

    #[tokio::test]
    async fn test_binding_failure_at_invocation() {
        let mut config = search_by_id();
        config.statement = "SELECT name FROM Hotel WHERE id = $1 AND city = $2".to_string();
        // Loading never checks the statement against the parameters
        let tool = SqlTool::new(config, hotel_backend().await);

        let args = json!({"id": 1}).as_object().cloned().unwrap();
        let err = tool.execute(&args).await.unwrap_err();
        assert!(matches!(err, crate::Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_driver_error_propagates() {
        let mut config = search_by_id();
        config.statement = "SELECT name FROM MissingTable WHERE id = $1".to_string();
        let tool = SqlTool::new(config, hotel_backend().await);

        let args = json!({"id": 1}).as_object().cloned().unwrap();
        let err = tool.execute(&args).await.unwrap_err();
        assert!(matches!(err, crate::Error::Sqlx(_)));
    }
}
