//! Name-indexed table of callables with a raw-query fallback.

use rig::completion::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    builtin::{DescribeTableTool, ListTablesTool, RunQueryTool},
    loader::ToolLoader,
    sql::SqlTool,
    Tool, ToolResult,
};
use crate::{database::SqlBackend, Error, Result};

/// A request from the agent side: a named tool call, a raw query, or both
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchRequest {
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub arguments: Map<String, JsonValue>,
    /// Raw SQL used when `tool` is absent or unknown
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Default)]
pub struct Toolbox {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    // declared name -> exposed function name
    aliases: HashMap<String, String>,
    declared: BTreeSet<String>,
    fallback: Option<Arc<RunQueryTool>>,
    toolsets: BTreeMap<String, Vec<String>>,
}

impl fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolbox")
            .field("tools", &self.tool_names())
            .field("fallback", &self.has_fallback())
            .field("toolsets", &self.toolsets)
            .finish()
    }
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configuration.
    ///
    /// An empty `toolsets` list loads every declared tool. The fallback source
    /// is `fallback_source` when given, otherwise the one source shared by the
    /// loaded tools, otherwise the only declared source.
    pub fn from_loader<S: AsRef<str>>(
        loader: &ToolLoader,
        toolsets: &[S],
        fallback_source: Option<&str>,
    ) -> Result<Self> {
        let tools = if toolsets.is_empty() {
            loader.load_all()
        } else {
            loader.load_toolset(toolsets)?
        };

        let mut toolbox = Self::new();

        let fallback = match fallback_source {
            Some(name) => Some(loader.backend(name)?),
            None => {
                let used: BTreeSet<_> = tools.iter().map(|t| t.config().source.clone()).collect();
                let declared = loader.source_names();
                if used.len() == 1 {
                    used.iter().next().map(|name| loader.backend(name)).transpose()?
                } else if used.is_empty() && declared.len() == 1 {
                    Some(loader.backend(&declared[0])?)
                } else {
                    warn!("No single fallback source could be chosen; raw queries are disabled");
                    None
                }
            }
        };
        if let Some(backend) = fallback {
            toolbox = toolbox.with_fallback(backend);
        }

        for tool in tools {
            toolbox.add_sql_tool(tool)?;
        }

        let selected: Vec<String> = if toolsets.is_empty() {
            loader.toolset_names()
        } else {
            toolsets.iter().map(|s| s.as_ref().to_string()).collect()
        };
        for name in selected {
            if let Some(toolset) = loader.toolset(&name) {
                toolbox.toolsets.insert(name, toolset.tool_names.clone());
            }
        }

        info!(
            "Toolbox ready with {} tools ({} declared)",
            toolbox.tools.len(),
            toolbox.declared.len()
        );
        Ok(toolbox)
    }

    /// Register the standard tools against `backend` and use it for raw queries
    pub fn with_fallback(mut self, backend: Arc<dyn SqlBackend>) -> Self {
        info!("Fallback queries run against source {}", backend.source_name());

        let run_query = Arc::new(RunQueryTool::new(backend.clone()));
        self.add_tool(run_query.clone());
        self.add_tool(Arc::new(ListTablesTool::new(backend.clone())));
        self.add_tool(Arc::new(DescribeTableTool::new(backend)));
        self.fallback = Some(run_query);
        self
    }

    /// Add a tool under its own name, replacing any tool with the same name
    pub fn add_tool(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!("Tool {} replaces an existing tool with the same name", name);
        }
    }

    /// Add a declared tool. Two declared tools may not share a function name
    /// (`hotel-count` and `hotel_count`); the same tool may be added again.
    pub fn add_sql_tool(&mut self, tool: SqlTool) -> Result<()> {
        let declared = tool.declared_name().to_string();
        let exposed = tool.name().to_string();

        if let Some((other, _)) = self
            .aliases
            .iter()
            .find(|(other, target)| **target == exposed && **other != declared)
        {
            return Err(Error::Config(format!(
                "Tools {} and {} both expose the function name {}",
                other, declared, exposed
            )));
        }

        self.add_tool(Arc::new(tool));
        self.declared.insert(exposed.clone());
        self.aliases.insert(declared, exposed);
        Ok(())
    }

    /// Look up by exposed name, then by declared name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .or_else(|| self.aliases.get(name).and_then(|n| self.tools.get(n)))
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Exposed names of tools that came from configuration
    pub fn declared_tool_names(&self) -> Vec<String> {
        self.declared.iter().cloned().collect()
    }

    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    pub fn toolsets(&self) -> &BTreeMap<String, Vec<String>> {
        &self.toolsets
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub async fn invoke(&self, name: &str, args: &Map<String, JsonValue>) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Tool {} not found", name)))?;
        tool.execute(args).await
    }

    /// Run caller-supplied SQL against the fallback source
    pub async fn fallback_query(&self, query: &str) -> Result<ToolResult> {
        let fallback = self
            .fallback
            .as_ref()
            .ok_or_else(|| Error::Config("No fallback source configured for raw queries".to_string()))?;
        fallback.run(query).await
    }

    /// Named tool when it exists, raw query otherwise
    pub async fn dispatch(&self, request: &DispatchRequest) -> Result<ToolResult> {
        if let Some(name) = &request.tool {
            if let Some(tool) = self.get(name) {
                debug!("Dispatching to tool {}", name);
                return tool.execute(&request.arguments).await;
            }
            debug!("No tool named {}, trying fallback query", name);
        }

        match &request.query {
            Some(query) => self.fallback_query(query).await,
            None => Err(Error::NotFound(match &request.tool {
                Some(name) => format!("Tool {} not found and no fallback query given", name),
                None => "Request names no tool and carries no query".to_string(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CONFIG: &str = r#"
sources:
  local:
    kind: sqlite
    path: ":memory:"
tools:
  get-hotel-address:
    kind: sqlite-sql
    source: local
    description: Address of a hotel given its id.
    parameters:
      - name: hotel_id
        type: int
        description: Hotel id
    statement: SELECT address FROM Hotel WHERE id = $1
toolsets:
  hotels:
    - get-hotel-address
"#;

    async fn toolbox() -> Toolbox {
        let loader = ToolLoader::from_yaml(CONFIG).unwrap();
        let toolbox = Toolbox::from_loader::<&str>(&loader, &[], None).unwrap();
        toolbox
            .fallback_query("CREATE TABLE Hotel (id INTEGER PRIMARY KEY, address TEXT)")
            .await
            .unwrap();
        toolbox
            .fallback_query("INSERT INTO Hotel VALUES (1, 'Main St 1')")
            .await
            .unwrap();
        toolbox
    }

    fn args(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_registered_names() {
        let toolbox = toolbox().await;
        assert_eq!(
            toolbox.tool_names(),
            vec!["describe_table", "get_hotel_address", "list_tables", "run_query"]
        );
        assert_eq!(toolbox.declared_tool_names(), vec!["get_hotel_address"]);
        assert!(toolbox.contains("get-hotel-address"));
        assert!(toolbox.has_fallback());
        assert_eq!(toolbox.toolsets()["hotels"], vec!["get-hotel-address"]);
        assert_eq!(toolbox.definitions().len(), 4);
    }

    #[tokio::test]
    async fn test_invoke_by_either_name() {
        let toolbox = toolbox().await;
        for name in ["get-hotel-address", "get_hotel_address"] {
            let result = toolbox.invoke(name, &args(json!({"hotel_id": 1}))).await.unwrap();
            assert_eq!(result.output, r#"[{"address":"Main St 1"}]"#);
        }

        let err = toolbox.invoke("unknown", &Map::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_dispatch_falls_back_to_query() {
        let toolbox = toolbox().await;

        let hit = DispatchRequest {
            tool: Some("get-hotel-address".to_string()),
            arguments: args(json!({"hotel_id": 1})),
            query: Some("SELECT 'ignored' AS x".to_string()),
        };
        assert_eq!(
            toolbox.dispatch(&hit).await.unwrap().output,
            r#"[{"address":"Main St 1"}]"#
        );

        let miss = DispatchRequest {
            tool: Some("hotel-name-by-id".to_string()),
            query: Some("SELECT COUNT(*) AS n FROM Hotel".to_string()),
            ..Default::default()
        };
        assert_eq!(toolbox.dispatch(&miss).await.unwrap().output, r#"[{"n":1}]"#);

        let nothing = DispatchRequest {
            tool: Some("hotel-name-by-id".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            toolbox.dispatch(&nothing).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_function_name_collision_rejected() {
        let loader = ToolLoader::from_yaml(
            r#"
sources:
  local:
    kind: sqlite
    path: ":memory:"
tools:
  hotel-count:
    kind: sqlite-sql
    source: local
    statement: SELECT 'dash' AS which
  hotel_count:
    kind: sqlite-sql
    source: local
    statement: SELECT 'underscore' AS which
toolsets:
  first:
    - hotel-count
  both:
    - hotel-count
  clash:
    - hotel-count
    - hotel_count
"#,
        )
        .unwrap();

        let err = Toolbox::from_loader::<&str>(&loader, &[], None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("hotel_count"));

        let err = Toolbox::from_loader(&loader, &["clash"], None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        // The same tool reached through two toolsets is not a collision
        let toolbox = Toolbox::from_loader(&loader, &["first", "both"], None).unwrap();
        let result = toolbox.invoke("hotel-count", &Map::new()).await.unwrap();
        assert_eq!(result.output, r#"[{"which":"dash"}]"#);
        assert_eq!(toolbox.declared_tool_names(), vec!["hotel_count"]);
    }

    #[tokio::test]
    async fn test_no_fallback_source() {
        let toolbox = Toolbox::new();
        let err = toolbox.fallback_query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_explicit_fallback_source_must_exist() {
        let loader = ToolLoader::from_yaml(CONFIG).unwrap();
        let err = Toolbox::from_loader(&loader, &["hotels"], Some("warehouse"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
