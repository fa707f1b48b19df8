//! Loads sources, tools and toolsets from a YAML configuration file.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use super::{
    models::{ParamType, SourceConfig, SourceKind, ToolConfig, ToolsFile, ToolsetConfig},
    sql::SqlTool,
};
use crate::{
    database::{self, SqlBackend},
    Error, Result,
};

pub struct ToolLoader {
    config_file: Option<PathBuf>,
    sources: BTreeMap<String, SourceConfig>,
    tools: BTreeMap<String, ToolConfig>,
    toolsets: BTreeMap<String, ToolsetConfig>,
    // One pool per source, shared by every tool that uses it
    backends: Mutex<HashMap<String, Arc<dyn SqlBackend>>>,
}

impl ToolLoader {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            error!("Error loading configuration {}: {}", path.display(), e);
            Error::Io(e)
        })?;

        let mut loader = Self::from_yaml(&content)?;
        loader.config_file = Some(path.to_path_buf());
        info!("Loaded configuration from {}", path.display());
        Ok(loader)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: ToolsFile = if content.trim().is_empty() {
            ToolsFile::default()
        } else {
            serde_yaml::from_str::<Option<ToolsFile>>(content)
                .map_err(|e| {
                    error!("Error parsing tools configuration: {}", e);
                    Error::Yaml(e)
                })?
                .unwrap_or_default()
        };

        Ok(Self::from_document(file))
    }

    pub fn from_document(file: ToolsFile) -> Self {
        let sources: BTreeMap<_, _> = file
            .sources
            .into_iter()
            .map(|(name, mut source)| {
                source.name = name.clone();
                (name, source)
            })
            .collect();

        let tools: BTreeMap<_, _> = file
            .tools
            .into_iter()
            .map(|(name, mut tool)| {
                tool.name = name.clone();
                (name, tool)
            })
            .collect();

        let toolsets: BTreeMap<_, _> = file
            .toolsets
            .into_iter()
            .map(|(name, tool_names)| {
                let toolset = ToolsetConfig {
                    name: name.clone(),
                    tool_names,
                };
                (name, toolset)
            })
            .collect();

        for tool in tools.values() {
            if tool.statement.trim().is_empty() {
                warn!("No SQL statement defined for tool {}", tool.name);
            }
            for param in &tool.parameters {
                if ParamType::parse(&param.type_name).is_none() {
                    warn!(
                        "Invalid parameter type '{}' for parameter '{}' of tool {}. Using 'string' instead.",
                        param.type_name, param.name, tool.name
                    );
                }
            }
        }

        info!(
            "Found {} sources, {} tools, and {} toolsets",
            sources.len(),
            tools.len(),
            toolsets.len()
        );

        Self {
            config_file: None,
            sources,
            tools,
            toolsets,
            backends: Mutex::new(HashMap::new()),
        }
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn toolset_names(&self) -> Vec<String> {
        self.toolsets.keys().cloned().collect()
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.get(name)
    }

    pub fn tool(&self, name: &str) -> Option<&ToolConfig> {
        self.tools.get(name)
    }

    pub fn toolset(&self, name: &str) -> Option<&ToolsetConfig> {
        self.toolsets.get(name)
    }

    /// Connected backend for a source, created on first use.
    ///
    /// Like every loading call that connects a source, this needs a running
    /// tokio runtime and fails with [`Error::Internal`] otherwise.
    pub fn backend(&self, source_name: &str) -> Result<Arc<dyn SqlBackend>> {
        let mut backends = self
            .backends
            .lock()
            .map_err(|_| Error::Internal("source cache lock poisoned".to_string()))?;

        if let Some(backend) = backends.get(source_name) {
            return Ok(backend.clone());
        }

        let source = self
            .sources
            .get(source_name)
            .ok_or_else(|| Error::NotFound(format!("Source {} not found in configuration", source_name)))?;
        let backend = database::connect(source)?;
        backends.insert(source_name.to_string(), backend.clone());
        Ok(backend)
    }

    /// Load a specific tool by name
    pub fn load_tool(&self, tool_name: &str) -> Result<SqlTool> {
        let (tool, source) = self.resolve(tool_name)?;
        let source_kind = source.source_kind().ok_or_else(|| {
            Error::Config(format!("Unsupported source type: {} for tool {}", source.kind, tool_name))
        })?;
        check_tool_kind(tool, source_kind)?;

        if tool.statement.trim().is_empty() {
            return Err(Error::Config(format!("No SQL statement defined for tool {}", tool_name)));
        }

        let backend = self.backend(&source.name)?;
        info!("Created {} tool: {}", tool.kind, tool_name);
        Ok(SqlTool::new(tool.clone(), backend))
    }

    /// Load one or more toolsets; tools come back in declared order
    pub fn load_toolset<S: AsRef<str>>(&self, toolset_names: &[S]) -> Result<Vec<SqlTool>> {
        // Validate all toolset names before processing
        for name in toolset_names {
            if !self.toolsets.contains_key(name.as_ref()) {
                return Err(Error::NotFound(format!(
                    "Toolset {} not found in configuration",
                    name.as_ref()
                )));
            }
        }

        let mut loaded = Vec::new();
        for name in toolset_names {
            let toolset = &self.toolsets[name.as_ref()];

            let mut kinds = BTreeSet::new();
            for tool_name in &toolset.tool_names {
                let (_, source) = self.resolve(tool_name)?;
                kinds.insert(source.kind.to_lowercase());
            }

            if toolset.tool_names.is_empty() {
                warn!("Toolset {} has no tools, skipping", toolset.name);
                continue;
            }

            if kinds.len() != 1 {
                return Err(Error::Config(format!(
                    "All tools in toolset {} must use the same type of source. Found: {:?}",
                    toolset.name, kinds
                )));
            }

            for tool_name in &toolset.tool_names {
                loaded.push(self.load_tool(tool_name)?);
            }
            info!(
                "Loaded toolset {} with {} tools",
                toolset.name,
                toolset.tool_names.len()
            );
        }

        Ok(loaded)
    }

    /// Every declared tool; tools that cannot be loaded are skipped with a warning
    pub fn load_all(&self) -> Vec<SqlTool> {
        self.tools
            .keys()
            .filter_map(|name| match self.load_tool(name) {
                Ok(tool) => Some(tool),
                Err(e) => {
                    warn!("Skipping tool {}: {}", name, e);
                    None
                }
            })
            .collect()
    }

    fn resolve(&self, tool_name: &str) -> Result<(&ToolConfig, &SourceConfig)> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| Error::NotFound(format!("Tool {} not found in configuration", tool_name)))?;
        let source = self.sources.get(&tool.source).ok_or_else(|| {
            Error::NotFound(format!("Source {} not found for tool {}", tool.source, tool_name))
        })?;
        Ok((tool, source))
    }
}

fn check_tool_kind(tool: &ToolConfig, source_kind: SourceKind) -> Result<()> {
    let known = [SourceKind::Mysql.tool_kind(), SourceKind::Sqlite.tool_kind()];
    if !known.contains(&tool.kind.as_str()) {
        return Err(Error::Config(format!("Unsupported tool kind: {}", tool.kind)));
    }
    if tool.kind != source_kind.tool_kind() {
        return Err(Error::Config(format!(
            "Tool {} of kind {} cannot run against {} source {}",
            tool.name, tool.kind, source_kind, tool.source
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
sources:
  hotels-db:
    kind: mysql
    host: ${TOOLBOX_TEST_UNSET_HOST:-127.0.0.1}
    port: 3306
    database: hotels
    user: agent
    password: secret
  local:
    kind: sqlite
    path: ":memory:"
tools:
  search-hotel-by-id:
    kind: mysql-sql
    source: hotels-db
    description: Find a hotel by id.
    parameters:
      - name: id
        type: int
        description: Hotel id
    statement: SELECT * FROM Hotel WHERE id = $1
  search-hotel-by-name:
    kind: mysql-sql
    source: hotels-db
    description: Find hotels by name.
    parameters:
      - name: name
        type: string
        description: Hotel name
    statement: SELECT * FROM Hotel WHERE name LIKE CONCAT('%', $1, '%')
  count-local:
    kind: sqlite-sql
    source: local
    statement: SELECT 1
  broken-source:
    kind: mysql-sql
    source: nowhere
    statement: SELECT 1
  legacy:
    kind: postgres-sql
    source: hotels-db
    statement: SELECT 1
toolsets:
  hotel-toolset:
    - search-hotel-by-id
    - search-hotel-by-name
  mixed-toolset:
    - search-hotel-by-id
    - count-local
  empty-toolset: []
"#;

    #[test]
    fn test_load_counts() {
        let loader = ToolLoader::from_yaml(CONFIG).unwrap();
        assert_eq!(loader.source_names(), vec!["hotels-db", "local"]);
        assert_eq!(loader.tool_names().len(), 5);
        assert_eq!(
            loader.toolset_names(),
            vec!["empty-toolset", "hotel-toolset", "mixed-toolset"]
        );

        let tool = loader.tool("search-hotel-by-id").unwrap();
        assert_eq!(tool.name, "search-hotel-by-id");
        assert_eq!(tool.source, "hotels-db");
        assert_eq!(tool.parameters[0].param_type(), ParamType::Integer);
        assert_eq!(loader.source("hotels-db").unwrap().port.as_deref(), Some("3306"));
    }

    #[test]
    fn test_empty_document() {
        let loader = ToolLoader::from_yaml("").unwrap();
        assert!(loader.tool_names().is_empty());

        let loader = ToolLoader::from_yaml("sources: {}\n").unwrap();
        assert!(loader.source_names().is_empty());
        assert!(loader.toolset_names().is_empty());
    }

    #[test]
    fn test_malformed_yaml() {
        let err = ToolLoader::from_yaml("tools: [unclosed").err().unwrap();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[tokio::test]
    async fn test_load_tool() {
        let loader = ToolLoader::from_yaml(CONFIG).unwrap();
        let tool = loader.load_tool("search-hotel-by-id").unwrap();
        assert_eq!(tool.declared_name(), "search-hotel-by-id");
        assert_eq!(tool.source_name(), "hotels-db");
    }

    #[tokio::test]
    async fn test_load_tool_errors() {
        let loader = ToolLoader::from_yaml(CONFIG).unwrap();

        let err = loader.load_tool("missing").err().unwrap();
        assert_eq!(err.to_string(), "Not found: Tool missing not found in configuration");

        let err = loader.load_tool("broken-source").err().unwrap();
        assert!(err.to_string().contains("Source nowhere not found for tool broken-source"));

        let err = loader.load_tool("legacy").err().unwrap();
        assert!(err.to_string().contains("Unsupported tool kind: postgres-sql"));
    }

    #[tokio::test]
    async fn test_load_toolset() {
        let loader = ToolLoader::from_yaml(CONFIG).unwrap();
        let tools = loader.load_toolset(&["hotel-toolset"]).unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.declared_name().to_string()).collect();
        assert_eq!(names, vec!["search-hotel-by-id", "search-hotel-by-name"]);

        // Both tools share a single pool
        assert!(Arc::ptr_eq(&tools[0].backend(), &tools[1].backend()));
    }

    #[tokio::test]
    async fn test_load_toolset_errors() {
        let loader = ToolLoader::from_yaml(CONFIG).unwrap();

        let err = loader.load_toolset(&["hotel-toolset", "nope"]).err().unwrap();
        assert!(err.to_string().contains("Toolset nope not found"));

        let err = loader.load_toolset(&["mixed-toolset"]).err().unwrap();
        assert!(err.to_string().contains("must use the same type of source"));

        assert!(loader.load_toolset(&["empty-toolset"]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_all_skips_broken_tools() {
        let loader = ToolLoader::from_yaml(CONFIG).unwrap();
        let mut names: Vec<_> = loader
            .load_all()
            .iter()
            .map(|t| t.declared_name().to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec!["count-local", "search-hotel-by-id", "search-hotel-by-name"]
        );
    }

    #[test]
    fn test_load_tool_outside_runtime() {
        let loader = ToolLoader::from_yaml(CONFIG).unwrap();
        let err = loader.load_tool("search-hotel-by-id").err().unwrap();
        assert!(matches!(err, Error::Internal(_)));

        // Configuration errors still come first
        let err = loader.load_tool("missing").err().unwrap();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.yaml");
        std::fs::write(&path, "toolsets:\n  empty: []\n").unwrap();

        let loader = ToolLoader::from_file(&path).unwrap();
        assert_eq!(loader.config_file(), Some(path.as_path()));
        assert_eq!(loader.toolset_names(), vec!["empty"]);

        assert!(matches!(
            ToolLoader::from_file(dir.path().join("missing.yaml")),
            Err(Error::Io(_))
        ));
    }
}
