//! Configuration records loaded from a tools YAML document.
//!
//! The document has three optional top-level maps:
//!
//! ```yaml
//! sources:
//!   hotels-db:
//!     kind: mysql
//!     host: ${MYSQL_HOST}
//!     port: 3306
//!     database: hotels
//!     user: ${MYSQL_USER}
//!     password: ${MYSQL_PASSWORD}
//! tools:
//!   search-hotel-by-id:
//!     kind: mysql-sql
//!     source: hotels-db
//!     description: Find a hotel by its id.
//!     parameters:
//!       - name: id
//!         type: integer
//!         description: Hotel id
//!     statement: SELECT * FROM Hotel WHERE id = $1
//! toolsets:
//!   hotel-toolset:
//!     - search-hotel-by-id
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Whole YAML document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsFile {
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
    #[serde(default)]
    pub tools: BTreeMap<String, ToolConfig>,
    #[serde(default)]
    pub toolsets: BTreeMap<String, Vec<String>>,
}

/// Database backends a source can point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Mysql,
    Sqlite,
}

impl SourceKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.to_lowercase().as_str() {
            "mysql" => Some(Self::Mysql),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Tool kind that runs statements against this source kind
    pub fn tool_kind(&self) -> &'static str {
        match self {
            Self::Mysql => "mysql-sql",
            Self::Sqlite => "sqlite-sql",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mysql => write!(f, "mysql"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Named connection descriptor.
///
/// String values may reference environment variables as `${VAR}` or
/// `${VAR:-default}`; they are resolved when the source is connected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub port: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Database file for sqlite sources (`:memory:` for an in-process database)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl SourceConfig {
    pub fn source_kind(&self) -> Option<SourceKind> {
        SourceKind::parse(&self.kind)
    }
}

/// Named parameterized SQL statement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,
    #[serde(default)]
    pub statement: String,
}

impl ToolConfig {
    /// Name exposed to agent frameworks, which reject `-` in function names
    pub fn function_name(&self) -> String {
        self.name.replace('-', "_")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterConfig {
    pub name: String,
    #[serde(rename = "type", default = "default_param_type")]
    pub type_name: String,
    #[serde(default)]
    pub description: String,
}

fn default_param_type() -> String {
    "string".to_string()
}

impl ParameterConfig {
    /// Declared type, unknown names fall back to string
    pub fn param_type(&self) -> ParamType {
        ParamType::parse(&self.type_name).unwrap_or(ParamType::String)
    }
}

/// Primitive parameter types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "string" | "str" | "text" => Some(Self::String),
            "integer" | "int" => Some(Self::Integer),
            "float" | "number" | "double" => Some(Self::Float),
            "boolean" | "bool" => Some(Self::Boolean),
            "object" | "dict" => Some(Self::Object),
            "array" | "list" => Some(Self::Array),
            _ => None,
        }
    }

    /// JSON schema type name
    pub fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// Named grouping of tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsetConfig {
    pub name: String,
    pub tool_names: Vec<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Number(i64),
        Text(String),
    }

    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|v| match v {
        Scalar::Number(n) => n.to_string(),
        Scalar::Text(s) => s,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_type_aliases() {
        assert_eq!(ParamType::parse("int"), Some(ParamType::Integer));
        assert_eq!(ParamType::parse("STR"), Some(ParamType::String));
        assert_eq!(ParamType::parse("dict"), Some(ParamType::Object));
        assert_eq!(ParamType::parse("list"), Some(ParamType::Array));
        assert_eq!(ParamType::parse("uuid"), None);
    }

    #[test]
    fn test_unknown_param_type_falls_back_to_string() {
        let param = ParameterConfig {
            name: "id".to_string(),
            type_name: "uuid".to_string(),
            description: String::new(),
        };
        assert_eq!(param.param_type(), ParamType::String);
    }

    #[test]
    fn test_port_accepts_number_and_string() {
        let source: SourceConfig = serde_yaml::from_str("kind: mysql\nport: 3307\n").unwrap();
        assert_eq!(source.port.as_deref(), Some("3307"));

        let source: SourceConfig =
            serde_yaml::from_str("kind: mysql\nport: \"${MYSQL_PORT}\"\n").unwrap();
        assert_eq!(source.port.as_deref(), Some("${MYSQL_PORT}"));

        let source: SourceConfig = serde_yaml::from_str("kind: mysql\n").unwrap();
        assert!(source.port.is_none());
    }

    #[test]
    fn test_function_name() {
        let tool = ToolConfig {
            name: "search-hotel-by-id".to_string(),
            ..Default::default()
        };
        assert_eq!(tool.function_name(), "search_hotel_by_id");
    }
}
