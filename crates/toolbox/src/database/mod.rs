//! Database access for tool sources.
//!
//! Each source is backed by an sqlx pool behind the [`SqlBackend`] trait so
//! tools don't care which engine they run against.

mod factory;
mod mysql;
mod sqlite;

pub use factory::connect;
pub use mysql::MySqlBackend;
pub use sqlite::SqliteBackend;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{tools::models::SourceKind, Error, Result};

/// Value bound to a positional placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Rows (or affected count) produced by a statement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, JsonValue>>,
    pub rows_affected: u64,
    /// Whether the statement produced a result set, even an empty one
    pub result_set: bool,
}

impl QueryOutput {
    /// Text handed back to the agent
    pub fn render(&self) -> String {
        if !self.result_set {
            return "Query executed successfully.".to_string();
        }
        serde_json::to_string(&self.rows).unwrap_or_else(|_| "[]".to_string())
    }

    /// First column of every row as text
    pub fn first_column(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| {
                let column = self.columns.first()?;
                match row.get(column)? {
                    JsonValue::String(s) => Some(s.clone()),
                    JsonValue::Null => None,
                    other => Some(other.to_string()),
                }
            })
            .collect()
    }
}

#[async_trait]
pub trait SqlBackend: Send + Sync {
    /// Name of the source this backend was connected from
    fn source_name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Run a statement with `?` placeholders bound to `binds`
    async fn execute(&self, sql: &str, binds: &[SqlValue]) -> Result<QueryOutput>;

    /// Run caller-supplied SQL as is
    async fn execute_raw(&self, sql: &str) -> Result<QueryOutput>;

    async fn list_tables(&self) -> Result<Vec<String>>;

    async fn describe_table(&self, table: &str) -> Result<QueryOutput>;
}

lazy_static! {
    static ref IDENTIFIER: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*)?$").expect("valid identifier regex");
}

/// Check that `name` is a plain (optionally schema-qualified) identifier
pub fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(Error::Validation(format!("Invalid table name: {}", name)))
    }
}

/// Whether a statement is expected to yield a result set
pub fn returns_rows(sql: &str) -> bool {
    let keyword = skip_leading_comments(sql)
        .trim_start_matches('(')
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_uppercase();

    matches!(
        keyword.as_str(),
        "SELECT" | "SHOW" | "DESCRIBE" | "DESC" | "EXPLAIN" | "WITH" | "PRAGMA" | "VALUES" | "TABLE"
    )
}

/// Drop leading whitespace and `--`, `#` or `/* */` comments
fn skip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if rest.starts_with("--") || rest.starts_with('#') {
            rest = rest.split_once('\n').map_or("", |(_, tail)| tail).trim_start();
        } else if let Some(body) = rest.strip_prefix("/*") {
            rest = body.split_once("*/").map_or("", |(_, tail)| tail).trim_start();
        } else {
            return rest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_returns_rows() {
        assert!(returns_rows("SELECT * FROM Hotel"));
        assert!(returns_rows("  select 1"));
        assert!(returns_rows("SHOW TABLES"));
        assert!(returns_rows("(SELECT 1) UNION (SELECT 2)"));
        assert!(!returns_rows("UPDATE Hotel SET name = 'x'"));
        assert!(!returns_rows("INSERT INTO Hotel VALUES (1)"));
        assert!(!returns_rows(""));
    }

    #[test]
    fn test_returns_rows_after_comments() {
        assert!(returns_rows("-- open incidents\nSELECT * FROM incident"));
        assert!(returns_rows("# note\n/* multi\nline */ SELECT 1"));
        assert!(!returns_rows("/* cleanup */ DELETE FROM incident"));
        assert!(!returns_rows("-- only a comment"));
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("Hotel").is_ok());
        assert!(validate_identifier("hotels.Hotel").is_ok());
        assert!(validate_identifier("Hotel; DROP TABLE Hotel").is_err());
        assert!(validate_identifier("`Hotel`").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_render_without_result_set() {
        let output = QueryOutput {
            rows_affected: 3,
            ..Default::default()
        };
        assert_eq!(output.render(), "Query executed successfully.");
    }

    #[test]
    fn test_render_rows() {
        let mut row = Map::new();
        row.insert("id".to_string(), json!(1));
        row.insert("name".to_string(), json!("Hilton"));
        let output = QueryOutput {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![row],
            rows_affected: 0,
            result_set: true,
        };
        assert_eq!(output.render(), r#"[{"id":1,"name":"Hilton"}]"#);
        assert_eq!(output.first_column(), vec!["1".to_string()]);
    }
}
