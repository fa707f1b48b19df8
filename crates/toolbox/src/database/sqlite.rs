use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{Map, Value as JsonValue};
use sqlx::{
    query::Query,
    sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Column, Either, Execute, Executor, Pool, Row, Sqlite, TypeInfo, ValueRef,
};
use tracing::{debug, info};

use super::{returns_rows, validate_identifier, QueryOutput, SqlBackend, SqlValue};
use crate::{tools::models::SourceKind, Result};

pub struct SqliteBackend {
    source_name: String,
    pool: Pool<Sqlite>,
}

impl SqliteBackend {
    /// Must be called from within a tokio runtime.
    pub fn new(source_name: &str, options: SqliteConnectOptions, in_memory: bool) -> Self {
        info!("Configuring SQLite source: {}", source_name);

        // Every connection to :memory: opens a fresh database, so pin one for the pool's lifetime
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        Self {
            source_name: source_name.to_string(),
            pool: pool_options.connect_lazy_with(options),
        }
    }

    /// In-process database, mostly useful for tests and local experiments
    pub fn in_memory(source_name: &str) -> Self {
        Self::new(source_name, SqliteConnectOptions::new().filename(":memory:"), true)
    }

    async fn run<'q, E>(&self, query: E, expect_rows: bool) -> Result<QueryOutput>
    where
        E: 'q + Execute<'q, Sqlite>,
    {
        let mut output = QueryOutput::default();
        let mut stream = (&self.pool).fetch_many(query);

        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => output.rows_affected += done.rows_affected(),
                Either::Right(row) => {
                    if output.columns.is_empty() {
                        output.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                    }
                    output.rows.push(row_to_json(&row)?);
                }
            }
        }

        output.result_set = expect_rows || !output.rows.is_empty();
        Ok(output)
    }
}

#[async_trait]
impl SqlBackend for SqliteBackend {
    fn source_name(&self) -> &str {
        &self.source_name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Sqlite
    }

    async fn execute(&self, sql: &str, binds: &[SqlValue]) -> Result<QueryOutput> {
        debug!("Executing on {}: {} ({} binds)", self.source_name, sql, binds.len());

        let query = binds.iter().fold(sqlx::query(sql), bind);
        self.run(query, returns_rows(sql)).await
    }

    async fn execute_raw(&self, sql: &str) -> Result<QueryOutput> {
        debug!("Executing raw query on {}: {}", self.source_name, sql);
        self.run(sql, returns_rows(sql)).await
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let output = self
            .run(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                true,
            )
            .await?;
        Ok(output.first_column())
    }

    async fn describe_table(&self, table: &str) -> Result<QueryOutput> {
        validate_identifier(table)?;
        let sql = match table.split_once('.') {
            Some((schema, name)) => format!("PRAGMA \"{}\".table_info(\"{}\")", schema, name),
            None => format!("PRAGMA table_info(\"{}\")", table),
        };
        self.run(sql.as_str(), true).await
    }
}

fn bind<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.clone()),
    }
}

fn row_to_json(row: &SqliteRow) -> Result<Map<String, JsonValue>> {
    let mut object = Map::new();

    for (idx, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(idx)?;
        // Storage class of the value itself, declared column types are only advisory
        let value = if raw.is_null() {
            JsonValue::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => JsonValue::from(row.try_get::<i64, _>(idx)?),
                "REAL" => JsonValue::from(row.try_get::<f64, _>(idx)?),
                "BLOB" => {
                    let bytes = row.try_get::<Vec<u8>, _>(idx)?;
                    JsonValue::from(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => JsonValue::from(row.try_get_unchecked::<String, _>(idx)?),
            }
        };
        object.insert(column.name().to_string(), value);
    }

    Ok(object)
}
