use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use serde_json::{Map, Value as JsonValue};
use sqlx::{
    mysql::{MySqlArguments, MySqlConnectOptions, MySqlPoolOptions, MySqlRow},
    query::Query,
    Column, Either, Execute, Executor, MySql, Pool, Row, TypeInfo, ValueRef,
};
use tracing::{debug, info};

use super::{returns_rows, validate_identifier, QueryOutput, SqlBackend, SqlValue};
use crate::{tools::models::SourceKind, Error, Result};

pub struct MySqlBackend {
    source_name: String,
    pool: Pool<MySql>,
}

impl MySqlBackend {
    /// Build a lazily connecting pool; nothing touches the network until the first query.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(source_name: &str, options: MySqlConnectOptions) -> Self {
        info!("Configuring MySQL source: {}", source_name);

        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect_lazy_with(options);

        Self {
            source_name: source_name.to_string(),
            pool,
        }
    }

    async fn run<'q, E>(&self, query: E, expect_rows: bool) -> Result<QueryOutput>
    where
        E: 'q + Execute<'q, MySql>,
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
impl SqlBackend for MySqlBackend {
    fn source_name(&self) -> &str {
        &self.source_name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Mysql
    }

    async fn execute(&self, sql: &str, binds: &[SqlValue]) -> Result<QueryOutput> {
        debug!("Executing on {}: {} ({} binds)", self.source_name, sql, binds.len());

        let query = binds.iter().fold(sqlx::query(sql), bind);
        self.run(query, returns_rows(sql)).await
    }

    async fn execute_raw(&self, sql: &str) -> Result<QueryOutput> {
        debug!("Executing raw query on {}: {}", self.source_name, sql);

        // Plain &str goes over the text protocol, which accepts any statement
        self.run(sql, returns_rows(sql)).await
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.run("SHOW TABLES", true).await?.first_column())
    }

    async fn describe_table(&self, table: &str) -> Result<QueryOutput> {
        validate_identifier(table)?;
        let quoted = table
            .split('.')
            .map(|part| format!("`{}`", part))
            .collect::<Vec<_>>()
            .join(".");
        let sql = format!("DESCRIBE {}", quoted);
        self.run(sql.as_str(), true).await
    }
}

fn bind<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.clone()),
    }
}

fn row_to_json(row: &MySqlRow) -> Result<Map<String, JsonValue>> {
    let mut object = Map::new();

    for (idx, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            JsonValue::Null
        } else {
            let type_name = raw.type_info().name().to_uppercase();
            decode_column(row, idx, &type_name)?
        };
        object.insert(column.name().to_string(), value);
    }

    Ok(object)
}

fn decode_column(row: &MySqlRow, idx: usize, type_name: &str) -> Result<JsonValue> {
    let value = match type_name {
        "BOOLEAN" => JsonValue::from(row.try_get::<bool, _>(idx)?),
        t if t.ends_with("UNSIGNED") => JsonValue::from(row.try_get::<u64, _>(idx)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            JsonValue::from(row.try_get::<i64, _>(idx)?)
        }
        "YEAR" => JsonValue::from(row.try_get_unchecked::<i64, _>(idx)?),
        "FLOAT" => JsonValue::from(row.try_get::<f32, _>(idx)?),
        "DOUBLE" => JsonValue::from(row.try_get::<f64, _>(idx)?),
        "DATETIME" => JsonValue::from(iso_datetime(&row.try_get::<NaiveDateTime, _>(idx)?)),
        "TIMESTAMP" => JsonValue::from(row.try_get::<DateTime<Utc>, _>(idx)?.to_rfc3339()),
        "DATE" => JsonValue::from(row.try_get::<NaiveDate, _>(idx)?.to_string()),
        "TIME" => JsonValue::from(row.try_get::<NaiveTime, _>(idx)?.to_string()),
        "JSON" => {
            let text = row.try_get_unchecked::<String, _>(idx)?;
            serde_json::from_str(&text).unwrap_or(JsonValue::String(text))
        }
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
            let bytes = row.try_get::<Vec<u8>, _>(idx)?;
            JsonValue::from(String::from_utf8_lossy(&bytes).into_owned())
        }
        // DECIMAL, text types and anything else travel as strings on the wire
        _ => match row.try_get_unchecked::<String, _>(idx) {
            Ok(text) => JsonValue::from(text),
            Err(_) => {
                let bytes = row
                    .try_get_unchecked::<Vec<u8>, _>(idx)
                    .map_err(|e| Error::Execution(format!("Cannot decode column {}: {}", idx, e)))?;
                JsonValue::from(String::from_utf8_lossy(&bytes).into_owned())
            }
        },
    };

    Ok(value)
}

/// ISO 8601 text for a zone-less DATETIME, fractional seconds only when present
fn iso_datetime(value: &NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_datetime() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let value = date.and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(iso_datetime(&value), "2024-01-01T12:00:00");

        let value = date.and_hms_milli_opt(12, 0, 0, 250).unwrap();
        assert_eq!(iso_datetime(&value), "2024-01-01T12:00:00.250");
    }
}
