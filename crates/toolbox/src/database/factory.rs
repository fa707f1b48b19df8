use sqlx::{mysql::MySqlConnectOptions, sqlite::SqliteConnectOptions};
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    database::{MySqlBackend, SqlBackend, SqliteBackend},
    tools::{
        env::{interpolate, resolve_or},
        models::{SourceConfig, SourceKind, DEFAULT_HOST, DEFAULT_MYSQL_PORT},
    },
    Error, Result,
};

/// Connect a configured source, resolving its environment references.
///
/// Pools connect lazily, so an unreachable database surfaces on the first query.
/// The pool's maintenance tasks need a running tokio runtime; without one this
/// returns [`Error::Internal`].
pub fn connect(source: &SourceConfig) -> Result<Arc<dyn SqlBackend>> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        Error::Internal(format!(
            "Source {} must be connected from within a tokio runtime",
            source.name
        ))
    })?;

    let kind = source.source_kind().ok_or_else(|| {
        Error::Config(format!(
            "Unsupported source type: {} for source {}",
            source.kind, source.name
        ))
    })?;

    match kind {
        SourceKind::Mysql => Ok(Arc::new(MySqlBackend::new(
            &source.name,
            mysql_options(source)?,
        ))),
        SourceKind::Sqlite => {
            let path = match &source.path {
                Some(path) => PathBuf::from(interpolate(&path.to_string_lossy())?),
                None => source
                    .database
                    .as_deref()
                    .map(interpolate)
                    .transpose()?
                    .map(PathBuf::from)
                    .ok_or_else(|| {
                        Error::Config(format!("SQLite path not configured for source {}", source.name))
                    })?,
            };

            let in_memory = path.as_os_str() == ":memory:";
            let options = SqliteConnectOptions::new()
                .filename(&path)
                .create_if_missing(!in_memory);
            Ok(Arc::new(SqliteBackend::new(&source.name, options, in_memory)))
        }
    }
}

fn mysql_options(source: &SourceConfig) -> Result<MySqlConnectOptions> {
    let host = resolve_or(source.host.as_deref(), DEFAULT_HOST)?;
    let port_text = resolve_or(source.port.as_deref(), &DEFAULT_MYSQL_PORT.to_string())?;
    let port: u16 = port_text.trim().parse().map_err(|_| {
        Error::Config(format!("Invalid port '{}' for source {}", port_text, source.name))
    })?;
    let database = resolve_or(source.database.as_deref(), "")?;
    let user = resolve_or(source.user.as_deref(), "")?;
    let password = resolve_or(source.password.as_deref(), "")?;

    let mut options = MySqlConnectOptions::new().host(&host).port(port);
    if !user.is_empty() {
        options = options.username(&user);
    }
    if !password.is_empty() {
        options = options.password(&password);
    }
    if !database.is_empty() {
        options = options.database(&database);
    }

    Ok(options)
}
