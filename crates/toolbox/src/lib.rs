pub mod agent;
pub mod config;
pub mod database;
pub mod metrics;
#[cfg(feature = "server")]
pub mod server;
pub mod tools;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Agent error: {0}")]
    Agent(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_with_category() {
        let err = Error::NotFound("Tool missing-tool not found in configuration".to_string());
        assert_eq!(
            err.to_string(),
            "Not found: Tool missing-tool not found in configuration"
        );
    }
}
