use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::agent::LLMConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub tools: ToolsConfig,
    pub llm: LLMConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub path: PathBuf,
    /// Toolsets to load; empty loads every declared tool
    #[serde(default)]
    pub toolsets: Vec<String>,
    /// Source used for raw queries
    pub fallback_source: Option<String>,
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Config {
            server: ServerConfig {
                addr: non_empty("SERVER_ADDR").unwrap_or(defaults.server.addr),
            },
            tools: ToolsConfig {
                path: non_empty("TOOLS_FILE")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.tools.path),
                toolsets: non_empty("TOOLSETS")
                    .map(|s| {
                        s.split(',')
                            .map(|name| name.trim().to_string())
                            .filter(|name| !name.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                fallback_source: non_empty("FALLBACK_SOURCE"),
            },
            llm: LLMConfig {
                provider: non_empty("LLM_PROVIDER").unwrap_or(defaults.llm.provider),
                model: non_empty("LLM_MODEL").unwrap_or(defaults.llm.model),
                api_key: non_empty("LLM_API_KEY"),
                max_tokens: match non_empty("LLM_MAX_TOKENS") {
                    Some(raw) => Some(raw.trim().parse().map_err(|_| {
                        crate::Error::Config(format!("LLM_MAX_TOKENS must be a number, got {}", raw))
                    })?),
                    None => defaults.llm.max_tokens,
                },
            },
        };

        // Validate the provider name early
        config.llm.provider_kind()?;

        if config.llm.api_key.is_none() {
            tracing::debug!("LLM_API_KEY is not set; providers will read their own environment");
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                addr: "0.0.0.0:8080".to_string(),
            },
            tools: ToolsConfig {
                path: PathBuf::from("tools.yaml"),
                toolsets: Vec::new(),
                fallback_source: None,
            },
            llm: LLMConfig::default(),
        }
    }
}
