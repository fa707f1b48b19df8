//! LLM Provider Configuration
//!
//! Selects which Rig provider backs the SQL agent.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: Option<u64>,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "o1".to_string(),
            api_key: None,
            max_tokens: Some(4096),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAI,
    Mock,
}

impl ProviderKind {
    pub fn parse(provider: &str) -> Result<Self> {
        match provider.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAI),
            "mock" => Ok(Self::Mock),
            other => Err(Error::Config(format!("Unsupported LLM provider: {}", other))),
        }
    }
}

impl LLMConfig {
    pub fn provider_kind(&self) -> Result<ProviderKind> {
        ProviderKind::parse(&self.provider)
    }

    /// Model name without a `provider/` prefix (e.g. `openai/o1` -> `o1`)
    pub fn model_name(&self) -> &str {
        match self.model.split_once('/') {
            Some((_, model)) => model,
            None => &self.model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind() {
        assert_eq!(ProviderKind::parse("Claude").unwrap(), ProviderKind::Anthropic);
        assert_eq!(ProviderKind::parse("openai").unwrap(), ProviderKind::OpenAI);
        assert_eq!(ProviderKind::parse("mock").unwrap(), ProviderKind::Mock);
        assert!(ProviderKind::parse("gemini").is_err());
    }

    #[test]
    fn test_model_name_strips_prefix() {
        let config = LLMConfig {
            model: "openai/o1".to_string(),
            ..Default::default()
        };
        assert_eq!(config.model_name(), "o1");
        assert_eq!(LLMConfig::default().model_name(), "o1");
    }
}
