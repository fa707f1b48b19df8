//! Agent Runtime
//!
//! Hands every tool in a [`Toolbox`] to a Rig agent. The reasoning loop
//! itself belongs to Rig; this module only wires tools and instructions.

use rig::{
    agent::AgentBuilder,
    completion::{Chat, CompletionModel},
    providers::{anthropic, openai},
};
use std::sync::Arc;
use tracing::{debug, info};

use super::provider::{LLMConfig, ProviderKind};
use crate::{
    tools::{builtin, RigToolAdapter, Toolbox},
    Error, Result,
};

/// System instruction describing the available tools
pub fn instruction(toolbox: &Toolbox) -> String {
    let dynamic = toolbox.declared_tool_names();
    let dynamic_str = if dynamic.is_empty() {
        "None".to_string()
    } else {
        dynamic.join(", ")
    };

    let mut standard = Vec::new();
    if toolbox.has_fallback() {
        standard.push(format!("- Running SQL queries with `{}(query)`", builtin::RUN_QUERY));
        standard.push(format!("- Listing available tables with `{}()`", builtin::LIST_TABLES));
        standard.push(format!(
            "- Describing table structure with `{}(table_name)`",
            builtin::DESCRIBE_TABLE
        ));
    }
    let standard_str = if standard.is_empty() {
        "   None".to_string()
    } else {
        standard
            .iter()
            .map(|line| format!("   {}", line))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You are a MySQL database expert. You can help users interact with their database by:\n\n\
         1. Using predefined tools loaded from configuration:\n   {}\n\n\
         2. Using standard tools:\n{}\n\n\
         Always:\n\
         - Try to use the most specific tool for the job first\n\
         - Fall back to the generic `{}` tool if no specific tool matches\n\
         - Provide clear explanations of query results\n\
         - Format complex results in a readable way\n\
         - Explain any errors encountered",
        dynamic_str,
        standard_str,
        builtin::RUN_QUERY
    )
}

/// Rig-backed agent with the toolbox's tools attached
pub struct SqlAgent {
    llm_config: LLMConfig,
    toolbox: Arc<Toolbox>,
}

impl SqlAgent {
    pub fn new(llm_config: LLMConfig, toolbox: Arc<Toolbox>) -> Result<Self> {
        // Reject unknown providers up front
        llm_config.provider_kind()?;
        Ok(Self {
            llm_config,
            toolbox,
        })
    }

    pub fn toolbox(&self) -> &Toolbox {
        &self.toolbox
    }

    fn attach_tools<M: CompletionModel>(&self, builder: AgentBuilder<M>) -> AgentBuilder<M> {
        let mut builder = builder.preamble(&instruction(&self.toolbox));
        for tool in self.toolbox.tools() {
            debug!("Added tool: {}", tool.name());
            builder = builder.tool(RigToolAdapter::new(tool));
        }
        builder
    }

    /// Send a single prompt through the configured provider
    pub async fn chat(&self, prompt: &str) -> Result<String> {
        info!(
            "Sending prompt to {} ({}) with {} tools",
            self.llm_config.provider,
            self.llm_config.model_name(),
            self.toolbox.tool_names().len()
        );

        match self.llm_config.provider_kind()? {
            ProviderKind::Anthropic => {
                let client = match &self.llm_config.api_key {
                    Some(key) => anthropic::Client::new(
                        key,
                        "https://api.anthropic.com",
                        None,
                        anthropic::ANTHROPIC_VERSION_LATEST,
                    ),
                    None => anthropic::Client::from_env(),
                };

                let mut builder = self.attach_tools(client.agent(self.llm_config.model_name()));
                if let Some(max_tokens) = self.llm_config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                builder
                    .build()
                    .chat(prompt, vec![])
                    .await
                    .map_err(|e| Error::Agent(format!("Anthropic chat failed: {:?}", e)))
            }
            ProviderKind::OpenAI => {
                let client = match &self.llm_config.api_key {
                    Some(key) => openai::Client::new(key),
                    None => openai::Client::from_env(),
                };

                self.attach_tools(client.agent(self.llm_config.model_name()))
                    .build()
                    .chat(prompt, vec![])
                    .await
                    .map_err(|e| Error::Agent(format!("OpenAI chat failed: {:?}", e)))
            }
            ProviderKind::Mock => Ok(self.mock_response(prompt)),
        }
    }

    /// Names the tool a model would be expected to pick, for offline runs
    fn mock_response(&self, prompt: &str) -> String {
        let lowered = prompt.to_lowercase().replace(['-', ' '], "_");
        let matched = self
            .toolbox
            .declared_tool_names()
            .into_iter()
            .find(|name| lowered.contains(name.as_str()));

        match matched {
            Some(name) => format!("Would call tool `{}`.", name),
            None if self.toolbox.has_fallback() => {
                format!("No specific tool matches; would fall back to `{}`.", builtin::RUN_QUERY)
            }
            None => "No tool matches and no fallback source is configured.".to_string(),
        }
    }
}
