//! Command line entry point: serve the toolbox over HTTP, or drive it directly.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value as JsonValue};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use incident_toolbox::{
    agent::SqlAgent,
    config::Config,
    metrics,
    server::Server,
    tools::{ToolLoader, ToolResult, Toolbox},
};

#[derive(Parser)]
#[command(author, version, about = "YAML-defined SQL tools for incident-analysis agents", long_about = None)]
struct Cli {
    /// Log level (debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Tools file (defaults to TOOLS_FILE, then tools.yaml)
    #[arg(short, long, env = "TOOLS_FILE")]
    tools_file: Option<PathBuf>,

    /// Toolsets to load, all tools when omitted
    #[arg(long, value_delimiter = ',')]
    toolset: Vec<String>,

    /// Source used for raw queries
    #[arg(long)]
    fallback_source: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the toolbox over HTTP
    Serve {
        /// Listen address (defaults to SERVER_ADDR)
        #[arg(long)]
        addr: Option<String>,
    },

    /// List the loaded tools and toolsets
    List,

    /// Invoke a tool by name
    Invoke {
        /// Tool name, declared or exposed
        tool: String,

        /// Argument as key=value; the value is parsed as JSON when possible
        #[arg(short = 'a', long = "arg", value_parser = parse_key_value)]
        args: Vec<(String, JsonValue)>,

        /// Arguments as a JSON object
        #[arg(long)]
        json: Option<String>,
    },

    /// Run raw SQL against the fallback source
    Query {
        sql: String,
    },

    /// Ask the agent a question
    Chat {
        prompt: String,

        /// LLM provider (anthropic, openai, mock)
        #[arg(short, long)]
        provider: Option<String>,

        /// Model to use
        #[arg(short, long)]
        model: Option<String>,
    },
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, JsonValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {}", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| JsonValue::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

fn build_arguments(
    pairs: Vec<(String, JsonValue)>,
    json: Option<String>,
) -> Result<Map<String, JsonValue>> {
    let mut args = match json {
        Some(raw) => serde_json::from_str::<Map<String, JsonValue>>(&raw)
            .context("--json must be a JSON object")?,
        None => Map::new(),
    };
    args.extend(pairs);
    Ok(args)
}

fn print_result(result: &ToolResult) -> Result<()> {
    if result.success {
        println!("{}", result.output);
        Ok(())
    } else {
        anyhow::bail!(result.error.clone().unwrap_or_else(|| "Tool failed".to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(format!("incident_toolbox={},info", cli.log_level))
        .init();

    metrics::register_metrics();

    let mut config = Config::load()?;
    if let Some(path) = cli.tools_file {
        config.tools.path = path;
    }
    if !cli.toolset.is_empty() {
        config.tools.toolsets = cli.toolset;
    }
    if cli.fallback_source.is_some() {
        config.tools.fallback_source = cli.fallback_source;
    }

    let loader = ToolLoader::from_file(&config.tools.path)
        .with_context(|| format!("Failed to load {}", config.tools.path.display()))?;
    let toolbox = Arc::new(Toolbox::from_loader(
        &loader,
        &config.tools.toolsets,
        config.tools.fallback_source.as_deref(),
    )?);

    match cli.command {
        Commands::Serve { addr } => {
            if let Some(addr) = addr {
                config.server.addr = addr;
            }
            let server = Server::new(&config, toolbox);

            info!("Starting server on {}", config.server.addr);
            server.start(&config.server.addr).await?;
        }
        Commands::List => {
            for definition in toolbox.definitions() {
                println!("{:<24} {}", definition.name, definition.description);
            }
            for (name, tools) in toolbox.toolsets() {
                println!("toolset {}: {}", name, tools.join(", "));
            }
        }
        Commands::Invoke { tool, args, json } => {
            let args = build_arguments(args, json)?;
            let result = toolbox.invoke(&tool, &args).await?;
            print_result(&result)?;
        }
        Commands::Query { sql } => {
            let result = toolbox.fallback_query(&sql).await?;
            print_result(&result)?;
        }
        Commands::Chat {
            prompt,
            provider,
            model,
        } => {
            if let Some(provider) = provider {
                config.llm.provider = provider;
            }
            if let Some(model) = model {
                config.llm.model = model;
            }
            let agent = SqlAgent::new(config.llm, toolbox)?;
            println!("{}", agent.chat(&prompt).await?);
        }
    }

    Ok(())
}
