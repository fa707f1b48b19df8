//! LLM Agent Module
//!
//! Wires the configured SQL tools into a Rig agent. Reasoning and tool
//! selection are left to Rig and the model.

pub mod provider;
pub mod runtime;

pub use provider::{LLMConfig, ProviderKind};
pub use runtime::{instruction, SqlAgent};
