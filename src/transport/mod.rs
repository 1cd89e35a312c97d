//! Terminal front-end for the agent

pub mod cli;

pub use cli::{format_transcript, AgentOverrides, ModelsFormat};
