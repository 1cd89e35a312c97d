//! toolcall-agent: a minimal tool-calling agent over Google Gemini
//!
//! This library provides:
//! - An append-only conversation store with checkpoint/rollback
//! - A tool registry and an executor that turns every tool failure into data
//!   the model can read, behind a filesystem capability policy
//! - A turn orchestrator with a configurable tool-round limit
//! - A Gemini `generateContent` backend, a scripted backend for tests, and a
//!   JSONL debug wrapper
//! - A terminal front-end (`toolcall` binary)

pub mod agent;
pub mod config;
pub mod llm;
pub mod tools;
pub mod transport;

pub use agent::{AgentResponse, ConversationStore, Session};
pub use config::Config;
