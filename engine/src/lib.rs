//! Forge Engine Library
//!
//! This library provides the core functionality of the Forge engine.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// File system security module
pub mod fs_guard;

/// Database persistence module
pub mod db;

/// Long-lived memories and relevance ranking
pub mod memory;

/// LLM provider abstraction layer
pub mod llm;

/// Agent loop core module
pub mod agent;

/// Workspace tools exposed to the model
pub mod tools;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
