//! Error types and handling
//!
//! This module provides the error types used throughout the Forge engine.
//! All engine errors implement the `ForgeErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! # Taxonomy
//!
//! - **Tool-level errors** never appear here. They are ordinary JSON payloads
//!   handed back to the model so it can pick a different action.
//! - **Upstream errors** (`UpstreamError`) come from a provider backend and are
//!   fatal to the current turn. They are wrapped unmodified in
//!   `EngineError::Upstream`.
//! - **Budget errors** (`EngineError::MaxIterationsExceeded`) end a turn that
//!   never reached a terminal model response.
//! - **Validation errors** (`EngineError::Validation`) are raised synchronously
//!   at the boundary, before anything enters the core.
//!
//! # Examples
//!
//! ```
//! use sdk::errors::{EngineError, ForgeErrorExt, UpstreamError};
//!
//! let error = EngineError::Validation("summary is required".to_string());
//! println!("Hint: {}", error.user_hint());
//! assert!(error.is_recoverable());
//!
//! let upstream: EngineError = UpstreamError::NoCandidate("empty".to_string()).into();
//! assert!(matches!(upstream, EngineError::Upstream(_)));
//! ```

use thiserror::Error;

/// Trait for Forge error extensions
///
/// Provides additional context for errors: a hint that is safe to show to an
/// end user and whether retrying (or sending another message) can succeed.
pub trait ForgeErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint never contains secrets, file paths or provider response bodies.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    fn is_recoverable(&self) -> bool;
}

/// Errors raised by a provider backend while producing a model turn
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UpstreamError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    Parse(String),

    /// The backend answered but gave nothing the loop can use
    #[error("No usable candidate: {0}")]
    NoCandidate(String),
}

/// Main engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Provider errors
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    // Agent loop errors
    #[error("Too many iterations: no final answer after {iterations} model turns")]
    MaxIterationsExceeded {
        iterations: usize,
        /// Workspace paths edited before the budget ran out
        edited_files: Vec<String>,
    },

    #[error("Turn cancelled")]
    Cancelled,

    // Session errors
    #[error("Session is busy: {0}")]
    SessionBusy(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    // Memory errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Memory not found: {0}")]
    MemoryNotFound(String),

    // File system security errors
    #[error("Path denied: {0:?}")]
    PathDenied(std::path::PathBuf),

    #[error("Path outside workspace: {0:?}")]
    PathOutsideWorkspace(std::path::PathBuf),

    #[error("Path canonicalization failed for {0:?}: {1}")]
    PathCanonicalization(std::path::PathBuf, String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForgeErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Database operation failed. Check the data directory",

            Self::Upstream(UpstreamError::AuthenticationFailed(_)) => {
                "The provider rejected the API key. Run 'forge key set <provider>'"
            }
            Self::Upstream(UpstreamError::RateLimitExceeded) => {
                "The provider is rate limiting requests. Wait a moment and retry"
            }
            Self::Upstream(UpstreamError::Timeout) => {
                "The provider took too long to respond. Try again"
            }
            Self::Upstream(_) => "The model provider failed to answer. Try again",
            Self::ProviderNotConfigured(_) => {
                "No such provider. Check [llm] default_provider in config.toml"
            }

            Self::MaxIterationsExceeded { .. } => {
                "The agent did not finish. Send another message to let it continue"
            }
            Self::Cancelled => "The request was cancelled",

            Self::SessionBusy(_) => "This chat is still answering a previous message",
            Self::SessionNotFound(_) => "No chat with that id exists",

            Self::Validation(_) => "The memory is missing required fields",
            Self::MemoryNotFound(_) => "No memory with that id exists",

            Self::PathDenied(_) => "Access to this path is not allowed",
            Self::PathOutsideWorkspace(_) => "Operation must be within workspace",
            Self::PathCanonicalization(_, _) => "Invalid path specified",

            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_)
            | Self::ProviderNotConfigured(_)
            | Self::Upstream(UpstreamError::AuthenticationFailed(_)) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
