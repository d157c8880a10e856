//! Forge SDK
//!
//! Shared library providing the canonical conversation types and the error
//! taxonomy used by the engine and by anything that drives it.

/// Error types and handling
pub mod errors;

/// Canonical conversation and tool declaration types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, ForgeErrorExt, UpstreamError};
pub use types::{
    ContentBlock, ConversationTurn, ParamType, ParameterSpec, ToolCall, ToolDeclaration,
    ToolResult, TurnRole,
};
