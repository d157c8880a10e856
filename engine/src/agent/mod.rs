//! Agent Loop Core
//!
//! This module implements the orchestration loop that drives a multi-round
//! exchange between a model and the workspace tools. The loop owns the
//! sessions and their canonical histories and never names a concrete
//! provider backend.

pub mod core;
pub mod events;
pub mod history;
pub mod prompt;
pub mod session;

pub use core::{AgentService, ChatReply, CANCELLED_CALL_ERROR, NO_RESPONSE};
pub use events::{AgentEvent, EventSender};
pub use history::{ConversationHistory, INCOMPLETE_CALL_ERROR};
pub use session::{
    Session, SessionDetail, SessionManager, SessionSummary, DEFAULT_TITLE, TITLE_MAX_CHARS,
};
