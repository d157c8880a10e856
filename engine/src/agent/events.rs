//! Progress events emitted while a turn runs

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// What the loop is doing right now
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Human-readable status line, e.g. "Reading plan.md..."
    Status { message: String },

    /// A tool call returned
    ToolFinished { name: String, is_error: bool },

    /// A workspace document was written
    FileEdited { path: String },
}

pub type EventSender = UnboundedSender<AgentEvent>;

/// Send an event if anyone is listening. A dropped receiver is not an error.
pub(crate) fn send_event(events: Option<&EventSender>, event: AgentEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}
