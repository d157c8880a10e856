//! Canonical conversation history
//!
//! Stores the provider-agnostic turns of one session in order. The history
//! never lets a user turn follow unresolved tool calls: pushing a user turn
//! while the last model turn still has calls first appends synthetic error
//! results for them.

use sdk::types::{ConversationTurn, ToolCall, ToolResult, TurnRole};
use tracing::debug;

/// Payload error of a call that never got a real result
pub const INCOMPLETE_CALL_ERROR: &str = "Tool call was not completed";

/// Ordered turns of a single session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a history from stored turns, closing any dangling calls
    pub fn from_turns(turns: Vec<ConversationTurn>) -> Self {
        let mut history = Self { turns };
        history.resolve_pending(INCOMPLETE_CALL_ERROR);
        history
    }

    /// Append a turn
    ///
    /// A user turn first resolves pending calls so the invariant holds.
    pub fn push(&mut self, turn: ConversationTurn) {
        if turn.role == TurnRole::User {
            self.resolve_pending(INCOMPLETE_CALL_ERROR);
        }
        self.turns.push(turn);
    }

    /// Calls of the last model turn that have no result yet
    pub fn pending_calls(&self) -> Vec<ToolCall> {
        match self.turns.last() {
            Some(turn) if turn.role == TurnRole::Model => {
                turn.tool_calls().into_iter().cloned().collect()
            }
            _ => Vec::new(),
        }
    }

    /// Answer every pending call with an error result carrying `message`
    ///
    /// Returns the number of calls that were resolved.
    pub fn resolve_pending(&mut self, message: &str) -> usize {
        let pending = self.pending_calls();
        if pending.is_empty() {
            return 0;
        }

        debug!("Closing {} pending tool call(s): {}", pending.len(), message);
        let results = pending
            .iter()
            .map(|call| ToolResult::error(call, message))
            .collect();
        self.turns.push(ConversationTurn::tool_results(results));
        pending.len()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::ContentBlock;
    use serde_json::json;

    fn model_with_calls(ids: &[&str]) -> ConversationTurn {
        ConversationTurn::model(
            ids.iter()
                .map(|id| ContentBlock::ToolCall(ToolCall::new(*id, "read_file", json!({}))))
                .collect(),
        )
    }

    #[test]
    fn test_push_in_order() {
        let mut history = ConversationHistory::new();
        assert!(history.is_empty());

        history.push(ConversationTurn::user("hi"));
        history.push(ConversationTurn::model(vec![ContentBlock::text("hello")]));

        assert_eq!(history.len(), 2);
        assert!(history.pending_calls().is_empty());
    }

    #[test]
    fn test_user_turn_resolves_pending_calls() {
        let mut history = ConversationHistory::new();
        history.push(ConversationTurn::user("read both"));
        history.push(model_with_calls(&["a", "b"]));
        assert_eq!(history.pending_calls().len(), 2);

        history.push(ConversationTurn::user("never mind"));

        let turns = history.turns();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[2].role, TurnRole::ToolResult);
        let results = turns[2].results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].call_id, "a");
        assert_eq!(results[1].call_id, "b");
        assert_eq!(results[0].payload["error"], INCOMPLETE_CALL_ERROR);
        assert_eq!(turns[3].role, TurnRole::User);
    }

    #[test]
    fn test_answered_calls_are_not_pending() {
        let mut history = ConversationHistory::new();
        history.push(ConversationTurn::user("go"));
        history.push(model_with_calls(&["a"]));
        history.push(ConversationTurn::tool_results(vec![ToolResult::new(
            "a",
            "read_file",
            json!({"content": "x"}),
        )]));

        assert!(history.pending_calls().is_empty());
        assert_eq!(history.resolve_pending("Cancelled"), 0);
    }

    #[test]
    fn test_from_turns_repairs_dangling_calls() {
        let history = ConversationHistory::from_turns(vec![
            ConversationTurn::user("go"),
            model_with_calls(&["a"]),
        ]);

        assert_eq!(history.len(), 3);
        assert!(history.pending_calls().is_empty());
    }
}
