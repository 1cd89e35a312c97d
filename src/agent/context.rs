//! Conversation history for one session

use crate::llm::Turn;

/// Position in a `ConversationStore` that can be rolled back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

impl Checkpoint {
    /// Number of turns the store held when the checkpoint was taken
    pub fn len(&self) -> usize {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Ordered, append-only sequence of turns
///
/// Turns are never edited or reordered once pushed. The only way to shrink
/// the store is an explicit `rollback` to an earlier checkpoint.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    turns: Vec<Turn>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        tracing::trace!(
            role = turn.role.as_str(),
            segments = turn.segments.len(),
            "Appending turn #{}",
            self.turns.len() + 1
        );
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.turns.len())
    }

    /// Drop every turn appended after `checkpoint`; returns how many were dropped
    pub fn rollback(&mut self, checkpoint: Checkpoint) -> usize {
        let dropped = self.turns.len().saturating_sub(checkpoint.0);
        if dropped > 0 {
            tracing::debug!("Rolling back {} turn(s) to checkpoint {}", dropped, checkpoint.0);
            self.turns.truncate(checkpoint.0);
        }
        dropped
    }
}
