use std::collections::HashMap;

use crate::domain::{ChatId, GoalCategory};

/// Where a chat currently is in the goal-creation dialogue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogueStep {
    /// The category list was sent; waiting for the user to answer with a
    /// category id.
    AwaitingCategory,
    /// Category chosen; waiting for the goal title.
    AwaitingTitle { category: GoalCategory },
}

/// Per-chat dialogue state.
///
/// In-memory only and lost on restart by design; a half-finished dialogue
/// is cheap to restart. Not thread-safe: there is exactly one writer, the
/// dispatch loop, and reusing this elsewhere requires per-chat locking.
#[derive(Debug, Default)]
pub struct DialogueStore {
    inner: HashMap<ChatId, DialogueStep>,
}

impl DialogueStore {
    pub fn get(&self, chat_id: ChatId) -> Option<&DialogueStep> {
        self.inner.get(&chat_id)
    }

    pub fn set(&mut self, chat_id: ChatId, step: DialogueStep) {
        self.inner.insert(chat_id, step);
    }

    /// Remove any state for the chat; true if there was some.
    pub fn clear(&mut self, chat_id: ChatId) -> bool {
        self.inner.remove(&chat_id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
