//! Append-only conversation log and the single in-flight flag.
//!
//! The conversation moves `idle -> awaiting response -> idle`. A submission
//! made while a reply is pending is refused here, whatever the UI shows.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::completion::CompletionError;

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    User,
    Assistant,
}

/// One message in the conversation. Never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    text: String,
    speaker: Speaker,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker: Speaker::User,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker: Speaker::Assistant,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn speaker(&self) -> Speaker {
        self.speaker
    }

    pub fn is_assistant(&self) -> bool {
        self.speaker == Speaker::Assistant
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("a response is still pending")]
    Busy,

    #[error("message is empty")]
    Empty,
}

#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
    pending: bool,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Record the user's message and enter the awaiting-response state.
    pub fn begin(&mut self, text: &str) -> Result<(), SubmitError> {
        if self.pending {
            return Err(SubmitError::Busy);
        }
        if text.trim().is_empty() {
            return Err(SubmitError::Empty);
        }

        self.turns.push(Turn::user(text));
        self.pending = true;
        Ok(())
    }

    /// Leave the awaiting-response state. Only a successful outcome adds a turn.
    pub fn resolve(&mut self, outcome: &Result<String, CompletionError>) {
        self.pending = false;
        if let Ok(reply) = outcome {
            self.turns.push(Turn::assistant(reply.as_str()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_rounds_alternate() {
        let mut conversation = Conversation::new();
        for i in 0..5 {
            conversation.begin(&format!("question {}", i)).unwrap();
            conversation.resolve(&Ok(format!("answer {}", i)));
        }

        assert_eq!(conversation.len(), 10);
        for (i, pair) in conversation.turns().chunks(2).enumerate() {
            assert_eq!(pair[0], Turn::user(format!("question {}", i)));
            assert_eq!(pair[1], Turn::assistant(format!("answer {}", i)));
        }
        assert!(!conversation.is_pending());
    }

    #[test]
    fn test_failure_keeps_user_turn_and_clears_pending() {
        let mut conversation = Conversation::new();
        conversation.begin("Hello").unwrap();
        assert!(conversation.is_pending());

        conversation.resolve(&Err(CompletionError::Auth { status: 401 }));

        assert_eq!(conversation.turns(), &[Turn::user("Hello")]);
        assert!(!conversation.is_pending());
    }

    #[test]
    fn test_begin_while_pending_is_busy() {
        let mut conversation = Conversation::new();
        conversation.begin("first").unwrap();

        assert_eq!(conversation.begin("second"), Err(SubmitError::Busy));
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn test_blank_message_rejected() {
        let mut conversation = Conversation::new();
        assert_eq!(conversation.begin("   \n"), Err(SubmitError::Empty));
        assert!(conversation.is_empty());
        assert!(!conversation.is_pending());
    }

    #[test]
    fn test_text_is_stored_verbatim() {
        let mut conversation = Conversation::new();
        conversation.begin("  padded  ").unwrap();
        assert_eq!(conversation.turns()[0].text(), "  padded  ");
    }
}
