//! Glue between the credential store, the completion endpoint and the
//! conversation log.
//!
//! A turn is split into `start_turn` and `finish_turn` so a front-end can run
//! the network call elsewhere (a spawned task) while still funnelling every
//! state change through the session. `send` does all three steps in place.

use std::fmt;

use tracing::{debug, info, warn};

use crate::completion::{Completer, CompletionError};
use crate::conversation::{Conversation, SubmitError};
use crate::credential::{CredentialError, CredentialStore, CREDENTIAL_KEY};

pub const FAILURE_DESCRIPTION: &str = "Failed to get AI response. Please check your API key.";
pub const SAVED_DESCRIPTION: &str = "API key saved successfully!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
}

/// A short-lived message for the user, shown as a toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn success(description: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            title: "Success".to_string(),
            description: description.into(),
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            title: "Error".to_string(),
            description: description.into(),
        }
    }
}

/// Everything needed to perform the network half of a turn.
pub struct PendingTurn {
    prompt: String,
    credential: Option<String>,
}

impl PendingTurn {
    /// Ask the completer for a reply. No request is made without a credential.
    pub async fn run(self, completer: &dyn Completer) -> Result<String, CompletionError> {
        let Some(credential) = self.credential else {
            return Err(CompletionError::MissingCredential);
        };
        completer.complete(&self.prompt, &credential).await
    }
}

impl fmt::Debug for PendingTurn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTurn")
            .field("prompt", &self.prompt)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub struct ChatSession {
    store: Box<dyn CredentialStore>,
    conversation: Conversation,
    needs_credential: bool,
}

impl ChatSession {
    pub fn new(store: Box<dyn CredentialStore>) -> Self {
        let mut session = Self {
            store,
            conversation: Conversation::new(),
            needs_credential: true,
        };
        session.refresh_credential();
        session
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn is_pending(&self) -> bool {
        self.conversation.is_pending()
    }

    /// Whether the credential form should be shown. Kept in step with every
    /// store mutation made through the session.
    pub fn needs_credential(&self) -> bool {
        self.needs_credential
    }

    pub fn save_credential(&mut self, value: &str) -> Result<Notification, CredentialError> {
        if value.is_empty() {
            return Err(CredentialError::Empty);
        }
        self.store.save(CREDENTIAL_KEY, value)?;
        self.refresh_credential();
        info!("API key saved");
        Ok(Notification::success(SAVED_DESCRIPTION))
    }

    /// Re-read the store and update the form visibility flag.
    pub fn refresh_credential(&mut self) -> Option<String> {
        let credential = match self.store.read(CREDENTIAL_KEY) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "could not read credential store");
                None
            }
        };
        self.needs_credential = credential.is_none();
        credential
    }

    pub fn start_turn(&mut self, text: &str) -> Result<PendingTurn, SubmitError> {
        self.conversation.begin(text)?;
        let credential = self.refresh_credential();
        debug!(turns = self.conversation.len(), "turn started");
        Ok(PendingTurn {
            prompt: text.to_string(),
            credential,
        })
    }

    /// Apply the outcome of a turn. Returns the notification to surface, if any.
    pub fn finish_turn(&mut self, outcome: Result<String, CompletionError>) -> Option<Notification> {
        self.conversation.resolve(&outcome);
        match outcome {
            Ok(_) => {
                debug!(turns = self.conversation.len(), "turn completed");
                None
            }
            Err(e) => {
                warn!(error = %e, "turn failed");
                if e == CompletionError::MissingCredential {
                    self.needs_credential = true;
                }
                Some(Notification::error(FAILURE_DESCRIPTION))
            }
        }
    }

    /// Run a whole turn in place.
    pub async fn send(
        &mut self,
        completer: &dyn Completer,
        text: &str,
    ) -> Result<Option<Notification>, SubmitError> {
        let pending = self.start_turn(text)?;
        let outcome = pending.run(completer).await;
        Ok(self.finish_turn(outcome))
    }
}

impl fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSession")
            .field("conversation", &self.conversation)
            .field("needs_credential", &self.needs_credential)
            .finish()
    }
}
