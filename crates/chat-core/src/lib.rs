pub mod completion;
pub mod config;
pub mod conversation;
pub mod credential;
pub mod session;

// Re-export main types for convenience
pub use completion::{Completer, CompletionClient, CompletionError, CompletionSettings};
pub use config::{Config, ConfigError};
pub use conversation::{Conversation, Speaker, SubmitError, Turn};
pub use credential::{
    CredentialError, CredentialStore, FileCredentialStore, MemoryCredentialStore, CREDENTIAL_KEY,
};
pub use session::{ChatSession, Notification, NotificationKind, PendingTurn};
