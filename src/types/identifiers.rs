//! Newtype wrappers for type safety
//!
//! Session, message and history ids are UUID v4 strings so they are never
//! reused while a session is live. Provider and model ids are free-form
//! names taken from configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing id
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the id as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Live session (panel) identifier
    SessionId
);
string_id!(
    /// Chat message identifier
    MessageId
);
string_id!(
    /// Persisted conversation history entry identifier
    HistoryId
);
string_id!(
    /// External provider identifier (e.g. `claude`, `codex`)
    ProviderId
);
string_id!(
    /// Model identifier within a provider
    ModelId
);

impl SessionId {
    /// Generate a fresh random session id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl MessageId {
    /// Generate a fresh random message id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl HistoryId {
    /// Generate a fresh random history id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Generation counter identifying one turn of one session
///
/// Provider results carry the turn they were started for; results whose
/// turn no longer matches the session's current turn are discarded.
pub type TurnId = u64;
