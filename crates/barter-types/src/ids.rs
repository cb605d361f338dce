//! Identifier types.
//!
//! Deals are minted locally and use UUID v7 so that ordering by id matches
//! creation order. Messages and participants are named by the game server,
//! so they wrap the server's strings instead.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

/// Generates a newtype wrapper around a server-assigned [`String`] name.
macro_rules! define_name {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a server-assigned name.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a deal the agent proposed or accepted.
    DealId
}

define_name! {
    /// Mailbox letter identifier as assigned by the game server.
    MessageId
}

define_name! {
    /// Another participant in the economy, named by their public alias.
    Participant
}

impl Participant {
    /// Case-insensitive identity comparison.
    ///
    /// Aliases are typed by humans and other agents, so `Alice` and
    /// `alice` refer to the same participant.
    pub fn same_as(&self, other: &str) -> bool {
        self.0.trim().eq_ignore_ascii_case(other.trim())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn deal_ids_are_unique() {
        assert_ne!(DealId::new(), DealId::new());
    }

    #[test]
    fn participant_comparison_ignores_case_and_padding() {
        let alice = Participant::new("Alice");
        assert!(alice.same_as(" alice "));
        assert!(!alice.same_as("alicia"));
    }

    #[test]
    fn names_serialize_as_plain_strings() {
        let id = MessageId::new("mail-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"mail-7\"");
    }
}
