//! Newtype wrappers for catalogue identifiers, plus the entity kind tag.
//!
//! All newtypes serialize/deserialize as plain strings so stored documents stay
//! readable by anything that speaks plain JSON.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<String> for $name {
            fn eq(&self, other: &String) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<$name> for String {
            fn eq(&self, other: &$name) -> bool {
                *self == other.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Identity of an onboarded vNSF or NS, as assigned by the orchestrator.
    EntityId
);

string_newtype!(
    /// Store-assigned identifier of a catalogue document (e.g. a validation record).
    RecordId
);

string_newtype!(
    /// Blake3 hash of a binary (manifest or attestation file) in the media store.
    MediaRef
);

string_newtype!(
    /// Orchestrator tenant on whose behalf packages are onboarded.
    TenantId
);

/// The two onboardable entity variants. Both share the same lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "vNSF")]
    Vnsf,
    #[serde(rename = "NS")]
    Ns,
}

impl EntityKind {
    /// Manifest section key used by packages of this kind.
    pub fn manifest_section(self) -> &'static str {
        match self {
            EntityKind::Vnsf => "manifest:vnsf",
            EntityKind::Ns => "manifest:ns",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Vnsf => f.write_str("vNSF"),
            EntityKind::Ns => f.write_str("NS"),
        }
    }
}
