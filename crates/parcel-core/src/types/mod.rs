//! Shared core types used across the store, staging and commit layers.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, random identifier.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().simple().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

opaque_id!(
    /// Identifier of a deployed package. Stable across updates.
    PackageId
);

opaque_id!(
    /// Identifier of a stored blob.
    BlobId
);

opaque_id!(
    /// Identifier of an owned entity (keyword, plan or schedule).
    EntityId
);

/// Kind of binary stored in a blob store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlobType {
    /// The package archive itself.
    PackageArchive,
    /// A library attached to a package.
    PackageLibrary,
    /// A file extracted from an archive and referenced by a keyword.
    KeywordFile,
    /// A file extracted from an archive and referenced by a plan node.
    PlanFile,
}

impl BlobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PackageArchive => "package-archive",
            Self::PackageLibrary => "package-library",
            Self::KeywordFile => "keyword-file",
            Self::PlanFile => "plan-file",
        }
    }
}

impl fmt::Display for BlobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility state of a package record.
///
/// A live package carries no status at all (`Option::None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageStatus {
    /// An update has been accepted but is waiting for the package write lock.
    DelayedUpdate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = PackageId::new();
        let b = PackageId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = BlobId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }

    #[test]
    fn delayed_status_uses_wire_name() {
        let json = serde_json::to_string(&PackageStatus::DelayedUpdate).unwrap();
        assert_eq!(json, "\"DELAYED_UPDATE\"");
    }
}
