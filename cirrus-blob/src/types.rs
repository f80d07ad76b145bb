use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque version token assigned by the store on every successful write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ETag(pub String);

impl ETag {
    pub fn new<S: Into<String>>(tag: S) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value read together with the token it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub etag: ETag,
}

impl<T> Versioned<T> {
    pub fn new(value: T, etag: ETag) -> Self {
        Self { value, etag }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Versioned<U> {
        Versioned {
            value: f(self.value),
            etag: self.etag,
        }
    }
}

/// Result of a conditional read against a known token.
#[derive(Debug, Clone, PartialEq)]
pub enum Modified<T> {
    /// Current token equals the one supplied.
    Unchanged,
    Modified(Versioned<T>),
    Absent,
}

/// Result of a single-shot read-modify-write.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<T> {
    /// The update function's value was written.
    Applied { value: T, etag: ETag },
    /// The update function declined; nothing was written.
    Aborted,
    /// Someone else wrote between our read and our write. Nothing was written.
    Conflict,
}

impl<T> UpdateOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Applied { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> UpdateOutcome<U> {
        match self {
            Self::Applied { value, etag } => UpdateOutcome::Applied {
                value: f(value),
                etag,
            },
            Self::Aborted => UpdateOutcome::Aborted,
            Self::Conflict => UpdateOutcome::Conflict,
        }
    }
}

/// Build a globally unique blob name under `prefix`: `{prefix}/{ulid}`.
///
/// ULIDs sort by creation time, so listings under a prefix come back in
/// roughly insertion order.
pub fn unique_blob_name(prefix: &str) -> String {
    format!("{}/{}", prefix, Ulid::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_names_share_prefix_and_differ() {
        let a = unique_blob_name("orders");
        let b = unique_blob_name("orders");
        assert!(a.starts_with("orders/"));
        assert!(b.starts_with("orders/"));
        assert_ne!(a, b);
    }

    #[test]
    fn update_outcome_helpers() {
        let applied = UpdateOutcome::Applied {
            value: 2,
            etag: ETag::new("e1"),
        };
        assert!(applied.is_applied());
        assert_eq!(applied.clone().map(|v| v * 10).into_value(), Some(20));
        assert_eq!(UpdateOutcome::<u32>::Conflict.into_value(), None);
        assert!(!UpdateOutcome::<u32>::Aborted.is_applied());
    }
}
