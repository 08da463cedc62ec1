//! Identifiers used by the document store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PatchworkError;

/// Globally unique document id: a random UUID v4 rendered as 32 hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Allocate a fresh id.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DocumentId {
    type Err = PatchworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = uuid::Uuid::parse_str(s.trim())
            .map_err(|_| PatchworkError::InvalidDocumentId(s.to_string()))?;
        Ok(Self(parsed.simple().to_string()))
    }
}

impl TryFrom<String> for DocumentId {
    type Error = PatchworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_ids_are_distinct_and_parse_back() {
        let a = DocumentId::random();
        let b = DocumentId::random();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert_eq!(a.as_str().parse::<DocumentId>().unwrap(), a);
    }

    #[test]
    fn test_hyphenated_form_normalizes() {
        let id: DocumentId = "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap();
        assert_eq!(id.as_str(), "67e5504410b1426f9247bb680e5fe0c8");
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = "not-a-doc".parse::<DocumentId>().unwrap_err();
        assert!(matches!(err, PatchworkError::InvalidDocumentId(_)));
    }
}
