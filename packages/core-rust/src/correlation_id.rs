//! Correlation identifier codec.
//!
//! Externally supplied identifiers are untrusted header values. They are
//! validated as UUIDs and normalized to the canonical lower-case hyphenated
//! form; anything else is treated as absent rather than as an error.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier tying together log lines and calls of one logical unit of work.
///
/// Canonically a hyphenated lower-case UUID. Job identifiers supplied by a job
/// engine are not required to be UUIDs, so [`CorrelationId::opaque`] keeps an
/// arbitrary string as-is. Two identifiers are equal iff their string forms match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Parses an optional raw value into its canonical form.
    ///
    /// Returns `None` for a missing value, an empty string, or anything that is
    /// not a syntactically valid UUID. Valid input is canonicalized, which may
    /// change letter case or hyphenation.
    ///
    /// # Examples
    /// ```
    /// use tracelink_core::CorrelationId;
    ///
    /// let id = CorrelationId::parse(Some("6F9619FF-8B86-D011-B42D-00CF4FC964FF")).unwrap();
    /// assert_eq!(id.as_str(), "6f9619ff-8b86-d011-b42d-00cf4fc964ff");
    /// assert!(CorrelationId::parse(Some("not-a-uuid")).is_none());
    /// assert!(CorrelationId::parse(None).is_none());
    /// ```
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        let raw = raw?;
        if raw.is_empty() {
            return None;
        }
        Uuid::parse_str(raw).ok().map(Self::from_uuid)
    }

    /// Generates a fresh random (version 4) identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Normalizes a job identifier: canonical UUID form when it parses, the raw
    /// string otherwise. Empty or missing input yields `None`.
    #[must_use]
    pub fn normalize_job_id(raw: Option<&str>) -> Option<Self> {
        match raw {
            None | Some("") => None,
            Some(value) => Some(Self::parse(Some(value)).unwrap_or_else(|| Self::opaque(value))),
        }
    }

    /// Wraps an arbitrary string without validation.
    #[must_use]
    pub fn opaque(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Builds an identifier from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.hyphenated().to_string())
    }

    /// Returns the string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
