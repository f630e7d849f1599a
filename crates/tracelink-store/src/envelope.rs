//! Record envelopes: the unit of persistence.
//!
//! An envelope wraps a serialized artifact with its type tag, its id, the
//! secondary index keys it is reachable through, and its retention window.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A secondary index entry, e.g. `("requirement", "REQ-12")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexKey {
    /// Index name
    pub index: String,

    /// Key within the index
    pub key: String,
}

impl IndexKey {
    /// Create a new index key.
    pub fn new(index: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            key: key.into(),
        }
    }
}

/// A persisted record with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEnvelope {
    /// Record type tag (e.g. "matrix", "coverage")
    pub record_type: String,

    /// Record id, unique within its record type
    pub id: String,

    /// Secondary index keys
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexKey>,

    /// When the record was stored
    pub stored_at: DateTime<Utc>,

    /// When the record stops being visible, if it has a retention window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Serialized record body
    pub body: serde_json::Value,
}

impl RecordEnvelope {
    /// Wrap a serializable body into an envelope stored now.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecord` if the type or id is empty, or
    /// `Error::Json` if the body fails to serialize.
    pub fn wrap<T: Serialize>(
        record_type: impl Into<String>,
        id: impl Into<String>,
        body: &T,
    ) -> Result<Self> {
        let record_type = record_type.into();
        let id = id.into();
        if record_type.trim().is_empty() {
            return Err(Error::InvalidRecord("record type cannot be empty".into()));
        }
        if id.trim().is_empty() {
            return Err(Error::InvalidRecord(format!(
                "{record_type} record id cannot be empty"
            )));
        }

        Ok(Self {
            record_type,
            id,
            indexes: Vec::new(),
            stored_at: Utc::now(),
            expires_at: None,
            body: serde_json::to_value(body)?,
        })
    }

    /// Add a secondary index key.
    #[must_use]
    pub fn with_index(mut self, index: impl Into<String>, key: impl Into<String>) -> Self {
        let entry = IndexKey::new(index, key);
        if !self.indexes.contains(&entry) {
            self.indexes.push(entry);
        }
        self
    }

    /// Set a retention window relative to `stored_at`.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(self.stored_at + ttl);
        self
    }

    /// Deserialize the body into a concrete record type.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if the body does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }

    /// Whether the record's retention window has passed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Whether the record is reachable through `index`/`key`.
    #[must_use]
    pub fn has_index(&self, index: &str, key: &str) -> bool {
        self.indexes
            .iter()
            .any(|entry| entry.index == index && entry.key == key)
    }

    /// The `(record_type, id)` pair identifying this record.
    #[must_use]
    pub fn key(&self) -> (&str, &str) {
        (&self.record_type, &self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Body {
        name: String,
        score: f64,
    }

    #[test]
    fn wrap_and_decode_preserves_body() {
        let body = Body {
            name: "alpha".to_string(),
            score: 0.75,
        };
        let envelope = RecordEnvelope::wrap("matrix", "m-1", &body).unwrap();
        let decoded: Body = envelope.decode().unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn wrap_rejects_empty_id() {
        let result = RecordEnvelope::wrap("matrix", "  ", &1);
        assert!(matches!(result, Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn duplicate_index_keys_are_ignored() {
        let envelope = RecordEnvelope::wrap("matrix", "m-1", &1)
            .unwrap()
            .with_index("document", "doc-a")
            .with_index("document", "doc-a");
        assert_eq!(envelope.indexes.len(), 1);
        assert!(envelope.has_index("document", "doc-a"));
        assert!(!envelope.has_index("document", "doc-b"));
    }

    #[test]
    fn ttl_controls_expiry() {
        let envelope = RecordEnvelope::wrap("coverage", "c-1", &1)
            .unwrap()
            .with_ttl(Duration::hours(1));
        assert!(!envelope.is_expired_at(envelope.stored_at));
        assert!(envelope.is_expired_at(envelope.stored_at + Duration::hours(2)));
    }

    #[test]
    fn records_without_ttl_never_expire() {
        let envelope = RecordEnvelope::wrap("coverage", "c-1", &1).unwrap();
        assert!(!envelope.is_expired_at(Utc::now() + Duration::days(10_000)));
    }
}
