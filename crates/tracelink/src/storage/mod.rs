//! Persistence and notification collaborators.
//!
//! Analysis artifacts are persisted through the [`Repository`] trait as
//! [`RecordEnvelope`]s: a record type, an id, a JSON body, secondary index
//! keys, and a retention window. Expired records are invisible to `load`
//! and `query` and are physically removed by `purge_expired`.
//!
//! # Backends
//!
//! - [`InMemoryRepository`]: maps behind a tokio `RwLock`; ephemeral
//! - [`JsonlRepository`]: the same index, persisted to a JSONL record log
//!   rewritten atomically on every save
//!
//! Use [`create_repository`] to pick one from a [`StorageBackend`].
//!
//! # Notifications
//!
//! Alerts are published through an [`EventSink`]. The engine only publishes
//! after the run's records were persisted successfully.

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::PathBuf;
use tracelink_store::RecordEnvelope;

pub mod events;
pub mod in_memory;
pub mod jsonl;

pub use events::{EventSink, NoopEventSink, PublishedEvent, RecordingEventSink, TracingEventSink};
pub use in_memory::InMemoryRepository;
pub use jsonl::JsonlRepository;

/// Index every record is reachable through, keyed by its record type
pub const INDEX_TYPE: &str = "type";

/// Index of records by requirement id
pub const INDEX_REQUIREMENT: &str = "requirement";

/// Index of records by matrix id
pub const INDEX_MATRIX: &str = "matrix";

/// Index of records by source document id
pub const INDEX_DOCUMENT: &str = "document";

/// Kinds of persisted records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// [`crate::matrix::TraceabilityMatrix`]
    Matrix,

    /// [`crate::coverage::CoverageRecord`]
    Coverage,

    /// [`crate::impact::ImpactRecord`]
    Impact,

    /// [`crate::report::AnalysisReport`]
    Report,

    /// Manually curated [`crate::domain::Relationship`]
    ManualRelationship,
}

impl RecordType {
    /// Type tag stored in the envelope
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Matrix => "matrix",
            RecordType::Coverage => "coverage",
            RecordType::Impact => "impact",
            RecordType::Report => "report",
            RecordType::ManualRelationship => "manual_relationship",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record store with secondary indexes and retention.
///
/// Implementations must be `Send + Sync`; the engine shares one repository
/// across concurrent runs.
///
/// # Ordering
///
/// `query` returns matches newest first (by store time, then by write order).
#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert or replace a single record.
    ///
    /// # Errors
    ///
    /// Returns `Error::Persistence` if the record cannot be stored.
    async fn save(&self, record: RecordEnvelope) -> Result<()>;

    /// Insert or replace a batch of records atomically: either every record
    /// becomes visible or none does.
    ///
    /// # Errors
    ///
    /// Returns `Error::Persistence` if the batch cannot be stored.
    async fn save_all(&self, records: Vec<RecordEnvelope>) -> Result<()>;

    /// Load a live record by type and id.
    async fn load(&self, record_type: RecordType, id: &str) -> Result<Option<RecordEnvelope>>;

    /// Live records reachable through `index`/`key`, newest first.
    async fn query(&self, index: &str, key: &str) -> Result<Vec<RecordEnvelope>>;

    /// Physically remove expired records, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}

/// Storage backend selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Ephemeral in-memory store
    InMemory,

    /// JSONL record log at the given path
    Jsonl(PathBuf),
}

/// Open a repository for the given backend.
///
/// # Errors
///
/// Returns `Error::Persistence` if an existing record log cannot be read.
pub async fn create_repository(backend: StorageBackend) -> Result<Box<dyn Repository>> {
    match backend {
        StorageBackend::InMemory => Ok(Box::new(InMemoryRepository::new())),
        StorageBackend::Jsonl(path) => Ok(Box::new(JsonlRepository::open(path).await?)),
    }
}

/// Wrap a domain record into an envelope indexed by its type.
///
/// # Errors
///
/// Returns `Error::Persistence` if the id is empty or the body fails to
/// serialize.
pub fn to_envelope<T: Serialize>(
    record_type: RecordType,
    id: &str,
    body: &T,
    ttl: Option<chrono::Duration>,
) -> Result<RecordEnvelope> {
    let envelope = RecordEnvelope::wrap(record_type.as_str(), id, body)?
        .with_index(INDEX_TYPE, record_type.as_str());
    Ok(match ttl {
        Some(ttl) => envelope.with_ttl(ttl),
        None => envelope,
    })
}

/// Serialize and save a single domain record.
///
/// # Errors
///
/// Returns `Error::Persistence` if serialization or the save fails.
pub async fn store_record<T: Serialize + Sync>(
    repository: &dyn Repository,
    record_type: RecordType,
    id: &str,
    body: &T,
    ttl: Option<chrono::Duration>,
) -> Result<()> {
    repository
        .save(to_envelope(record_type, id, body, ttl)?)
        .await
}

/// Load and deserialize a single domain record.
///
/// # Errors
///
/// Returns `Error::Persistence` if the stored body does not decode as `T`.
pub async fn fetch_record<T: DeserializeOwned>(
    repository: &dyn Repository,
    record_type: RecordType,
    id: &str,
) -> Result<Option<T>> {
    match repository.load(record_type, id).await? {
        Some(envelope) => Ok(Some(envelope.decode()?)),
        None => Ok(None),
    }
}

/// Live records of one type reachable through `index`/`key`, decoded,
/// newest first.
///
/// # Errors
///
/// Returns `Error::Persistence` if a stored body does not decode as `T`.
pub async fn query_records<T: DeserializeOwned>(
    repository: &dyn Repository,
    record_type: RecordType,
    index: &str,
    key: &str,
) -> Result<Vec<T>> {
    repository
        .query(index, key)
        .await?
        .iter()
        .filter(|envelope| envelope.record_type == record_type.as_str())
        .map(|envelope| envelope.decode().map_err(Into::into))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    #[tokio::test]
    async fn store_then_fetch_round_trips() {
        let repository = InMemoryRepository::new();
        let note = Note {
            text: "hello".to_string(),
        };

        store_record(&repository, RecordType::Report, "r-1", &note, None)
            .await
            .unwrap();
        let fetched: Option<Note> = fetch_record(&repository, RecordType::Report, "r-1")
            .await
            .unwrap();

        assert_eq!(fetched, Some(note));
        let missing: Option<Note> = fetch_record(&repository, RecordType::Matrix, "r-1")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn every_record_is_indexed_by_type() {
        let repository = InMemoryRepository::new();
        for id in ["a", "b"] {
            store_record(
                &repository,
                RecordType::ManualRelationship,
                id,
                &Note { text: id.to_string() },
                None,
            )
            .await
            .unwrap();
        }

        let notes: Vec<Note> = query_records(
            &repository,
            RecordType::ManualRelationship,
            INDEX_TYPE,
            RecordType::ManualRelationship.as_str(),
        )
        .await
        .unwrap();

        assert_eq!(notes.len(), 2);
    }

    #[tokio::test]
    async fn decode_mismatch_is_persistence_error() {
        let repository = InMemoryRepository::new();
        store_record(&repository, RecordType::Report, "r-1", &42, None)
            .await
            .unwrap();

        let err = fetch_record::<Note>(&repository, RecordType::Report, "r-1")
            .await
            .unwrap_err();

        assert_eq!(err.code(), "PERSISTENCE_ERROR");
    }
}
