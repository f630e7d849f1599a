//! Repository persisted to a JSONL record log.
//!
//! The full record set lives in memory. Every save builds the next record
//! set, rewrites the log atomically, and only then publishes the new set,
//! so a failed write leaves both the file and the visible records unchanged.

use super::in_memory::RecordSet;
use super::{RecordType, Repository};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracelink_store::{RecordEnvelope, RecordLog, Warning};
use tracing::{info, warn};

/// File-backed repository.
#[derive(Debug)]
pub struct JsonlRepository {
    log: RecordLog,
    records: Mutex<RecordSet>,
    warnings: Vec<Warning>,
}

impl JsonlRepository {
    /// Open the record log at `path`, creating it lazily on first save.
    ///
    /// Malformed, superseded, and expired lines are skipped and kept as
    /// warnings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Persistence` if the file exists but cannot be read.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let log = RecordLog::new(path);
        let (envelopes, warnings) = log.load(Utc::now()).await?;
        for warning in &warnings {
            warn!(path = %log.path().display(), %warning, "Record log warning");
        }
        info!(
            path = %log.path().display(),
            records = envelopes.len(),
            "Opened record log"
        );
        Ok(Self {
            log,
            records: Mutex::new(RecordSet::from_envelopes(envelopes)),
            warnings,
        })
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        self.log.path()
    }

    /// Warnings collected while opening the log
    #[must_use]
    pub fn load_warnings(&self) -> &[Warning] {
        &self.warnings
    }

    async fn commit(&self, records: Vec<RecordEnvelope>) -> Result<()> {
        let mut current = self.records.lock().await;
        let mut next = current.clone();
        for record in records {
            next.insert(record);
        }
        self.log.rewrite(next.ordered(), Utc::now()).await?;
        *current = next;
        Ok(())
    }
}

#[async_trait]
impl Repository for JsonlRepository {
    async fn save(&self, record: RecordEnvelope) -> Result<()> {
        self.commit(vec![record]).await
    }

    async fn save_all(&self, records: Vec<RecordEnvelope>) -> Result<()> {
        self.commit(records).await
    }

    async fn load(&self, record_type: RecordType, id: &str) -> Result<Option<RecordEnvelope>> {
        Ok(self.records.lock().await.get(record_type, id, Utc::now()))
    }

    async fn query(&self, index: &str, key: &str) -> Result<Vec<RecordEnvelope>> {
        Ok(self.records.lock().await.query(index, key, Utc::now()))
    }

    async fn purge_expired(&self) -> Result<usize> {
        let mut current = self.records.lock().await;
        let now = Utc::now();
        let mut next = current.clone();
        let removed = next.purge(now);
        self.log.rewrite(next.ordered(), now).await?;
        *current = next;
        Ok(removed)
    }
}
