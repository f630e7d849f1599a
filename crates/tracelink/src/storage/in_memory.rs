//! In-memory repository.

use super::{RecordType, Repository};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracelink_store::RecordEnvelope;

/// Record table keyed by `(record_type, id)` with a write sequence for
/// stable newest-first ordering.
#[derive(Debug, Clone, Default)]
pub(super) struct RecordSet {
    records: HashMap<(String, String), (u64, RecordEnvelope)>,
    next_seq: u64,
}

impl RecordSet {
    pub(super) fn from_envelopes(envelopes: impl IntoIterator<Item = RecordEnvelope>) -> Self {
        let mut set = Self::default();
        for envelope in envelopes {
            set.insert(envelope);
        }
        set
    }

    pub(super) fn insert(&mut self, envelope: RecordEnvelope) {
        let key = (envelope.record_type.clone(), envelope.id.clone());
        self.records.insert(key, (self.next_seq, envelope));
        self.next_seq += 1;
    }

    pub(super) fn get(&self, record_type: RecordType, id: &str, now: DateTime<Utc>) -> Option<RecordEnvelope> {
        self.records
            .get(&(record_type.as_str().to_string(), id.to_string()))
            .map(|(_, envelope)| envelope)
            .filter(|envelope| !envelope.is_expired_at(now))
            .cloned()
    }

    pub(super) fn query(&self, index: &str, key: &str, now: DateTime<Utc>) -> Vec<RecordEnvelope> {
        let mut matches: Vec<&(u64, RecordEnvelope)> = self
            .records
            .values()
            .filter(|(_, envelope)| envelope.has_index(index, key) && !envelope.is_expired_at(now))
            .collect();
        matches.sort_by(|(seq_a, a), (seq_b, b)| {
            b.stored_at.cmp(&a.stored_at).then_with(|| seq_b.cmp(seq_a))
        });
        matches.into_iter().map(|(_, envelope)| envelope.clone()).collect()
    }

    pub(super) fn purge(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, (_, envelope)| !envelope.is_expired_at(now));
        before - self.records.len()
    }

    /// Envelopes in write order.
    pub(super) fn ordered(&self) -> Vec<&RecordEnvelope> {
        let mut entries: Vec<&(u64, RecordEnvelope)> = self.records.values().collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, envelope)| envelope).collect()
    }

    pub(super) fn len(&self) -> usize {
        self.records.len()
    }
}

/// Ephemeral repository; clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    inner: Arc<RwLock<RecordSet>>,
}

impl InMemoryRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, including expired ones not yet purged
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the repository holds no records
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn save(&self, record: RecordEnvelope) -> Result<()> {
        self.inner.write().await.insert(record);
        Ok(())
    }

    async fn save_all(&self, records: Vec<RecordEnvelope>) -> Result<()> {
        let mut inner = self.inner.write().await;
        for record in records {
            inner.insert(record);
        }
        Ok(())
    }

    async fn load(&self, record_type: RecordType, id: &str) -> Result<Option<RecordEnvelope>> {
        Ok(self.inner.read().await.get(record_type, id, Utc::now()))
    }

    async fn query(&self, index: &str, key: &str) -> Result<Vec<RecordEnvelope>> {
        Ok(self.inner.read().await.query(index, key, Utc::now()))
    }

    async fn purge_expired(&self) -> Result<usize> {
        Ok(self.inner.write().await.purge(Utc::now()))
    }
}
