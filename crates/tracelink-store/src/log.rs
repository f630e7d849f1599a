//! The record log: a JSONL file of [`RecordEnvelope`]s.
//!
//! The log is a snapshot, not an append-only journal. [`RecordLog::load`]
//! reads every envelope (last write wins per `(record_type, id)`), and
//! [`RecordLog::rewrite`] replaces the file atomically with the given set,
//! dropping anything already expired.

use crate::atomic::write_jsonl_atomic;
use crate::envelope::RecordEnvelope;
use crate::reader::JsonlReader;
use crate::warning::Warning;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tracing::debug;

/// Handle to a record log file.
#[derive(Debug, Clone)]
pub struct RecordLog {
    path: PathBuf,
}

impl RecordLog {
    /// Create a handle for the log at `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all live envelopes.
    ///
    /// A missing file is an empty log. Duplicate `(record_type, id)` pairs
    /// keep the later line and report the earlier one as skipped. Envelopes
    /// expired at `now` are dropped and reported as skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only for I/O failures; malformed lines become warnings.
    pub async fn load(&self, now: DateTime<Utc>) -> Result<(Vec<RecordEnvelope>, Vec<Warning>)> {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Record log does not exist yet");
                return Ok((Vec::new(), Vec::new()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut reader = JsonlReader::new(file);
        let mut warnings = Vec::new();
        let mut ordered: Vec<(usize, RecordEnvelope)> = Vec::new();
        let mut latest: HashMap<(String, String), usize> = HashMap::new();

        while let Some(line) = reader.next_line().await? {
            let line_number = reader.line_number();
            if line.trim().is_empty() {
                continue;
            }
            let envelope: RecordEnvelope = match serde_json::from_str(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warnings.push(Warning::MalformedJson {
                        line_number,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            if envelope.is_expired_at(now) {
                warnings.push(Warning::SkippedLine {
                    line_number,
                    reason: format!("{} {} expired", envelope.record_type, envelope.id),
                });
                continue;
            }

            let key = (envelope.record_type.clone(), envelope.id.clone());
            if let Some(previous) = latest.insert(key, ordered.len()) {
                let earlier_line = ordered[previous].0;
                warnings.push(Warning::SkippedLine {
                    line_number: earlier_line,
                    reason: format!(
                        "superseded by line {line_number} ({} {})",
                        envelope.record_type, envelope.id
                    ),
                });
            }
            ordered.push((line_number, envelope));
        }

        let keep: Vec<usize> = {
            let mut indices: Vec<usize> = latest.into_values().collect();
            indices.sort_unstable();
            indices
        };
        let mut slots: Vec<Option<RecordEnvelope>> =
            ordered.into_iter().map(|(_, envelope)| Some(envelope)).collect();
        let envelopes = keep
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect();

        Ok((envelopes, warnings))
    }

    /// Replace the log contents with `envelopes`, omitting any expired at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the atomic write fails; the previous file is kept.
    pub async fn rewrite<'a, I>(&self, envelopes: I, now: DateTime<Utc>) -> Result<usize>
    where
        I: IntoIterator<Item = &'a RecordEnvelope>,
    {
        let live: Vec<&RecordEnvelope> = envelopes
            .into_iter()
            .filter(|envelope| !envelope.is_expired_at(now))
            .collect();
        let count = live.len();
        write_jsonl_atomic(&self.path, live).await?;
        debug!(path = %self.path.display(), records = count, "Rewrote record log");
        Ok(count)
    }
}
