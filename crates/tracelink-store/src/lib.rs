//! Persistence primitives for tracelink analysis artifacts.
//!
//! Artifacts are stored as [`RecordEnvelope`]s: a typed JSON body plus the
//! secondary index keys it can be queried by and an optional expiry. The
//! envelopes live in a JSON Lines record log that is rewritten atomically
//! (temp file then rename) so a crash never leaves a half-written log.
//!
//! Loading is resilient: malformed lines are skipped and reported as
//! [`Warning`]s instead of failing the whole load.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod atomic;
pub mod envelope;
pub mod error;
pub mod log;
pub mod reader;
pub mod warning;
pub mod writer;

pub use atomic::write_jsonl_atomic;
pub use envelope::{IndexKey, RecordEnvelope};
pub use error::{Error, Result};
pub use log::RecordLog;
pub use reader::JsonlReader;
pub use warning::Warning;
pub use writer::JsonlWriter;
