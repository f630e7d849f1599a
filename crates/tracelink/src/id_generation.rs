//! Hash-based identifiers for relationships, records and runs.
//!
//! Two flavors:
//!
//! - **Content ids** are deterministic: the same inputs always yield the
//!   same id. Manual relationships use them so re-submitting the same
//!   `(source, target, type)` replaces the earlier record.
//! - **Unique ids** mix in the current time and a process-wide counter, for
//!   artifacts that must never collide across runs (matrices, reports,
//!   correlation ids).
//!
//! Both hash with SHA256 and render the first 8 bytes in base36 as
//! `{prefix}-{hash}`.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

const BASE36_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the hash part of generated ids.
pub const HASH_LENGTH: usize = 10;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Deterministic id derived from `parts`.
///
/// Parts are joined with `|` before hashing, so `["a|b"]` and `["a", "b"]`
/// collide; callers pass ids that never contain the separator.
#[must_use]
pub fn content_id(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    let hash_bytes = hasher.finalize();
    format!("{prefix}-{}", encode_base36(&hash_bytes[..8], HASH_LENGTH))
}

/// Id that is unique within and across processes with high probability.
#[must_use]
pub fn unique_id(prefix: &str, seed: &str) -> String {
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    content_id(
        prefix,
        &[
            seed,
            &timestamp.to_string(),
            &sequence.to_string(),
            &std::process::id().to_string(),
        ],
    )
}

/// Encode up to 8 bytes as a fixed-length base36 string.
///
/// Bytes are folded into a `u64` with wrapping shifts; the output is
/// left-padded with `0` when the number has fewer digits than `length`.
fn encode_base36(bytes: &[u8], length: usize) -> String {
    let mut num: u64 = 0;
    for &byte in bytes {
        num = num.wrapping_shl(8).wrapping_add(u64::from(byte));
    }

    let mut result = Vec::with_capacity(length);
    while result.len() < length {
        let remainder = usize::try_from(num % 36).unwrap_or_default();
        result.push(char::from(BASE36_CHARS[remainder]));
        num /= 36;
    }
    result.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn base36_has_requested_length() {
        let result = encode_base36(&[0x12, 0x34, 0x56, 0x78], 10);
        assert_eq!(result.len(), 10);
        assert!(result.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(result.starts_with('0'));
    }

    #[test]
    fn content_ids_are_deterministic() {
        let a = content_id("rel", &["REQ-1", "REQ-2", "depends_on"]);
        let b = content_id("rel", &["REQ-1", "REQ-2", "depends_on"]);
        let c = content_id("rel", &["REQ-2", "REQ-1", "depends_on"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("rel-"));
        assert_eq!(a.len(), "rel-".len() + HASH_LENGTH);
    }

    #[test]
    fn unique_ids_do_not_repeat() {
        let ids: HashSet<String> = (0..500).map(|_| unique_id("mtx", "doc-a")).collect();
        assert_eq!(ids.len(), 500);
    }
}
