//! JSONL reading with line tracking and resilient decoding.

use crate::warning::Warning;
use crate::Result;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Async reader for JSONL (JSON Lines) data.
///
/// Tracks 1-based line numbers so decoding problems can be reported against
/// the offending line.
pub struct JsonlReader<R> {
    reader: BufReader<R>,
    line_number: usize,
}

impl<R: AsyncRead + Unpin> JsonlReader<R> {
    /// Creates a new `JsonlReader` wrapping the given async reader.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_number: 0,
        }
    }

    /// Returns the line number of the last line read (0 before any reads).
    #[must_use]
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Reads the next line, without its trailing newline.
    ///
    /// Returns `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails or the line is not UTF-8.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Decodes every remaining line into `T`, skipping lines that fail.
    ///
    /// Blank lines are ignored silently. Lines that are not valid JSON or do
    /// not match `T` are skipped and reported as [`Warning::MalformedJson`].
    ///
    /// # Errors
    ///
    /// Only I/O failures are returned as errors.
    pub async fn read_resilient<T: DeserializeOwned>(
        &mut self,
    ) -> Result<(Vec<T>, Vec<Warning>)> {
        let mut values = Vec::new();
        let mut warnings = Vec::new();

        while let Some(line) = self.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(&line) {
                Ok(value) => values.push(value),
                Err(e) => {
                    tracing::debug!(line = self.line_number, error = %e, "Skipping malformed line");
                    warnings.push(Warning::MalformedJson {
                        line_number: self.line_number,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok((values, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Cursor;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Row {
        id: u32,
    }

    #[tokio::test]
    async fn new_reader_starts_at_line_zero() {
        let reader = JsonlReader::new(Cursor::new(b""));
        assert_eq!(reader.line_number(), 0);
    }

    #[tokio::test]
    async fn next_line_strips_line_endings() {
        let mut reader = JsonlReader::new(Cursor::new(b"a\r\nb\n".to_vec()));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("a"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("b"));
        assert_eq!(reader.next_line().await.unwrap(), None);
        assert_eq!(reader.line_number(), 2);
    }

    #[tokio::test]
    async fn read_resilient_skips_bad_lines() {
        let data = b"{\"id\":1}\nnot json\n\n{\"id\":\"wrong\"}\n{\"id\":4}".to_vec();
        let mut reader = JsonlReader::new(Cursor::new(data));

        let (rows, warnings): (Vec<Row>, _) = reader.read_resilient().await.unwrap();

        assert_eq!(rows, vec![Row { id: 1 }, Row { id: 4 }]);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].line_number(), 2);
        assert_eq!(warnings[1].line_number(), 4);
    }
}
