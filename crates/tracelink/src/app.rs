//! Application context for CLI command execution.
//!
//! [`App`] locates the workspace, loads its configuration and requirement
//! source, opens the record log, and wires everything into a
//! [`TraceEngine`].
//!
//! # Example
//!
//! ```no_run
//! use tracelink::app::App;
//! use std::path::Path;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let app = App::from_directory(Path::new(".")).await?;
//!     let removed = app.engine().purge_expired().await?;
//!     println!("{removed} expired records removed");
//!     Ok(())
//! }
//! ```

use crate::classifier::command::CommandClassifier;
use crate::classifier::{SemanticClassifier, UnavailableClassifier};
use crate::commands::init::{
    CONFIG_FILE_NAME, RECORDS_FILE_NAME, REQUIREMENTS_FILE_NAME, TRACELINK_DIR_NAME,
    TracelinkConfig, find_tracelink_root,
};
use crate::engine::TraceEngine;
use crate::error::{Error, Result};
use crate::loader::load_source_jsonl;
use crate::storage::{StorageBackend, TracingEventSink, create_repository};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Application context for CLI operations.
#[derive(Debug)]
pub struct App {
    engine: TraceEngine,

    /// Path to the workspace directory (.tracelink)
    tracelink_dir: PathBuf,

    /// Number of requirement source lines that were skipped on load
    skipped_source_lines: usize,
}

impl App {
    /// Create an App instance from the given working directory.
    ///
    /// Searches up the directory tree for a `.tracelink/` directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No workspace is found in the directory tree
    /// - Configuration cannot be loaded
    /// - The requirement source or record log cannot be read
    pub async fn from_directory(working_dir: &Path) -> Result<Self> {
        let root_dir = find_tracelink_root(working_dir).ok_or_else(|| {
            Error::Config(format!(
                "Not a tracelink workspace (or any parent up to the filesystem root). Run 'tracelink init' first. Missing '{TRACELINK_DIR_NAME}'"
            ))
        })?;
        let tracelink_dir = root_dir.join(TRACELINK_DIR_NAME);

        let config = TracelinkConfig::load(&tracelink_dir.join(CONFIG_FILE_NAME)).await?;

        let (source, source_warnings) =
            load_source_jsonl(&tracelink_dir.join(REQUIREMENTS_FILE_NAME)).await?;
        debug!(
            requirements = source.len(),
            skipped = source_warnings.len(),
            "Loaded requirement source"
        );

        let repository =
            create_repository(StorageBackend::Jsonl(tracelink_dir.join(RECORDS_FILE_NAME)))
                .await?;

        let classifier: Arc<dyn SemanticClassifier> = match config.classifier {
            Some(spec) => Arc::new(CommandClassifier::new(spec)),
            None => {
                warn!("No classifier configured; relationships come from heuristics only");
                Arc::new(UnavailableClassifier)
            }
        };

        let engine = TraceEngine::new(
            Arc::new(source),
            classifier,
            Arc::from(repository),
            config.analysis,
        )?
        .with_event_sink(Arc::new(TracingEventSink));

        Ok(Self {
            engine,
            tracelink_dir,
            skipped_source_lines: source_warnings.len(),
        })
    }

    /// The wired engine
    #[must_use]
    pub fn engine(&self) -> &TraceEngine {
        &self.engine
    }

    /// Path to the workspace directory
    #[must_use]
    pub fn tracelink_dir(&self) -> &Path {
        &self.tracelink_dir
    }

    /// Requirement source lines skipped as malformed or invalid
    #[must_use]
    pub fn skipped_source_lines(&self) -> usize {
        self.skipped_source_lines
    }
}
