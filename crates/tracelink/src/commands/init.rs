//! Implementation of the `init` command.
//!
//! Creates the `.tracelink/` workspace directory with a configuration file,
//! an empty requirement source, and an empty record log.

use crate::classifier::command::CommandSpec;
use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Name of the workspace directory
pub const TRACELINK_DIR_NAME: &str = ".tracelink";

/// Name of the configuration file
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Name of the requirement source file
pub const REQUIREMENTS_FILE_NAME: &str = "requirements.jsonl";

/// Name of the record log
pub const RECORDS_FILE_NAME: &str = "records.jsonl";

/// Name of the gitignore file within .tracelink
pub const GITIGNORE_FILE_NAME: &str = ".gitignore";

/// Maximum directory depth to traverse when searching for the workspace root
pub const MAX_TRAVERSAL_DEPTH: usize = 256;

/// Workspace configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TracelinkConfig {
    /// Analysis tunables
    #[serde(flatten)]
    pub analysis: AnalysisConfig,

    /// External semantic classifier; heuristics only when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<CommandSpec>,
}

impl TracelinkConfig {
    /// Load and validate configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read and `Error::Config` if
    /// it is not valid YAML or holds invalid values.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config
            .analysis
            .validate()
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    /// Save configuration to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        fs::write(path, content).await?;
        Ok(())
    }
}

/// Result of the init command
#[derive(Debug)]
pub struct InitResult {
    /// Path to the created workspace directory
    pub tracelink_dir: PathBuf,
    /// Path to the created config file
    pub config_file: PathBuf,
    /// Path to the created requirement source
    pub requirements_file: PathBuf,
    /// Path to the created record log
    pub records_file: PathBuf,
    /// Path to the created gitignore file
    pub gitignore_file: PathBuf,
}

/// Initialize a new workspace in the given directory.
///
/// # Errors
///
/// Returns an error if:
/// - The `.tracelink/` directory already exists
/// - File system operations fail
pub async fn init(base_dir: &Path) -> Result<InitResult> {
    let tracelink_dir = base_dir.join(TRACELINK_DIR_NAME);

    if tracelink_dir.exists() {
        return Err(Error::Config(format!(
            "Tracelink is already initialized in this directory. Found existing '{TRACELINK_DIR_NAME}'"
        )));
    }

    fs::create_dir_all(&tracelink_dir).await?;

    let config_file = tracelink_dir.join(CONFIG_FILE_NAME);
    TracelinkConfig::default().save(&config_file).await?;

    let requirements_file = tracelink_dir.join(REQUIREMENTS_FILE_NAME);
    fs::write(&requirements_file, "").await?;

    let records_file = tracelink_dir.join(RECORDS_FILE_NAME);
    fs::write(&records_file, "").await?;

    // Analysis records are derived artifacts; the requirement source is not.
    let gitignore_file = tracelink_dir.join(GITIGNORE_FILE_NAME);
    let gitignore_content = format!(
        "# Derived analysis records; regenerate with `tracelink build`\n{RECORDS_FILE_NAME}\n*.tmp\n"
    );
    fs::write(&gitignore_file, gitignore_content).await?;

    Ok(InitResult {
        tracelink_dir,
        config_file,
        requirements_file,
        records_file,
        gitignore_file,
    })
}

/// Check if a directory has been initialized.
///
/// Returns `true` if the `.tracelink/` directory exists.
#[must_use]
pub fn is_initialized(base_dir: &Path) -> bool {
    base_dir.join(TRACELINK_DIR_NAME).exists()
}

/// Find the workspace root by searching up the directory tree.
///
/// Returns the directory containing `.tracelink/`, or `None` if none is
/// found before the filesystem root or [`MAX_TRAVERSAL_DEPTH`].
#[must_use]
pub fn find_tracelink_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    let mut depth = 0;

    loop {
        if current.join(TRACELINK_DIR_NAME).exists() {
            return Some(current);
        }

        depth += 1;
        if depth > MAX_TRAVERSAL_DEPTH || !current.pop() {
            return None;
        }
    }
}
