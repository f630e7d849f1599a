//! CLI argument parsing and command dispatch.
//!
//! # Commands
//!
//! - `init`: Create the `.tracelink/` workspace
//! - `build`: Build a traceability matrix for one or more documents
//! - `coverage`: Show the coverage report of a stored matrix
//! - `impact`: Analyze the impact of changing a requirement
//! - `link`: Create or replace a manual relationship
//! - `links`: List manual relationships
//! - `purge`: Remove expired analysis records
//!
//! # Global Flags
//!
//! - `--json`: Output in JSON format (applies to all commands)
//!
//! # Example
//!
//! ```bash
//! tracelink build --doc srs-auth --doc srs-billing
//! tracelink impact REQ-12 --change "Session timeout drops to 5 minutes"
//! tracelink link TC-4 REQ-12 --type tests
//! ```

mod args;
mod execute;
mod types;
mod validators;

use anyhow::Result;
use clap::{Parser, Subcommand};

pub use args::{BuildArgs, CoverageArgs, ImpactArgs, InitArgs, LinkArgs, LinksArgs, PurgeArgs};
pub use types::RelationshipTypeArg;
pub use validators::{
    validate_change, validate_confidence, validate_id, validate_max_depth, validate_max_pairs,
};

/// Tracelink - requirement traceability and change impact analysis
///
/// Discovers relationships between requirements, reports coverage gaps, and
/// estimates how far a change to one requirement ripples. Requirements are
/// read from `.tracelink/requirements.jsonl`.
#[derive(Parser, Debug)]
#[command(name = "tracelink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format for programmatic use
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Initialize a tracelink workspace
    ///
    /// Creates `.tracelink/` with a default configuration, an empty
    /// requirement source, and an empty record log.
    Init(InitArgs),

    /// Build a traceability matrix
    ///
    /// Loads the requirements of the given documents, classifies requirement
    /// pairs, and stores the matrix with its coverage report.
    Build(BuildArgs),

    /// Show coverage of a stored matrix
    Coverage(CoverageArgs),

    /// Analyze the impact of a requirement change
    ///
    /// Walks the newest matrix containing the requirement (or `--matrix`)
    /// and scores every requirement reached within the depth bound.
    Impact(ImpactArgs),

    /// Create or replace a manual relationship
    ///
    /// Manual relationships are merged into every matrix built afterwards.
    Link(LinkArgs),

    /// List manual relationships
    Links(LinksArgs),

    /// Remove expired analysis records
    Purge(PurgeArgs),
}

impl Cli {
    /// Parse CLI arguments from command line
    #[must_use]
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse CLI arguments from an iterator (for testing)
    ///
    /// # Errors
    ///
    /// Returns the clap error for invalid arguments.
    pub fn try_parse_from<I, T>(iter: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Execute the CLI command
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace cannot be opened or the command fails.
    pub async fn execute(&self) -> Result<()> {
        use crate::app::App;
        use crate::output::OutputMode;

        let output_mode = if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };

        let Some(command) = &self.command else {
            println!("Tracelink requirement traceability");
            println!("Use --help for more information");
            return Ok(());
        };

        if let Commands::Init(args) = command {
            return execute::execute_init(args, output_mode).await;
        }

        let app = App::from_directory(&std::env::current_dir()?).await?;
        match command {
            Commands::Init(_) => Ok(()),
            Commands::Build(args) => execute::execute_build(&app, args, output_mode).await,
            Commands::Coverage(args) => execute::execute_coverage(&app, args, output_mode).await,
            Commands::Impact(args) => execute::execute_impact(&app, args, output_mode).await,
            Commands::Link(args) => execute::execute_link(&app, args, output_mode).await,
            Commands::Links(args) => execute::execute_links(&app, args, output_mode).await,
            Commands::Purge(args) => execute::execute_purge(&app, args, output_mode).await,
        }
    }
}
