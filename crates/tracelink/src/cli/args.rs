//! CLI argument structs for all commands.

use clap::Parser;

use super::types::RelationshipTypeArg;
use super::validators::{
    validate_change, validate_confidence, validate_id, validate_max_depth, validate_max_pairs,
};

/// Arguments for the `init` command
#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// Suppress output messages
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the `build` command
#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    /// Documents to analyze (repeatable or comma-separated)
    #[arg(short, long = "doc", required = true, value_delimiter = ',', value_parser = validate_id)]
    pub docs: Vec<String>,

    /// Cap on classified requirement pairs
    #[arg(long, value_parser = validate_max_pairs)]
    pub max_pairs: Option<usize>,

    /// Minimum classifier confidence for a relationship to be accepted
    #[arg(long, value_parser = validate_confidence)]
    pub min_confidence: Option<f64>,

    /// Ignore manually curated relationships
    #[arg(long)]
    pub no_manual: bool,
}

/// Arguments for the `coverage` command
#[derive(Parser, Debug, Clone)]
pub struct CoverageArgs {
    /// Matrix id printed by `build`
    #[arg(value_parser = validate_id)]
    pub matrix_id: String,
}

/// Arguments for the `impact` command
#[derive(Parser, Debug, Clone)]
pub struct ImpactArgs {
    /// Requirement that is changing
    #[arg(value_parser = validate_id)]
    pub requirement_id: String,

    /// What is changing
    #[arg(short, long, value_parser = validate_change)]
    pub change: String,

    /// Matrix to analyze (default: newest matrix containing the requirement)
    #[arg(short, long, value_parser = validate_id)]
    pub matrix: Option<String>,

    /// Maximum propagation depth
    #[arg(long, value_parser = validate_max_depth)]
    pub max_depth: Option<usize>,

    /// Minimum impact score to report
    #[arg(long, value_parser = validate_confidence)]
    pub threshold: Option<f64>,
}

/// Arguments for the `link` command
#[derive(Parser, Debug, Clone)]
pub struct LinkArgs {
    /// Requirement the relationship starts at
    #[arg(value_parser = validate_id)]
    pub source: String,

    /// Requirement the relationship points to
    #[arg(value_parser = validate_id)]
    pub target: String,

    /// Relationship type
    #[arg(short = 't', long = "type", value_enum)]
    pub relationship_type: RelationshipTypeArg,

    /// Curator confidence
    #[arg(long, value_parser = validate_confidence, default_value = "1.0")]
    pub confidence: f64,

    /// Mark the relationship as holding in both directions
    ///
    /// Defaults to on for `supports` and `conflicts_with`.
    #[arg(long)]
    pub bidirectional: bool,

    /// Why the relationship exists
    #[arg(short, long)]
    pub reason: Option<String>,
}

/// Arguments for the `links` command
#[derive(Parser, Debug, Clone)]
pub struct LinksArgs {}

/// Arguments for the `purge` command
#[derive(Parser, Debug, Clone)]
pub struct PurgeArgs {}
