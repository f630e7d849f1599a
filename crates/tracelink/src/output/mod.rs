//! Output formatting for CLI commands.
//!
//! Every command prints either human-readable text or JSON. Text output is
//! colored through [`color`] and wrapped to the terminal width.

pub mod color;

use crate::coverage::{CoverageRecord, CoverageReport};
use crate::domain::Relationship;
use crate::engine::{ImpactRun, MatrixRun};
use crate::impact::ImpactedRequirement;
use crate::report::Alert;
use serde::Serialize;
use std::env;
use std::io::{self, Write};

pub use color::{error, info, success, warning};

use color::{bold, colorize_percentage, colorize_risk, colorize_severity, dimmed};

// ============================================================================
// Output Configuration
// ============================================================================

const DEFAULT_TERMINAL_WIDTH: usize = 80;
const DEFAULT_MAX_CONTENT_WIDTH: usize = 100;

/// Configuration for text output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Maximum content width for text wrapping.
    pub max_width: usize,
    /// Whether to use colors in output.
    pub use_colors: bool,
}

impl OutputConfig {
    /// Create a new `OutputConfig` with explicit values.
    #[must_use]
    pub fn new(max_width: usize, use_colors: bool) -> Self {
        Self {
            max_width,
            use_colors,
        }
    }

    /// Create an `OutputConfig` from the process environment.
    ///
    /// Reads:
    /// - `TRACELINK_MAX_WIDTH`: Maximum content width (default: 100)
    /// - `NO_COLOR`: Standard env var to disable colors (any value disables colors)
    /// - `TRACELINK_COLOR`: Set to "0" or "false" to disable colors
    ///
    /// The width is further capped by the detected terminal width.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::from_lookup(|key| env::var(key).ok());
        config.max_width = config.max_width.min(terminal_width());
        config
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let max_width = match lookup("TRACELINK_MAX_WIDTH") {
            Some(s) if !s.is_empty() => match s.parse() {
                Ok(width) if width > 0 => width,
                _ => {
                    tracing::warn!(
                        env_var = "TRACELINK_MAX_WIDTH",
                        value = %s,
                        default = DEFAULT_MAX_CONTENT_WIDTH,
                        "Invalid value, using default"
                    );
                    DEFAULT_MAX_CONTENT_WIDTH
                }
            },
            _ => DEFAULT_MAX_CONTENT_WIDTH,
        };

        // Respect NO_COLOR (https://no-color.org/)
        let use_colors = lookup("NO_COLOR").is_none()
            && lookup("TRACELINK_COLOR")
                .is_none_or(|v| v != "0" && !v.eq_ignore_ascii_case("false"));

        Self {
            max_width,
            use_colors,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTENT_WIDTH, true)
    }
}

fn terminal_width() -> usize {
    terminal_size::terminal_size().map_or(DEFAULT_TERMINAL_WIDTH, |(w, _)| usize::from(w.0))
}

/// Output format mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text format
    Text,
    /// JSON format for programmatic use
    Json,
}

// ============================================================================
// Public Dispatch Functions
// ============================================================================

/// Print a matrix build result; coverage is colored against `threshold`.
///
/// # Errors
///
/// Returns an error if writing to stdout fails.
pub fn print_matrix_run(run: &MatrixRun, threshold: f64, mode: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match mode {
        OutputMode::Text => {
            write_matrix_run_text(&mut handle, run, threshold, &OutputConfig::from_env())
        }
        OutputMode::Json => write_json(&mut handle, &run.report),
    }
}

/// Print a stored coverage report; percentages are colored against `threshold`.
///
/// # Errors
///
/// Returns an error if writing to stdout fails.
pub fn print_coverage(record: &CoverageRecord, threshold: f64, mode: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match mode {
        OutputMode::Text => {
            let config = OutputConfig::from_env();
            writeln!(
                handle,
                "{} {}",
                bold("Matrix", &config),
                info(record.matrix_id.as_str(), &config)
            )?;
            write_coverage_text(&mut handle, &record.report, threshold, &config)
        }
        OutputMode::Json => write_json(&mut handle, record),
    }
}

/// Print an impact analysis result
///
/// # Errors
///
/// Returns an error if writing to stdout fails.
pub fn print_impact_run(run: &ImpactRun, mode: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match mode {
        OutputMode::Text => write_impact_run_text(&mut handle, run, &OutputConfig::from_env()),
        OutputMode::Json => write_json(&mut handle, &run.report),
    }
}

/// Print manual relationships
///
/// # Errors
///
/// Returns an error if writing to stdout fails.
pub fn print_relationships(relationships: &[Relationship], mode: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match mode {
        OutputMode::Text => {
            let config = OutputConfig::from_env();
            if relationships.is_empty() {
                writeln!(handle, "No manual relationships.")?;
            }
            for relationship in relationships {
                write_relationship_text(&mut handle, relationship, &config)?;
            }
            Ok(())
        }
        OutputMode::Json => write_json(&mut handle, &relationships),
    }
}

/// Print a simple message
///
/// # Errors
///
/// Returns an error if writing to stdout fails.
pub fn print_message(msg: &str) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{msg}")
}

/// Print a JSON-formatted result for any serializable value
///
/// # Errors
///
/// Returns an error if serialization or writing to stdout fails.
pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_json(&mut handle, value)
}

fn write_json<W: Write, T: Serialize + ?Sized>(w: &mut W, value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(w, "{json}")
}

// ============================================================================
// Text Formatting
// ============================================================================

fn write_matrix_run_text<W: Write>(
    w: &mut W,
    run: &MatrixRun,
    threshold: f64,
    config: &OutputConfig,
) -> io::Result<()> {
    let matrix = &run.matrix;
    let stats = &matrix.stats;
    writeln!(
        w,
        "{} {}",
        bold("Traceability matrix", config),
        info(matrix.id.as_str(), config)
    )?;
    writeln!(
        w,
        "  {} {}",
        dimmed("Documents:    ", config),
        matrix
            .document_ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    )?;
    writeln!(w, "  {} {}", dimmed("Requirements: ", config), matrix.requirements.len())?;
    writeln!(w, "  {} {}", dimmed("Relationships:", config), matrix.relationships.len())?;
    writeln!(
        w,
        "  {} {} of {} evaluated ({} classifier, {} heuristic, {} fallbacks)",
        dimmed("Pairs:        ", config),
        stats.pairs_evaluated,
        stats.pairs_available,
        stats.ai_accepted,
        stats.heuristic_matches,
        stats.fallbacks
    )?;
    writeln!(w)?;
    write_coverage_text(w, &run.report.coverage, threshold, config)?;
    write_alerts_text(w, &run.report.alerts, config)
}

fn write_coverage_text<W: Write>(
    w: &mut W,
    report: &CoverageReport,
    threshold: f64,
    config: &OutputConfig,
) -> io::Result<()> {
    writeln!(
        w,
        "{} {} ({} of {} requirements tracked)",
        bold("Coverage:", config),
        colorize_percentage(report.coverage_percentage, threshold, config),
        report.tracked_count,
        report.total_requirements
    )?;

    if !report.by_type.is_empty() {
        writeln!(w, "  {}", dimmed("By type:", config))?;
        for (requirement_type, bucket) in &report.by_type {
            writeln!(
                w,
                "    {:<16} {:>3}/{:<3} {}",
                requirement_type.to_string(),
                bucket.tracked,
                bucket.total,
                colorize_percentage(bucket.percentage, threshold, config)
            )?;
        }
    }
    if !report.by_priority.is_empty() {
        writeln!(w, "  {}", dimmed("By priority:", config))?;
        for (priority, bucket) in &report.by_priority {
            writeln!(
                w,
                "    {:<16} {:>3}/{:<3} {}",
                priority.to_string(),
                bucket.tracked,
                bucket.total,
                colorize_percentage(bucket.percentage, threshold, config)
            )?;
        }
    }

    if !report.orphaned_requirements.is_empty() {
        let orphans = report
            .orphaned_requirements
            .iter()
            .map(|id| info(id.as_str(), config))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(w, "  {} {orphans}", dimmed("Orphaned:", config))?;
    }

    if !report.gaps.is_empty() {
        writeln!(w)?;
        writeln!(w, "{}", bold("Gaps:", config))?;
        for gap in &report.gaps {
            let prefix = format!("[{}] ", gap.severity);
            let mut lines = wrap_text(&gap.message, config.max_width.saturating_sub(4 + prefix.len()));
            let first = if lines.is_empty() { String::new() } else { lines.remove(0) };
            writeln!(w, "  [{}] {first}", colorize_severity(gap.severity, config))?;
            for line in lines {
                writeln!(w, "  {:width$}{line}", "", width = prefix.len())?;
            }
        }
    }

    write_list_section(w, "Recommendations", &report.recommendations, config)
}

fn write_impact_run_text<W: Write>(w: &mut W, run: &ImpactRun, config: &OutputConfig) -> io::Result<()> {
    let analysis = &run.analysis;
    writeln!(
        w,
        "{} {} {}",
        bold("Impact of changing", config),
        info(analysis.requirement_id.as_str(), config),
        dimmed(&format!("(matrix {})", run.matrix_id), config)
    )?;
    for line in wrap_text(&analysis.change_description, config.max_width.saturating_sub(2)) {
        writeln!(w, "  {line}")?;
    }
    writeln!(w)?;
    writeln!(
        w,
        "  {} {}",
        dimmed("Overall risk:     ", config),
        colorize_risk(analysis.overall_risk, config)
    )?;
    writeln!(
        w,
        "  {} {}",
        dimmed("Affected:         ", config),
        analysis.total_affected_requirements
    )?;
    writeln!(
        w,
        "  {} {}",
        dimmed("Aggregate effort: ", config),
        colorize_risk(analysis.aggregate_effort, config)
    )?;

    write_impacts(w, "Direct impacts", &analysis.direct_impacts, config)?;
    write_impacts(w, "Cascading impacts", &analysis.cascading_impacts, config)?;
    write_list_section(w, "Mitigation", &analysis.mitigation_strategies, config)?;
    write_alerts_text(w, &run.report.alerts, config)?;
    writeln!(w)?;
    writeln!(w, "{} {}", dimmed("Stored as", config), run.impact_id)
}

fn write_impacts<W: Write>(
    w: &mut W,
    title: &str,
    impacts: &[ImpactedRequirement],
    config: &OutputConfig,
) -> io::Result<()> {
    if impacts.is_empty() {
        return Ok(());
    }
    writeln!(w)?;
    writeln!(w, "{}", bold(&format!("{title}:"), config))?;
    for impact in impacts {
        writeln!(
            w,
            "  {} depth {} via {} score {:.2} risk {} effort {}",
            info(impact.requirement_id.as_str(), config),
            impact.depth,
            impact.relationship_path_type,
            impact.score,
            colorize_risk(impact.risk_level, config),
            impact.estimated_effort
        )?;
    }
    Ok(())
}

fn write_relationship_text<W: Write>(
    w: &mut W,
    relationship: &Relationship,
    config: &OutputConfig,
) -> io::Result<()> {
    let arrow = if relationship.bidirectional { "<->" } else { "->" };
    writeln!(
        w,
        "{} {} {arrow} {} {} {}",
        dimmed(relationship.id.as_str(), config),
        info(relationship.source_requirement_id.as_str(), config),
        info(relationship.target_requirement_id.as_str(), config),
        relationship.relationship_type,
        dimmed(
            &format!("({:.2}, {})", relationship.confidence, relationship.provenance),
            config
        )
    )?;
    if let Some(reasoning) = &relationship.reasoning {
        for line in wrap_text(reasoning, config.max_width.saturating_sub(2)) {
            writeln!(w, "  {line}")?;
        }
    }
    Ok(())
}

fn write_alerts_text<W: Write>(w: &mut W, alerts: &[Alert], config: &OutputConfig) -> io::Result<()> {
    if alerts.is_empty() {
        return Ok(());
    }
    writeln!(w)?;
    for alert in alerts {
        writeln!(
            w,
            "{} {}",
            warning(&format!("[{}]", alert.kind), config),
            alert.message
        )?;
    }
    Ok(())
}

fn write_list_section<W: Write>(
    w: &mut W,
    title: &str,
    items: &[String],
    config: &OutputConfig,
) -> io::Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(w)?;
    writeln!(w, "{}", bold(&format!("{title}:"), config))?;
    for item in items {
        let mut lines = wrap_text(item, config.max_width.saturating_sub(4)).into_iter();
        if let Some(first) = lines.next() {
            writeln!(w, "  - {first}")?;
        }
        for line in lines {
            writeln!(w, "    {line}")?;
        }
    }
    Ok(())
}

/// Wrap text to fit within a given width, preserving existing line breaks.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let max_width = max_width.max(1);
    text.lines()
        .flat_map(|line| {
            if line.trim().is_empty() {
                vec![String::new()]
            } else {
                textwrap::wrap(line, max_width)
                    .into_iter()
                    .map(std::borrow::Cow::into_owned)
                    .collect()
            }
        })
        .collect()
}
