//! Color and styling helpers for CLI output.
//!
//! Semantic Color Theme:
//!   - Success/Low risk:   green
//!   - Warning/Medium:     yellow
//!   - Error/High/Gaps:    red
//!   - Info/Reference:     cyan   (requirement, matrix, and relationship ids)
//!   - Muted:              dimmed (field labels, provenance)
//!   - Emphasis:           bold   (section headers)

use crate::coverage::Severity;
use crate::impact::RiskLevel;
use colored::Colorize;

use super::OutputConfig;

/// Apply semantic "success" color (green) to text.
pub fn success(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.green().to_string()
}

/// Apply semantic "error" color (red) to text.
pub fn error(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.red().to_string()
}

/// Apply semantic "warning" color (yellow) to text.
pub fn warning(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.yellow().to_string()
}

/// Apply semantic "info" color (cyan) to text.
pub fn info(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.cyan().to_string()
}

pub(crate) fn bold(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.bold().to_string()
}

pub(crate) fn dimmed(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.dimmed().to_string()
}

/// Color a risk level by tier.
pub(crate) fn colorize_risk(risk: RiskLevel, config: &OutputConfig) -> String {
    let text = risk.to_string();
    match risk {
        RiskLevel::Low => success(&text, config),
        RiskLevel::Medium => warning(&text, config),
        RiskLevel::High => error(&text, config),
    }
}

/// Color a gap severity by tier.
pub(crate) fn colorize_severity(severity: Severity, config: &OutputConfig) -> String {
    let text = severity.to_string();
    match severity {
        Severity::Low => dimmed(&text, config),
        Severity::Medium => warning(&text, config),
        Severity::High => error(&text, config),
    }
}

/// Color a coverage percentage against the configured threshold.
pub(crate) fn colorize_percentage(percentage: f64, threshold: f64, config: &OutputConfig) -> String {
    let text = format!("{percentage:.1}%");
    if percentage >= threshold {
        success(&text, config)
    } else if percentage >= threshold / 2.0 {
        warning(&text, config)
    } else {
        error(&text, config)
    }
}
