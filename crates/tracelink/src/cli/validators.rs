//! CLI input validation functions.
//!
//! These validators are used by clap's `value_parser` attribute to validate
//! user input at parse time.

/// Maximum length of a change description
pub const MAX_CHANGE_DESCRIPTION_LENGTH: usize = 2000;

/// Validate a requirement, document, or matrix id.
///
/// Ids are trimmed and must be non-empty without inner whitespace.
pub fn validate_id(s: &str) -> Result<String, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("ID cannot be empty".to_string());
    }

    if s.chars().any(char::is_whitespace) {
        return Err(format!("Invalid ID '{s}': IDs cannot contain whitespace"));
    }

    Ok(s.to_string())
}

/// Validate a change description.
pub fn validate_change(s: &str) -> Result<String, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Change description cannot be empty".to_string());
    }

    if s.chars().count() > MAX_CHANGE_DESCRIPTION_LENGTH {
        return Err(format!(
            "Change description cannot exceed {MAX_CHANGE_DESCRIPTION_LENGTH} characters"
        ));
    }

    Ok(s.to_string())
}

/// Validate a confidence value in [0, 1].
pub fn validate_confidence(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid confidence '{s}': expected a number"))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("Confidence must be within [0, 1], got {value}"));
    }
    Ok(value)
}

/// Validate a BFS depth bound against [`crate::config::MAX_DEPTH_LIMIT`].
pub fn validate_max_depth(s: &str) -> Result<usize, String> {
    let value: usize = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid depth '{s}': expected a positive integer"))?;
    crate::config::validate_max_depth(value).map_err(|e| e.to_string())?;
    Ok(value)
}

/// Validate a pair cap (at least 1).
pub fn validate_max_pairs(s: &str) -> Result<usize, String> {
    match s.trim().parse::<usize>() {
        Ok(0) => Err("max-pairs must be at least 1".to_string()),
        Ok(value) => Ok(value),
        Err(_) => Err(format!("Invalid pair cap '{s}': expected a positive integer")),
    }
}
