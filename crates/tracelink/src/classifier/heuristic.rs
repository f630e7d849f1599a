//! Deterministic relationship heuristics.
//!
//! Used whenever the semantic classifier is unavailable, times out, or
//! answers with something unusable. Rules are tried in order:
//!
//! 1. dependency terms → `depends_on` (0.7)
//! 2. elaboration terms → `refines` (0.6)
//! 3. contradiction terms → `conflicts_with` (0.65, bidirectional)
//! 4. Jaccard word overlap > 0.5 → `supports` (bidirectional, confidence = overlap)
//!
//! Nothing here can fail: the result is either a match or `None`.

use crate::domain::RelationshipType;
use std::collections::HashSet;

/// Confidence assigned to keyword-triggered `depends_on`
pub const DEPENDS_ON_CONFIDENCE: f64 = 0.7;

/// Confidence assigned to keyword-triggered `refines`
pub const REFINES_CONFIDENCE: f64 = 0.6;

/// Confidence assigned to keyword-triggered `conflicts_with`
pub const CONFLICTS_WITH_CONFIDENCE: f64 = 0.65;

/// Overlap that must be exceeded for a `supports` relationship
pub const SIMILARITY_THRESHOLD: f64 = 0.5;

const DEPENDENCY_TERMS: &[&str] = &[
    "depends on",
    "depend on",
    "dependent on",
    "requires",
    "prerequisite",
    "relies on",
    "rely on",
    "contingent on",
];

const ELABORATION_TERMS: &[&str] = &[
    "specifically",
    "in detail",
    "more precisely",
    "in particular",
    "for example",
    "such as",
    "elaborates",
    "refines",
];

const CONTRADICTION_TERMS: &[&str] = &[
    "must not",
    "shall not",
    "cannot",
    "never",
    "prohibited",
    "forbidden",
    "instead of",
    "contradicts",
    "conflicts with",
];

/// Which direction a heuristic match points, relative to the input pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// First requirement is the source
    Forward,

    /// Second requirement is the source
    Reverse,
}

/// A relationship found by the heuristics
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicMatch {
    /// Relationship type
    pub relationship_type: RelationshipType,

    /// Fixed or similarity-derived confidence in [0, 1]
    pub confidence: f64,

    /// Whether the edge holds both ways
    pub bidirectional: bool,

    /// Edge direction relative to `(first, second)`
    pub direction: Direction,

    /// Short explanation recorded on the relationship
    pub reasoning: String,
}

/// Lowercased alphanumeric words of `text`.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard similarity of the word sets of two texts.
///
/// Returns 0.0 when both texts have no words.
#[must_use]
pub fn jaccard(first: &str, second: &str) -> f64 {
    let a: HashSet<String> = tokenize(first).into_iter().collect();
    let b: HashSet<String> = tokenize(second).into_iter().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let similarity = a.intersection(&b).count() as f64 / union as f64;
    similarity
}

/// Classify a pair of requirement texts without the semantic classifier.
#[must_use]
pub fn classify_pair(first: &str, second: &str) -> Option<HeuristicMatch> {
    let first_norm = normalize(first);
    let second_norm = normalize(second);

    if let Some(found) = keyword_rule(
        &first_norm,
        &second_norm,
        DEPENDENCY_TERMS,
        RelationshipType::DependsOn,
        DEPENDS_ON_CONFIDENCE,
    ) {
        return Some(found);
    }
    if let Some(found) = keyword_rule(
        &first_norm,
        &second_norm,
        ELABORATION_TERMS,
        RelationshipType::Refines,
        REFINES_CONFIDENCE,
    ) {
        return Some(found);
    }
    if let Some(term) = find_term(&first_norm, CONTRADICTION_TERMS)
        .or_else(|| find_term(&second_norm, CONTRADICTION_TERMS))
    {
        return Some(HeuristicMatch {
            relationship_type: RelationshipType::ConflictsWith,
            confidence: CONFLICTS_WITH_CONFIDENCE,
            bidirectional: true,
            direction: Direction::Forward,
            reasoning: format!("contradiction term '{term}'"),
        });
    }

    let similarity = jaccard(first, second);
    if similarity > SIMILARITY_THRESHOLD {
        return Some(HeuristicMatch {
            relationship_type: RelationshipType::Supports,
            confidence: similarity.clamp(0.0, 1.0),
            bidirectional: true,
            direction: Direction::Forward,
            reasoning: format!("word overlap {similarity:.2}"),
        });
    }

    None
}

/// Directional keyword rule: the text containing the term is the source.
fn keyword_rule(
    first_norm: &str,
    second_norm: &str,
    terms: &[&str],
    relationship_type: RelationshipType,
    confidence: f64,
) -> Option<HeuristicMatch> {
    let (direction, term) = match find_term(first_norm, terms) {
        Some(term) => (Direction::Forward, term),
        None => (Direction::Reverse, find_term(second_norm, terms)?),
    };
    Some(HeuristicMatch {
        relationship_type,
        confidence,
        bidirectional: false,
        direction,
        reasoning: format!("keyword '{term}'"),
    })
}

/// Words joined by single spaces and padded, so terms match on word boundaries.
fn normalize(text: &str) -> String {
    format!(" {} ", tokenize(text).join(" "))
}

fn find_term<'a>(normalized: &str, terms: &[&'a str]) -> Option<&'a str> {
    terms
        .iter()
        .copied()
        .find(|term| normalized.contains(&format!(" {term} ")))
}
