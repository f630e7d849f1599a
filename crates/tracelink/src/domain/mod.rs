//! Domain types for requirement traceability.
//!
//! Requirements are produced by ingestion and are immutable once loaded
//! into an analysis run. Relationships are typed edges between two
//! requirements; a classification run creates new relationship records
//! rather than editing old ones.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new id
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the id as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Unique identifier for a requirement
    RequirementId
);
string_id!(
    /// Identifier of a source document
    DocumentId
);
string_id!(
    /// Identifier of a relationship record
    RelationshipId
);
string_id!(
    /// Identifier of a traceability matrix (one per analysis run)
    MatrixId
);

/// An atomic requirement statement extracted from a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    /// Unique identifier
    pub id: RequirementId,

    /// Requirement statement
    pub text: String,

    /// Requirement category
    #[serde(rename = "type")]
    pub requirement_type: RequirementType,

    /// Priority level
    pub priority: Priority,

    /// Document the requirement was extracted from
    pub source_document_id: DocumentId,
}

impl Requirement {
    /// Check that the requirement has a usable id and text.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidParameter` for a blank id or blank text.
    pub fn validate(&self) -> Result<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(Error::InvalidParameter(
                "requirement id cannot be empty".to_string(),
            ));
        }
        if self.text.trim().is_empty() {
            return Err(Error::InvalidParameter(format!(
                "requirement {} has empty text",
                self.id
            )));
        }
        Ok(())
    }
}

/// Category of requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequirementType {
    /// Observable system behavior
    Functional,

    /// Quality attribute (performance, security, ...)
    NonFunctional,

    /// Business rule or goal
    Business,

    /// Technical constraint
    Technical,
}

impl RequirementType {
    /// All requirement types in reporting order.
    pub const ALL: [RequirementType; 4] = [
        RequirementType::Functional,
        RequirementType::NonFunctional,
        RequirementType::Business,
        RequirementType::Technical,
    ];

    /// Wire name of the type
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RequirementType::Functional => "functional",
            RequirementType::NonFunctional => "non-functional",
            RequirementType::Business => "business",
            RequirementType::Technical => "technical",
        }
    }
}

impl fmt::Display for RequirementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requirement priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Must have
    High,

    /// Should have
    Medium,

    /// Nice to have
    Low,
}

impl Priority {
    /// All priorities, highest first.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Wire name of the priority
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed relationship taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Source is derived from target
    DerivesFrom,

    /// Source adds detail to target
    Refines,

    /// Source realizes target
    Implements,

    /// Source verifies target
    Tests,

    /// Source cannot be satisfied without target
    DependsOn,

    /// Source and target cannot both hold
    ConflictsWith,

    /// Source and target reinforce each other
    Supports,

    /// Source supersedes target
    Replaces,
}

impl RelationshipType {
    /// The full taxonomy, in the order it is presented to classifiers.
    pub const ALL: [RelationshipType; 8] = [
        RelationshipType::DerivesFrom,
        RelationshipType::Refines,
        RelationshipType::Implements,
        RelationshipType::Tests,
        RelationshipType::DependsOn,
        RelationshipType::ConflictsWith,
        RelationshipType::Supports,
        RelationshipType::Replaces,
    ];

    /// Wire name of the type
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipType::DerivesFrom => "derives_from",
            RelationshipType::Refines => "refines",
            RelationshipType::Implements => "implements",
            RelationshipType::Tests => "tests",
            RelationshipType::DependsOn => "depends_on",
            RelationshipType::ConflictsWith => "conflicts_with",
            RelationshipType::Supports => "supports",
            RelationshipType::Replaces => "replaces",
        }
    }

    /// One-line definition used when describing the taxonomy to a classifier.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            RelationshipType::DerivesFrom => "the first requirement is derived from the second",
            RelationshipType::Refines => "the first requirement adds detail to the second",
            RelationshipType::Implements => "the first requirement realizes the second",
            RelationshipType::Tests => "the first requirement verifies the second",
            RelationshipType::DependsOn => "the first requirement needs the second to be met",
            RelationshipType::ConflictsWith => "the two requirements cannot both be satisfied",
            RelationshipType::Supports => "the two requirements reinforce each other",
            RelationshipType::Replaces => "the first requirement supersedes the second",
        }
    }

    /// Types whose meaning is symmetric between the two requirements.
    #[must_use]
    pub fn is_naturally_bidirectional(self) -> bool {
        matches!(
            self,
            RelationshipType::ConflictsWith | RelationshipType::Supports
        )
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        RelationshipType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| {
                Error::InvalidParameter(format!(
                    "unknown relationship type '{s}'; valid types: {}",
                    RelationshipType::ALL.map(RelationshipType::as_str).join(", ")
                ))
            })
    }
}

/// Where a relationship came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Produced by the semantic classifier
    Ai,

    /// Produced by the deterministic fallback
    Heuristic,

    /// Curated by a person
    Manual,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provenance::Ai => "ai",
            Provenance::Heuristic => "heuristic",
            Provenance::Manual => "manual",
        })
    }
}

/// A typed edge between two requirements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Unique identifier
    pub id: RelationshipId,

    /// Requirement the edge starts at
    pub source_requirement_id: RequirementId,

    /// Requirement the edge points to
    pub target_requirement_id: RequirementId,

    /// Relationship type
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// Whether the edge holds in both directions
    pub bidirectional: bool,

    /// Origin of the relationship
    pub provenance: Provenance,

    /// Classifier or curator explanation, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// Check the relationship invariants.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidParameter` if the confidence is not a finite
    /// value in [0, 1], or if the edge is a self-loop that is not manual.
    pub fn validate(&self) -> Result<()> {
        validate_confidence(self.confidence)?;
        if self.source_requirement_id == self.target_requirement_id
            && self.provenance != Provenance::Manual
        {
            return Err(Error::InvalidParameter(format!(
                "relationship {} links requirement {} to itself",
                self.id, self.source_requirement_id
            )));
        }
        Ok(())
    }

    /// Whether the relationship touches `id` at either end.
    #[must_use]
    pub fn involves(&self, id: &RequirementId) -> bool {
        &self.source_requirement_id == id || &self.target_requirement_id == id
    }
}

/// Reject confidences outside [0, 1] (and NaN).
///
/// # Errors
///
/// Returns `Error::InvalidParameter` for out-of-range values.
pub fn validate_confidence(confidence: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(Error::InvalidParameter(format!(
            "confidence must be within [0, 1], got {confidence}"
        )));
    }
    Ok(())
}

/// Input for creating or replacing a manually curated relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRelationship {
    /// Requirement the edge starts at
    pub source_requirement_id: RequirementId,

    /// Requirement the edge points to
    pub target_requirement_id: RequirementId,

    /// Relationship type
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,

    /// Curator confidence (defaults to 1.0)
    #[serde(default = "default_manual_confidence")]
    pub confidence: f64,

    /// Whether the edge holds in both directions
    #[serde(default)]
    pub bidirectional: bool,

    /// Optional explanation
    #[serde(default)]
    pub reasoning: Option<String>,
}

fn default_manual_confidence() -> f64 {
    1.0
}

impl NewRelationship {
    /// A directional manual relationship with full confidence.
    pub fn new(
        source: impl Into<RequirementId>,
        target: impl Into<RequirementId>,
        relationship_type: RelationshipType,
    ) -> Self {
        Self {
            source_requirement_id: source.into(),
            target_requirement_id: target.into(),
            relationship_type,
            confidence: default_manual_confidence(),
            bidirectional: relationship_type.is_naturally_bidirectional(),
            reasoning: None,
        }
    }
}
