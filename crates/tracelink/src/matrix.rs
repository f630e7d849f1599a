//! Traceability matrix snapshots.

use crate::classifier::ClassificationStats;
use crate::config::DEFAULT_COVERAGE_THRESHOLD;
use crate::domain::{DocumentId, MatrixId, Relationship, Requirement, RequirementId};
use crate::graph::{AdjacentEdge, TraceGraph};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Requirement list, relationship list, and derived adjacency for one
/// analysis run. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceabilityMatrix {
    /// Matrix id
    pub id: MatrixId,

    /// Documents the requirements were loaded from
    pub document_ids: Vec<DocumentId>,

    /// Requirements in load order
    pub requirements: Vec<Requirement>,

    /// Discovered relationships followed by merged manual ones
    pub relationships: Vec<Relationship>,

    /// Adjacency derived from `relationships`
    pub adjacency: BTreeMap<RequirementId, Vec<AdjacentEdge>>,

    /// Classification counters for the run
    pub stats: ClassificationStats,

    /// Coverage gap threshold (percent) the build ran with
    #[serde(default = "default_coverage_threshold")]
    pub coverage_threshold: f64,

    /// When the matrix was built
    pub generated_at: DateTime<Utc>,
}

impl TraceabilityMatrix {
    /// Assemble a matrix, deriving the adjacency map.
    #[must_use]
    pub fn new(
        id: MatrixId,
        document_ids: Vec<DocumentId>,
        requirements: Vec<Requirement>,
        relationships: Vec<Relationship>,
        stats: ClassificationStats,
    ) -> Self {
        let adjacency = TraceGraph::build(&requirements, &relationships).adjacency();
        Self {
            id,
            document_ids,
            requirements,
            relationships,
            adjacency,
            stats,
            coverage_threshold: DEFAULT_COVERAGE_THRESHOLD,
            generated_at: Utc::now(),
        }
    }

    /// Record the coverage threshold the build used.
    #[must_use]
    pub fn with_coverage_threshold(mut self, threshold: f64) -> Self {
        self.coverage_threshold = threshold;
        self
    }

    /// Rebuild the graph for traversal.
    #[must_use]
    pub fn graph(&self) -> TraceGraph {
        TraceGraph::build(&self.requirements, &self.relationships)
    }

    /// Requirements keyed by id
    #[must_use]
    pub fn requirement_map(&self) -> HashMap<RequirementId, Requirement> {
        self.requirements
            .iter()
            .map(|r| (r.id.clone(), r.clone()))
            .collect()
    }

    /// Whether the matrix contains the requirement
    #[must_use]
    pub fn contains(&self, id: &RequirementId) -> bool {
        self.requirements.iter().any(|r| &r.id == id)
    }
}

fn default_coverage_threshold() -> f64 {
    DEFAULT_COVERAGE_THRESHOLD
}
