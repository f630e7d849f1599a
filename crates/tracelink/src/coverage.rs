//! Coverage statistics for a traceability matrix.
//!
//! A requirement is *tracked* when it appears at either end of at least one
//! relationship, and *orphaned* otherwise. Tracked and orphaned partition the
//! requirement set: relationships pointing at requirements outside the set
//! are ignored.

use crate::domain::{
    MatrixId, Priority, Relationship, RelationshipType, Requirement, RequirementId,
    RequirementType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Tracked/total counts for one slice of the requirement set
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageBucket {
    /// Requirements in the slice
    pub total: usize,

    /// Tracked requirements in the slice
    pub tracked: usize,

    /// `100 * tracked / total`, or 0 for an empty slice
    pub percentage: f64,
}

impl CoverageBucket {
    fn new(total: usize, tracked: usize) -> Self {
        Self {
            total,
            tracked,
            percentage: percentage(tracked, total),
        }
    }
}

/// Gap severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth a look
    Low,

    /// Should be addressed
    Medium,

    /// Blocks confident change analysis
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        })
    }
}

/// Kind of coverage gap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    /// Overall coverage below the configured threshold
    LowOverallCoverage,

    /// Fewer `tests` relationships than half the functional requirements
    InsufficientTestCoverage,

    /// Some requirements have no relationships
    OrphanedRequirements,

    /// One requirement type is covered below the threshold
    LowTypeCoverage,
}

impl fmt::Display for GapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GapKind::LowOverallCoverage => "low_overall_coverage",
            GapKind::InsufficientTestCoverage => "insufficient_test_coverage",
            GapKind::OrphanedRequirements => "orphaned_requirements",
            GapKind::LowTypeCoverage => "low_type_coverage",
        })
    }
}

/// A coverage finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapFinding {
    /// Finding kind
    pub kind: GapKind,

    /// Finding severity
    pub severity: Severity,

    /// Human-readable description
    pub message: String,

    /// Requirements the finding is about, if specific ones apply
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected: Vec<RequirementId>,
}

/// Coverage statistics for one requirement/relationship snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Size of the requirement set
    pub total_requirements: usize,

    /// Requirements with at least one relationship
    pub tracked_count: usize,

    /// Requirements with no relationship, in load order
    pub orphaned_requirements: Vec<RequirementId>,

    /// `100 * tracked / total`, or 0 for an empty set
    pub coverage_percentage: f64,

    /// Coverage per requirement type (every type present, possibly empty)
    pub by_type: BTreeMap<RequirementType, CoverageBucket>,

    /// Coverage per priority (every priority present, possibly empty)
    pub by_priority: BTreeMap<Priority, CoverageBucket>,

    /// Relationship count per type
    pub relationship_counts: BTreeMap<RelationshipType, usize>,

    /// Findings, most severe kinds first
    pub gaps: Vec<GapFinding>,

    /// Suggested actions, orphan remediation first
    pub recommendations: Vec<String>,
}

impl CoverageReport {
    /// Whether the report contains a gap of the given kind
    #[must_use]
    pub fn has_gap(&self, kind: GapKind) -> bool {
        self.gaps.iter().any(|gap| gap.kind == kind)
    }
}

/// Persisted coverage artifact for a matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRecord {
    /// Record id
    pub id: String,

    /// Matrix the coverage was computed from
    pub matrix_id: MatrixId,

    /// When the coverage was computed
    pub generated_at: DateTime<Utc>,

    /// The statistics
    #[serde(flatten)]
    pub report: CoverageReport,
}

/// Computes [`CoverageReport`]s against a gap threshold.
#[derive(Debug, Clone, Copy)]
pub struct CoverageAnalyzer {
    threshold: f64,
}

impl CoverageAnalyzer {
    /// Analyzer reporting coverage below `threshold` percent as a gap
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Compute coverage statistics.
    #[must_use]
    pub fn analyze(&self, requirements: &[Requirement], relationships: &[Relationship]) -> CoverageReport {
        let known: HashSet<&RequirementId> = requirements.iter().map(|r| &r.id).collect();
        let tracked: HashSet<&RequirementId> = relationships
            .iter()
            .flat_map(|r| [&r.source_requirement_id, &r.target_requirement_id])
            .filter(|id| known.contains(id))
            .collect();

        let orphaned_requirements: Vec<RequirementId> = requirements
            .iter()
            .filter(|r| !tracked.contains(&r.id))
            .map(|r| r.id.clone())
            .collect();
        // Duplicate ids in the input count once as tracked but may repeat
        // among orphans, so derive the tracked count from the same walk.
        let tracked_count = requirements.len() - orphaned_requirements.len();

        let by_type = RequirementType::ALL
            .into_iter()
            .map(|requirement_type| {
                let slice = requirements
                    .iter()
                    .filter(|r| r.requirement_type == requirement_type);
                (requirement_type, bucket(slice, &tracked))
            })
            .collect();
        let by_priority = Priority::ALL
            .into_iter()
            .map(|priority| {
                let slice = requirements.iter().filter(|r| r.priority == priority);
                (priority, bucket(slice, &tracked))
            })
            .collect();

        let mut relationship_counts = BTreeMap::new();
        for relationship in relationships {
            *relationship_counts
                .entry(relationship.relationship_type)
                .or_insert(0) += 1;
        }

        let mut report = CoverageReport {
            total_requirements: requirements.len(),
            tracked_count,
            orphaned_requirements,
            coverage_percentage: percentage(tracked_count, requirements.len()),
            by_type,
            by_priority,
            relationship_counts,
            gaps: Vec::new(),
            recommendations: Vec::new(),
        };
        report.gaps = self.find_gaps(requirements, &report);
        report.recommendations = recommendations(&report);
        report
    }

    fn find_gaps(&self, requirements: &[Requirement], report: &CoverageReport) -> Vec<GapFinding> {
        let mut gaps = Vec::new();

        if report.coverage_percentage < self.threshold {
            gaps.push(GapFinding {
                kind: GapKind::LowOverallCoverage,
                severity: if report.coverage_percentage < self.threshold / 2.0 {
                    Severity::High
                } else {
                    Severity::Medium
                },
                message: format!(
                    "Coverage is {:.1}%, below the {:.1}% threshold",
                    report.coverage_percentage, self.threshold
                ),
                affected: Vec::new(),
            });
        }

        let functional = report
            .by_type
            .get(&RequirementType::Functional)
            .map_or(0, |b| b.total);
        let tests = report
            .relationship_counts
            .get(&RelationshipType::Tests)
            .copied()
            .unwrap_or(0);
        if tests * 2 < functional {
            gaps.push(GapFinding {
                kind: GapKind::InsufficientTestCoverage,
                severity: Severity::Medium,
                message: format!(
                    "{tests} tests relationship(s) for {functional} functional requirement(s)"
                ),
                affected: requirements
                    .iter()
                    .filter(|r| r.requirement_type == RequirementType::Functional)
                    .map(|r| r.id.clone())
                    .collect(),
            });
        }

        if !report.orphaned_requirements.is_empty() {
            gaps.push(GapFinding {
                kind: GapKind::OrphanedRequirements,
                severity: if report.orphaned_requirements.len() * 2 > report.total_requirements {
                    Severity::High
                } else {
                    Severity::Medium
                },
                message: format!(
                    "{} requirement(s) have no relationships",
                    report.orphaned_requirements.len()
                ),
                affected: report.orphaned_requirements.clone(),
            });
        }

        for (requirement_type, bucket) in &report.by_type {
            if bucket.total > 0 && bucket.percentage < self.threshold {
                gaps.push(GapFinding {
                    kind: GapKind::LowTypeCoverage,
                    severity: Severity::Low,
                    message: format!(
                        "{requirement_type} requirements are {:.1}% covered ({} of {})",
                        bucket.percentage, bucket.tracked, bucket.total
                    ),
                    affected: Vec::new(),
                });
            }
        }

        gaps
    }
}

fn bucket<'a>(
    slice: impl Iterator<Item = &'a Requirement>,
    tracked: &HashSet<&RequirementId>,
) -> CoverageBucket {
    let (total, hit) = slice.fold((0, 0), |(total, hit), r| {
        (total + 1, hit + usize::from(tracked.contains(&r.id)))
    });
    CoverageBucket::new(total, hit)
}

#[allow(clippy::cast_precision_loss)]
fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    100.0 * part as f64 / whole as f64
}

fn recommendations(report: &CoverageReport) -> Vec<String> {
    let mut out = Vec::new();

    if !report.orphaned_requirements.is_empty() {
        out.push(format!(
            "Link or retire the {} orphaned requirement(s): {}",
            report.orphaned_requirements.len(),
            report
                .orphaned_requirements
                .iter()
                .map(RequirementId::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    if report.has_gap(GapKind::InsufficientTestCoverage) {
        out.push("Add tests relationships for functional requirements".to_string());
    }
    for gap in report
        .gaps
        .iter()
        .filter(|gap| gap.kind == GapKind::LowTypeCoverage)
    {
        out.push(format!("Review relationships for: {}", gap.message));
    }
    if report.has_gap(GapKind::LowOverallCoverage) {
        out.push(
            "Re-run relationship discovery with a lower confidence threshold or curate manual links"
                .to_string(),
        );
    }
    if out.is_empty() {
        out.push("Coverage meets the threshold; keep relationships current as requirements change".to_string());
    }

    out
}
