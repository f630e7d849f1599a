//! Change impact propagation.
//!
//! Given a changed requirement, traverse the traceability graph breadth
//! first up to `max_depth` hops and score every reached requirement against
//! the changed one. Requirements one hop away are *direct* impacts, the rest
//! are *cascading* impacts.
//!
//! # Scoring
//!
//! | Component                                   | Weight              |
//! |---------------------------------------------|---------------------|
//! | base                                        | 0.3                 |
//! | either requirement has `high` priority      | +0.2                |
//! | both requirements are `functional`          | +0.2                |
//! | word-overlap (Jaccard) similarity of texts  | +0.3 × similarity   |
//!
//! The sum is clipped to [0, 1]. Impacts scoring below the impact threshold
//! are dropped.

use crate::cancel::CancellationToken;
use crate::classifier::heuristic::jaccard;
use crate::config::{AnalysisConfig, validate_max_depth};
use crate::domain::{MatrixId, Priority, RelationshipType, Requirement, RequirementId, RequirementType};
use crate::error::{Error, Result};
use crate::graph::TraceGraph;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// Base score every reached requirement starts with
pub const BASE_WEIGHT: f64 = 0.3;

/// Added when either requirement has high priority
pub const PRIORITY_WEIGHT: f64 = 0.2;

/// Added when both requirements are functional
pub const TYPE_WEIGHT: f64 = 0.2;

/// Multiplier for the text similarity of the two requirements
pub const SIMILARITY_WEIGHT: f64 = 0.3;

/// Score of `target` as impacted by a change to `source`, in [0, 1].
#[must_use]
pub fn impact_score(source: &Requirement, target: &Requirement) -> f64 {
    let mut score = BASE_WEIGHT;
    if source.priority == Priority::High || target.priority == Priority::High {
        score += PRIORITY_WEIGHT;
    }
    if source.requirement_type == RequirementType::Functional
        && target.requirement_type == RequirementType::Functional
    {
        score += TYPE_WEIGHT;
    }
    score += SIMILARITY_WEIGHT * jaccard(&source.text, &target.text);
    score.clamp(0.0, 1.0)
}

/// Risk tier of an impact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Score at most 0.4
    #[default]
    Low,

    /// Score above 0.4
    Medium,

    /// Score above 0.7
    High,
}

impl RiskLevel {
    /// Tier for an impact score
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score > 0.7 {
            RiskLevel::High
        } else if score > 0.4 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        })
    }
}

/// Effort estimate for a single impacted requirement.
#[must_use]
pub fn estimated_effort(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Low => "1-2 hours",
        RiskLevel::Medium => "4-8 hours",
        RiskLevel::High => "1-2 days",
    }
}

/// Effort bucket for the change as a whole, by number of impacts.
#[must_use]
pub fn aggregate_effort(total_impacts: usize) -> RiskLevel {
    match total_impacts {
        0..=5 => RiskLevel::Low,
        6..=15 => RiskLevel::Medium,
        _ => RiskLevel::High,
    }
}

/// A requirement affected by the change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactedRequirement {
    /// Affected requirement
    pub requirement_id: RequirementId,

    /// Hops from the changed requirement
    pub depth: usize,

    /// Impact score in [0, 1]
    pub score: f64,

    /// Risk tier derived from the score
    pub risk_level: RiskLevel,

    /// Effort estimate for the risk tier
    pub estimated_effort: String,

    /// Type of the relationship the traversal arrived through
    pub relationship_path_type: RelationshipType,
}

/// Result of one impact analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    /// Changed requirement
    pub requirement_id: RequirementId,

    /// Description of the change
    pub change_description: String,

    /// Retained impacts at depth 1
    pub direct_impacts: Vec<ImpactedRequirement>,

    /// Retained impacts at depth > 1
    pub cascading_impacts: Vec<ImpactedRequirement>,

    /// Highest risk among retained impacts (low when there are none)
    pub overall_risk: RiskLevel,

    /// Distinct requirements across direct and cascading impacts
    pub total_affected_requirements: usize,

    /// Effort bucket for the whole change
    pub aggregate_effort: RiskLevel,

    /// Suggested mitigations, driven by the risk tier
    pub mitigation_strategies: Vec<String>,

    /// Depth bound the traversal used
    pub max_depth: usize,

    /// Retention threshold the scoring used
    pub impact_threshold: f64,
}

impl ImpactAnalysis {
    /// Direct then cascading impacts
    pub fn all_impacts(&self) -> impl Iterator<Item = &ImpactedRequirement> {
        self.direct_impacts.iter().chain(&self.cascading_impacts)
    }
}

/// Persisted impact artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactRecord {
    /// Record id
    pub id: String,

    /// Matrix the graph came from
    pub matrix_id: MatrixId,

    /// When the analysis ran
    pub generated_at: DateTime<Utc>,

    /// The analysis
    #[serde(flatten)]
    pub analysis: ImpactAnalysis,
}

/// Progress of one propagation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactStage {
    /// Not started
    #[default]
    Idle,

    /// Checking parameters and the target requirement
    Validating,

    /// Breadth-first traversal
    Traversing,

    /// Scoring reached requirements
    Scoring,

    /// Finished; the analysis is complete
    Aggregated,
}

/// Runs a single impact analysis against a graph snapshot.
///
/// A propagator is used for one run; [`ImpactPropagator::stage`] reports how
/// far it got, which is where a failed run stopped.
#[derive(Debug, Clone)]
pub struct ImpactPropagator {
    max_depth: usize,
    impact_threshold: f64,
    stage: ImpactStage,
}

impl ImpactPropagator {
    /// Propagator using the depth bound and threshold from `config`.
    #[must_use]
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            impact_threshold: config.impact_threshold,
            stage: ImpactStage::Idle,
        }
    }

    /// Current stage
    #[must_use]
    pub fn stage(&self) -> ImpactStage {
        self.stage
    }

    fn advance(&mut self, stage: ImpactStage) {
        debug!(from = ?self.stage, to = ?stage, "Impact stage");
        self.stage = stage;
    }

    /// Analyze the impact of changing `requirement_id`.
    ///
    /// `requirements` must contain every requirement in `graph`.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidParameter` for an out-of-range depth bound or a
    ///   blank change description
    /// - `Error::NotFound` if the requirement is unknown; nothing is traversed
    /// - `Error::Cancelled` if `cancel` fires during traversal
    pub fn propagate(
        &mut self,
        requirement_id: &RequirementId,
        change_description: &str,
        graph: &TraceGraph,
        requirements: &HashMap<RequirementId, Requirement>,
        cancel: &CancellationToken,
    ) -> Result<ImpactAnalysis> {
        self.advance(ImpactStage::Validating);
        validate_max_depth(self.max_depth)?;
        if change_description.trim().is_empty() {
            return Err(Error::InvalidParameter(
                "change description cannot be empty".to_string(),
            ));
        }
        let changed = requirements
            .get(requirement_id)
            .filter(|_| graph.contains(requirement_id))
            .ok_or_else(|| Error::not_found("requirement", requirement_id.as_str()))?;

        self.advance(ImpactStage::Traversing);
        let reached = graph.bfs_depths(requirement_id, self.max_depth, cancel)?;

        self.advance(ImpactStage::Scoring);
        let mut direct_impacts = Vec::new();
        let mut cascading_impacts = Vec::new();
        for hit in reached {
            let Some(target) = requirements.get(&hit.requirement_id) else {
                continue;
            };
            let score = impact_score(changed, target);
            if score < self.impact_threshold {
                debug!(requirement = %hit.requirement_id, score, "Impact below threshold");
                continue;
            }
            let risk_level = RiskLevel::from_score(score);
            let impact = ImpactedRequirement {
                requirement_id: hit.requirement_id,
                depth: hit.depth,
                score,
                risk_level,
                estimated_effort: estimated_effort(risk_level).to_string(),
                relationship_path_type: hit.via,
            };
            if hit.depth == 1 {
                direct_impacts.push(impact);
            } else {
                cascading_impacts.push(impact);
            }
        }

        self.advance(ImpactStage::Aggregated);
        let overall_risk = direct_impacts
            .iter()
            .chain(&cascading_impacts)
            .map(|impact| impact.risk_level)
            .max()
            .unwrap_or(RiskLevel::Low);
        let total_affected_requirements = direct_impacts.len() + cascading_impacts.len();
        let mitigation_strategies = mitigation_strategies(
            overall_risk,
            &direct_impacts,
            &cascading_impacts,
        );

        info!(
            requirement = %requirement_id,
            direct = direct_impacts.len(),
            cascading = cascading_impacts.len(),
            risk = %overall_risk,
            "Impact analysis complete"
        );

        Ok(ImpactAnalysis {
            requirement_id: requirement_id.clone(),
            change_description: change_description.to_string(),
            direct_impacts,
            cascading_impacts,
            overall_risk,
            total_affected_requirements,
            aggregate_effort: aggregate_effort(total_affected_requirements),
            mitigation_strategies,
            max_depth: self.max_depth,
            impact_threshold: self.impact_threshold,
        })
    }
}

fn mitigation_strategies(
    overall_risk: RiskLevel,
    direct: &[ImpactedRequirement],
    cascading: &[ImpactedRequirement],
) -> Vec<String> {
    if direct.is_empty() && cascading.is_empty() {
        return vec!["No dependent requirements found; validate the change in isolation".to_string()];
    }

    let mut strategies = Vec::new();
    let conflicts = direct
        .iter()
        .chain(cascading)
        .any(|impact| impact.relationship_path_type == RelationshipType::ConflictsWith);
    if conflicts {
        strategies.push("Resolve conflicts_with relationships before implementing the change".to_string());
    }

    match overall_risk {
        RiskLevel::High => {
            strategies.push("Schedule a design review with owners of high-risk requirements".to_string());
            strategies.push("Update and re-run tests for every directly impacted requirement".to_string());
            strategies.push("Roll the change out in phases".to_string());
        }
        RiskLevel::Medium => {
            strategies.push("Review directly impacted requirements with their owners".to_string());
            strategies.push("Re-run regression tests covering impacted requirements".to_string());
        }
        RiskLevel::Low => {
            strategies.push("Verify directly impacted requirements during normal review".to_string());
        }
    }
    if !cascading.is_empty() {
        strategies.push(format!(
            "Notify owners of {} cascading impact(s)",
            cascading.len()
        ));
    }
    strategies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Provenance, Relationship, RelationshipId};
    use proptest::prelude::*;
    use rstest::rstest;

    fn requirement(id: &str, text: &str, requirement_type: RequirementType, priority: Priority) -> Requirement {
        Requirement {
            id: id.into(),
            text: text.to_string(),
            requirement_type,
            priority,
            source_document_id: "doc".into(),
        }
    }

    fn edge(source: &str, target: &str) -> Relationship {
        Relationship {
            id: RelationshipId::new(format!("rel-{source}-{target}")),
            source_requirement_id: source.into(),
            target_requirement_id: target.into(),
            relationship_type: RelationshipType::DependsOn,
            confidence: 0.9,
            bidirectional: false,
            provenance: Provenance::Manual,
            reasoning: None,
            created_at: Utc::now(),
        }
    }

    fn chain() -> (TraceGraph, HashMap<RequirementId, Requirement>) {
        let requirements: Vec<_> = ["A", "B", "C", "D"]
            .into_iter()
            .map(|id| requirement(id, "Shared login text", RequirementType::Functional, Priority::High))
            .collect();
        let graph = TraceGraph::build(&requirements, &[edge("A", "B"), edge("B", "C"), edge("C", "D")]);
        let map = requirements.into_iter().map(|r| (r.id.clone(), r)).collect();
        (graph, map)
    }

    #[test]
    fn score_follows_weight_table() {
        let a = requirement("A", "alpha beta", RequirementType::Functional, Priority::High);
        let b = requirement("B", "alpha beta", RequirementType::Functional, Priority::Low);
        assert!((impact_score(&a, &b) - 1.0).abs() < 1e-9);

        let c = requirement("C", "gamma", RequirementType::Business, Priority::Low);
        let d = requirement("D", "delta", RequirementType::Functional, Priority::Medium);
        assert!((impact_score(&c, &d) - 0.3).abs() < 1e-9);

        let e = requirement("E", "alpha gamma", RequirementType::Functional, Priority::Low);
        let f = requirement("F", "alpha delta", RequirementType::Functional, Priority::Low);
        // 0.3 + 0.2 + 0.3 * (1/3)
        assert!((impact_score(&e, &f) - 0.6).abs() < 1e-9);
    }

    #[rstest]
    #[case(0.0, RiskLevel::Low)]
    #[case(0.4, RiskLevel::Low)]
    #[case(0.41, RiskLevel::Medium)]
    #[case(0.7, RiskLevel::Medium)]
    #[case(0.71, RiskLevel::High)]
    #[case(1.0, RiskLevel::High)]
    fn risk_tiers(#[case] score: f64, #[case] expected: RiskLevel) {
        assert_eq!(RiskLevel::from_score(score), expected);
    }

    #[rstest]
    #[case(0, RiskLevel::Low)]
    #[case(5, RiskLevel::Low)]
    #[case(6, RiskLevel::Medium)]
    #[case(15, RiskLevel::Medium)]
    #[case(16, RiskLevel::High)]
    fn aggregate_effort_buckets(#[case] total: usize, #[case] expected: RiskLevel) {
        assert_eq!(aggregate_effort(total), expected);
    }

    #[test]
    fn depth_one_keeps_only_direct_impacts() {
        let (graph, requirements) = chain();
        let mut propagator = ImpactPropagator::new(&AnalysisConfig {
            max_depth: 1,
            ..AnalysisConfig::default()
        });

        let analysis = propagator
            .propagate(&"A".into(), "rename", &graph, &requirements, &CancellationToken::new())
            .unwrap();

        assert_eq!(analysis.direct_impacts.len(), 1);
        assert_eq!(analysis.direct_impacts[0].requirement_id.as_str(), "B");
        assert!(analysis.cascading_impacts.is_empty());
        assert_eq!(propagator.stage(), ImpactStage::Aggregated);
    }

    #[test]
    fn deeper_hops_are_cascading() {
        let (graph, requirements) = chain();
        let mut propagator = ImpactPropagator::new(&AnalysisConfig::default());

        let analysis = propagator
            .propagate(&"A".into(), "rename", &graph, &requirements, &CancellationToken::new())
            .unwrap();

        let cascading: Vec<(&str, usize)> = analysis
            .cascading_impacts
            .iter()
            .map(|i| (i.requirement_id.as_str(), i.depth))
            .collect();
        assert_eq!(cascading, vec![("C", 2), ("D", 3)]);
        assert_eq!(analysis.total_affected_requirements, 3);
        assert_eq!(analysis.overall_risk, RiskLevel::High);
        assert_eq!(analysis.direct_impacts[0].estimated_effort, "1-2 days");
        assert_eq!(analysis.direct_impacts[0].relationship_path_type, RelationshipType::DependsOn);
    }

    #[test]
    fn isolated_requirement_has_no_impacts() {
        let requirements = vec![requirement("X", "alone", RequirementType::Business, Priority::Low)];
        let graph = TraceGraph::build(&requirements, &[]);
        let map = requirements.into_iter().map(|r| (r.id.clone(), r)).collect();

        let analysis = ImpactPropagator::new(&AnalysisConfig::default())
            .propagate(&"X".into(), "tweak", &graph, &map, &CancellationToken::new())
            .unwrap();

        assert!(analysis.direct_impacts.is_empty());
        assert!(analysis.cascading_impacts.is_empty());
        assert_eq!(analysis.total_affected_requirements, 0);
        assert_eq!(analysis.overall_risk, RiskLevel::Low);
        assert_eq!(analysis.mitigation_strategies.len(), 1);
    }

    #[test]
    fn threshold_filters_weak_impacts() {
        let requirements = vec![
            requirement("A", "alpha", RequirementType::Business, Priority::Low),
            requirement("B", "beta", RequirementType::Business, Priority::Low),
        ];
        let graph = TraceGraph::build(&requirements, &[edge("A", "B")]);
        let map: HashMap<_, _> = requirements.into_iter().map(|r| (r.id.clone(), r)).collect();

        let strict = ImpactPropagator::new(&AnalysisConfig {
            impact_threshold: 0.5,
            ..AnalysisConfig::default()
        })
        .propagate(&"A".into(), "change", &graph, &map, &CancellationToken::new())
        .unwrap();
        assert!(strict.direct_impacts.is_empty());

        let lenient = ImpactPropagator::new(&AnalysisConfig::default())
            .propagate(&"A".into(), "change", &graph, &map, &CancellationToken::new())
            .unwrap();
        assert_eq!(lenient.direct_impacts.len(), 1);
    }

    #[test]
    fn unknown_requirement_stops_at_validation() {
        let (graph, requirements) = chain();
        let mut propagator = ImpactPropagator::new(&AnalysisConfig::default());

        let err = propagator
            .propagate(&"Z".into(), "change", &graph, &requirements, &CancellationToken::new())
            .unwrap_err();

        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(propagator.stage(), ImpactStage::Validating);
    }

    #[test]
    fn zero_depth_is_invalid() {
        let (graph, requirements) = chain();
        let err = ImpactPropagator::new(&AnalysisConfig {
            max_depth: 0,
            ..AnalysisConfig::default()
        })
        .propagate(&"A".into(), "change", &graph, &requirements, &CancellationToken::new())
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMETER");
    }

    #[test]
    fn scoring_is_directional_through_the_graph() {
        let requirements = vec![
            requirement("A", "alpha", RequirementType::Functional, Priority::Low),
            requirement("B", "beta", RequirementType::Functional, Priority::Low),
        ];
        let graph = TraceGraph::build(&requirements, &[edge("A", "B")]);
        let map: HashMap<_, _> = requirements.into_iter().map(|r| (r.id.clone(), r)).collect();
        let cancel = CancellationToken::new();

        let forward = ImpactPropagator::new(&AnalysisConfig::default())
            .propagate(&"A".into(), "change", &graph, &map, &cancel)
            .unwrap();
        let backward = ImpactPropagator::new(&AnalysisConfig::default())
            .propagate(&"B".into(), "change", &graph, &map, &cancel)
            .unwrap();

        assert_eq!(forward.total_affected_requirements, 1);
        assert_eq!(backward.total_affected_requirements, 0);
    }

    fn arb_requirement(id: &'static str) -> impl Strategy<Value = Requirement> {
        (
            "[a-z ]{0,30}",
            prop::sample::select(RequirementType::ALL.to_vec()),
            prop::sample::select(Priority::ALL.to_vec()),
        )
            .prop_map(move |(text, requirement_type, priority)| {
                requirement(id, &text, requirement_type, priority)
            })
    }

    proptest! {
        #[test]
        fn score_is_clipped_to_unit_interval(a in arb_requirement("A"), b in arb_requirement("B")) {
            let score = impact_score(&a, &b);
            prop_assert!((0.0..=1.0).contains(&score));
            prop_assert!(score >= BASE_WEIGHT);
        }
    }
}
