//! Relationship discovery between requirement pairs.
//!
//! Every unordered pair of loaded requirements (up to a cap) is offered to a
//! [`SemanticClassifier`]. Answers below the confidence threshold are
//! discarded. When the classifier times out, is unavailable, or answers with
//! something malformed, the pair falls back to the deterministic
//! [`heuristic`] rules instead of failing the run.
//!
//! # Ordering and concurrency
//!
//! Pairs are enumerated in a fixed order, `(0,1), (0,2), …, (1,2), …`,
//! following load order, and truncated to `max_pairs` *before* dispatch.
//! Up to `classifier_concurrency` calls are in flight at once; results are
//! collected in enumeration order, so completion order never changes the
//! output.

pub mod command;
pub mod heuristic;
#[cfg(any(test, feature = "test-util"))]
pub mod stub;

use crate::cancel::CancellationToken;
use crate::config::AnalysisConfig;
use crate::domain::{
    Provenance, Relationship, RelationshipId, RelationshipType, Requirement, validate_confidence,
};
use crate::error::{Error, Result};
use crate::id_generation::content_id;
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use command::CommandClassifier;
pub use heuristic::HeuristicMatch;

/// Answer from the semantic classifier for one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    /// Whether the two requirements are related at all
    pub has_relationship: bool,

    /// Relationship type, required when `has_relationship` is true
    #[serde(rename = "type", default)]
    pub relationship_type: Option<RelationshipType>,

    /// Classifier confidence in [0, 1]
    #[serde(default)]
    pub confidence: f64,

    /// Whether the relationship holds both ways
    #[serde(default)]
    pub bidirectional: bool,

    /// Classifier explanation
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl ClassificationResult {
    /// A positive answer.
    #[must_use]
    pub fn related(relationship_type: RelationshipType, confidence: f64) -> Self {
        Self {
            has_relationship: true,
            relationship_type: Some(relationship_type),
            confidence,
            bidirectional: relationship_type.is_naturally_bidirectional(),
            reasoning: None,
        }
    }

    /// A negative answer.
    #[must_use]
    pub fn unrelated() -> Self {
        Self {
            has_relationship: false,
            relationship_type: None,
            confidence: 0.0,
            bidirectional: false,
            reasoning: None,
        }
    }

    /// Check internal consistency of the answer.
    ///
    /// # Errors
    ///
    /// Returns `ClassifierFailure::Malformed` if a positive answer lacks a
    /// type or the confidence is outside [0, 1].
    pub fn validate(&self) -> std::result::Result<(), ClassifierFailure> {
        if self.has_relationship && self.relationship_type.is_none() {
            return Err(ClassifierFailure::Malformed(
                "hasRelationship is true but no type was given".to_string(),
            ));
        }
        validate_confidence(self.confidence)
            .map_err(|e| ClassifierFailure::Malformed(e.to_string()))
    }
}

/// Why the semantic classifier produced no usable answer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifierFailure {
    /// The call did not complete within the per-call timeout
    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),

    /// The response could not be interpreted
    #[error("malformed classifier response: {0}")]
    Malformed(String),

    /// The classifier could not be reached at all
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

impl From<ClassifierFailure> for Error {
    fn from(failure: ClassifierFailure) -> Self {
        match failure {
            ClassifierFailure::Timeout(after) => Error::ClassifierTimeout(after),
            ClassifierFailure::Malformed(msg) | ClassifierFailure::Unavailable(msg) => {
                Error::ClassifierMalformedResponse(msg)
            }
        }
    }
}

/// External semantic classifier.
///
/// Implementations need not enforce a timeout; [`RelationshipClassifier`]
/// wraps every call in one.
#[async_trait]
pub trait SemanticClassifier: Send + Sync {
    /// Classify the relationship from `first` to `second`.
    async fn classify(
        &self,
        first: &Requirement,
        second: &Requirement,
        taxonomy: &[RelationshipType],
    ) -> std::result::Result<ClassificationResult, ClassifierFailure>;

    /// Identifier recorded in generation metadata.
    fn model_id(&self) -> String;
}

/// Classifier for deployments without a semantic backend; every pair uses
/// the heuristics.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableClassifier;

#[async_trait]
impl SemanticClassifier for UnavailableClassifier {
    async fn classify(
        &self,
        _first: &Requirement,
        _second: &Requirement,
        _taxonomy: &[RelationshipType],
    ) -> std::result::Result<ClassificationResult, ClassifierFailure> {
        Err(ClassifierFailure::Unavailable(
            "no semantic classifier configured".to_string(),
        ))
    }

    fn model_id(&self) -> String {
        "heuristic-only".to_string()
    }
}

/// Counters describing one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationStats {
    /// Total unordered pairs among the loaded requirements
    pub pairs_available: usize,

    /// Pairs actually evaluated (after the cap)
    pub pairs_evaluated: usize,

    /// Classifier answers accepted as relationships
    pub ai_accepted: usize,

    /// Classifier answers discarded for low confidence
    pub ai_rejected_low_confidence: usize,

    /// Classifier answers saying the pair is unrelated
    pub ai_no_relationship: usize,

    /// Pairs that fell back to the heuristics
    pub fallbacks: usize,

    /// Fallback pairs where a heuristic matched
    pub heuristic_matches: usize,
}

/// Relationships discovered in one pass, in pair enumeration order
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Discovered relationships
    pub relationships: Vec<Relationship>,

    /// Pass counters
    pub stats: ClassificationStats,
}

/// What happened to a single pair
#[derive(Debug, Clone)]
enum PairOutcome {
    Accepted(Relationship),
    LowConfidence,
    Unrelated,
    Fallback(Option<Relationship>),
}

/// Drives pairwise classification with a bounded worker pool.
pub struct RelationshipClassifier {
    classifier: Arc<dyn SemanticClassifier>,
    min_confidence: f64,
    max_pairs: usize,
    concurrency: usize,
    timeout: Duration,
}

impl std::fmt::Debug for RelationshipClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationshipClassifier")
            .field("classifier", &self.classifier.model_id())
            .field("min_confidence", &self.min_confidence)
            .field("max_pairs", &self.max_pairs)
            .field("concurrency", &self.concurrency)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RelationshipClassifier {
    /// Create a driver using the classifier-related fields of `config`.
    #[must_use]
    pub fn new(classifier: Arc<dyn SemanticClassifier>, config: &AnalysisConfig) -> Self {
        Self {
            classifier,
            min_confidence: config.min_confidence,
            max_pairs: config.max_pairs,
            concurrency: config.classifier_concurrency.max(1),
            timeout: config.classifier_timeout(),
        }
    }

    /// Discover relationships among `requirements`.
    ///
    /// `run_id` scopes relationship ids to this run.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` if `cancel` fires before every pair has
    /// been evaluated. Classifier failures never surface as errors.
    ///
    /// Pairs of two requirements with the same id are never classified, and
    /// discovered edges failing [`Relationship::validate`] are dropped.
    pub async fn discover(
        &self,
        requirements: &[Requirement],
        run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Discovery> {
        let pairs: Vec<(usize, usize)> = pair_indices(requirements.len())
            .filter(|&(i, j)| requirements[i].id != requirements[j].id)
            .take(self.max_pairs)
            .collect();
        let mut stats = ClassificationStats {
            pairs_available: total_pairs(requirements.len()),
            pairs_evaluated: pairs.len(),
            ..ClassificationStats::default()
        };
        info!(
            requirements = requirements.len(),
            pairs = pairs.len(),
            available = stats.pairs_available,
            concurrency = self.concurrency,
            "Classifying requirement pairs"
        );

        let outcomes: Vec<PairOutcome> = stream::iter(pairs)
            .map(|(i, j)| self.evaluate_pair(&requirements[i], &requirements[j], run_id, cancel))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut relationships = Vec::new();
        for outcome in outcomes {
            match outcome {
                PairOutcome::Accepted(relationship) => {
                    if let Some(relationship) = valid(relationship) {
                        stats.ai_accepted += 1;
                        relationships.push(relationship);
                    }
                }
                PairOutcome::LowConfidence => stats.ai_rejected_low_confidence += 1,
                PairOutcome::Unrelated => stats.ai_no_relationship += 1,
                PairOutcome::Fallback(found) => {
                    stats.fallbacks += 1;
                    if let Some(relationship) = found.and_then(valid) {
                        stats.heuristic_matches += 1;
                        relationships.push(relationship);
                    }
                }
            }
        }

        if stats.fallbacks > 0 {
            warn!(
                fallbacks = stats.fallbacks,
                heuristic_matches = stats.heuristic_matches,
                "Classifier unavailable for some pairs; used heuristic fallback"
            );
        }
        info!(relationships = relationships.len(), "Relationship discovery complete");

        Ok(Discovery {
            relationships,
            stats,
        })
    }

    async fn evaluate_pair(
        &self,
        first: &Requirement,
        second: &Requirement,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PairOutcome> {
        cancel.check()?;

        let call = self
            .classifier
            .classify(first, second, &RelationshipType::ALL);
        let answer = match tokio::time::timeout(self.timeout, call).await {
            Ok(answer) => answer.and_then(|result| result.validate().map(|()| result)),
            Err(_) => Err(ClassifierFailure::Timeout(self.timeout)),
        };

        let result = match answer {
            Ok(result) => result,
            Err(failure) => {
                debug!(
                    first = %first.id,
                    second = %second.id,
                    error = %Error::from(failure),
                    "Falling back to heuristics"
                );
                return Ok(PairOutcome::Fallback(heuristic_relationship(
                    first, second, run_id,
                )));
            }
        };

        let relationship_type = match result.relationship_type {
            Some(relationship_type) if result.has_relationship => relationship_type,
            _ => return Ok(PairOutcome::Unrelated),
        };
        if result.confidence < self.min_confidence {
            debug!(
                first = %first.id,
                second = %second.id,
                confidence = result.confidence,
                min_confidence = self.min_confidence,
                "Discarding low-confidence classification"
            );
            return Ok(PairOutcome::LowConfidence);
        }

        Ok(PairOutcome::Accepted(build_relationship(
            first,
            second,
            relationship_type,
            result.confidence,
            result.bidirectional,
            Provenance::Ai,
            result.reasoning,
            run_id,
        )))
    }
}

/// `relationship` if it passes domain validation; dropped with a warning otherwise.
fn valid(relationship: Relationship) -> Option<Relationship> {
    match relationship.validate() {
        Ok(()) => Some(relationship),
        Err(error) => {
            warn!(relationship = %relationship.id, %error, "Dropping invalid discovered relationship");
            None
        }
    }
}

/// Relationship from the heuristics for a pair, if any rule matches.
fn heuristic_relationship(
    first: &Requirement,
    second: &Requirement,
    run_id: &str,
) -> Option<Relationship> {
    let found = heuristic::classify_pair(&first.text, &second.text)?;
    let (source, target) = match found.direction {
        heuristic::Direction::Forward => (first, second),
        heuristic::Direction::Reverse => (second, first),
    };
    Some(build_relationship(
        source,
        target,
        found.relationship_type,
        found.confidence,
        found.bidirectional,
        Provenance::Heuristic,
        Some(found.reasoning),
        run_id,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_relationship(
    source: &Requirement,
    target: &Requirement,
    relationship_type: RelationshipType,
    confidence: f64,
    bidirectional: bool,
    provenance: Provenance,
    reasoning: Option<String>,
    run_id: &str,
) -> Relationship {
    let id = content_id(
        "rel",
        &[
            run_id,
            source.id.as_str(),
            target.id.as_str(),
            relationship_type.as_str(),
        ],
    );
    Relationship {
        id: RelationshipId::new(id),
        source_requirement_id: source.id.clone(),
        target_requirement_id: target.id.clone(),
        relationship_type,
        confidence: confidence.clamp(0.0, 1.0),
        bidirectional,
        provenance,
        reasoning,
        created_at: Utc::now(),
    }
}

/// Number of unordered pairs among `n` items.
#[must_use]
pub fn total_pairs(n: usize) -> usize {
    n.saturating_mul(n.saturating_sub(1)) / 2
}

/// Unordered index pairs `(i, j)` with `i < j`, in lexicographic order,
/// truncated to `max_pairs`.
#[must_use]
pub fn candidate_pairs(n: usize, max_pairs: usize) -> Vec<(usize, usize)> {
    pair_indices(n).take(max_pairs).collect()
}

fn pair_indices(n: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n).flat_map(move |i| ((i + 1)..n).map(move |j| (i, j)))
}

#[cfg(test)]
mod tests {
    use super::stub::{StubClassifier, StubResponse};
    use super::*;
    use crate::domain::{Priority, RequirementType};

    fn requirement(id: &str, text: &str) -> Requirement {
        Requirement {
            id: id.into(),
            text: text.to_string(),
            requirement_type: RequirementType::Functional,
            priority: Priority::Medium,
            source_document_id: "doc".into(),
        }
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            classifier_timeout_secs: 1,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn pairs_are_enumerated_in_fixed_order() {
        assert_eq!(
            candidate_pairs(4, 100),
            vec![(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]
        );
        assert_eq!(candidate_pairs(4, 2), vec![(0, 1), (0, 2)]);
        assert!(candidate_pairs(1, 100).is_empty());
        assert!(candidate_pairs(0, 100).is_empty());
    }

    #[test]
    fn total_pairs_matches_formula() {
        assert_eq!(total_pairs(0), 0);
        assert_eq!(total_pairs(1), 0);
        assert_eq!(total_pairs(5), 10);
        assert_eq!(total_pairs(15), 105);
    }

    #[tokio::test]
    async fn accepts_confident_answers_and_rejects_weak_ones() {
        let stub = StubClassifier::new(StubResponse::Unrelated)
            .with_response(
                "R1",
                "R2",
                StubResponse::Answer(ClassificationResult::related(
                    RelationshipType::Implements,
                    0.9,
                )),
            )
            .with_response(
                "R1",
                "R3",
                StubResponse::Answer(ClassificationResult::related(
                    RelationshipType::Tests,
                    0.4,
                )),
            );
        let driver = RelationshipClassifier::new(Arc::new(stub), &config());
        let requirements = vec![
            requirement("R1", "alpha"),
            requirement("R2", "beta"),
            requirement("R3", "gamma"),
        ];

        let discovery = driver
            .discover(&requirements, "run-1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(discovery.relationships.len(), 1);
        let accepted = &discovery.relationships[0];
        assert_eq!(accepted.relationship_type, RelationshipType::Implements);
        assert_eq!(accepted.provenance, Provenance::Ai);
        assert_eq!(discovery.stats.ai_accepted, 1);
        assert_eq!(discovery.stats.ai_rejected_low_confidence, 1);
        assert_eq!(discovery.stats.ai_no_relationship, 1);
        assert_eq!(discovery.stats.fallbacks, 0);
    }

    #[tokio::test]
    async fn failures_fall_back_to_heuristics() {
        let stub = StubClassifier::new(StubResponse::Malformed);
        let driver = RelationshipClassifier::new(Arc::new(stub), &config());
        let requirements = vec![
            requirement("R1", "Export monthly reports as PDF"),
            requirement("R2", "Export monthly reports as PDF"),
        ];

        let discovery = driver
            .discover(&requirements, "run-1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(discovery.relationships.len(), 1);
        let found = &discovery.relationships[0];
        assert_eq!(found.provenance, Provenance::Heuristic);
        assert_eq!(found.relationship_type, RelationshipType::Supports);
        assert!(found.bidirectional);
        assert_eq!(discovery.stats.fallbacks, 1);
        assert_eq!(discovery.stats.heuristic_matches, 1);
    }

    #[tokio::test]
    async fn hanging_classifier_times_out_into_fallback() {
        let stub = StubClassifier::new(StubResponse::Hang);
        let driver = RelationshipClassifier::new(Arc::new(stub), &config());
        let requirements = vec![
            requirement("R1", "Checkout requires a saved card"),
            requirement("R2", "Users manage a saved card"),
        ];

        let discovery = driver
            .discover(&requirements, "run-1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(discovery.stats.fallbacks, 1);
        assert_eq!(
            discovery.relationships[0].relationship_type,
            RelationshipType::DependsOn
        );
        assert_eq!(discovery.relationships[0].source_requirement_id.as_str(), "R1");
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_malformed() {
        let stub = StubClassifier::new(StubResponse::Answer(ClassificationResult::related(
            RelationshipType::Refines,
            1.7,
        )));
        let driver = RelationshipClassifier::new(Arc::new(stub), &config());
        let requirements = vec![requirement("R1", "alpha"), requirement("R2", "omega")];

        let discovery = driver
            .discover(&requirements, "run-1", &CancellationToken::new())
            .await
            .unwrap();

        assert!(discovery.relationships.is_empty());
        assert_eq!(discovery.stats.fallbacks, 1);
    }

    #[tokio::test]
    async fn pair_cap_limits_calls() {
        let stub = Arc::new(StubClassifier::new(StubResponse::Unrelated));
        let driver = RelationshipClassifier::new(
            stub.clone(),
            &AnalysisConfig {
                max_pairs: 3,
                ..config()
            },
        );
        let requirements: Vec<Requirement> = (0..6)
            .map(|i| requirement(&format!("R{i}"), "text"))
            .collect();

        let discovery = driver
            .discover(&requirements, "run-1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(discovery.stats.pairs_available, 15);
        assert_eq!(discovery.stats.pairs_evaluated, 3);
        assert_eq!(stub.calls(), 3);
    }

    #[tokio::test]
    async fn cancelled_run_returns_error() {
        let stub = StubClassifier::new(StubResponse::Unrelated);
        let driver = RelationshipClassifier::new(Arc::new(stub), &config());
        let requirements = vec![requirement("R1", "a"), requirement("R2", "b")];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = driver
            .discover(&requirements, "run-1", &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn results_keep_enumeration_order_regardless_of_latency() {
        let stub = StubClassifier::new(StubResponse::Answer(ClassificationResult::related(
            RelationshipType::Supports,
            0.8,
        )))
        .with_delay("R0", "R1", Duration::from_millis(50));
        let driver = RelationshipClassifier::new(Arc::new(stub), &config());
        let requirements: Vec<Requirement> = (0..3)
            .map(|i| requirement(&format!("R{i}"), "text"))
            .collect();

        let discovery = driver
            .discover(&requirements, "run-1", &CancellationToken::new())
            .await
            .unwrap();

        let pairs: Vec<(&str, &str)> = discovery
            .relationships
            .iter()
            .map(|r| {
                (
                    r.source_requirement_id.as_str(),
                    r.target_requirement_id.as_str(),
                )
            })
            .collect();
        assert_eq!(pairs, vec![("R0", "R1"), ("R0", "R2"), ("R1", "R2")]);
    }

    #[tokio::test]
    async fn duplicated_ids_are_never_paired_with_themselves() {
        let driver = RelationshipClassifier::new(Arc::new(UnavailableClassifier), &config());
        let requirements = vec![
            requirement("R1", "Export monthly reports as PDF"),
            requirement("R1", "Export monthly reports as PDF"),
            requirement("R2", "Export monthly reports as PDF"),
        ];

        let discovery = driver
            .discover(&requirements, "run-1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(discovery.stats.pairs_evaluated, 2);
        assert_eq!(discovery.relationships.len(), 2);
        assert!(discovery.relationships.iter().all(|r| {
            r.source_requirement_id != r.target_requirement_id && r.validate().is_ok()
        }));
    }
}
