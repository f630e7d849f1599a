//! The traceability engine: the four public operations.
//!
//! ```text
//! load requirements → classify pairs → build graph → coverage / impact → report → persist → alert
//! ```
//!
//! Every operation runs under its own correlation id, attached to a tracing
//! span and to any returned [`RunError`]. Nothing is persisted until the run
//! has fully succeeded, and then everything the run produced is saved in a
//! single atomic batch. Alerts go out only after that batch is stored.

use crate::cancel::CancellationToken;
use crate::classifier::{RelationshipClassifier, SemanticClassifier};
use crate::config::{AnalysisConfig, ImpactOptions, MatrixOptions};
use crate::coverage::{CoverageAnalyzer, CoverageRecord, CoverageReport};
use crate::domain::{
    DocumentId, MatrixId, NewRelationship, Provenance, Relationship, RelationshipId, RequirementId,
    validate_confidence,
};
use crate::error::{Error, Result, RunError};
use crate::id_generation::{content_id, unique_id};
use crate::impact::{ImpactAnalysis, ImpactPropagator};
use crate::loader::RequirementSource;
use crate::matrix::TraceabilityMatrix;
use crate::report::{AnalysisReport, ReportAssembler};
use crate::storage::{
    EventSink, INDEX_REQUIREMENT, INDEX_TYPE, NoopEventSink, RecordType, Repository, fetch_record,
    query_records, to_envelope,
};
use chrono::Utc;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};

/// Outcome of a matrix build
#[derive(Debug, Clone)]
pub struct MatrixRun {
    /// The persisted matrix
    pub matrix: TraceabilityMatrix,

    /// The persisted report, including coverage
    pub report: AnalysisReport,
}

/// Outcome of an impact analysis
#[derive(Debug, Clone)]
pub struct ImpactRun {
    /// Id of the persisted impact record
    pub impact_id: String,

    /// Matrix the analysis ran against
    pub matrix_id: MatrixId,

    /// The analysis
    pub analysis: ImpactAnalysis,

    /// The persisted report
    pub report: AnalysisReport,
}

/// Wires the collaborators together and runs analyses.
pub struct TraceEngine {
    source: Arc<dyn RequirementSource>,
    classifier: Arc<dyn SemanticClassifier>,
    repository: Arc<dyn Repository>,
    sink: Arc<dyn EventSink>,
    config: AnalysisConfig,
}

impl std::fmt::Debug for TraceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceEngine")
            .field("classifier", &self.classifier.model_id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TraceEngine {
    /// Create an engine that drops alerts; see [`TraceEngine::with_event_sink`].
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidParameter` if `config` is invalid.
    pub fn new(
        source: Arc<dyn RequirementSource>,
        classifier: Arc<dyn SemanticClassifier>,
        repository: Arc<dyn Repository>,
        config: AnalysisConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            classifier,
            repository,
            sink: Arc::new(NoopEventSink),
            config,
        })
    }

    /// Publish alerts to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Engine configuration
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Reports name the semantic classifier's model alongside the configured
    /// heuristic model, e.g. `gpt-4o+heuristic-v1`.
    fn assembler(&self, config: &AnalysisConfig) -> ReportAssembler {
        let model = format!("{}+{}", self.classifier.model_id(), config.model);
        ReportAssembler::new(model, config.retention_ttl())
    }

    /// Run `op` under a fresh correlation id and span.
    async fn run<T, F>(&self, operation: &'static str, op: impl FnOnce(String) -> F) -> std::result::Result<T, RunError>
    where
        F: Future<Output = Result<T>>,
    {
        let correlation_id = unique_id("run", operation);
        let span = info_span!("run", operation, correlation_id = %correlation_id);
        let result = op(correlation_id.clone()).instrument(span.clone()).await;
        result.map_err(|error| {
            span.in_scope(|| warn!(code = error.code(), %error, "Run failed"));
            error.with_correlation(correlation_id)
        })
    }

    /// Build and persist a traceability matrix for the given documents.
    ///
    /// # Errors
    ///
    /// - `INVALID_PARAMETER` for an empty document list or invalid options
    /// - `NOT_FOUND` for an unresolved document id
    /// - `PERSISTENCE_ERROR` if the run's records cannot be saved
    pub async fn build_traceability_matrix(
        &self,
        document_ids: &[DocumentId],
        options: &MatrixOptions,
    ) -> std::result::Result<MatrixRun, RunError> {
        self.build_traceability_matrix_with_cancel(document_ids, options, &CancellationToken::new())
            .await
    }

    /// [`TraceEngine::build_traceability_matrix`] with cooperative cancellation.
    ///
    /// # Errors
    ///
    /// As [`TraceEngine::build_traceability_matrix`], plus `CANCELLED`.
    pub async fn build_traceability_matrix_with_cancel(
        &self,
        document_ids: &[DocumentId],
        options: &MatrixOptions,
        cancel: &CancellationToken,
    ) -> std::result::Result<MatrixRun, RunError> {
        self.run("build_matrix", |correlation_id| {
            self.build_matrix_inner(document_ids, options, cancel, correlation_id)
        })
        .await
    }

    async fn build_matrix_inner(
        &self,
        document_ids: &[DocumentId],
        options: &MatrixOptions,
        cancel: &CancellationToken,
        correlation_id: String,
    ) -> Result<MatrixRun> {
        let config = self.config.with_matrix_options(options)?;
        let requirements = self.source.load_requirements(document_ids).await?;
        info!(
            documents = document_ids.len(),
            requirements = requirements.len(),
            classifier = %self.classifier.model_id(),
            "Building traceability matrix"
        );

        let seed = document_ids
            .iter()
            .map(DocumentId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let matrix_id = MatrixId::new(unique_id("mtx", &seed));

        let discovery = RelationshipClassifier::new(self.classifier.clone(), &config)
            .discover(&requirements, matrix_id.as_str(), cancel)
            .await?;
        let mut relationships = discovery.relationships;

        if !options.exclude_manual {
            let known: HashSet<&RequirementId> = requirements.iter().map(|r| &r.id).collect();
            let mut manual: Vec<Relationship> = self
                .manual_relationships()
                .await?
                .into_iter()
                .filter(|r| {
                    known.contains(&r.source_requirement_id) && known.contains(&r.target_requirement_id)
                })
                .collect();
            manual.sort_by(|a, b| a.id.cmp(&b.id));
            debug!(manual = manual.len(), "Merging manual relationships");
            relationships.extend(manual);
        }
        cancel.check()?;

        let mut unique_documents: Vec<DocumentId> = Vec::new();
        for id in document_ids {
            if !unique_documents.contains(id) {
                unique_documents.push(id.clone());
            }
        }
        let matrix = TraceabilityMatrix::new(
            matrix_id,
            unique_documents,
            requirements,
            relationships,
            discovery.stats,
        )
        .with_coverage_threshold(config.coverage_threshold);
        let coverage = coverage_of(&matrix);

        let assembler = self.assembler(&config);
        let assembled = assembler.assemble_matrix(&matrix, coverage, &correlation_id)?;
        self.repository.save_all(assembled.records).await?;
        assembler
            .publish_alerts(self.sink.as_ref(), &assembled.report)
            .await;

        info!(
            matrix = %matrix.id,
            relationships = matrix.relationships.len(),
            coverage = assembled.report.coverage.coverage_percentage,
            "Traceability matrix stored"
        );
        Ok(MatrixRun {
            matrix,
            report: assembled.report,
        })
    }

    /// Load a persisted matrix.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` if no live matrix has the id.
    pub async fn get_matrix(&self, matrix_id: &MatrixId) -> std::result::Result<TraceabilityMatrix, RunError> {
        self.run("get_matrix", |_| self.load_matrix(matrix_id)).await
    }

    async fn load_matrix(&self, matrix_id: &MatrixId) -> Result<TraceabilityMatrix> {
        fetch_record(self.repository.as_ref(), RecordType::Matrix, matrix_id.as_str())
            .await?
            .ok_or_else(|| Error::not_found("matrix", matrix_id.as_str()))
    }

    /// Coverage of a persisted matrix.
    ///
    /// Recomputed from the matrix if the stored coverage record is gone.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` if the matrix is unknown or expired.
    pub async fn get_coverage(&self, matrix_id: &MatrixId) -> std::result::Result<CoverageRecord, RunError> {
        self.run("get_coverage", |_| self.coverage_inner(matrix_id)).await
    }

    async fn coverage_inner(&self, matrix_id: &MatrixId) -> Result<CoverageRecord> {
        if let Some(record) =
            fetch_record::<CoverageRecord>(self.repository.as_ref(), RecordType::Coverage, matrix_id.as_str()).await?
        {
            return Ok(record);
        }
        let matrix = self.load_matrix(matrix_id).await?;
        debug!(matrix = %matrix_id, "Coverage record missing; recomputing");
        Ok(CoverageRecord {
            id: matrix_id.to_string(),
            matrix_id: matrix_id.clone(),
            generated_at: Utc::now(),
            report: coverage_of(&matrix),
        })
    }

    /// Analyze and persist the impact of changing a requirement.
    ///
    /// Runs against `options.matrix_id`, or the newest live matrix that
    /// contains the requirement.
    ///
    /// # Errors
    ///
    /// - `INVALID_PARAMETER` for invalid options or a blank description
    /// - `NOT_FOUND` for an unknown requirement or matrix; nothing is persisted
    /// - `PERSISTENCE_ERROR` if the run's records cannot be saved
    pub async fn analyze_impact(
        &self,
        requirement_id: &RequirementId,
        change_description: &str,
        options: &ImpactOptions,
    ) -> std::result::Result<ImpactRun, RunError> {
        self.analyze_impact_with_cancel(requirement_id, change_description, options, &CancellationToken::new())
            .await
    }

    /// [`TraceEngine::analyze_impact`] with cooperative cancellation.
    ///
    /// # Errors
    ///
    /// As [`TraceEngine::analyze_impact`], plus `CANCELLED`.
    pub async fn analyze_impact_with_cancel(
        &self,
        requirement_id: &RequirementId,
        change_description: &str,
        options: &ImpactOptions,
        cancel: &CancellationToken,
    ) -> std::result::Result<ImpactRun, RunError> {
        self.run("analyze_impact", |correlation_id| {
            self.impact_inner(requirement_id, change_description, options, cancel, correlation_id)
        })
        .await
    }

    async fn impact_inner(
        &self,
        requirement_id: &RequirementId,
        change_description: &str,
        options: &ImpactOptions,
        cancel: &CancellationToken,
        correlation_id: String,
    ) -> Result<ImpactRun> {
        let config = self.config.with_impact_options(options)?;

        let matrix = match &options.matrix_id {
            Some(matrix_id) => self.load_matrix(matrix_id).await?,
            None => query_records::<TraceabilityMatrix>(
                self.repository.as_ref(),
                RecordType::Matrix,
                INDEX_REQUIREMENT,
                requirement_id.as_str(),
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found("requirement", requirement_id.as_str()))?,
        };
        info!(requirement = %requirement_id, matrix = %matrix.id, "Analyzing impact");

        let mut propagator = ImpactPropagator::new(&config);
        let analysis = propagator.propagate(
            requirement_id,
            change_description,
            &matrix.graph(),
            &matrix.requirement_map(),
            cancel,
        )?;

        let coverage = self.coverage_inner(&matrix.id).await?.report;
        let assembler = self.assembler(&config);
        let assembled = assembler.assemble_impact(&matrix.id, coverage, analysis.clone(), &correlation_id)?;
        self.repository.save_all(assembled.records).await?;
        assembler
            .publish_alerts(self.sink.as_ref(), &assembled.report)
            .await;

        Ok(ImpactRun {
            impact_id: assembled.record_id,
            matrix_id: matrix.id,
            analysis,
            report: assembled.report,
        })
    }

    /// Create or replace a manually curated relationship.
    ///
    /// The id is derived from `(source, target, type)`, so submitting the
    /// same triple again replaces the earlier record. Manual relationships
    /// are merged into matrices built afterwards.
    ///
    /// # Errors
    ///
    /// - `INVALID_PARAMETER` for an out-of-range confidence
    /// - `NOT_FOUND` if either requirement is unknown to the requirement source
    pub async fn upsert_manual_relationship(
        &self,
        new: NewRelationship,
    ) -> std::result::Result<Relationship, RunError> {
        self.run("upsert_manual_relationship", |_| self.upsert_inner(new))
            .await
    }

    async fn upsert_inner(&self, new: NewRelationship) -> Result<Relationship> {
        validate_confidence(new.confidence)?;
        for id in [&new.source_requirement_id, &new.target_requirement_id] {
            if self.source.get_requirement(id).await?.is_none() {
                return Err(Error::not_found("requirement", id.as_str()));
            }
        }

        let id = content_id(
            "man",
            &[
                new.source_requirement_id.as_str(),
                new.target_requirement_id.as_str(),
                new.relationship_type.as_str(),
            ],
        );
        let relationship = Relationship {
            id: RelationshipId::new(id),
            source_requirement_id: new.source_requirement_id,
            target_requirement_id: new.target_requirement_id,
            relationship_type: new.relationship_type,
            confidence: new.confidence,
            bidirectional: new.bidirectional,
            provenance: Provenance::Manual,
            reasoning: new.reasoning,
            created_at: Utc::now(),
        };
        relationship.validate()?;

        let envelope = to_envelope(
            RecordType::ManualRelationship,
            relationship.id.as_str(),
            &relationship,
            None,
        )?
        .with_index(INDEX_REQUIREMENT, relationship.source_requirement_id.as_str())
        .with_index(INDEX_REQUIREMENT, relationship.target_requirement_id.as_str());
        self.repository.save(envelope).await?;

        info!(
            relationship = %relationship.id,
            source = %relationship.source_requirement_id,
            target = %relationship.target_requirement_id,
            relationship_type = %relationship.relationship_type,
            "Manual relationship stored"
        );
        Ok(relationship)
    }

    /// Every live manual relationship.
    ///
    /// # Errors
    ///
    /// `PERSISTENCE_ERROR` if a stored relationship cannot be decoded.
    pub async fn list_manual_relationships(&self) -> std::result::Result<Vec<Relationship>, RunError> {
        self.run("list_manual_relationships", |_| self.manual_relationships())
            .await
    }

    async fn manual_relationships(&self) -> Result<Vec<Relationship>> {
        query_records(
            self.repository.as_ref(),
            RecordType::ManualRelationship,
            INDEX_TYPE,
            RecordType::ManualRelationship.as_str(),
        )
        .await
    }

    /// Remove expired records from the repository.
    ///
    /// # Errors
    ///
    /// `PERSISTENCE_ERROR` if the repository cannot be rewritten.
    pub async fn purge_expired(&self) -> std::result::Result<usize, RunError> {
        self.run("purge_expired", |_| async {
            let removed = self.repository.purge_expired().await?;
            info!(removed, "Purged expired records");
            Ok(removed)
        })
        .await
    }
}

/// Coverage against the threshold the matrix was built with.
fn coverage_of(matrix: &TraceabilityMatrix) -> CoverageReport {
    CoverageAnalyzer::new(matrix.coverage_threshold).analyze(&matrix.requirements, &matrix.relationships)
}
