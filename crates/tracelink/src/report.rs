//! Analysis report assembly.
//!
//! A report bundles the coverage of a matrix, and the impact analysis when
//! one was requested, with generation metadata. The assembler also produces
//! the envelopes a run persists; alerts are published separately, after the
//! caller has persisted those envelopes.

use crate::coverage::{CoverageRecord, CoverageReport, GapKind};
use crate::domain::MatrixId;
use crate::error::Result;
use crate::id_generation::unique_id;
use crate::impact::{ImpactAnalysis, ImpactRecord, RiskLevel};
use crate::matrix::TraceabilityMatrix;
use crate::storage::{
    EventSink, INDEX_DOCUMENT, INDEX_MATRIX, INDEX_REQUIREMENT, RecordType, to_envelope,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracelink_store::RecordEnvelope;
use tracing::warn;

/// Version of the [`AnalysisReport`] layout
pub const SCHEMA_VERSION: u32 = 1;

/// Who produced a report, and when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Classifier model / version identifier
    pub model: String,

    /// Version of this engine
    pub engine_version: String,

    /// Generation timestamp
    pub generated_at: DateTime<Utc>,

    /// Correlation id of the run
    pub correlation_id: String,
}

/// Alert kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Matrix coverage is below the configured threshold
    LowCoverage,

    /// An impact analysis came out with high overall risk
    HighImpactRisk,
}

impl AlertKind {
    /// Topic the alert is published on
    #[must_use]
    pub fn topic(self) -> &'static str {
        match self {
            AlertKind::LowCoverage => "low_coverage",
            AlertKind::HighImpactRisk => "high_impact_risk",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

/// An alert raised by a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Alert kind
    pub kind: AlertKind,

    /// Human-readable description
    pub message: String,
}

/// Versioned record of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Report id
    pub id: String,

    /// Layout version, see [`SCHEMA_VERSION`]
    pub schema_version: u32,

    /// Generation metadata
    pub metadata: GenerationMetadata,

    /// Matrix the report covers
    pub matrix_id: MatrixId,

    /// Coverage of the matrix
    pub coverage: CoverageReport,

    /// Impact analysis, for impact runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<ImpactAnalysis>,

    /// Alerts raised by this report
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

/// A report and the envelopes its run must persist
#[derive(Debug, Clone)]
pub struct Assembled {
    /// Id of the run's primary artifact (matrix or impact record)
    pub record_id: String,

    /// The report
    pub report: AnalysisReport,

    /// Envelopes to persist in one atomic batch (the report included)
    pub records: Vec<RecordEnvelope>,
}

/// Builds reports and persisted records for analysis runs.
#[derive(Debug, Clone)]
pub struct ReportAssembler {
    model: String,
    retention: chrono::Duration,
}

impl ReportAssembler {
    /// Assembler stamping `model` into metadata and `retention` onto records.
    pub fn new(model: impl Into<String>, retention: chrono::Duration) -> Self {
        Self {
            model: model.into(),
            retention,
        }
    }

    fn metadata(&self, correlation_id: &str) -> GenerationMetadata {
        GenerationMetadata {
            model: self.model.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
            correlation_id: correlation_id.to_string(),
        }
    }

    /// Assemble the records of a matrix build.
    ///
    /// Persists the matrix (indexed by matrix, requirement, and document),
    /// its coverage (stored under the matrix id), and the report.
    ///
    /// # Errors
    ///
    /// Returns `Error::Persistence` if a record fails to serialize.
    pub fn assemble_matrix(
        &self,
        matrix: &TraceabilityMatrix,
        coverage: CoverageReport,
        correlation_id: &str,
    ) -> Result<Assembled> {
        let metadata = self.metadata(correlation_id);
        let mut alerts = Vec::new();
        if coverage.has_gap(GapKind::LowOverallCoverage) {
            alerts.push(Alert {
                kind: AlertKind::LowCoverage,
                message: format!(
                    "Matrix {} coverage is {:.1}% ({} of {} requirements tracked)",
                    matrix.id,
                    coverage.coverage_percentage,
                    coverage.tracked_count,
                    coverage.total_requirements
                ),
            });
        }

        let coverage_record = CoverageRecord {
            id: matrix.id.to_string(),
            matrix_id: matrix.id.clone(),
            generated_at: metadata.generated_at,
            report: coverage.clone(),
        };
        let report = AnalysisReport {
            id: unique_id("rpt", matrix.id.as_str()),
            schema_version: SCHEMA_VERSION,
            metadata,
            matrix_id: matrix.id.clone(),
            coverage,
            impact: None,
            alerts,
        };

        let mut matrix_envelope = self
            .envelope(RecordType::Matrix, matrix.id.as_str(), matrix)?
            .with_index(INDEX_MATRIX, matrix.id.as_str());
        for requirement in &matrix.requirements {
            matrix_envelope = matrix_envelope.with_index(INDEX_REQUIREMENT, requirement.id.as_str());
        }
        for document_id in &matrix.document_ids {
            matrix_envelope = matrix_envelope.with_index(INDEX_DOCUMENT, document_id.as_str());
        }

        let records = vec![
            matrix_envelope,
            self.envelope(RecordType::Coverage, &coverage_record.id, &coverage_record)?
                .with_index(INDEX_MATRIX, matrix.id.as_str()),
            self.report_envelope(&report)?,
        ];
        Ok(Assembled {
            record_id: matrix.id.to_string(),
            report,
            records,
        })
    }

    /// Assemble the records of an impact analysis.
    ///
    /// # Errors
    ///
    /// Returns `Error::Persistence` if a record fails to serialize.
    pub fn assemble_impact(
        &self,
        matrix_id: &MatrixId,
        coverage: CoverageReport,
        analysis: ImpactAnalysis,
        correlation_id: &str,
    ) -> Result<Assembled> {
        let metadata = self.metadata(correlation_id);
        let mut alerts = Vec::new();
        if analysis.overall_risk == RiskLevel::High {
            alerts.push(Alert {
                kind: AlertKind::HighImpactRisk,
                message: format!(
                    "Changing {} has high risk: {} requirement(s) affected",
                    analysis.requirement_id, analysis.total_affected_requirements
                ),
            });
        }

        let record = ImpactRecord {
            id: unique_id("imp", analysis.requirement_id.as_str()),
            matrix_id: matrix_id.clone(),
            generated_at: metadata.generated_at,
            analysis: analysis.clone(),
        };
        let report = AnalysisReport {
            id: unique_id("rpt", matrix_id.as_str()),
            schema_version: SCHEMA_VERSION,
            metadata,
            matrix_id: matrix_id.clone(),
            coverage,
            impact: Some(analysis),
            alerts,
        };

        let mut impact_envelope = self
            .envelope(RecordType::Impact, &record.id, &record)?
            .with_index(INDEX_MATRIX, matrix_id.as_str())
            .with_index(INDEX_REQUIREMENT, record.analysis.requirement_id.as_str());
        for impact in record.analysis.all_impacts() {
            impact_envelope = impact_envelope.with_index(INDEX_REQUIREMENT, impact.requirement_id.as_str());
        }

        let records = vec![impact_envelope, self.report_envelope(&report)?];
        Ok(Assembled {
            record_id: record.id,
            report,
            records,
        })
    }

    fn envelope<T: Serialize>(&self, record_type: RecordType, id: &str, body: &T) -> Result<RecordEnvelope> {
        to_envelope(record_type, id, body, Some(self.retention))
    }

    fn report_envelope(&self, report: &AnalysisReport) -> Result<RecordEnvelope> {
        let mut envelope = self
            .envelope(RecordType::Report, &report.id, report)?
            .with_index(INDEX_MATRIX, report.matrix_id.as_str());
        if let Some(impact) = &report.impact {
            envelope = envelope.with_index(INDEX_REQUIREMENT, impact.requirement_id.as_str());
        }
        Ok(envelope)
    }

    /// Publish the report's alerts. Delivery failures are logged, not returned.
    pub async fn publish_alerts(&self, sink: &dyn EventSink, report: &AnalysisReport) -> usize {
        let mut published = 0;
        for alert in &report.alerts {
            let message = serde_json::json!({
                "report_id": report.id,
                "matrix_id": report.matrix_id,
                "correlation_id": report.metadata.correlation_id,
                "message": alert.message,
            });
            match sink.publish(alert.kind.topic(), &message).await {
                Ok(()) => published += 1,
                Err(e) => warn!(topic = alert.kind.topic(), error = %e, "Failed to publish alert"),
            }
        }
        published
    }
}
