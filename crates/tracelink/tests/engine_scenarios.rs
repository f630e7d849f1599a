//! End-to-end analysis runs against in-memory collaborators.

mod common;

use common::{FailingRepository, Script, ScriptedClassifier, engine, requirement, source};
use std::sync::Arc;
use tracelink::cancel::CancellationToken;
use tracelink::classifier::UnavailableClassifier;
use tracelink::classifier::command::{CommandClassifier, CommandSpec};
use tracelink::config::{AnalysisConfig, ImpactOptions, MatrixOptions};
use tracelink::coverage::GapKind;
use tracelink::domain::{
    DocumentId, MatrixId, NewRelationship, Priority, Provenance, RelationshipType, RequirementId,
};
use tracelink::impact::RiskLevel;
use tracelink::loader::Document;
use tracelink::storage::{INDEX_TYPE, InMemoryRepository, RecordType, Repository, to_envelope};

fn docs(ids: &[&str]) -> Vec<DocumentId> {
    ids.iter().map(|id| DocumentId::new(*id)).collect()
}

async fn stored(repository: &InMemoryRepository, record_type: RecordType) -> usize {
    repository
        .query(INDEX_TYPE, record_type.as_str())
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn unrelated_requirements_have_zero_coverage() {
    let repository = Arc::new(InMemoryRepository::new());
    let (engine, sink) = engine(
        source([
            requirement("R1", "srs", "Users reset passwords by email"),
            requirement("R2", "srs", "Invoices export to PDF"),
            requirement("R3", "srs", "Dashboards refresh every minute"),
        ]),
        ScriptedClassifier::new(Script::Unrelated),
        repository.clone(),
        AnalysisConfig::default(),
    );

    let run = engine
        .build_traceability_matrix(&docs(&["srs"]), &MatrixOptions::default())
        .await
        .unwrap();

    let coverage = &run.report.coverage;
    assert!(run.matrix.relationships.is_empty());
    assert!(coverage.coverage_percentage.abs() < f64::EPSILON);
    assert_eq!(coverage.orphaned_requirements.len(), 3);
    assert!(coverage.has_gap(GapKind::LowOverallCoverage));
    assert_eq!(run.matrix.stats.ai_no_relationship, 3);
    assert_eq!(sink.topics().await, vec!["low_coverage"]);
    assert_eq!(stored(&repository, RecordType::Matrix).await, 1);
    assert_eq!(stored(&repository, RecordType::Coverage).await, 1);
    assert_eq!(stored(&repository, RecordType::Report).await, 1);
}

#[tokio::test]
async fn identical_text_yields_bidirectional_supports() {
    let (engine, _sink) = engine(
        source([
            requirement("R1", "srs", "Export monthly invoices as PDF files"),
            requirement("R2", "ops", "Export monthly invoices as PDF files"),
        ]),
        UnavailableClassifier,
        Arc::new(InMemoryRepository::new()),
        AnalysisConfig::default(),
    );

    let run = engine
        .build_traceability_matrix(&docs(&["srs", "ops"]), &MatrixOptions::default())
        .await
        .unwrap();

    assert_eq!(run.matrix.relationships.len(), 1);
    let relationship = &run.matrix.relationships[0];
    assert_eq!(relationship.relationship_type, RelationshipType::Supports);
    assert!(relationship.bidirectional);
    assert_eq!(relationship.provenance, Provenance::Heuristic);
    assert!((relationship.confidence - 1.0).abs() < 1e-9);
    // Bidirectional edges show up in both adjacency cells.
    assert_eq!(run.matrix.adjacency[&RequirementId::new("R1")].len(), 1);
    assert_eq!(run.matrix.adjacency[&RequirementId::new("R2")].len(), 1);
    assert!((run.report.coverage.coverage_percentage - 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn isolated_requirement_has_no_impact() {
    let (engine, _sink) = engine(
        source([
            requirement("R1", "srs", "Orders are paid by card"),
            requirement("R2", "srs", "Card payments are captured nightly"),
            requirement("R3", "srs", "The help page lists support hours"),
        ]),
        ScriptedClassifier::new(Script::Unrelated).relate("R1", "R2", RelationshipType::DependsOn, 0.9),
        Arc::new(InMemoryRepository::new()),
        AnalysisConfig::default(),
    );
    engine
        .build_traceability_matrix(&docs(&["srs"]), &MatrixOptions::default())
        .await
        .unwrap();

    let run = engine
        .analyze_impact(
            &RequirementId::new("R3"),
            "Support hours move to 8-18",
            &ImpactOptions::default(),
        )
        .await
        .unwrap();

    assert!(run.analysis.direct_impacts.is_empty());
    assert!(run.analysis.cascading_impacts.is_empty());
    assert_eq!(run.analysis.total_affected_requirements, 0);
    assert_eq!(run.analysis.overall_risk, RiskLevel::Low);
}

fn chain_engine() -> (tracelink::TraceEngine, tracelink::storage::RecordingEventSink) {
    engine(
        source([
            requirement("A", "srs", "Accounts have a unique handle"),
            requirement("B", "srs", "Profiles display the account handle"),
            requirement("C", "srs", "Profile pages are cached"),
            requirement("D", "srs", "Cache entries expire after an hour"),
        ]),
        ScriptedClassifier::new(Script::Unrelated)
            .relate("A", "B", RelationshipType::DependsOn, 0.9)
            .relate("B", "C", RelationshipType::DependsOn, 0.9)
            .relate("C", "D", RelationshipType::DependsOn, 0.9),
        Arc::new(InMemoryRepository::new()),
        AnalysisConfig::default(),
    )
}

#[tokio::test]
async fn depth_bound_stops_traversal() {
    let (engine, _sink) = chain_engine();
    engine
        .build_traceability_matrix(&docs(&["srs"]), &MatrixOptions::default())
        .await
        .unwrap();

    let run = engine
        .analyze_impact(
            &RequirementId::new("A"),
            "Handles become case-insensitive",
            &ImpactOptions {
                max_depth: Some(1),
                ..ImpactOptions::default()
            },
        )
        .await
        .unwrap();

    let direct: Vec<&str> = run
        .analysis
        .direct_impacts
        .iter()
        .map(|i| i.requirement_id.as_str())
        .collect();
    assert_eq!(direct, vec!["B"]);
    assert!(run.analysis.cascading_impacts.is_empty());
    assert_eq!(run.analysis.total_affected_requirements, 1);
    assert_eq!(run.analysis.max_depth, 1);
}

#[tokio::test]
async fn full_depth_reports_cascading_impacts() {
    let (engine, _sink) = chain_engine();
    engine
        .build_traceability_matrix(&docs(&["srs"]), &MatrixOptions::default())
        .await
        .unwrap();

    let run = engine
        .analyze_impact(
            &RequirementId::new("A"),
            "Handles become case-insensitive",
            &ImpactOptions::default(),
        )
        .await
        .unwrap();

    let cascading: Vec<(&str, usize)> = run
        .analysis
        .cascading_impacts
        .iter()
        .map(|i| (i.requirement_id.as_str(), i.depth))
        .collect();
    assert_eq!(cascading, vec![("C", 2), ("D", 3)]);
    assert_eq!(run.analysis.total_affected_requirements, 3);
}

#[tokio::test]
async fn timed_out_classifier_falls_back_to_heuristics() {
    let (engine, _sink) = engine(
        source([
            requirement("R1", "srs", "Export monthly invoices as PDF files"),
            requirement("R2", "srs", "Export monthly invoices as PDF files"),
            requirement("R3", "srs", "Audit logs are retained for a year"),
            requirement("R4", "srs", "Login requires a verified email"),
            requirement("R5", "srs", "Themes switch between light and dark"),
        ]),
        ScriptedClassifier::new(Script::TimedOut),
        Arc::new(InMemoryRepository::new()),
        AnalysisConfig::default(),
    );

    let run = engine
        .build_traceability_matrix(&docs(&["srs"]), &MatrixOptions::default())
        .await
        .unwrap();

    assert_eq!(run.matrix.stats.pairs_evaluated, 10);
    assert_eq!(run.matrix.stats.fallbacks, 10);
    assert_eq!(run.matrix.stats.ai_accepted, 0);
    assert!(!run.matrix.relationships.is_empty());
    assert!(
        run.matrix
            .relationships
            .iter()
            .all(|r| r.provenance == Provenance::Heuristic)
    );
    let reloaded = engine.get_matrix(&run.matrix.id).await.unwrap();
    assert_eq!(reloaded.relationships, run.matrix.relationships);
}

#[tokio::test]
async fn hanging_classifier_is_cut_off_by_timeout() {
    let config = AnalysisConfig {
        classifier_timeout_secs: 1,
        ..AnalysisConfig::default()
    };
    let (engine, _sink) = engine(
        source([
            requirement("R1", "srs", "Export monthly invoices as PDF files"),
            requirement("R2", "srs", "Export monthly invoices as PDF files"),
            requirement("R3", "srs", "Themes switch between light and dark"),
        ]),
        ScriptedClassifier::new(Script::Hang),
        Arc::new(InMemoryRepository::new()),
        config,
    );

    let run = engine
        .build_traceability_matrix(&docs(&["srs"]), &MatrixOptions::default())
        .await
        .unwrap();

    assert_eq!(run.matrix.stats.fallbacks, 3);
    assert_eq!(run.matrix.relationships.len(), 1);
}

#[tokio::test]
async fn unknown_requirement_is_not_found_and_nothing_is_persisted() {
    let repository = Arc::new(InMemoryRepository::new());
    let (engine, sink) = chain_engine_with(repository.clone());
    engine
        .build_traceability_matrix(&docs(&["srs"]), &MatrixOptions::default())
        .await
        .unwrap();
    let reports_before = stored(&repository, RecordType::Report).await;
    let alerts_before = sink.events().await.len();

    let err = engine
        .analyze_impact(&RequirementId::new("nope"), "Anything", &ImpactOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "NOT_FOUND");
    assert!(err.correlation_id.starts_with("run-"));
    assert_eq!(stored(&repository, RecordType::Impact).await, 0);
    assert_eq!(stored(&repository, RecordType::Report).await, reports_before);
    assert_eq!(sink.events().await.len(), alerts_before);
}

fn chain_engine_with(
    repository: Arc<InMemoryRepository>,
) -> (tracelink::TraceEngine, tracelink::storage::RecordingEventSink) {
    engine(
        source([
            requirement("A", "srs", "Accounts have a unique handle"),
            requirement("B", "srs", "Profiles display the account handle"),
        ]),
        ScriptedClassifier::new(Script::Unrelated).relate("A", "B", RelationshipType::Refines, 0.8),
        repository,
        AnalysisConfig::default(),
    )
}

#[tokio::test]
async fn unknown_matrix_is_not_found() {
    let (engine, _sink) = chain_engine_with(Arc::new(InMemoryRepository::new()));

    let err = engine
        .analyze_impact(
            &RequirementId::new("A"),
            "Anything",
            &ImpactOptions {
                matrix_id: Some(MatrixId::new("mtx-missing")),
                ..ImpactOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");

    let err = engine.get_coverage(&MatrixId::new("mtx-missing")).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn invalid_parameters_are_rejected_before_work() {
    let repository = Arc::new(InMemoryRepository::new());
    let (engine, _sink) = chain_engine_with(repository.clone());
    engine
        .build_traceability_matrix(&docs(&["srs"]), &MatrixOptions::default())
        .await
        .unwrap();

    let blank = engine
        .analyze_impact(&RequirementId::new("A"), "   ", &ImpactOptions::default())
        .await
        .unwrap_err();
    assert_eq!(blank.code(), "INVALID_PARAMETER");

    let zero_depth = engine
        .analyze_impact(
            &RequirementId::new("A"),
            "Anything",
            &ImpactOptions {
                max_depth: Some(0),
                ..ImpactOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(zero_depth.code(), "INVALID_PARAMETER");

    let no_documents = engine
        .build_traceability_matrix(&[], &MatrixOptions::default())
        .await
        .unwrap_err();
    assert_eq!(no_documents.code(), "INVALID_PARAMETER");

    let unknown_document = engine
        .build_traceability_matrix(&docs(&["srs", "missing"]), &MatrixOptions::default())
        .await
        .unwrap_err();
    assert_eq!(unknown_document.code(), "NOT_FOUND");

    assert_eq!(stored(&repository, RecordType::Matrix).await, 1);
    assert_eq!(stored(&repository, RecordType::Impact).await, 0);
}

#[tokio::test]
async fn persistence_failure_surfaces_and_suppresses_alerts() {
    let (engine, sink) = engine(
        source([
            requirement("R1", "srs", "Users reset passwords by email"),
            requirement("R2", "srs", "Invoices export to PDF"),
        ]),
        ScriptedClassifier::new(Script::Unrelated),
        Arc::new(FailingRepository),
        AnalysisConfig::default(),
    );

    let err = engine
        .build_traceability_matrix(&docs(&["srs"]), &MatrixOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "PERSISTENCE_ERROR");
    assert!(sink.events().await.is_empty());
}

#[tokio::test]
async fn cancelled_run_persists_nothing() {
    let repository = Arc::new(InMemoryRepository::new());
    let (engine, sink) = chain_engine_with(repository.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .build_traceability_matrix_with_cancel(&docs(&["srs"]), &MatrixOptions::default(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "CANCELLED");
    assert!(repository.is_empty().await);
    assert!(sink.events().await.is_empty());
}

#[tokio::test]
async fn high_risk_impact_raises_alert() {
    let mut first = requirement("A", "srs", "Lock the account after five failed login attempts");
    first.priority = Priority::High;
    let second = requirement("B", "srs", "Lock the account after three failed login attempts");
    let (engine, sink) = engine(
        source([first, second]),
        ScriptedClassifier::new(Script::Unrelated).relate("A", "B", RelationshipType::Refines, 0.9),
        Arc::new(InMemoryRepository::new()),
        AnalysisConfig::default(),
    );
    engine
        .build_traceability_matrix(&docs(&["srs"]), &MatrixOptions::default())
        .await
        .unwrap();
    assert!(sink.events().await.is_empty());

    let run = engine
        .analyze_impact(&RequirementId::new("A"), "Lock after three attempts", &ImpactOptions::default())
        .await
        .unwrap();

    assert_eq!(run.analysis.overall_risk, RiskLevel::High);
    assert_eq!(run.analysis.direct_impacts[0].estimated_effort, "1-2 days");
    assert_eq!(sink.topics().await, vec!["high_impact_risk"]);
    assert_eq!(run.report.impact.as_ref(), Some(&run.analysis));
}

#[tokio::test]
async fn impact_defaults_to_newest_matrix() {
    let (engine, _sink) = chain_engine_with(Arc::new(InMemoryRepository::new()));
    engine
        .build_traceability_matrix(&docs(&["srs"]), &MatrixOptions::default())
        .await
        .unwrap();
    let newest = engine
        .build_traceability_matrix(&docs(&["srs"]), &MatrixOptions::default())
        .await
        .unwrap();

    let run = engine
        .analyze_impact(&RequirementId::new("B"), "Handles render in bold", &ImpactOptions::default())
        .await
        .unwrap();

    assert_eq!(run.matrix_id, newest.matrix.id);
    // Directional edge A -> B: nothing is reachable from B.
    assert_eq!(run.analysis.total_affected_requirements, 0);
}

#[tokio::test]
async fn coverage_is_served_from_the_stored_record() {
    let (engine, _sink) = chain_engine_with(Arc::new(InMemoryRepository::new()));
    let run = engine
        .build_traceability_matrix(&docs(&["srs"]), &MatrixOptions::default())
        .await
        .unwrap();

    let record = engine.get_coverage(&run.matrix.id).await.unwrap();

    assert_eq!(record.id, run.matrix.id.as_str());
    assert_eq!(record.matrix_id, run.matrix.id);
    assert_eq!(record.report, run.report.coverage);
}

#[tokio::test]
async fn manual_relationships_merge_into_later_builds() {
    let (engine, _sink) = engine(
        source([
            requirement("REQ-1", "srs", "Users sign in with a password"),
            requirement("TC-1", "srs", "Sign-in test with a wrong password"),
            requirement("OPS-1", "ops", "Backups run nightly"),
        ]),
        ScriptedClassifier::new(Script::Unrelated),
        Arc::new(InMemoryRepository::new()),
        AnalysisConfig::default(),
    );

    let first = engine
        .upsert_manual_relationship(NewRelationship::new("TC-1", "REQ-1", RelationshipType::Tests))
        .await
        .unwrap();
    let mut replacement = NewRelationship::new("TC-1", "REQ-1", RelationshipType::Tests);
    replacement.confidence = 0.8;
    let second = engine.upsert_manual_relationship(replacement).await.unwrap();
    // Touches a document the build below does not load.
    engine
        .upsert_manual_relationship(NewRelationship::new("OPS-1", "REQ-1", RelationshipType::Supports))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    let listed = engine.list_manual_relationships().await.unwrap();
    assert_eq!(listed.len(), 2);

    let run = engine
        .build_traceability_matrix(&docs(&["srs"]), &MatrixOptions::default())
        .await
        .unwrap();

    assert_eq!(run.matrix.relationships.len(), 1);
    let merged = &run.matrix.relationships[0];
    assert_eq!(merged.id, first.id);
    assert_eq!(merged.provenance, Provenance::Manual);
    assert!((merged.confidence - 0.8).abs() < f64::EPSILON);
    assert!((run.report.coverage.coverage_percentage - 100.0).abs() < 1e-9);

    let excluded = engine
        .build_traceability_matrix(
            &docs(&["srs"]),
            &MatrixOptions {
                exclude_manual: true,
                ..MatrixOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(excluded.matrix.relationships.is_empty());
}

#[tokio::test]
async fn manual_relationship_validation() {
    let (engine, _sink) = chain_engine_with(Arc::new(InMemoryRepository::new()));

    let unknown = engine
        .upsert_manual_relationship(NewRelationship::new("A", "ghost", RelationshipType::Tests))
        .await
        .unwrap_err();
    assert_eq!(unknown.code(), "NOT_FOUND");

    let mut out_of_range = NewRelationship::new("A", "B", RelationshipType::Tests);
    out_of_range.confidence = 1.5;
    let invalid = engine.upsert_manual_relationship(out_of_range).await.unwrap_err();
    assert_eq!(invalid.code(), "INVALID_PARAMETER");
}

#[tokio::test]
async fn low_confidence_answers_are_dropped_without_fallback() {
    let (engine, _sink) = engine(
        source([
            requirement("R1", "srs", "Export monthly invoices as PDF files"),
            requirement("R2", "srs", "Export monthly invoices as PDF files"),
        ]),
        ScriptedClassifier::new(Script::Unrelated).relate("R1", "R2", RelationshipType::Supports, 0.2),
        Arc::new(InMemoryRepository::new()),
        AnalysisConfig::default(),
    );

    let run = engine
        .build_traceability_matrix(&docs(&["srs"]), &MatrixOptions::default())
        .await
        .unwrap();

    assert!(run.matrix.relationships.is_empty());
    assert_eq!(run.matrix.stats.ai_rejected_low_confidence, 1);
    assert_eq!(run.matrix.stats.fallbacks, 0);
}

#[tokio::test]
async fn pair_cap_limits_classifier_calls() {
    let classifier = Arc::new(ScriptedClassifier::new(Script::Unrelated));
    let engine = tracelink::TraceEngine::new(
        Arc::new(source((0..6).map(|i| {
            requirement(&format!("R{i}"), "srs", &format!("Statement number {i}"))
        }))),
        classifier.clone(),
        Arc::new(InMemoryRepository::new()),
        AnalysisConfig::default(),
    )
    .unwrap();

    let run = engine
        .build_traceability_matrix(
            &docs(&["srs"]),
            &MatrixOptions {
                max_pairs: Some(4),
                ..MatrixOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(classifier.calls(), 4);
    assert_eq!(run.matrix.stats.pairs_evaluated, 4);
    assert_eq!(run.matrix.stats.pairs_available, 15);
}

#[tokio::test]
async fn requirement_listed_twice_never_links_to_itself() {
    let mut requirements = source([requirement("R1", "doc", "Export monthly invoices as PDF files")]);
    requirements
        .add_document(Document {
            id: DocumentId::new("doc"),
            title: None,
            requirements: vec![
                requirement("R1", "doc", "Export monthly invoices as PDF files"),
                requirement("R2", "doc", "Themes switch between light and dark"),
            ],
        })
        .unwrap();
    let (engine, _sink) = engine(
        requirements,
        UnavailableClassifier,
        Arc::new(InMemoryRepository::new()),
        AnalysisConfig::default(),
    );

    let run = engine
        .build_traceability_matrix(&docs(&["doc"]), &MatrixOptions::default())
        .await
        .unwrap();

    assert_eq!(run.matrix.requirements.len(), 3);
    assert_eq!(run.matrix.stats.pairs_evaluated, 2);
    assert!(run.matrix.relationships.iter().all(|r| r.validate().is_ok()));
    assert!(run.matrix.relationships.is_empty());
}

#[tokio::test]
async fn report_names_the_configured_classifier_model() {
    let classifier = CommandClassifier::new(CommandSpec {
        program: "/nonexistent/tracelink-classifier".to_string(),
        args: vec![],
        model: Some("claims-7".to_string()),
    });
    let (engine, _sink) = engine(
        source([
            requirement("R1", "srs", "Export monthly invoices as PDF files"),
            requirement("R2", "srs", "Export monthly invoices as PDF files"),
        ]),
        classifier,
        Arc::new(InMemoryRepository::new()),
        AnalysisConfig::default(),
    );

    let run = engine
        .build_traceability_matrix(&docs(&["srs"]), &MatrixOptions::default())
        .await
        .unwrap();

    assert_eq!(run.report.metadata.model, "claims-7+heuristic-v1");
    assert_eq!(run.matrix.stats.fallbacks, 1);
}

#[tokio::test]
async fn recomputed_coverage_keeps_the_build_threshold() {
    let repository = Arc::new(InMemoryRepository::new());
    let (engine, _sink) = engine(
        source([
            requirement("R1", "srs", "Export monthly invoices as PDF files"),
            requirement("R2", "srs", "Export monthly invoices as PDF files"),
            requirement("R3", "srs", "Themes switch between light and dark"),
        ]),
        UnavailableClassifier,
        repository.clone(),
        AnalysisConfig::default(),
    );
    let options = MatrixOptions {
        coverage_threshold: Some(60.0),
        ..MatrixOptions::default()
    };
    let run = engine
        .build_traceability_matrix(&docs(&["srs"]), &options)
        .await
        .unwrap();
    assert!(!run.report.coverage.has_gap(GapKind::LowOverallCoverage));

    let mut expired = to_envelope(
        RecordType::Coverage,
        run.matrix.id.as_str(),
        &run.report.coverage,
        Some(chrono::Duration::days(1)),
    )
    .unwrap();
    expired.stored_at -= chrono::Duration::days(2);
    expired.expires_at = Some(expired.stored_at + chrono::Duration::days(1));
    repository.save(expired).await.unwrap();

    let record = engine.get_coverage(&run.matrix.id).await.unwrap();

    assert_eq!(record.matrix_id, run.matrix.id);
    assert!((record.report.coverage_percentage - run.report.coverage.coverage_percentage).abs() < 1e-9);
    assert!(!record.report.has_gap(GapKind::LowOverallCoverage));
}
