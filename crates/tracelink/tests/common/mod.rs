//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracelink::classifier::{ClassificationResult, ClassifierFailure, SemanticClassifier};
use tracelink::config::AnalysisConfig;
use tracelink::domain::{Priority, RelationshipType, Requirement, RequirementType};
use tracelink::error::{Error, Result};
use tracelink::loader::InMemoryRequirementSource;
use tracelink::storage::{RecordType, RecordingEventSink, Repository};
use tracelink::TraceEngine;
use tracelink_store::RecordEnvelope;

/// How the scripted classifier answers a pair
#[derive(Debug, Clone)]
pub enum Script {
    /// Return this classification
    Answer(ClassificationResult),
    /// Report the pair as unrelated
    Unrelated,
    /// Fail as if the call timed out
    TimedOut,
    /// Sleep past any reasonable timeout
    Hang,
}

/// Deterministic classifier answering from a per-pair script.
#[derive(Debug)]
pub struct ScriptedClassifier {
    default: Script,
    script: HashMap<(String, String), Script>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new(default: Script) -> Self {
        Self {
            default,
            script: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Script a directional answer for `(first, second)` in load order
    pub fn relate(mut self, first: &str, second: &str, relationship_type: RelationshipType, confidence: f64) -> Self {
        self.script.insert(
            (first.to_string(), second.to_string()),
            Script::Answer(ClassificationResult::related(relationship_type, confidence)),
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SemanticClassifier for ScriptedClassifier {
    async fn classify(
        &self,
        first: &Requirement,
        second: &Requirement,
        _taxonomy: &[RelationshipType],
    ) -> std::result::Result<ClassificationResult, ClassifierFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = (first.id.to_string(), second.id.to_string());
        match self.script.get(&key).unwrap_or(&self.default) {
            Script::Answer(result) => Ok(result.clone()),
            Script::Unrelated => Ok(ClassificationResult::unrelated()),
            Script::TimedOut => Err(ClassifierFailure::Timeout(Duration::from_secs(10))),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ClassificationResult::unrelated())
            }
        }
    }

    fn model_id(&self) -> String {
        "scripted".to_string()
    }
}

/// Repository whose writes always fail; reads see nothing.
#[derive(Debug, Default)]
pub struct FailingRepository;

#[async_trait]
impl Repository for FailingRepository {
    async fn save(&self, _record: RecordEnvelope) -> Result<()> {
        Err(Error::Persistence("disk full".to_string()))
    }

    async fn save_all(&self, _records: Vec<RecordEnvelope>) -> Result<()> {
        Err(Error::Persistence("disk full".to_string()))
    }

    async fn load(&self, _record_type: RecordType, _id: &str) -> Result<Option<RecordEnvelope>> {
        Ok(None)
    }

    async fn query(&self, _index: &str, _key: &str) -> Result<Vec<RecordEnvelope>> {
        Ok(Vec::new())
    }

    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }
}

pub fn requirement(id: &str, document: &str, text: &str) -> Requirement {
    Requirement {
        id: id.into(),
        text: text.to_string(),
        requirement_type: RequirementType::Functional,
        priority: Priority::Medium,
        source_document_id: document.into(),
    }
}

pub fn source(requirements: impl IntoIterator<Item = Requirement>) -> InMemoryRequirementSource {
    let mut source = InMemoryRequirementSource::new();
    for requirement in requirements {
        source.add_requirement(requirement).unwrap();
    }
    source
}

/// Engine over the given source, classifier, and repository with a recording sink.
pub fn engine(
    source: InMemoryRequirementSource,
    classifier: impl SemanticClassifier + 'static,
    repository: Arc<dyn Repository>,
    config: AnalysisConfig,
) -> (TraceEngine, RecordingEventSink) {
    let sink = RecordingEventSink::new();
    let engine = TraceEngine::new(Arc::new(source), Arc::new(classifier), repository, config)
        .unwrap()
        .with_event_sink(Arc::new(sink.clone()));
    (engine, sink)
}
