//! Scripted classifier for tests.

use super::{ClassificationResult, ClassifierFailure, SemanticClassifier};
use crate::domain::{RelationshipType, Requirement};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted answer for a pair
#[derive(Debug, Clone)]
pub enum StubResponse {
    /// Return this result as-is
    Answer(ClassificationResult),

    /// Answer that the pair is unrelated
    Unrelated,

    /// Fail with a malformed-response error
    Malformed,

    /// Fail with a timeout error without waiting
    Timeout,

    /// Never answer; relies on the caller's timeout
    Hang,
}

/// Classifier answering from a script keyed by requirement id pair.
///
/// Lookups try `(first, second)` then `(second, first)`, then fall back to
/// the default response.
#[derive(Debug)]
pub struct StubClassifier {
    default: StubResponse,
    responses: HashMap<(String, String), StubResponse>,
    delays: HashMap<(String, String), Duration>,
    calls: AtomicUsize,
}

impl StubClassifier {
    /// Stub answering `default` for every unscripted pair
    #[must_use]
    pub fn new(default: StubResponse) -> Self {
        Self {
            default,
            responses: HashMap::new(),
            delays: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Script the answer for one pair
    #[must_use]
    pub fn with_response(mut self, first: &str, second: &str, response: StubResponse) -> Self {
        self.responses
            .insert((first.to_string(), second.to_string()), response);
        self
    }

    /// Delay the answer for one pair
    #[must_use]
    pub fn with_delay(mut self, first: &str, second: &str, delay: Duration) -> Self {
        self.delays
            .insert((first.to_string(), second.to_string()), delay);
        self
    }

    /// Number of classify calls received so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lookup<'a, V>(
        map: &'a HashMap<(String, String), V>,
        first: &Requirement,
        second: &Requirement,
    ) -> Option<&'a V> {
        let a = first.id.as_str().to_string();
        let b = second.id.as_str().to_string();
        map.get(&(a.clone(), b.clone())).or_else(|| map.get(&(b, a)))
    }
}

#[async_trait]
impl SemanticClassifier for StubClassifier {
    async fn classify(
        &self,
        first: &Requirement,
        second: &Requirement,
        _taxonomy: &[RelationshipType],
    ) -> Result<ClassificationResult, ClassifierFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = Self::lookup(&self.delays, first, second) {
            tokio::time::sleep(*delay).await;
        }

        let response = Self::lookup(&self.responses, first, second)
            .unwrap_or(&self.default)
            .clone();
        match response {
            StubResponse::Answer(result) => Ok(result),
            StubResponse::Unrelated => Ok(ClassificationResult::unrelated()),
            StubResponse::Malformed => Err(ClassifierFailure::Malformed(
                "scripted malformed response".to_string(),
            )),
            StubResponse::Timeout => Err(ClassifierFailure::Timeout(Duration::from_secs(0))),
            StubResponse::Hang => {
                std::future::pending::<()>().await;
                Err(ClassifierFailure::Unavailable("unreachable".to_string()))
            }
        }
    }

    fn model_id(&self) -> String {
        "stub".to_string()
    }
}
