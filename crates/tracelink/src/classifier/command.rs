//! Semantic classifier backed by an external command.
//!
//! The prompt is written to the command's stdin and the answer is read from
//! its stdout. The answer must contain a JSON object shaped like
//! [`ClassificationResult`]; it may be wrapped in a fenced code block or
//! surrounded by prose.

use super::{ClassificationResult, ClassifierFailure, SemanticClassifier};
use crate::domain::{RelationshipType, Requirement};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// How to launch the external classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommandSpec {
    /// Program to execute
    pub program: String,

    /// Arguments passed before the prompt is piped in
    #[serde(default)]
    pub args: Vec<String>,

    /// Model identifier recorded in generation metadata
    #[serde(default)]
    pub model: Option<String>,
}

/// Classifier that shells out to [`CommandSpec::program`] once per pair.
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    spec: CommandSpec,
}

impl CommandClassifier {
    /// Create a classifier for the given command
    #[must_use]
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    async fn run(&self, prompt: &str) -> Result<String, ClassifierFailure> {
        let mut child = Command::new(&self.spec.program)
            .args(&self.spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ClassifierFailure::Unavailable(format!("failed to start {}: {e}", self.spec.program))
            })?;

        // The prompt is written while stdout is drained.
        let stdin = child.stdin.take();
        let send_prompt = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(prompt.as_bytes()).await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (sent, output) = tokio::join!(send_prompt, child.wait_with_output());

        let output = output.map_err(|e| ClassifierFailure::Unavailable(e.to_string()))?;
        if let Err(e) = sent {
            // A child may answer without reading the whole prompt.
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(ClassifierFailure::Unavailable(format!(
                    "failed to send prompt: {e}"
                )));
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClassifierFailure::Unavailable(format!(
                "exit code {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        let response = String::from_utf8_lossy(&output.stdout).into_owned();
        if response.trim().is_empty() {
            return Err(ClassifierFailure::Malformed("empty response".to_string()));
        }
        Ok(response)
    }
}

#[async_trait]
impl SemanticClassifier for CommandClassifier {
    async fn classify(
        &self,
        first: &Requirement,
        second: &Requirement,
        taxonomy: &[RelationshipType],
    ) -> Result<ClassificationResult, ClassifierFailure> {
        let prompt = build_prompt(first, second, taxonomy);
        let response = self.run(&prompt).await?;
        debug!(
            first = %first.id,
            second = %second.id,
            bytes = response.len(),
            "Classifier responded"
        );
        parse_response(&response)
    }

    fn model_id(&self) -> String {
        self.spec
            .model
            .clone()
            .unwrap_or_else(|| self.spec.program.clone())
    }
}

/// Prompt describing the pair and the allowed taxonomy.
#[must_use]
pub fn build_prompt(
    first: &Requirement,
    second: &Requirement,
    taxonomy: &[RelationshipType],
) -> String {
    let mut prompt = String::from(
        "Decide whether the first requirement is related to the second.\n\n",
    );
    let _ = writeln!(
        prompt,
        "First requirement ({}, {}, {} priority):\n{}\n",
        first.id, first.requirement_type, first.priority, first.text
    );
    let _ = writeln!(
        prompt,
        "Second requirement ({}, {}, {} priority):\n{}\n",
        second.id, second.requirement_type, second.priority, second.text
    );
    prompt.push_str("Relationship types:\n");
    for relationship_type in taxonomy {
        let _ = writeln!(
            prompt,
            "- {}: {}",
            relationship_type.as_str(),
            relationship_type.description()
        );
    }
    prompt.push_str(
        "\nRespond with a single JSON object:\n\
         {\"hasRelationship\": bool, \"type\": string or null, \"confidence\": number between 0 and 1, \
         \"bidirectional\": bool, \"reasoning\": string}\n",
    );
    prompt
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnswer {
    has_relationship: bool,
    #[serde(rename = "type", default)]
    relationship_type: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    bidirectional: Option<bool>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Parse a classifier answer.
///
/// # Errors
///
/// Returns `ClassifierFailure::Malformed` if no JSON object can be found,
/// the object lacks required fields, the type is outside the taxonomy, or
/// a positive answer omits its confidence.
pub fn parse_response(response: &str) -> Result<ClassificationResult, ClassifierFailure> {
    let json = extract_json(response);
    let raw: RawAnswer = serde_json::from_str(json)
        .map_err(|e| ClassifierFailure::Malformed(format!("invalid JSON: {e}")))?;

    if !raw.has_relationship {
        return Ok(ClassificationResult {
            reasoning: raw.reasoning,
            ..ClassificationResult::unrelated()
        });
    }

    let type_name = raw
        .relationship_type
        .ok_or_else(|| ClassifierFailure::Malformed("missing relationship type".to_string()))?;
    let relationship_type: RelationshipType = type_name
        .parse()
        .map_err(|_| ClassifierFailure::Malformed(format!("unknown relationship type '{type_name}'")))?;
    let confidence = raw
        .confidence
        .ok_or_else(|| ClassifierFailure::Malformed("missing confidence".to_string()))?;

    let result = ClassificationResult {
        has_relationship: true,
        relationship_type: Some(relationship_type),
        confidence,
        bidirectional: raw
            .bidirectional
            .unwrap_or_else(|| relationship_type.is_naturally_bidirectional()),
        reasoning: raw.reasoning,
    };
    result.validate()?;
    Ok(result)
}

/// Locate the JSON object in a free-form response.
///
/// Tries a ```` ```json ```` fence, then any fence, then the span from the
/// first `{` to the last `}`.
fn extract_json(response: &str) -> &str {
    if let Some(start) = response.find("```json") {
        let body = start + "```json".len();
        if let Some(end) = response[body..].find("```") {
            return response[body..body + end].trim();
        }
    }

    if let Some(start) = response.find("```") {
        let fence = start + 3;
        let body = response[fence..]
            .find('\n')
            .map_or(fence, |newline| fence + newline + 1);
        if let Some(end) = response[body..].find("```") {
            return response[body..body + end].trim();
        }
    }

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if end > start {
            return &response[start..=end];
        }
    }

    response.trim()
}
