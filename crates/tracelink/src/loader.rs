//! Requirement loading.
//!
//! Resolves document ids into a flat list of requirements drawn from two
//! sources: requirements embedded in documents, and standalone requirement
//! records tagged with a document id. No deduplication happens here;
//! near-duplicates are left for similarity-based relationship discovery.

use crate::domain::{DocumentId, Requirement, RequirementId};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::fs::File;
use tracelink_store::{JsonlReader, Warning};
use tracing::{debug, warn};

/// Source of requirements for an analysis run.
#[async_trait]
pub trait RequirementSource: Send + Sync {
    /// Resolve document ids into requirements.
    ///
    /// Requirements are returned in document order; within a document,
    /// embedded requirements precede standalone ones.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidParameter` if `document_ids` is empty
    /// - `Error::NotFound` if a document id resolves to no requirement source
    async fn load_requirements(&self, document_ids: &[DocumentId]) -> Result<Vec<Requirement>>;

    /// Look up a single requirement by id.
    async fn get_requirement(&self, id: &RequirementId) -> Result<Option<Requirement>>;
}

/// A document with its embedded requirements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Document identifier
    pub id: DocumentId,

    /// Human-readable title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Requirements extracted into the document itself
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

/// One line of a requirement source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceEntry {
    /// A document with embedded requirements
    Document(Document),

    /// A standalone requirement tagged with its document id
    Requirement(Requirement),
}

/// Requirement source held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRequirementSource {
    documents: HashMap<DocumentId, Document>,
    standalone: Vec<Requirement>,
}

impl InMemoryRequirementSource {
    /// Create an empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a document.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidParameter` if any embedded requirement is invalid.
    pub fn add_document(&mut self, document: Document) -> Result<()> {
        for requirement in &document.requirements {
            requirement.validate()?;
        }
        self.documents.insert(document.id.clone(), document);
        Ok(())
    }

    /// Add a standalone requirement record.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidParameter` if the requirement is invalid.
    pub fn add_requirement(&mut self, requirement: Requirement) -> Result<()> {
        requirement.validate()?;
        self.standalone.push(requirement);
        Ok(())
    }

    /// Add a parsed source entry.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidParameter` if the entry is invalid.
    pub fn add_entry(&mut self, entry: SourceEntry) -> Result<()> {
        match entry {
            SourceEntry::Document(document) => self.add_document(document),
            SourceEntry::Requirement(requirement) => self.add_requirement(requirement),
        }
    }

    /// Known document ids (embedded and standalone), sorted.
    #[must_use]
    pub fn document_ids(&self) -> Vec<DocumentId> {
        let mut ids: Vec<DocumentId> = self
            .documents
            .keys()
            .cloned()
            .chain(
                self.standalone
                    .iter()
                    .map(|r| r.source_document_id.clone()),
            )
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        ids.sort();
        ids
    }

    /// Total number of requirements across both sources
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents
            .values()
            .map(|d| d.requirements.len())
            .sum::<usize>()
            + self.standalone.len()
    }

    /// Whether the source holds no requirements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RequirementSource for InMemoryRequirementSource {
    async fn load_requirements(&self, document_ids: &[DocumentId]) -> Result<Vec<Requirement>> {
        if document_ids.is_empty() {
            return Err(Error::InvalidParameter(
                "at least one document id is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut requirements = Vec::new();

        for document_id in document_ids {
            if !seen.insert(document_id) {
                continue;
            }

            let embedded = self.documents.get(document_id);
            let standalone: Vec<&Requirement> = self
                .standalone
                .iter()
                .filter(|r| &r.source_document_id == document_id)
                .collect();

            if embedded.is_none() && standalone.is_empty() {
                return Err(Error::not_found("document", document_id.as_str()));
            }

            let before = requirements.len();
            if let Some(document) = embedded {
                requirements.extend(document.requirements.iter().cloned());
            }
            requirements.extend(standalone.into_iter().cloned());
            debug!(
                document = %document_id,
                count = requirements.len() - before,
                "Resolved document requirements"
            );
        }

        Ok(requirements)
    }

    async fn get_requirement(&self, id: &RequirementId) -> Result<Option<Requirement>> {
        let embedded = self
            .documents
            .values()
            .flat_map(|d| d.requirements.iter())
            .find(|r| &r.id == id);
        Ok(embedded
            .or_else(|| self.standalone.iter().find(|r| &r.id == id))
            .cloned())
    }
}

/// Build an in-memory source from a JSONL file of [`SourceEntry`] lines.
///
/// Malformed or invalid lines are skipped and returned as warnings.
///
/// # Errors
///
/// Returns `Error::Io` if the file cannot be opened or read.
pub async fn load_source_jsonl(path: &Path) -> Result<(InMemoryRequirementSource, Vec<Warning>)> {
    let file = File::open(path).await?;
    let mut reader = JsonlReader::new(file);
    let mut source = InMemoryRequirementSource::new();
    let mut warnings = Vec::new();

    while let Some(line) = reader.next_line().await.map_err(Error::from)? {
        let line_number = reader.line_number();
        if line.trim().is_empty() {
            continue;
        }
        let entry: SourceEntry = match serde_json::from_str(&line) {
            Ok(entry) => entry,
            Err(e) => {
                warnings.push(Warning::MalformedJson {
                    line_number,
                    error: e.to_string(),
                });
                continue;
            }
        };
        if let Err(e) = source.add_entry(entry) {
            warnings.push(Warning::SkippedLine {
                line_number,
                reason: e.to_string(),
            });
        }
    }

    for warning in &warnings {
        warn!(path = %path.display(), %warning, "Requirement source warning");
    }

    Ok((source, warnings))
}
