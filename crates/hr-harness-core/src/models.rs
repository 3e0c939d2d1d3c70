//! Core data models used throughout HR Harness.
//!
//! These types represent the documents, chunks, principals and query results
//! that flow through the ingestion and retrieval pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing status of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processed => "processed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DocumentStatus::Pending),
            "processed" => Some(DocumentStatus::Processed),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// An HR document as submitted for ingestion.
///
/// `text` is the plain text produced by the parsing adapter, before masking.
/// The pipeline owns status transitions from `Pending` to a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub department: Option<String>,
    pub access_roles: BTreeSet<String>,
    pub text: String,
    pub uploaded_at: DateTime<Utc>,
    pub status: DocumentStatus,
    pub filename: Option<String>,
    pub uploaded_by: Option<String>,
    pub chunk_count: usize,
    /// PII category name → number of spans masked.
    pub pii_detected: BTreeMap<String, usize>,
    pub failure_reason: Option<String>,
    /// Set when masking could not run and the text was indexed unmasked.
    pub pii_unmasked: bool,
}

impl Document {
    /// Create a pending document with a fresh UUID.
    pub fn new<I, S>(text: impl Into<String>, access_roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: Uuid::new_v4().to_string(),
            department: None,
            access_roles: access_roles.into_iter().map(Into::into).collect(),
            text: text.into(),
            uploaded_at: Utc::now(),
            status: DocumentStatus::Pending,
            filename: None,
            uploaded_by: None,
            chunk_count: 0,
            pii_detected: BTreeMap::new(),
            failure_reason: None,
            pii_unmasked: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_uploader(mut self, uploaded_by: impl Into<String>) -> Self {
        self.uploaded_by = Some(uploaded_by.into());
        self
    }
}

/// A chunk of a document's masked text.
///
/// `text` starts with `overlap` characters copied from the end of the
/// previous chunk; [`Chunk::body`] is the part that belongs to this chunk
/// alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub char_len: usize,
    pub overlap: usize,
    pub roles: BTreeSet<String>,
    pub hash: String,
}

impl Chunk {
    /// Composite chunk identifier: `"{document_id}#{chunk_index}"`.
    pub fn make_id(document_id: &str, chunk_index: usize) -> String {
        format!("{}#{}", document_id, chunk_index)
    }

    /// The chunk text without the overlap prefix.
    pub fn body(&self) -> &str {
        match self.text.char_indices().nth(self.overlap) {
            Some((i, _)) => &self.text[i..],
            None => "",
        }
    }
}

/// An embedding produced for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub model: String,
}

/// The authenticated entity issuing a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Option<String>,
    pub roles: BTreeSet<String>,
}

impl Principal {
    pub fn with_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_id: None,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// One ranked, attributed chunk in a [`QueryResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultItem {
    pub chunk_id: String,
    pub score: f64,
    pub document_id: String,
    pub chunk_index: usize,
    pub snippet: String,
}

/// Ranked answer chunks for one question.
///
/// Items are ordered by score (descending) and contain only chunks the
/// requesting principal may see. `degraded` is set when the search backend
/// failed and the result is empty for that reason rather than for lack of
/// matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub items: Vec<ResultItem>,
    pub candidates_examined: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

impl QueryResult {
    pub fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Default::default()
        }
    }

    pub fn degraded(query: &str, reason: impl Into<String>) -> Self {
        Self {
            query: query.to_string(),
            degraded: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Chunk identifiers in rank order.
    pub fn chunk_ids(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.chunk_id.as_str()).collect()
    }
}

/// Ground-truth relevance for one evaluation query.
///
/// `query` and `principal_roles` are optional and only needed when the
/// judgment drives the retriever directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceJudgment {
    pub query_id: String,
    pub relevant: BTreeSet<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub principal_roles: Vec<String>,
}

impl RelevanceJudgment {
    pub fn new<I, S>(query_id: impl Into<String>, relevant: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            query_id: query_id.into(),
            relevant: relevant.into_iter().map(Into::into).collect(),
            query: None,
            principal_roles: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_is_pending() {
        let doc = Document::new("hello", ["hr"]).with_department("HR");
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert!(doc.access_roles.contains("hr"));
        assert_eq!(doc.department.as_deref(), Some("HR"));
        assert!(!doc.id.is_empty());
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for s in [
            DocumentStatus::Pending,
            DocumentStatus::Processed,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(DocumentStatus::parse("archived"), None);
    }

    #[test]
    fn test_chunk_body_strips_overlap() {
        let chunk = Chunk {
            id: Chunk::make_id("d", 1),
            document_id: "d".into(),
            chunk_index: 1,
            text: "ñaXYZ".into(),
            char_len: 5,
            overlap: 2,
            roles: BTreeSet::new(),
            hash: String::new(),
        };
        assert_eq!(chunk.body(), "XYZ");
        assert_eq!(chunk.id, "d#1");
    }
}
