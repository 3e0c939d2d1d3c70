//! Storage capabilities for HR Harness.
//!
//! The [`VectorIndex`] trait persists chunk vectors with their access
//! metadata and answers similarity queries; the [`MetadataStore`] trait
//! persists [`Document`] records and their status transitions. Both are
//! injected into the pipeline and retriever as trait objects, enabling
//! pluggable backends (SQLite in the app crate, in-memory here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::{IndexError, MetadataError};
use crate::models::{Chunk, Document};
use crate::rbac::RoleFilter;

/// One staged index write: a chunk's vector plus everything search needs
/// to attribute and authorise it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub vector: Vec<f32>,
    pub roles: BTreeSet<String>,
    pub department: Option<String>,
    pub text: String,
}

impl IndexEntry {
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>, department: Option<&str>) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            chunk_index: chunk.chunk_index,
            vector,
            roles: chunk.roles.clone(),
            department: department.map(str::to_string),
            text: chunk.text.clone(),
        }
    }
}

/// A candidate chunk returned from vector search.
///
/// Carries the roles so the retriever can apply RBAC without another
/// round-trip, and `seq` (insertion order) for deterministic tie-breaking.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: usize,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f64,
    pub seq: u64,
    pub roles: BTreeSet<String>,
    pub department: Option<String>,
    pub snippet: String,
}

/// Characters of chunk text carried in a [`Candidate`] snippet.
pub const SNIPPET_CHARS: usize = 240;

/// Truncate `text` to [`SNIPPET_CHARS`] characters.
pub fn snippet(text: &str) -> String {
    match text.char_indices().nth(SNIPPET_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Order candidates by score descending, then insertion order ascending.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.seq.cmp(&b.seq))
    });
}

/// Abstract vector index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Atomically add or replace a batch of entries |
/// | [`search`](VectorIndex::search) | Nearest neighbours, optionally role-prefiltered |
/// | [`delete_by_document`](VectorIndex::delete_by_document) | Remove every entry of a document |
/// | [`count`](VectorIndex::count) | Number of stored vectors |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Dimension every stored vector must have.
    fn dims(&self) -> usize;

    /// Insert or replace entries keyed by `(document_id, chunk_index)`.
    ///
    /// All-or-nothing: if any entry is rejected, none are stored.
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<(), IndexError>;

    /// Return up to `limit` candidates ordered by score descending then
    /// insertion order. With a filter, only admitted entries are returned.
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&RoleFilter>,
    ) -> Result<Vec<Candidate>, IndexError>;

    /// Remove every entry belonging to `document_id`; returns the count.
    async fn delete_by_document(&self, document_id: &str) -> Result<usize, IndexError>;

    async fn count(&self) -> Result<usize, IndexError>;

    async fn close(&self) -> Result<(), IndexError> {
        Ok(())
    }
}

/// Abstract metadata store for [`Document`] records.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert or replace a document record.
    async fn put(&self, doc: &Document) -> Result<(), MetadataError>;

    async fn get(&self, id: &str) -> Result<Option<Document>, MetadataError>;

    /// All documents, newest upload first.
    async fn list(&self) -> Result<Vec<Document>, MetadataError>;

    /// Remove a record; returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, MetadataError>;

    async fn close(&self) -> Result<(), MetadataError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(id: &str, score: f64, seq: u64) -> Candidate {
        Candidate {
            chunk_id: id.into(),
            document_id: "d".into(),
            chunk_index: 0,
            score,
            seq,
            roles: BTreeSet::new(),
            department: None,
            snippet: String::new(),
        }
    }

    #[test]
    fn test_sort_candidates_score_then_seq() {
        let mut c = vec![cand("a", 0.5, 2), cand("b", 0.9, 3), cand("c", 0.5, 1)];
        sort_candidates(&mut c);
        let ids: Vec<_> = c.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let long = "é".repeat(SNIPPET_CHARS + 10);
        assert_eq!(snippet(&long).chars().count(), SNIPPET_CHARS);
        assert_eq!(snippet("short"), "short");
    }
}
