//! In-memory [`VectorIndex`] and [`MetadataStore`] implementations.
//!
//! Uses `BTreeMap` behind `std::sync::RwLock` for thread safety. Vector
//! search is brute-force cosine similarity over all stored vectors. Upsert
//! validates the whole batch before touching the map, and delete runs under
//! the write lock, so readers never observe a half-applied change.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{IndexError, MetadataError};
use crate::models::Document;
use crate::rbac::RoleFilter;

use super::{snippet, sort_candidates, Candidate, IndexEntry, MetadataStore, VectorIndex};

struct StoredEntry {
    entry: IndexEntry,
    seq: u64,
}

#[derive(Default)]
struct IndexState {
    entries: BTreeMap<(String, usize), StoredEntry>,
    next_seq: u64,
}

/// In-memory vector index for tests and the offline CLI mode.
pub struct InMemoryIndex {
    dims: usize,
    state: RwLock<IndexState>,
}

impl InMemoryIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            state: RwLock::new(IndexState::default()),
        }
    }
}

fn poisoned() -> IndexError {
    IndexError::Backend("index lock poisoned".to_string())
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<(), IndexError> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != self.dims) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                actual: bad.vector.len(),
            });
        }
        let mut state = self.state.write().map_err(|_| poisoned())?;
        for e in entries {
            let seq = state.next_seq;
            state.next_seq += 1;
            state.entries.insert(
                (e.document_id.clone(), e.chunk_index),
                StoredEntry {
                    entry: e.clone(),
                    seq,
                },
            );
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&RoleFilter>,
    ) -> Result<Vec<Candidate>, IndexError> {
        if query.len() != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }
        if limit == 0 {
            return Ok(Vec::new());
        }
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut candidates: Vec<Candidate> = state
            .entries
            .values()
            .filter(|s| filter.map_or(true, |f| f.admits(&s.entry.roles)))
            .map(|s| Candidate {
                chunk_id: s.entry.chunk_id.clone(),
                document_id: s.entry.document_id.clone(),
                chunk_index: s.entry.chunk_index,
                score: cosine_similarity(query, &s.entry.vector) as f64,
                seq: s.seq,
                roles: s.entry.roles.clone(),
                department: s.entry.department.clone(),
                snippet: snippet(&s.entry.text),
            })
            .collect();
        sort_candidates(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize, IndexError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let before = state.entries.len();
        state.entries.retain(|(doc, _), _| doc != document_id);
        Ok(before - state.entries.len())
    }

    async fn count(&self) -> Result<usize, IndexError> {
        Ok(self.state.read().map_err(|_| poisoned())?.entries.len())
    }
}

/// In-memory document metadata store.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    docs: RwLock<BTreeMap<String, Document>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn meta_poisoned() -> MetadataError {
    MetadataError("metadata lock poisoned".to_string())
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn put(&self, doc: &Document) -> Result<(), MetadataError> {
        self.docs
            .write()
            .map_err(|_| meta_poisoned())?
            .insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, MetadataError> {
        Ok(self.docs.read().map_err(|_| meta_poisoned())?.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Document>, MetadataError> {
        let mut docs: Vec<Document> = self
            .docs
            .read()
            .map_err(|_| meta_poisoned())?
            .values()
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn delete(&self, id: &str) -> Result<bool, MetadataError> {
        Ok(self
            .docs
            .write()
            .map_err(|_| meta_poisoned())?
            .remove(id)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn entry(doc: &str, idx: usize, vector: Vec<f32>, roles: &[&str]) -> IndexEntry {
        IndexEntry {
            chunk_id: format!("{}#{}", doc, idx),
            document_id: doc.into(),
            chunk_index: idx,
            vector,
            roles: roles.iter().map(|s| s.to_string()).collect(),
            department: None,
            text: format!("text of {}#{}", doc, idx),
        }
    }

    #[tokio::test]
    async fn test_search_orders_by_score_then_insertion() {
        let index = InMemoryIndex::new(2);
        index
            .upsert(&[
                entry("a", 0, vec![1.0, 0.0], &["all_staff"]),
                entry("b", 0, vec![0.0, 1.0], &["all_staff"]),
                entry("c", 0, vec![1.0, 0.0], &["all_staff"]),
            ])
            .await
            .unwrap();
        let got = index.search(&[1.0, 0.0], 10, None).await.unwrap();
        let ids: Vec<_> = got.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a#0", "c#0", "b#0"]);
        assert!((got[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_upsert_is_all_or_nothing() {
        let index = InMemoryIndex::new(2);
        let err = index
            .upsert(&[
                entry("a", 0, vec![1.0, 0.0], &[]),
                entry("a", 1, vec![1.0, 0.0, 0.0], &[]),
            ])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        );
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_key() {
        let index = InMemoryIndex::new(2);
        index.upsert(&[entry("a", 0, vec![1.0, 0.0], &[])]).await.unwrap();
        index.upsert(&[entry("a", 0, vec![0.0, 1.0], &[])]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        let got = index.search(&[0.0, 1.0], 1, None).await.unwrap();
        assert!((got[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_delete_by_document() {
        let index = InMemoryIndex::new(2);
        index
            .upsert(&[
                entry("a", 0, vec![1.0, 0.0], &[]),
                entry("a", 1, vec![1.0, 0.0], &[]),
                entry("b", 0, vec![1.0, 0.0], &[]),
            ])
            .await
            .unwrap();
        assert_eq!(index.delete_by_document("a").await.unwrap(), 2);
        assert_eq!(index.delete_by_document("a").await.unwrap(), 0);
        let got = index.search(&[1.0, 0.0], 10, None).await.unwrap();
        assert!(got.iter().all(|c| c.document_id == "b"));
    }

    #[tokio::test]
    async fn test_role_prefilter() {
        let index = InMemoryIndex::new(2);
        index
            .upsert(&[
                entry("a", 0, vec![1.0, 0.0], &["director"]),
                entry("b", 0, vec![1.0, 0.0], &["all_staff"]),
            ])
            .await
            .unwrap();
        let filter = RoleFilter {
            roles: ["engineer".to_string()].into_iter().collect::<BTreeSet<_>>(),
            universal_role: "all_staff".into(),
            admit_untagged: false,
        };
        let got = index.search(&[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].document_id, "b");
    }

    #[tokio::test]
    async fn test_metadata_store_roundtrip() {
        let store = InMemoryMetadataStore::new();
        let doc = Document::new("body", ["all_staff"]).with_id("doc-1");
        store.put(&doc).await.unwrap();
        assert_eq!(store.get("doc-1").await.unwrap().map(|d| d.text), Some(doc.text));
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(store.delete("doc-1").await.unwrap());
        assert!(!store.delete("doc-1").await.unwrap());
        assert!(store.get("doc-1").await.unwrap().is_none());
    }
}
