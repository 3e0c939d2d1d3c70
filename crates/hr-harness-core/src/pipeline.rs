//! Document ingestion: mask → chunk → embed → index.
//!
//! One document's stages run strictly in sequence; independent documents
//! may be ingested concurrently with [`IngestionPipeline::ingest_many`].
//! All index entries for a document are staged locally and written in a
//! single upsert. If that upsert cannot be completed, whatever reached the
//! index is deleted before the error is returned.
//!
//! Every failure marks the document `failed`, records the reason and writes
//! the record to the [`MetadataStore`]. Nothing is retried at document
//! level; the embedding and index calls have their own bounded retries.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::chunk::{chunk_text, ChunkConfig};
use crate::embedding::{embed_all, Embedder};
use crate::error::{IndexError, IngestError};
use crate::models::{Document, DocumentStatus};
use crate::pii::{MaskResult, PiiMasker};
use crate::retry::RetryPolicy;
use crate::store::{IndexEntry, MetadataStore, VectorIndex};

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub document_id: String,
    pub chunk_count: usize,
    pub pii_detected: BTreeMap<String, usize>,
    /// Entries removed from a previous ingestion of the same document.
    pub replaced: usize,
    pub pii_unmasked: bool,
}

/// Outcome of [`IngestionPipeline::delete_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteReport {
    pub chunks_removed: usize,
    pub record_removed: bool,
}

/// Content-derived document id: first 16 hex chars of SHA-256 over the
/// raw bytes and the filename. Uploading the same file twice yields the
/// same id, so the second upload replaces the first.
pub fn content_id(raw: &[u8], filename: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    hasher.update(filename.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..16].to_string()
}

enum Masking {
    Run,
    Done(MaskResult),
    Skipped,
}

pub struct IngestionPipeline {
    masker: PiiMasker,
    chunking: ChunkConfig,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    metadata: Arc<dyn MetadataStore>,
    retry: RetryPolicy,
}

impl IngestionPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            masker: PiiMasker::new(),
            chunking: ChunkConfig::default(),
            embedder,
            index,
            metadata,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_masker(mut self, masker: PiiMasker) -> Self {
        self.masker = masker;
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn masker(&self) -> &PiiMasker {
        &self.masker
    }

    /// Ingest a document whose `text` is already decoded.
    pub async fn ingest(&self, doc: &mut Document) -> Result<IngestReport, IngestError> {
        self.run(doc, Masking::Run).await
    }

    /// Ingest raw file bytes into `doc`.
    ///
    /// Bytes that are not valid UTF-8 cannot be masked reliably: they are
    /// decoded lossily, indexed unmasked and the document is flagged with
    /// `pii_unmasked`.
    pub async fn ingest_bytes(
        &self,
        doc: &mut Document,
        raw: &[u8],
    ) -> Result<IngestReport, IngestError> {
        let masking = match self.masker.mask_bytes(raw) {
            Ok(result) => {
                doc.text = String::from_utf8_lossy(raw).into_owned();
                Masking::Done(result)
            }
            Err(e) => {
                warn!(document_id = %doc.id, error = %e, "masking skipped, indexing unmasked text");
                doc.text = String::from_utf8_lossy(raw).into_owned();
                Masking::Skipped
            }
        };
        self.run(doc, masking).await
    }

    /// Ingest several documents concurrently, at most `concurrency` at a time.
    ///
    /// Results come back in completion order, each paired with its document.
    pub async fn ingest_many(
        &self,
        docs: Vec<Document>,
        concurrency: usize,
    ) -> Vec<(Document, Result<IngestReport, IngestError>)> {
        stream::iter(docs.into_iter().map(|mut doc| async move {
            let result = self.ingest(&mut doc).await;
            (doc, result)
        }))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
    }

    /// Remove a document's index entries, then its metadata record.
    ///
    /// Once this returns, no retrieval can see the document.
    pub async fn delete_document(&self, document_id: &str) -> Result<DeleteReport, IngestError> {
        let chunks_removed = self
            .retry
            .run("delete", || self.index.delete_by_document(document_id))
            .await
            .map_err(|source| IngestError::Index {
                document_id: document_id.to_string(),
                source,
            })?;
        let record_removed =
            self.metadata
                .delete(document_id)
                .await
                .map_err(|source| IngestError::Metadata {
                    document_id: document_id.to_string(),
                    source,
                })?;
        info!(document_id, chunks_removed, record_removed, "document deleted");
        Ok(DeleteReport {
            chunks_removed,
            record_removed,
        })
    }

    async fn run(&self, doc: &mut Document, masking: Masking) -> Result<IngestReport, IngestError> {
        match self.process(doc, masking).await {
            Ok(report) => Ok(report),
            Err(e) => {
                doc.status = DocumentStatus::Failed;
                doc.failure_reason = Some(e.to_string());
                warn!(document_id = %doc.id, error = %e, "ingestion failed");
                if let Err(meta) = self.metadata.put(doc).await {
                    warn!(document_id = %doc.id, error = %meta, "could not record failed status");
                }
                Err(e)
            }
        }
    }

    async fn process(&self, doc: &mut Document, masking: Masking) -> Result<IngestReport, IngestError> {
        let id = doc.id.clone();

        if let Err(source) = self.chunking.validate() {
            return Err(IngestError::Chunking {
                document_id: id,
                source,
            });
        }

        doc.status = DocumentStatus::Pending;
        doc.failure_reason = None;
        doc.pii_unmasked = matches!(masking, Masking::Skipped);
        self.metadata
            .put(doc)
            .await
            .map_err(|source| IngestError::Metadata {
                document_id: id.clone(),
                source,
            })?;

        let masked = match masking {
            Masking::Run => self.masker.mask(&doc.text),
            Masking::Done(result) => result,
            Masking::Skipped => MaskResult {
                masked_text: doc.text.clone(),
                spans: Vec::new(),
            },
        };
        let pii_detected = masked.counts();
        debug!(document_id = %id, spans = masked.spans.len(), ?pii_detected, "masked");

        let chunks = chunk_text(&id, &masked.masked_text, &doc.access_roles, &self.chunking)
            .map_err(|source| IngestError::Chunking {
                document_id: id.clone(),
                source,
            })?;
        info!(document_id = %id, chunks = chunks.len(), "chunked");

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_all(self.embedder.as_ref(), &texts, &self.retry)
            .await
            .map_err(|source| IngestError::Embedding {
                document_id: id.clone(),
                source,
            })?;
        info!(document_id = %id, vectors = vectors.len(), model = self.embedder.model_name(), "embedded");

        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry::from_chunk(chunk, vector, doc.department.as_deref()))
            .collect();

        let replaced = self
            .retry
            .run("delete", || self.index.delete_by_document(&id))
            .await
            .map_err(|source| IngestError::Index {
                document_id: id.clone(),
                source,
            })?;
        if replaced > 0 {
            debug!(document_id = %id, replaced, "removed previous entries");
        }

        if !entries.is_empty() {
            let upserted = self
                .retry
                .run("upsert", || self.index.upsert(&entries))
                .await;
            if let Err(source) = upserted {
                return Err(match self.rollback(&id).await {
                    Ok(()) => IngestError::Index {
                        document_id: id,
                        source,
                    },
                    Err(rollback) => IngestError::RollbackFailed {
                        document_id: id,
                        source,
                        rollback,
                    },
                });
            }
        }
        info!(document_id = %id, entries = entries.len(), "indexed");

        doc.status = DocumentStatus::Processed;
        doc.chunk_count = chunks.len();
        doc.pii_detected = pii_detected.clone();
        self.metadata
            .put(doc)
            .await
            .map_err(|source| IngestError::Metadata {
                document_id: id.clone(),
                source,
            })?;

        Ok(IngestReport {
            document_id: id,
            chunk_count: chunks.len(),
            pii_detected,
            replaced,
            pii_unmasked: doc.pii_unmasked,
        })
    }

    async fn rollback(&self, document_id: &str) -> Result<(), IndexError> {
        match self
            .retry
            .run("rollback", || self.index.delete_by_document(document_id))
            .await
        {
            Ok(removed) => {
                warn!(document_id, removed, "rolled back partial upsert");
                Ok(())
            }
            Err(e) => {
                error!(document_id, error = %e, "rollback failed, chunks may remain searchable");
                Err(e)
            }
        }
    }
}
