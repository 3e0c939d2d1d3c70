//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Each stage has its own error type so callers can tell a fatal
//! configuration problem from a transient capability failure. Access denial
//! has no error variant: unauthorised chunks are omitted from results.

use thiserror::Error;

/// Masking could not run on the supplied input.
///
/// Non-fatal: the pipeline falls back to indexing the text unmasked and
/// flags the document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MaskingError {
    #[error("input is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidEncoding { valid_up_to: usize },
}

/// Invalid chunking configuration. Fatal, raised before any external call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("max_size must be > 0")]
    ZeroMaxSize,
    #[error("overlap ({overlap}) must be smaller than max_size ({max_size})")]
    OverlapTooLarge { overlap: usize, max_size: usize },
}

/// Failure reported by (or about) the embedding capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("embedding service unavailable: {0}")]
    Unavailable(String),
    #[error("embedding service rate limited: {0}")]
    RateLimited(String),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding count mismatch: sent {expected} texts, got {actual} vectors")]
    CountMismatch { expected: usize, actual: usize },
    #[error("embedding request rejected: {0}")]
    Rejected(String),
}

impl EmbeddingError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::Unavailable(_)
                | EmbeddingError::RateLimited(_)
                | EmbeddingError::CountMismatch { .. }
        )
    }
}

/// Failure reported by the vector index capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("vector index unavailable: {0}")]
    Unavailable(String),
    #[error("vector dimension mismatch: index holds {expected}, entry has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("vector index error: {0}")]
    Backend(String),
}

impl IndexError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexError::Unavailable(_))
    }
}

/// Failure reported by the metadata store capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("metadata store error: {0}")]
pub struct MetadataError(pub String);

/// Ingestion failure for one document.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("document {document_id}: {source}")]
    Chunking {
        document_id: String,
        #[source]
        source: ChunkingError,
    },
    #[error("document {document_id}: {source}")]
    Embedding {
        document_id: String,
        #[source]
        source: EmbeddingError,
    },
    #[error("document {document_id}: {source}")]
    Index {
        document_id: String,
        #[source]
        source: IndexError,
    },
    /// The upsert failed and so did every attempt to remove what it wrote.
    /// Some of the document's chunks may still be searchable.
    #[error("document {document_id}: {source}; rollback failed: {rollback}")]
    RollbackFailed {
        document_id: String,
        #[source]
        source: IndexError,
        rollback: IndexError,
    },
    #[error("document {document_id}: {source}")]
    Metadata {
        document_id: String,
        #[source]
        source: MetadataError,
    },
}

impl IngestError {
    pub fn document_id(&self) -> &str {
        match self {
            IngestError::Chunking { document_id, .. }
            | IngestError::Embedding { document_id, .. }
            | IngestError::Index { document_id, .. }
            | IngestError::RollbackFailed { document_id, .. }
            | IngestError::Metadata { document_id, .. } => document_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(EmbeddingError::Unavailable("down".into()).is_retryable());
        assert!(EmbeddingError::RateLimited("429".into()).is_retryable());
        assert!(!EmbeddingError::DimensionMismatch {
            expected: 3,
            actual: 4
        }
        .is_retryable());
        assert!(!EmbeddingError::Rejected("400".into()).is_retryable());
        assert!(IndexError::Unavailable("timeout".into()).is_retryable());
        assert!(!IndexError::Backend("corrupt".into()).is_retryable());
    }

    #[test]
    fn test_ingest_error_carries_document_id() {
        let err = IngestError::Chunking {
            document_id: "doc-1".into(),
            source: ChunkingError::ZeroMaxSize,
        };
        assert_eq!(err.document_id(), "doc-1");
        assert_eq!(err.to_string(), "document doc-1: max_size must be > 0");
    }
}
