//! Embedding capability trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! the deterministic [`HashingEmbedder`] used offline and in tests, the
//! order-preserving batched helper [`embed_all`], and pure helpers for
//! vector serialization and similarity.
//!
//! Network-backed providers (OpenAI) live in the `hr-harness` app crate.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::EmbeddingError;
use crate::retry::RetryPolicy;

/// An external text-embedding capability.
///
/// `embed` returns one vector per input, in input order, each of length
/// [`dims`](Embedder::dims).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Largest number of texts accepted in one call, if limited.
    fn max_batch_size(&self) -> Option<usize> {
        None
    }
    /// Embed a batch of texts in one call.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Embed `texts` with sub-batching, validation and bounded retries.
///
/// Sub-batches follow the embedder's `max_batch_size` and are concatenated
/// in input order. Every sub-batch is checked for vector count and
/// dimension; a count mismatch is retried like an outage, a dimension
/// mismatch is not.
pub async fn embed_all(
    embedder: &dyn Embedder,
    texts: &[String],
    retry: &RetryPolicy,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let batch_size = embedder.max_batch_size().unwrap_or(texts.len()).max(1);
    let mut out = Vec::with_capacity(texts.len());

    for (n, batch) in texts.chunks(batch_size).enumerate() {
        let vectors = retry
            .run("embed", || async move {
                let vectors = embedder.embed(batch).await?;
                if vectors.len() != batch.len() {
                    return Err(EmbeddingError::CountMismatch {
                        expected: batch.len(),
                        actual: vectors.len(),
                    });
                }
                Ok(vectors)
            })
            .await?;

        for v in &vectors {
            if v.len() != embedder.dims() {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: embedder.dims(),
                    actual: v.len(),
                });
            }
        }
        debug!(batch = n, size = batch.len(), "embedded batch");
        out.extend(vectors);
    }

    Ok(out)
}

/// Embed a single query text.
pub async fn embed_query(
    embedder: &dyn Embedder,
    text: &str,
    retry: &RetryPolicy,
) -> Result<Vec<f32>, EmbeddingError> {
    let results = embed_all(embedder, &[text.to_string()], retry).await?;
    results.into_iter().next().ok_or(EmbeddingError::CountMismatch {
        expected: 1,
        actual: 0,
    })
}

/// Deterministic bag-of-words embedder.
///
/// Lower-cased alphanumeric tokens are hashed (SHA-256) into `dims`
/// buckets and the counts are L2-normalised. Texts sharing words get a
/// positive cosine similarity; no network or model is needed.
pub struct HashingEmbedder {
    dims: usize,
    batch_limit: Option<usize>,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims: dims.max(1),
            batch_limit: None,
        }
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = Some(limit);
        self
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bytes) % self.dims as u64) as usize;
            v[bucket] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing-bow"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn max_batch_size(&self) -> Option<usize> {
        self.batch_limit
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use hr_harness_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}
