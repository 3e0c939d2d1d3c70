//! SQLite-backed [`VectorIndex`] and [`MetadataStore`] implementations.
//!
//! Vectors are stored as little-endian f32 BLOBs next to the masked chunk
//! text and its roles (a JSON array). Search is brute-force cosine
//! similarity over every row. Upsert and delete each run in one
//! transaction, so a failed batch leaves no partial state behind.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use hr_harness_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use hr_harness_core::error::{IndexError, MetadataError};
use hr_harness_core::models::{Document, DocumentStatus};
use hr_harness_core::rbac::RoleFilter;
use hr_harness_core::store::{
    snippet, sort_candidates, Candidate, IndexEntry, MetadataStore, VectorIndex, SNIPPET_CHARS,
};

fn index_err(e: sqlx::Error) -> IndexError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            IndexError::Unavailable(e.to_string())
        }
        other => IndexError::Backend(other.to_string()),
    }
}

fn meta_err(e: impl std::fmt::Display) -> MetadataError {
    MetadataError(e.to_string())
}

fn parse_roles(json: &str) -> Result<BTreeSet<String>, serde_json::Error> {
    serde_json::from_str(json)
}

/// SQLite implementation of [`VectorIndex`].
pub struct SqliteIndex {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool, dims: usize) -> Self {
        Self { pool, dims }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Fail if stored vectors were written with a different dimensionality.
    ///
    /// Changing `embedding.dims` or the model needs a fresh database or a
    /// re-ingest of every document after deleting the old ones.
    pub async fn check_dims(&self) -> Result<(), IndexError> {
        let stored: Vec<i64> = sqlx::query_scalar("SELECT DISTINCT dims FROM chunks")
            .fetch_all(&self.pool)
            .await
            .map_err(index_err)?;
        match stored.iter().find(|&&d| d as usize != self.dims) {
            Some(&actual) => Err(IndexError::DimensionMismatch {
                expected: self.dims,
                actual: actual as usize,
            }),
            None => Ok(()),
        }
    }

    fn row_to_candidate(&self, row: &SqliteRow, query: &[f32]) -> Result<Candidate, IndexError> {
        let blob: Vec<u8> = row.try_get("embedding").map_err(index_err)?;
        let roles_json: String = row.try_get("roles").map_err(index_err)?;
        let roles = parse_roles(&roles_json).map_err(|e| IndexError::Backend(e.to_string()))?;
        let chunk_index: i64 = row.try_get("chunk_index").map_err(index_err)?;
        let seq: i64 = row.try_get("seq").map_err(index_err)?;
        let text: String = row.try_get("snippet").map_err(index_err)?;
        Ok(Candidate {
            chunk_id: row.try_get("id").map_err(index_err)?,
            document_id: row.try_get("document_id").map_err(index_err)?,
            chunk_index: chunk_index as usize,
            score: cosine_similarity(query, &blob_to_vec(&blob)) as f64,
            seq: seq as u64,
            roles,
            department: row.try_get("department").map_err(index_err)?,
            snippet: snippet(&text),
        })
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
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

        let mut tx = self.pool.begin().await.map_err(index_err)?;
        for entry in entries {
            let roles =
                serde_json::to_string(&entry.roles).map_err(|e| IndexError::Backend(e.to_string()))?;
            // REPLACE deletes the old row, so a rewritten chunk gets a fresh seq.
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO chunks
                    (id, document_id, chunk_index, text, roles, department, embedding, dims)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&entry.chunk_id)
            .bind(&entry.document_id)
            .bind(entry.chunk_index as i64)
            .bind(&entry.text)
            .bind(&roles)
            .bind(&entry.department)
            .bind(vec_to_blob(&entry.vector))
            .bind(self.dims as i64)
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;
        }
        tx.commit().await.map_err(index_err)?;
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

        let rows = sqlx::query(
            r#"
            SELECT seq, id, document_id, chunk_index, roles, department, embedding,
                   substr(text, 1, ?) AS snippet
            FROM chunks
            "#,
        )
        .bind(SNIPPET_CHARS as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(index_err)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let candidate = self.row_to_candidate(row, query)?;
            if filter.map_or(true, |f| f.admits(&candidate.roles)) {
                candidates.push(candidate);
            }
        }
        sort_candidates(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize, IndexError> {
        let mut tx = self.pool.begin().await.map_err(index_err)?;
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;
        tx.commit().await.map_err(index_err)?;
        Ok(result.rows_affected() as usize)
    }

    async fn count(&self) -> Result<usize, IndexError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(index_err)?;
        Ok(n as usize)
    }

    async fn close(&self) -> Result<(), IndexError> {
        self.pool.close().await;
        Ok(())
    }
}

/// SQLite implementation of [`MetadataStore`].
///
/// The document's raw `text` is not persisted: it may hold unmasked PII.
/// Records read back have an empty `text`.
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_document(row: &SqliteRow) -> Result<Document, MetadataError> {
    let roles_json: String = row.try_get("access_roles").map_err(meta_err)?;
    let pii_json: String = row.try_get("pii_detected").map_err(meta_err)?;
    let status: String = row.try_get("status").map_err(meta_err)?;
    let uploaded_at: String = row.try_get("uploaded_at").map_err(meta_err)?;
    let chunk_count: i64 = row.try_get("chunk_count").map_err(meta_err)?;
    let pii_unmasked: i64 = row.try_get("pii_unmasked").map_err(meta_err)?;

    Ok(Document {
        id: row.try_get("id").map_err(meta_err)?,
        department: row.try_get("department").map_err(meta_err)?,
        access_roles: parse_roles(&roles_json).map_err(meta_err)?,
        text: String::new(),
        uploaded_at: DateTime::parse_from_rfc3339(&uploaded_at)
            .map_err(meta_err)?
            .with_timezone(&Utc),
        status: DocumentStatus::parse(&status)
            .ok_or_else(|| MetadataError(format!("unknown document status: {}", status)))?,
        filename: row.try_get("filename").map_err(meta_err)?,
        uploaded_by: row.try_get("uploaded_by").map_err(meta_err)?,
        chunk_count: chunk_count as usize,
        pii_detected: serde_json::from_str::<BTreeMap<String, usize>>(&pii_json)
            .map_err(meta_err)?,
        failure_reason: row.try_get("failure_reason").map_err(meta_err)?,
        pii_unmasked: pii_unmasked != 0,
    })
}

const DOCUMENT_COLUMNS: &str = "id, department, access_roles, uploaded_at, status, filename, \
     uploaded_by, chunk_count, pii_detected, failure_reason, pii_unmasked";

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn put(&self, doc: &Document) -> Result<(), MetadataError> {
        let roles = serde_json::to_string(&doc.access_roles).map_err(meta_err)?;
        let pii = serde_json::to_string(&doc.pii_detected).map_err(meta_err)?;
        sqlx::query(
            r#"
            INSERT INTO documents (id, department, access_roles, uploaded_at, status, filename,
                                   uploaded_by, chunk_count, pii_detected, failure_reason, pii_unmasked)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                department = excluded.department,
                access_roles = excluded.access_roles,
                uploaded_at = excluded.uploaded_at,
                status = excluded.status,
                filename = excluded.filename,
                uploaded_by = excluded.uploaded_by,
                chunk_count = excluded.chunk_count,
                pii_detected = excluded.pii_detected,
                failure_reason = excluded.failure_reason,
                pii_unmasked = excluded.pii_unmasked
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.department)
        .bind(&roles)
        .bind(doc.uploaded_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .bind(doc.status.as_str())
        .bind(&doc.filename)
        .bind(&doc.uploaded_by)
        .bind(doc.chunk_count as i64)
        .bind(&pii)
        .bind(&doc.failure_reason)
        .bind(doc.pii_unmasked as i64)
        .execute(&self.pool)
        .await
        .map_err(meta_err)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, MetadataError> {
        let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(meta_err)?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn list(&self) -> Result<Vec<Document>, MetadataError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY uploaded_at DESC, id ASC",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(meta_err)?;
        rows.iter().map(row_to_document).collect()
    }

    async fn delete(&self, id: &str) -> Result<bool, MetadataError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(meta_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn close(&self) -> Result<(), MetadataError> {
        self.pool.close().await;
        Ok(())
    }
}
