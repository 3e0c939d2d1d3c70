//! # HR Harness Core
//!
//! Retrieval-and-governance logic for HR Harness: data models, PII masking,
//! structure-aware chunking, role-based access control, the embedding and
//! vector-index capability traits, the ingestion pipeline, the retriever and
//! ranking evaluation.
//!
//! This crate contains no sqlx, HTTP, or filesystem dependencies. Concrete
//! storage and embedding clients live in the `hr-harness` app crate; the
//! in-memory [`store::memory`] backends and [`embedding::HashingEmbedder`]
//! stand in for them in tests.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod models;
pub mod pii;
pub mod pipeline;
pub mod rbac;
pub mod retriever;
pub mod retry;
pub mod store;
