//! # HR Harness
//!
//! Retrieval and governance for an HR document assistant.
//!
//! Documents are PII-masked, chunked, embedded and written to SQLite along
//! with the roles allowed to read them. Queries are embedded, matched by
//! cosine similarity, and filtered so a principal only ever sees chunks
//! their roles permit. An evaluator scores retrieval quality against
//! labeled judgments.
//!
//! The algorithms live in the `hr-harness-core` crate and only talk to
//! storage and embedding providers through traits. This crate supplies the
//! SQLite and HTTP implementations, TOML configuration and the `hrx` CLI.
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────────┐   ┌──────────┐
//! │  file    │──▶│ mask → chunk → embed      │──▶│  SQLite  │
//! └──────────┘   └───────────────────────────┘   └────┬─────┘
//!                                                     │
//!                ┌───────────────────────────┐        │
//!   question ───▶│ embed → search → RBAC     │◀───────┘
//!                └───────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite vector index and metadata store |
//! | [`embedding`] | Embedding provider selection and OpenAI client |
//! | [`harness`] | Wiring config into pipeline and retriever |
//! | [`ingest`] | `ingest`, `delete` and `docs` commands |
//! | [`query`] | `query` command |
//! | [`mask_cmd`] | `mask` command |
//! | [`evaluate`] | `evaluate` command |
//! | [`stats`] | `stats` command |

pub mod config;
pub mod db;
pub mod embedding;
pub mod evaluate;
pub mod harness;
pub mod ingest;
pub mod mask_cmd;
pub mod migrate;
pub mod query;
pub mod sqlite_store;
pub mod stats;
