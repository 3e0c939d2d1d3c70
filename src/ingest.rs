//! `hrx ingest`, `hrx delete` and `hrx docs`.
//!
//! Files are read as raw bytes and handed to the pipeline's byte path, so
//! text that is not valid UTF-8 is still indexed (unmasked, and flagged).
//! The document id is derived from the content and filename, making
//! re-uploads of the same file replace the earlier ingestion.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};

use hr_harness_core::models::Document;
use hr_harness_core::pipeline::content_id;
use hr_harness_core::store::MetadataStore;

use crate::config::Config;
use crate::harness::Harness;

pub async fn run_ingest(
    config: &Config,
    path: &Path,
    department: Option<String>,
    roles: Vec<String>,
    uploaded_by: Option<String>,
) -> Result<()> {
    let raw = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut doc = Document::new(String::new(), roles)
        .with_id(content_id(&raw, &filename))
        .with_filename(filename.clone());
    if let Some(dept) = department {
        doc = doc.with_department(dept);
    }
    if let Some(user) = uploaded_by {
        doc = doc.with_uploader(user);
    }

    let harness = Harness::open(config).await?;
    let result = harness.pipeline.ingest_bytes(&mut doc, &raw).await;
    harness.close().await?;
    let report = result.with_context(|| format!("Failed to ingest {}", filename))?;

    println!("ingest {}", filename);
    println!("  document: {}", report.document_id);
    println!("  chunks: {}", report.chunk_count);
    println!("  pii masked: {}", format_counts(&report.pii_detected));
    if report.replaced > 0 {
        println!("  replaced entries: {}", report.replaced);
    }
    if report.pii_unmasked {
        println!("  warning: file is not valid UTF-8; indexed without PII masking");
    }
    println!("ok");
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let harness = Harness::open(config).await?;
    let result = harness.pipeline.delete_document(id).await;
    harness.close().await?;
    let report = result?;

    if report.chunks_removed == 0 && !report.record_removed {
        bail!("Document not found: {}", id);
    }
    println!("delete {}", id);
    println!("  chunks removed: {}", report.chunks_removed);
    println!("ok");
    Ok(())
}

pub async fn run_docs(config: &Config) -> Result<()> {
    let harness = Harness::open(config).await?;
    let docs = harness.metadata.list().await;
    harness.close().await?;
    let docs = docs?;

    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    for doc in &docs {
        println!(
            "{}  {:<9}  {} chunks  {}",
            doc.id,
            doc.status,
            doc.chunk_count,
            doc.filename.as_deref().unwrap_or("(unnamed)")
        );
        if let Some(ref dept) = doc.department {
            println!("    department: {}", dept);
        }
        println!(
            "    roles: {}",
            doc.access_roles.iter().cloned().collect::<Vec<_>>().join(", ")
        );
        println!("    uploaded: {}", doc.uploaded_at.format("%Y-%m-%d %H:%M"));
        if let Some(ref reason) = doc.failure_reason {
            println!("    failure: {}", reason);
        }
        if doc.pii_unmasked {
            println!("    warning: indexed without PII masking");
        }
    }
    Ok(())
}

pub fn format_counts(counts: &BTreeMap<String, usize>) -> String {
    if counts.is_empty() {
        return "none".to_string();
    }
    counts
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}
