//! `hrx query`: role-scoped semantic search from the command line.

use anyhow::{bail, Result};

use hr_harness_core::models::Principal;

use crate::config::Config;
use crate::harness::Harness;

pub async fn run_query(
    config: &Config,
    query: &str,
    roles: Vec<String>,
    top_k: Option<usize>,
    department: Option<String>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let principal = Principal::with_roles(roles);
    let top_k = top_k.unwrap_or(config.retrieval.top_k);

    let harness = Harness::open(config).await?;
    let result = harness
        .retriever
        .retrieve_filtered(query, &principal, top_k, department.as_deref())
        .await;
    harness.close().await?;

    if let Some(reason) = result.degraded {
        bail!("Retrieval unavailable: {}", reason);
    }

    if result.items.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, item) in result.items.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, item.score, item.chunk_id);
        println!("    document: {}", item.document_id);
        println!("    excerpt: \"{}\"", item.snippet.replace('\n', " ").trim());
        println!();
    }
    Ok(())
}
