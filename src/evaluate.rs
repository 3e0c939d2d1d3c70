//! `hrx evaluate`: score the retriever against a judgment file.
//!
//! The file is a JSON array of judgments:
//!
//! ```json
//! [
//!   {
//!     "query_id": "leave-1",
//!     "query": "How many days of annual leave do I get?",
//!     "principal_roles": ["engineer"],
//!     "relevant": ["3f2a9c0d1b7e4a55#0"]
//!   }
//! ]
//! ```

use std::path::Path;

use anyhow::{Context, Result};

use hr_harness_core::evaluation::evaluate_retriever;
use hr_harness_core::models::RelevanceJudgment;

use crate::config::Config;
use crate::harness::Harness;

pub fn load_judgments(path: &Path) -> Result<Vec<RelevanceJudgment>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read judgments file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse judgments file: {}", path.display()))
}

pub async fn run_evaluate(config: &Config, path: &Path, k: Option<usize>) -> Result<()> {
    let judgments = load_judgments(path)?;
    let k = k.unwrap_or(config.retrieval.top_k);

    let harness = Harness::open(config).await?;
    let metrics = evaluate_retriever(&harness.retriever, &judgments, k).await;
    harness.close().await?;

    print!("{}", metrics.summary());
    for (query_id, m) in &metrics.per_query {
        let recall = m
            .recall_at_k
            .map(|r| format!("{:.3}", r))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "  {}: recall={} precision={:.3} rr={:.3} ({}/{} relevant found)",
            query_id, recall, m.precision_at_k, m.reciprocal_rank, m.relevant_found, m.relevant_total
        );
    }
    Ok(())
}
