//! Ranking quality metrics: Recall@k, Precision@k and MRR.
//!
//! Retrieved identifiers are compared against a [`RelevanceJudgment`]'s
//! relevant chunk ids. Queries with no relevant ids have no defined recall
//! and are left out of the recall mean.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;
use tracing::warn;

use crate::models::{Principal, QueryResult, RelevanceJudgment};
use crate::retriever::Retriever;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMetrics {
    /// `None` when the judgment lists no relevant ids.
    pub recall_at_k: Option<f64>,
    pub precision_at_k: f64,
    pub reciprocal_rank: f64,
    pub relevant_found: usize,
    pub relevant_total: usize,
    pub retrieved_total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateMetrics {
    pub k: usize,
    /// Mean over queries with a defined recall; `None` if there are none.
    pub mean_recall: Option<f64>,
    pub mean_precision: f64,
    pub mrr: f64,
    pub total_queries: usize,
    /// Runs with no matching judgment, or judgments without query text.
    pub skipped: usize,
    pub per_query: BTreeMap<String, QueryMetrics>,
}

impl AggregateMetrics {
    /// Plain-text report for terminals and logs.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Evaluation Results ({} queries, k={})", self.total_queries, self.k);
        let _ = writeln!(out, "{}", "=".repeat(40));
        match self.mean_recall {
            Some(r) => {
                let _ = writeln!(out, "Mean Recall@k:    {:.3}", r);
            }
            None => {
                let _ = writeln!(out, "Mean Recall@k:    n/a");
            }
        }
        let _ = writeln!(out, "Mean Precision@k: {:.3}", self.mean_precision);
        let _ = writeln!(out, "MRR:              {:.3}", self.mrr);
        if self.skipped > 0 {
            let _ = writeln!(out, "Skipped:          {}", self.skipped);
        }
        out
    }
}

/// Score one ranked result against its judgment, looking at the first `k` items.
///
/// Precision divides by `k`, not by the number returned, so short result
/// lists are penalised. `k == 0` scores zero everywhere.
pub fn evaluate_query(result: &QueryResult, judgment: &RelevanceJudgment, k: usize) -> QueryMetrics {
    let top: Vec<&str> = result.items.iter().take(k).map(|i| i.chunk_id.as_str()).collect();
    let relevant_total = judgment.relevant.len();

    let mut seen = std::collections::BTreeSet::new();
    let relevant_found = top
        .iter()
        .filter(|id| judgment.relevant.contains(**id) && seen.insert(**id))
        .count();

    let recall_at_k = if relevant_total == 0 {
        None
    } else {
        Some(relevant_found as f64 / relevant_total as f64)
    };
    let precision_at_k = if k == 0 {
        0.0
    } else {
        relevant_found as f64 / k as f64
    };
    let reciprocal_rank = top
        .iter()
        .position(|id| judgment.relevant.contains(*id))
        .map(|pos| 1.0 / (pos + 1) as f64)
        .unwrap_or(0.0);

    QueryMetrics {
        recall_at_k,
        precision_at_k,
        reciprocal_rank,
        relevant_found,
        relevant_total,
        retrieved_total: result.items.len(),
    }
}

/// Score many `(query_id, result)` runs and average the metrics.
pub fn evaluate_batch(
    runs: &[(String, QueryResult)],
    judgments: &[RelevanceJudgment],
    k: usize,
) -> AggregateMetrics {
    let by_id: BTreeMap<&str, &RelevanceJudgment> =
        judgments.iter().map(|j| (j.query_id.as_str(), j)).collect();

    let mut agg = AggregateMetrics {
        k,
        ..Default::default()
    };
    for (query_id, result) in runs {
        match by_id.get(query_id.as_str()) {
            Some(judgment) => {
                agg.per_query
                    .insert(query_id.clone(), evaluate_query(result, judgment, k));
            }
            None => {
                warn!(query_id = %query_id, "no relevance judgment for query, skipping");
                agg.skipped += 1;
            }
        }
    }
    finish(agg)
}

fn finish(mut agg: AggregateMetrics) -> AggregateMetrics {
    let n = agg.per_query.len();
    agg.total_queries = n;
    if n == 0 {
        return agg;
    }
    let recalls: Vec<f64> = agg.per_query.values().filter_map(|m| m.recall_at_k).collect();
    agg.mean_recall = if recalls.is_empty() {
        None
    } else {
        Some(recalls.iter().sum::<f64>() / recalls.len() as f64)
    };
    agg.mean_precision = agg.per_query.values().map(|m| m.precision_at_k).sum::<f64>() / n as f64;
    agg.mrr = agg.per_query.values().map(|m| m.reciprocal_rank).sum::<f64>() / n as f64;
    agg
}

/// Run `retriever` over judgments that carry query text and score the results.
///
/// Each judgment's `principal_roles` become the querying principal.
pub async fn evaluate_retriever(
    retriever: &Retriever,
    judgments: &[RelevanceJudgment],
    k: usize,
) -> AggregateMetrics {
    let mut runs = Vec::with_capacity(judgments.len());
    let mut skipped = 0;
    for j in judgments {
        let Some(query) = j.query.as_deref() else {
            warn!(query_id = %j.query_id, "judgment has no query text, skipping");
            skipped += 1;
            continue;
        };
        let principal = Principal::with_roles(j.principal_roles.iter().cloned());
        let result = retriever.retrieve(query, &principal, k).await;
        if let Some(reason) = &result.degraded {
            warn!(query_id = %j.query_id, reason = %reason, "retrieval degraded during evaluation");
        }
        runs.push((j.query_id.clone(), result));
    }
    let mut agg = evaluate_batch(&runs, judgments, k);
    agg.skipped += skipped;
    agg
}
