//! Role-scoped semantic retrieval.
//!
//! Embeds the question, over-fetches nearest neighbours from the
//! [`VectorIndex`], then walks candidates in rank order keeping only those the
//! principal may see, until `top_k` are collected. If RBAC leaves the page
//! short while the index returned a full page, the search is repeated once
//! with a larger limit. Results are never padded.
//!
//! With `rerank` on, the page is re-scored as a blend of cosine similarity
//! and the share of query terms found in each snippet, then re-sorted.
//! Blended scores stay in `[-1, 1]`.
//!
//! Backend failures do not surface as errors: the returned [`QueryResult`]
//! has no items and carries the reason in `degraded`.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::embedding::{embed_query, Embedder};
use crate::error::IndexError;
use crate::models::{Principal, QueryResult, ResultItem};
use crate::rbac::{AccessPolicy, RoleFilter};
use crate::retry::RetryPolicy;
use crate::store::{sort_candidates, Candidate, VectorIndex};

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverConfig {
    /// Candidates fetched per requested result.
    pub over_fetch_factor: usize,
    /// Lower bound on the candidate page size.
    pub min_candidates: usize,
    /// Page growth for the single re-query.
    pub requery_factor: usize,
    /// Candidates scoring below this are dropped.
    pub score_threshold: Option<f64>,
    /// Push the role predicate down to the index.
    pub prefilter: bool,
    /// Re-score the page with query term overlap.
    pub rerank: bool,
}

/// Share of the reranked score taken by term overlap.
pub const RERANK_WEIGHT: f64 = 0.3;

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            over_fetch_factor: 3,
            min_candidates: 20,
            requery_factor: 4,
            score_threshold: None,
            prefilter: false,
            rerank: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverStats {
    pub vector_count: usize,
    pub model: String,
    pub dims: usize,
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    policy: AccessPolicy,
    config: RetrieverConfig,
    retry: RetryPolicy,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            policy: AccessPolicy::default(),
            config: RetrieverConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_config(mut self, config: RetrieverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Return up to `top_k` permitted chunks ranked by similarity.
    pub async fn retrieve(&self, question: &str, principal: &Principal, top_k: usize) -> QueryResult {
        self.retrieve_filtered(question, principal, top_k, None).await
    }

    /// Like [`retrieve`](Self::retrieve), restricted to one department.
    pub async fn retrieve_filtered(
        &self,
        question: &str,
        principal: &Principal,
        top_k: usize,
        department: Option<&str>,
    ) -> QueryResult {
        if question.trim().is_empty() || top_k == 0 {
            return QueryResult::empty(question);
        }

        let query_vec = match embed_query(self.embedder.as_ref(), question, &self.retry).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed");
                return QueryResult::degraded(question, e.to_string());
            }
        };

        let filter = if self.config.prefilter {
            Some(self.policy.role_filter(principal))
        } else {
            None
        };

        let mut limit = (top_k.saturating_mul(self.config.over_fetch_factor))
            .max(self.config.min_candidates)
            .max(top_k);
        let mut requeried = false;

        loop {
            let mut candidates = match self.search(&query_vec, limit, filter.as_ref()).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, limit, "vector search failed");
                    return QueryResult::degraded(question, e.to_string());
                }
            };
            sort_candidates(&mut candidates);

            let mut items = self.select(&candidates, principal, top_k, department);
            let page_full = candidates.len() >= limit;

            if items.len() < top_k && page_full && !requeried {
                let next = limit.saturating_mul(self.config.requery_factor.max(2));
                debug!(found = items.len(), limit, next, "short after access filtering, re-querying");
                limit = next;
                requeried = true;
                continue;
            }

            if self.config.rerank {
                rerank(question, &mut items);
            }

            info!(
                top_k,
                returned = items.len(),
                examined = candidates.len(),
                "retrieval complete"
            );
            return QueryResult {
                query: question.to_string(),
                items,
                candidates_examined: candidates.len(),
                degraded: None,
            };
        }
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&RoleFilter>,
    ) -> Result<Vec<Candidate>, IndexError> {
        self.retry
            .run("search", || self.index.search(query, limit, filter))
            .await
    }

    fn select(
        &self,
        candidates: &[Candidate],
        principal: &Principal,
        top_k: usize,
        department: Option<&str>,
    ) -> Vec<ResultItem> {
        let mut items = Vec::with_capacity(top_k);
        for c in candidates {
            if items.len() == top_k {
                break;
            }
            if self.config.score_threshold.is_some_and(|t| c.score < t) {
                continue;
            }
            if department.is_some_and(|d| c.department.as_deref() != Some(d)) {
                continue;
            }
            if !self.policy.is_permitted(principal, &c.roles) {
                continue;
            }
            items.push(ResultItem {
                chunk_id: c.chunk_id.clone(),
                score: c.score,
                document_id: c.document_id.clone(),
                chunk_index: c.chunk_index,
                snippet: c.snippet.clone(),
            });
        }
        items
    }

    pub async fn stats(&self) -> Result<RetrieverStats, IndexError> {
        Ok(RetrieverStats {
            vector_count: self.index.count().await?,
            model: self.embedder.model_name().to_string(),
            dims: self.embedder.dims(),
        })
    }
}

fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Blend each score with the fraction of query terms present in the
/// snippet and re-sort. Ties keep their previous order.
fn rerank(question: &str, items: &mut [ResultItem]) {
    let wanted = terms(question);
    if wanted.is_empty() {
        return;
    }
    for item in items.iter_mut() {
        let found = terms(&item.snippet);
        let overlap = wanted.intersection(&found).count() as f64 / wanted.len() as f64;
        item.score = (1.0 - RERANK_WEIGHT) * item.score + RERANK_WEIGHT * overlap;
    }
    items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    debug!(reranked = items.len(), "applied term overlap rerank");
}
