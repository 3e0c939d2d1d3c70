//! TOML configuration for the `hrx` binary.
//!
//! Every section except `[db]` is optional and falls back to defaults.
//! [`load_config`] parses and validates the file; the `*_config` helpers
//! translate sections into the core crate's types.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use hr_harness_core::chunk::{ChunkConfig, ChunkStrategy, SplitLevel};
use hr_harness_core::pii::{PiiCategory, PiiMasker};
use hr_harness_core::rbac::{AccessPolicy, DEFAULT_UNIVERSAL_ROLE};
use hr_harness_core::retriever::RetrieverConfig;
use hr_harness_core::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub rbac: RbacConfig,
    #[serde(default)]
    pub pii: PiiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
    /// One of `paragraph`, `line`, `sentence`, `word`, `character`.
    #[serde(default = "default_split_floor")]
    pub split_floor: String,
    /// One of `recursive`, `sentence`, `fixed`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// A final chunk shorter than this borrows text from the one before.
    #[serde(default)]
    pub min_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
            split_floor: default_split_floor(),
            strategy: default_strategy(),
            min_chunk_chars: 0,
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}
fn default_split_floor() -> String {
    "character".to_string()
}
fn default_strategy() -> String {
    "recursive".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_over_fetch")]
    pub over_fetch_factor: usize,
    #[serde(default = "default_min_candidates")]
    pub min_candidates: usize,
    #[serde(default = "default_requery_factor")]
    pub requery_factor: usize,
    #[serde(default)]
    pub score_threshold: Option<f64>,
    #[serde(default)]
    pub prefilter: bool,
    /// Blend query term overlap into the final ranking.
    #[serde(default)]
    pub rerank: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            over_fetch_factor: default_over_fetch(),
            min_candidates: default_min_candidates(),
            requery_factor: default_requery_factor(),
            score_threshold: None,
            prefilter: false,
            rerank: false,
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_over_fetch() -> usize {
    3
}
fn default_min_candidates() -> usize {
    20
}
fn default_requery_factor() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `hashing` (offline, deterministic) or `openai`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hashing".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}

pub const DEFAULT_HASHING_DIMS: usize = 256;

impl EmbeddingConfig {
    /// `max_retries` retries after the first attempt, doubling from `backoff_ms`.
    pub fn retry_policy(&self) -> RetryPolicy {
        let base = Duration::from_millis(self.backoff_ms);
        RetryPolicy {
            max_attempts: self.max_retries.saturating_add(1),
            base_delay: base,
            max_delay: base.saturating_mul(32),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RbacConfig {
    #[serde(default = "default_universal_role")]
    pub universal_role: String,
    /// Role that may see every chunk, including ones with no roles.
    #[serde(default)]
    pub admin_role: Option<String>,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            universal_role: default_universal_role(),
            admin_role: None,
        }
    }
}

fn default_universal_role() -> String {
    DEFAULT_UNIVERSAL_ROLE.to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PiiConfig {
    /// Categories to leave unmasked, e.g. `["POSTCODE"]`.
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl Config {
    pub fn chunk_config(&self) -> Result<ChunkConfig> {
        let floor = SplitLevel::parse(&self.chunking.split_floor).with_context(|| {
            format!(
                "Unknown chunking.split_floor: '{}'. Must be paragraph, line, sentence, word, or character.",
                self.chunking.split_floor
            )
        })?;
        let strategy = ChunkStrategy::parse(&self.chunking.strategy).with_context(|| {
            format!(
                "Unknown chunking.strategy: '{}'. Must be recursive, sentence, or fixed.",
                self.chunking.strategy
            )
        })?;
        Ok(ChunkConfig::new(self.chunking.max_chars, self.chunking.overlap_chars)
            .with_split_floor(floor)
            .with_strategy(strategy)
            .with_min_size(self.chunking.min_chunk_chars))
    }

    pub fn retriever_config(&self) -> RetrieverConfig {
        RetrieverConfig {
            over_fetch_factor: self.retrieval.over_fetch_factor,
            min_candidates: self.retrieval.min_candidates,
            requery_factor: self.retrieval.requery_factor,
            score_threshold: self.retrieval.score_threshold,
            prefilter: self.retrieval.prefilter,
            rerank: self.retrieval.rerank,
        }
    }

    pub fn access_policy(&self) -> AccessPolicy {
        let policy = AccessPolicy::new(self.rbac.universal_role.clone());
        match &self.rbac.admin_role {
            Some(role) => policy.with_admin_override(role.clone()),
            None => policy,
        }
    }

    pub fn masker(&self) -> Result<PiiMasker> {
        let mut disabled = BTreeSet::new();
        for name in &self.pii.disabled {
            match PiiCategory::parse(name) {
                Some(c) => {
                    disabled.insert(c);
                }
                None => bail!("Unknown PII category in pii.disabled: '{}'", name),
            }
        }
        Ok(PiiMasker::with_disabled(&disabled))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_chars == 0 {
        bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        bail!("chunking.overlap_chars must be < chunking.max_chars");
    }
    config.chunk_config()?;

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.over_fetch_factor < 1 {
        bail!("retrieval.over_fetch_factor must be >= 1");
    }
    if let Some(t) = config.retrieval.score_threshold {
        if !(-1.0..=1.0).contains(&t) {
            bail!("retrieval.score_threshold must be in [-1.0, 1.0]");
        }
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "hashing" => {
            if config.embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0");
            }
        }
        "openai" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
            if config.embedding.model.is_none() {
                bail!("embedding.model must be specified when provider is 'openai'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hashing or openai.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    config.masker()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse_config("[db]\npath = \"./data/hr.sqlite\"\n").unwrap();
        assert_eq!(cfg.chunking.max_chars, 1000);
        assert_eq!(cfg.chunking.overlap_chars, 200);
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.embedding.provider, "hashing");
        assert_eq!(cfg.rbac.universal_role, "all_staff");
        assert!(cfg.rbac.admin_role.is_none());
        assert_eq!(cfg.chunk_config().unwrap().split_floor, SplitLevel::Character);
        assert_eq!(cfg.chunk_config().unwrap().strategy, ChunkStrategy::Recursive);
        assert!(!cfg.retriever_config().rerank);
    }

    #[test]
    fn test_chunk_strategy_and_rerank_options() {
        let cfg = parse_config(
            "[db]\npath = \"x\"\n[chunking]\nstrategy = \"fixed\"\nmin_chunk_chars = 100\n[retrieval]\nrerank = true\n",
        )
        .unwrap();
        let chunk = cfg.chunk_config().unwrap();
        assert_eq!(chunk.strategy, ChunkStrategy::Fixed);
        assert_eq!(chunk.min_size, 100);
        assert!(cfg.retriever_config().rerank);

        let err = parse_config("[db]\npath = \"x\"\n[chunking]\nstrategy = \"semantic\"\n").unwrap_err();
        assert!(format!("{:#}", err).contains("chunking.strategy"));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_max() {
        let err = parse_config("[db]\npath = \"x\"\n[chunking]\nmax_chars = 50\noverlap_chars = 50\n")
            .unwrap_err();
        assert!(err.to_string().contains("overlap_chars"));
    }

    #[test]
    fn test_openai_requires_model_and_dims() {
        let err = parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\ndims = 1536\n")
            .unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_unknown_provider_and_category() {
        assert!(parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[db]\npath = \"x\"\n[pii]\ndisabled = [\"SHOE_SIZE\"]\n").is_err());
    }

    #[test]
    fn test_disabled_category_is_not_masked() {
        let cfg = parse_config("[db]\npath = \"x\"\n[pii]\ndisabled = [\"email\"]\n").unwrap();
        let masked = cfg.masker().unwrap().mask("mail a@b.com").masked_text;
        assert_eq!(masked, "mail a@b.com");
    }

    #[test]
    fn test_retry_policy_from_embedding_section() {
        let cfg = parse_config("[db]\npath = \"x\"\n[embedding]\nmax_retries = 2\nbackoff_ms = 100\n").unwrap();
        let p = cfg.embedding.retry_policy();
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.base_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_retry_policy_saturates_at_max_retries() {
        let cfg = parse_config(&format!(
            "[db]\npath = \"x\"\n[embedding]\nmax_retries = {}\n",
            u32::MAX
        ))
        .unwrap();
        assert_eq!(cfg.embedding.retry_policy().max_attempts, u32::MAX);
    }

    #[test]
    fn test_admin_role_enables_override() {
        let cfg = parse_config("[db]\npath = \"x\"\n[rbac]\nadmin_role = \"hr_admin\"\n").unwrap();
        assert_eq!(cfg.access_policy().admin_override_role.as_deref(), Some("hr_admin"));
    }

    #[test]
    fn test_example_config_parses() {
        let cfg = parse_config(include_str!("../config/hrx.example.toml")).unwrap();
        assert_eq!(cfg.embedding.dims, Some(256));
        assert_eq!(cfg.retrieval.min_candidates, 20);
        cfg.masker().unwrap();
    }
}
