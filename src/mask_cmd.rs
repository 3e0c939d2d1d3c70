//! `hrx mask`: print a file's text with PII redacted, without indexing it.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::ingest::format_counts;

pub fn run_mask(config: &Config, path: &Path) -> Result<()> {
    let raw = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let masker = config.masker()?;
    let result = masker
        .mask_bytes(&raw)
        .with_context(|| format!("Cannot mask {}", path.display()))?;

    info!(spans = result.spans.len(), counts = %format_counts(&result.counts()), "masked");
    print!("{}", result.masked_text);
    if !result.masked_text.ends_with('\n') {
        println!();
    }
    Ok(())
}
