//! Structure-aware text chunker with overlap.
//!
//! Splits masked document text into [`Chunk`]s of at most `max_size`
//! characters, preferring the coarsest structural boundary that works.
//!
//! # Algorithm
//!
//! 1. Push the whole text onto a work stack tagged with the coarsest
//!    [`SplitLevel`] (paragraph).
//! 2. Pop a segment. If it fits in `max_size`, it is final. Otherwise split
//!    it on the delimiters of its level, keeping each delimiter attached to
//!    the piece on its left, and push the pieces back tagged with the next
//!    finer level. A segment with no delimiter of its level is pushed back
//!    whole at the next level.
//! 3. At [`SplitLevel::Character`] the segment is cut every `max_size`
//!    characters. A segment that is still too large when its level is finer
//!    than the configured `split_floor` is atomic and kept whole.
//! 4. Merge consecutive segments greedily up to the size budget.
//! 5. Prefix every chunk after the first with the trailing `overlap`
//!    characters of the previous chunk, shrinking the overlap if the chunk
//!    would otherwise exceed `max_size`.
//!
//! [`ChunkStrategy::Sentence`] starts at step 2 with sentence delimiters
//! instead of paragraphs. [`ChunkStrategy::Fixed`] skips structure entirely:
//! the first body is `max_size` characters and each later body is
//! `max_size - overlap`, so every chunk but the last is exactly `max_size`
//! once its overlap prefix is added.
//!
//! With `min_size` set, a final body shorter than that takes characters from
//! the end of the previous body, cutting after whitespace where possible.
//! Neither body is pushed past its size budget.
//!
//! Segments cover the text exactly, so stripping each chunk's overlap
//! prefix and concatenating the rest reproduces the input.
//!
//! Each chunk gets the composite id `"{document_id}#{index}"` and a SHA-256
//! hash of its text.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeSet;
//! use hr_harness_core::chunk::{chunk_text, ChunkConfig};
//!
//! let roles: BTreeSet<String> = ["hr".to_string()].into_iter().collect();
//! let config = ChunkConfig::new(700, 80);
//! let chunks = chunk_text("doc-123", "Hello world.\n\nSecond paragraph.", &roles, &config).unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ChunkingError;
use crate::models::Chunk;

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Structural delimiter levels, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitLevel {
    Paragraph,
    Line,
    Sentence,
    Word,
    Character,
}

impl SplitLevel {
    fn delimiters(self) -> &'static [&'static str] {
        match self {
            SplitLevel::Paragraph => &["\n\n"],
            SplitLevel::Line => &["\n"],
            SplitLevel::Sentence => &[". ", "! ", "? "],
            SplitLevel::Word => &[" "],
            SplitLevel::Character => &[],
        }
    }

    fn finer(self) -> Option<SplitLevel> {
        match self {
            SplitLevel::Paragraph => Some(SplitLevel::Line),
            SplitLevel::Line => Some(SplitLevel::Sentence),
            SplitLevel::Sentence => Some(SplitLevel::Word),
            SplitLevel::Word => Some(SplitLevel::Character),
            SplitLevel::Character => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paragraph" => Some(SplitLevel::Paragraph),
            "line" => Some(SplitLevel::Line),
            "sentence" => Some(SplitLevel::Sentence),
            "word" => Some(SplitLevel::Word),
            "character" => Some(SplitLevel::Character),
            _ => None,
        }
    }
}

/// How text is cut into chunk bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    /// Coarsest structural boundary first, down to `split_floor`.
    #[default]
    Recursive,
    /// Sentence boundaries first; paragraphs and lines are not preferred.
    Sentence,
    /// Fixed character windows with no regard for structure.
    Fixed,
}

impl ChunkStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "recursive" => Some(ChunkStrategy::Recursive),
            "sentence" => Some(ChunkStrategy::Sentence),
            "fixed" => Some(ChunkStrategy::Fixed),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChunkStrategy::Recursive => "recursive",
            ChunkStrategy::Sentence => "sentence",
            ChunkStrategy::Fixed => "fixed",
        }
    }

    fn first_level(self) -> SplitLevel {
        match self {
            ChunkStrategy::Sentence => SplitLevel::Sentence,
            ChunkStrategy::Recursive | ChunkStrategy::Fixed => SplitLevel::Paragraph,
        }
    }
}

/// Chunk sizing, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub max_size: usize,
    pub overlap: usize,
    /// Finest level the splitter may cut at.
    pub split_floor: SplitLevel,
    pub strategy: ChunkStrategy,
    /// Final bodies shorter than this are rebalanced. Zero disables.
    pub min_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

impl ChunkConfig {
    pub fn new(max_size: usize, overlap: usize) -> Self {
        Self {
            max_size,
            overlap,
            split_floor: SplitLevel::Character,
            strategy: ChunkStrategy::Recursive,
            min_size: 0,
        }
    }

    pub fn with_split_floor(mut self, floor: SplitLevel) -> Self {
        self.split_floor = floor;
        self
    }

    pub fn with_strategy(mut self, strategy: ChunkStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Size budget for every body after the first.
    fn body_budget(&self) -> usize {
        self.max_size - self.overlap
    }

    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.max_size == 0 {
            return Err(ChunkingError::ZeroMaxSize);
        }
        if self.overlap >= self.max_size {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: self.overlap,
                max_size: self.max_size,
            });
        }
        Ok(())
    }
}

/// Split masked text into overlapping chunks.
///
/// # Guarantees
///
/// - Empty text yields no chunks.
/// - Chunk indices are contiguous: `0, 1, 2, …, N-1`.
/// - `char_len <= max_size` unless one atomic segment is larger.
/// - Concatenating [`Chunk::body`] over all chunks gives back `text`.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    roles: &BTreeSet<String>,
    config: &ChunkConfig,
) -> Result<Vec<Chunk>, ChunkingError> {
    config.validate()?;
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let bodies = match config.strategy {
        ChunkStrategy::Fixed => fixed_bodies(text, config),
        ChunkStrategy::Recursive | ChunkStrategy::Sentence => {
            merge_segments(&split_segments(text, config), config)
        }
    };
    let bodies = rebalance_tail(bodies, config);

    let mut chunks: Vec<Chunk> = Vec::with_capacity(bodies.len());
    for (index, body) in bodies.iter().enumerate() {
        let body_len = char_len(body);
        let (prefix, overlap) = match chunks.last() {
            Some(prev) => {
                let want = config
                    .overlap
                    .min(config.max_size.saturating_sub(body_len))
                    .min(prev.char_len);
                (tail_chars(&prev.text, want), want)
            }
            None => ("", 0),
        };
        let mut content = String::with_capacity(prefix.len() + body.len());
        content.push_str(prefix);
        content.push_str(body);
        chunks.push(make_chunk(document_id, index, content, overlap, roles));
    }

    Ok(chunks)
}

/// Rough token estimate for a piece of text.
pub fn estimate_tokens(text: &str) -> usize {
    char_len(text) / CHARS_PER_TOKEN
}

/// Break `text` into ordered structural segments, each within `max_size`
/// unless atomic. Uses an explicit stack to bound depth on inputs with no
/// delimiters.
pub fn split_segments<'a>(text: &'a str, config: &ChunkConfig) -> Vec<&'a str> {
    let first = config.strategy.first_level();
    let floor = config.split_floor.max(first);
    let mut stack: Vec<(&'a str, SplitLevel)> = vec![(text, first)];
    let mut segments = Vec::new();

    while let Some((segment, level)) = stack.pop() {
        if char_len(segment) <= config.max_size || level > floor {
            segments.push(segment);
            continue;
        }

        if level == SplitLevel::Character {
            segments.extend(split_every(segment, config.max_size));
            continue;
        }

        let pieces = split_keep_delimiters(segment, level.delimiters());
        let next = level.finer().unwrap_or(SplitLevel::Character);
        if pieces.len() <= 1 {
            stack.push((segment, next));
        } else {
            for piece in pieces.into_iter().rev() {
                stack.push((piece, next));
            }
        }
    }

    segments
}

/// Greedily join segments into chunk bodies.
///
/// The first body may use the full `max_size`; later ones leave room for the
/// overlap prefix.
fn merge_segments(segments: &[&str], config: &ChunkConfig) -> Vec<String> {
    let mut bodies: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for segment in segments {
        let len = char_len(segment);
        let budget = if bodies.is_empty() {
            config.max_size
        } else {
            config.body_budget()
        };
        if current_len > 0 && current_len + len > budget {
            bodies.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(segment);
        current_len += len;
    }

    if !current.is_empty() {
        bodies.push(current);
    }
    bodies
}

/// `max_size` characters, then windows of `max_size - overlap`.
fn fixed_bodies(text: &str, config: &ChunkConfig) -> Vec<String> {
    let (first, rest) = text.split_at(byte_offset(text, config.max_size));
    let mut bodies = vec![first.to_string()];
    bodies.extend(
        split_every(rest, config.body_budget())
            .into_iter()
            .map(str::to_string),
    );
    bodies
}

/// Grow a final body shorter than `min_size` by moving the cut between it
/// and the previous body backwards.
///
/// Two bodies that fit together in the previous body's budget are joined.
/// Otherwise the cut lands after the whitespace nearest the target length
/// that keeps the final body within budget, or at the exact character when
/// the configuration allows cuts mid-word. Oversized atomic bodies are never cut.
fn rebalance_tail(mut bodies: Vec<String>, config: &ChunkConfig) -> Vec<String> {
    let n = bodies.len();
    let budget = config.body_budget();
    let target = config.min_size.min(budget);
    if n < 2 || char_len(&bodies[n - 1]) >= target {
        return bodies;
    }

    let prev_budget = if n == 2 { config.max_size } else { budget };
    if char_len(&bodies[n - 2]) > prev_budget {
        return bodies;
    }
    let structured = config.strategy != ChunkStrategy::Fixed;
    if structured && config.split_floor < SplitLevel::Word {
        return bodies;
    }

    let joined = format!("{}{}", bodies[n - 2], bodies[n - 1]);
    let chars: Vec<(usize, char)> = joined.char_indices().collect();
    let total = chars.len();

    if total <= prev_budget {
        bodies.truncate(n - 2);
        bodies.push(joined);
        return bodies;
    }

    // total > prev_budget >= budget >= target, so 1 <= lowest <= exact < total.
    let lowest = (total - budget).max(1);
    let exact = total - target;
    let after_space = (lowest..=exact)
        .rev()
        .find(|&i| chars[i - 1].1.is_whitespace());
    let cut = match after_space {
        Some(i) => i,
        None if !structured || config.split_floor == SplitLevel::Character => exact,
        None => return bodies,
    };

    let at = chars[cut].0;
    bodies.truncate(n - 2);
    bodies.push(joined[..at].to_string());
    bodies.push(joined[at..].to_string());
    bodies
}

/// Split after every occurrence of any delimiter; the delimiter stays with
/// the left piece.
fn split_keep_delimiters<'a>(s: &'a str, delimiters: &[&str]) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < s.len() {
        let rest = &s[start..];
        let hit = delimiters
            .iter()
            .filter_map(|d| rest.find(d).map(|i| i + d.len()))
            .min();
        match hit {
            Some(end) => {
                pieces.push(&rest[..end]);
                start += end;
            }
            None => break,
        }
    }

    if start < s.len() {
        pieces.push(&s[start..]);
    }
    pieces
}

/// Hard split every `size` characters on char boundaries.
fn split_every(s: &str, size: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (i, _) in s.char_indices() {
        if count == size {
            pieces.push(&s[start..i]);
            start = i;
            count = 0;
        }
        count += 1;
    }
    if start < s.len() {
        pieces.push(&s[start..]);
    }
    pieces
}

/// Byte index of the `n`th character, or `s.len()` if `s` is shorter.
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The last `n` characters of `s`.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let total = char_len(s);
    if n >= total {
        return s;
    }
    match s.char_indices().nth(total - n) {
        Some((i, _)) => &s[i..],
        None => "",
    }
}

/// Create a single [`Chunk`] with its composite id and SHA-256 content hash.
fn make_chunk(
    document_id: &str,
    index: usize,
    text: String,
    overlap: usize,
    roles: &BTreeSet<String>,
) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Chunk::make_id(document_id, index),
        document_id: document_id.to_string(),
        chunk_index: index,
        char_len: char_len(&text),
        text,
        overlap,
        roles: roles.clone(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles() -> BTreeSet<String> {
        ["hr".to_string()].into_iter().collect()
    }

    fn reassemble(chunks: &[Chunk]) -> String {
        chunks.iter().map(|c| c.body()).collect()
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", &roles(), &ChunkConfig::new(100, 10)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].overlap, 0);
        assert_eq!(chunks[0].id, "doc1#0");
        assert!(chunks[0].roles.contains("hr"));
    }

    #[test]
    fn test_empty_text() {
        let chunks = chunk_text("doc1", "", &roles(), &ChunkConfig::new(100, 10)).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_invalid_config() {
        let err = chunk_text("d", "x", &roles(), &ChunkConfig::new(0, 0)).unwrap_err();
        assert_eq!(err, ChunkingError::ZeroMaxSize);
        let err = chunk_text("d", "x", &roles(), &ChunkConfig::new(10, 10)).unwrap_err();
        assert_eq!(
            err,
            ChunkingError::OverlapTooLarge {
                overlap: 10,
                max_size: 10
            }
        );
    }

    #[test]
    fn test_paragraph_boundaries_preferred() {
        let p1 = "Annual leave is 25 days.";
        let p2 = "Sick leave needs a note.";
        let text = format!("{}\n\n{}", p1, p2);
        let chunks = chunk_text("d", &text, &roles(), &ChunkConfig::new(30, 5)).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, format!("{}\n\n", p1));
        assert_eq!(chunks[1].body(), p2);
        assert_eq!(chunks[1].overlap, 5);
        assert!(chunks[1].text.starts_with("ys.\n\n"));
    }

    #[test]
    fn test_reassembles_original_text() {
        let texts = [
            "Policy.\n\nSection one covers leave. It is long enough to need splitting! Does it? Yes.\nA line.\n\n\nEnd",
            "nodelimitersatallinthisverylongrunoftextwhichmustbehardsplit",
            "   leading spaces and trailing   ",
            "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘",
        ];
        for text in texts {
            for (max, overlap) in [(10, 0), (10, 3), (25, 8), (200, 20)] {
                let chunks = chunk_text("d", text, &roles(), &ChunkConfig::new(max, overlap)).unwrap();
                assert_eq!(reassemble(&chunks), text, "max={} overlap={}", max, overlap);
            }
        }
    }

    #[test]
    fn test_chunks_within_max_size() {
        let text = (0..40)
            .map(|i| format!("Sentence number {} of the handbook.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let config = ChunkConfig::new(50, 10);
        let chunks = chunk_text("d", &text, &roles(), &config).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.char_len <= 50, "chunk {} has {} chars", c.chunk_index, c.char_len);
            assert_eq!(c.char_len, c.text.chars().count());
        }
    }

    #[test]
    fn test_overlap_is_tail_of_previous_chunk() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let chunks = chunk_text("d", text, &roles(), &ChunkConfig::new(20, 6)).unwrap();
        for pair in chunks.windows(2) {
            let prefix: String = pair[1].text.chars().take(pair[1].overlap).collect();
            assert!(pair[0].text.ends_with(&prefix));
        }
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("d", &text, &roles(), &ChunkConfig::new(40, 8)).unwrap();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i, "Index mismatch at position {}", i);
            assert_eq!(c.id, format!("d#{}", i));
        }
    }

    #[test]
    fn test_atomic_sentence_kept_whole_at_floor() {
        let long = "this single sentence has many words but no terminator so it cannot be split further";
        let text = format!("Short one. {}", long);
        let config = ChunkConfig::new(30, 5).with_split_floor(SplitLevel::Sentence);
        let chunks = chunk_text("d", &text, &roles(), &config).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].body(), long);
        assert!(chunks[1].char_len > 30);
        assert_eq!(chunks[1].overlap, 0);
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_character_split_on_multibyte() {
        let text = "ééééééééééééééééééééééé";
        let chunks = chunk_text("d", text, &roles(), &ChunkConfig::new(5, 2)).unwrap();
        for c in &chunks {
            assert!(c.char_len <= 5);
        }
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let config = ChunkConfig::new(8, 2);
        let c1 = chunk_text("d", text, &roles(), &config).unwrap();
        let c2 = chunk_text("d", text, &roles(), &config).unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_split_keep_delimiters() {
        assert_eq!(
            split_keep_delimiters("a. b? c! d", SplitLevel::Sentence.delimiters()),
            vec!["a. ", "b? ", "c! ", "d"]
        );
        assert_eq!(split_keep_delimiters("none", &["\n"]), vec!["none"]);
    }

    #[test]
    fn test_sentence_strategy_skips_paragraph_preference() {
        let text = "Alpha beta. Gamma delta.\n\nEpsilon.";
        let recursive = chunk_text("d", text, &roles(), &ChunkConfig::new(30, 0)).unwrap();
        assert_eq!(recursive[0].text, "Alpha beta. Gamma delta.\n\n");

        let config = ChunkConfig::new(30, 0).with_strategy(ChunkStrategy::Sentence);
        let chunks = chunk_text("d", text, &roles(), &config).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Alpha beta. ");
        assert_eq!(chunks[1].text, "Gamma delta.\n\nEpsilon.");
    }

    #[test]
    fn test_fixed_strategy_windows() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let config = ChunkConfig::new(10, 3).with_strategy(ChunkStrategy::Fixed);
        let chunks = chunk_text("d", text, &roles(), &config).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcdefghij", "hijklmnopq", "opqrstuvwx", "vwxyz"]);
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_min_size_grows_short_tail_at_whitespace() {
        let text = "aaaa bbbb cccc dddd eeee";
        let plain = chunk_text("d", text, &roles(), &ChunkConfig::new(20, 0)).unwrap();
        assert_eq!(plain.last().unwrap().text, "eeee");

        let config = ChunkConfig::new(20, 0).with_min_size(8);
        let chunks = chunk_text("d", text, &roles(), &config).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "aaaa bbbb cccc ");
        assert_eq!(chunks[1].text, "dddd eeee");
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_min_size_with_fixed_windows() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let config = ChunkConfig::new(10, 3)
            .with_strategy(ChunkStrategy::Fixed)
            .with_min_size(5);
        let chunks = chunk_text("d", text, &roles(), &config).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[3].body(), "vwxyz");
        assert_eq!(chunks[3].text, "stuvwxyz");
        for c in &chunks {
            assert!(c.char_len <= 10);
        }
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_min_size_keeps_bounds_across_strategies() {
        let text = (0..30)
            .map(|i| format!("Clause {} applies to staff. ", i))
            .collect::<String>();
        for strategy in [ChunkStrategy::Recursive, ChunkStrategy::Sentence, ChunkStrategy::Fixed] {
            let config = ChunkConfig::new(60, 12).with_strategy(strategy).with_min_size(40);
            let chunks = chunk_text("d", &text, &roles(), &config).unwrap();
            for c in &chunks {
                assert!(c.char_len <= 60, "{:?}: {} chars", strategy, c.char_len);
            }
            assert_eq!(reassemble(&chunks), text, "{:?}", strategy);
        }
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(ChunkStrategy::parse("fixed"), Some(ChunkStrategy::Fixed));
        assert_eq!(ChunkStrategy::parse("sentence").map(ChunkStrategy::name), Some("sentence"));
        assert_eq!(ChunkStrategy::parse("semantic"), None);
        assert_eq!(ChunkStrategy::default(), ChunkStrategy::Recursive);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens("This is a test sentence.."), 6);
    }
}
