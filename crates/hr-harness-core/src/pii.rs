//! Pattern-based PII masking for UK HR documents.
//!
//! Every category has its own matcher in a fixed priority table. Matchers
//! run independently over the original text; overlapping matches from
//! different categories are then resolved (longer match wins, then earlier
//! start, then table priority) and the losers are dropped whole. Each
//! surviving span is replaced by a bracketed category token such as
//! `[EMAIL]`, so the masked text still reads as a sentence.
//!
//! Span offsets are byte offsets into the original text. Tokens never match
//! any pattern, so masking already-masked text is a no-op.
//!
//! # Example
//!
//! ```rust
//! use hr_harness_core::pii::PiiMasker;
//!
//! let masker = PiiMasker::new();
//! let result = masker.mask("Contact me at john@example.com, NI number AB123456C.");
//! assert_eq!(result.masked_text, "Contact me at [EMAIL], NI number [NI_NUMBER].");
//! assert_eq!(result.spans.len(), 2);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MaskingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PiiCategory {
    NiNumber,
    DateOfBirth,
    Phone,
    Email,
    Postcode,
    SortCode,
    BankAccount,
    Passport,
}

impl PiiCategory {
    pub const ALL: [PiiCategory; 8] = [
        PiiCategory::NiNumber,
        PiiCategory::DateOfBirth,
        PiiCategory::Phone,
        PiiCategory::Email,
        PiiCategory::Postcode,
        PiiCategory::SortCode,
        PiiCategory::BankAccount,
        PiiCategory::Passport,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PiiCategory::NiNumber => "NI_NUMBER",
            PiiCategory::DateOfBirth => "DOB",
            PiiCategory::Phone => "PHONE",
            PiiCategory::Email => "EMAIL",
            PiiCategory::Postcode => "POSTCODE",
            PiiCategory::SortCode => "SORT_CODE",
            PiiCategory::BankAccount => "BANK_ACCOUNT",
            PiiCategory::Passport => "PASSPORT",
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            PiiCategory::NiNumber => "[NI_NUMBER]",
            PiiCategory::DateOfBirth => "[DOB]",
            PiiCategory::Phone => "[PHONE]",
            PiiCategory::Email => "[EMAIL]",
            PiiCategory::Postcode => "[POSTCODE]",
            PiiCategory::SortCode => "[SORT_CODE]",
            PiiCategory::BankAccount => "[BANK_ACCOUNT]",
            PiiCategory::Passport => "[PASSPORT]",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        PiiCategory::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for PiiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Matcher table in priority order. Priority only breaks ties between
/// overlapping matches of equal length and start.
const PATTERNS: [(PiiCategory, &str); 8] = [
    // Two prefix letters (D, F, I, Q, U, V never used; O not second), six digits, suffix A-D.
    (
        PiiCategory::NiNumber,
        r"(?i)\b[A-CEGHJ-PR-TW-Z][A-CEGHJ-NPR-TW-Z]\d{6}[A-D]\b",
    ),
    (
        PiiCategory::DateOfBirth,
        r"\b(?:0[1-9]|[12]\d|3[01])[-/.](?:0[1-9]|1[0-2])[-/.](?:19|20)\d{2}\b",
    ),
    // Mobile (07xxx) then landline (01/02), with 0, (0) or +44 prefix.
    (
        PiiCategory::Phone,
        r"(?:\+44\s?(?:\(0\)\s?)?|\(0\)\s?|\b0)(?:7\d{3}[\s.-]?\d{3}[\s.-]?\d{3}|[12]\d{2,3}[\s.-]?\d{3}[\s.-]?\d{3,4})\b",
    ),
    (
        PiiCategory::Email,
        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
    ),
    (
        PiiCategory::Postcode,
        r"(?i)\b[A-Z]{1,2}\d[A-Z\d]?\s*\d[A-Z]{2}\b",
    ),
    // Hyphenated only; spaced digit triples are too common in prose.
    (PiiCategory::SortCode, r"\b\d{2}-\d{2}-\d{2}\b"),
    (PiiCategory::BankAccount, r"\b\d{8}\b"),
    (PiiCategory::Passport, r"\b\d{9}\b"),
];

/// One redacted region of the original text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaskedSpan {
    pub start: usize,
    pub end: usize,
    pub category: PiiCategory,
    pub replacement: &'static str,
}

impl MaskedSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    fn overlaps(&self, other: &MaskedSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Masked text plus the spans that produced it, sorted by `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaskResult {
    pub masked_text: String,
    pub spans: Vec<MaskedSpan>,
}

impl MaskResult {
    /// Number of spans per category name.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for span in &self.spans {
            *counts.entry(span.category.name().to_string()).or_insert(0) += 1;
        }
        counts
    }
}

/// Regex-driven PII masker.
pub struct PiiMasker {
    matchers: Vec<(PiiCategory, Regex)>,
}

impl PiiMasker {
    /// Masker with every category enabled.
    pub fn new() -> Self {
        Self::with_disabled(&BTreeSet::new())
    }

    /// Masker with the given categories switched off.
    pub fn with_disabled(disabled: &BTreeSet<PiiCategory>) -> Self {
        let matchers = PATTERNS
            .iter()
            .filter(|(cat, _)| !disabled.contains(cat))
            .map(|(cat, pattern)| {
                (
                    *cat,
                    Regex::new(pattern).expect("built-in PII pattern must compile"),
                )
            })
            .collect();
        Self { matchers }
    }

    pub fn categories(&self) -> impl Iterator<Item = PiiCategory> + '_ {
        self.matchers.iter().map(|(c, _)| *c)
    }

    /// Find, merge and replace all PII in `text`.
    pub fn mask(&self, text: &str) -> MaskResult {
        let spans = self.find_spans(text);
        let mut masked_text = String::with_capacity(text.len());
        let mut cursor = 0;
        for span in &spans {
            masked_text.push_str(&text[cursor..span.start]);
            masked_text.push_str(span.replacement);
            cursor = span.end;
        }
        masked_text.push_str(&text[cursor..]);

        if !spans.is_empty() {
            debug!(spans = spans.len(), "masked PII spans");
        }

        MaskResult { masked_text, spans }
    }

    /// Mask and report per-category counts.
    pub fn mask_with_stats(&self, text: &str) -> (MaskResult, BTreeMap<String, usize>) {
        let result = self.mask(text);
        let counts = result.counts();
        (result, counts)
    }

    /// Decode raw bytes as UTF-8 and mask them.
    pub fn mask_bytes(&self, raw: &[u8]) -> Result<MaskResult, MaskingError> {
        let text = std::str::from_utf8(raw).map_err(|e| MaskingError::InvalidEncoding {
            valid_up_to: e.valid_up_to(),
        })?;
        Ok(self.mask(text))
    }

    /// Report the matched values per category without masking.
    ///
    /// The returned map holds real PII; callers must not log or persist it.
    pub fn detect_only(&self, text: &str) -> BTreeMap<String, Vec<String>> {
        let mut found: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for span in self.find_spans(text) {
            found
                .entry(span.category.name().to_string())
                .or_default()
                .push(text[span.start..span.end].to_string());
        }
        found
    }

    /// Run every matcher and resolve overlaps. Result is sorted by start.
    pub fn find_spans(&self, text: &str) -> Vec<MaskedSpan> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<(usize, MaskedSpan)> = Vec::new();
        for (priority, (category, re)) in self.matchers.iter().enumerate() {
            for m in re.find_iter(text) {
                if m.start() == m.end() {
                    continue;
                }
                candidates.push((
                    priority,
                    MaskedSpan {
                        start: m.start(),
                        end: m.end(),
                        category: *category,
                        replacement: category.token(),
                    },
                ));
            }
        }

        candidates.sort_by(|(pa, a), (pb, b)| {
            b.len()
                .cmp(&a.len())
                .then(a.start.cmp(&b.start))
                .then(pa.cmp(pb))
        });

        let mut accepted: Vec<MaskedSpan> = Vec::with_capacity(candidates.len());
        for (_, span) in candidates {
            if accepted.iter().all(|a| !a.overlaps(&span)) {
                accepted.push(span);
            }
        }
        accepted.sort_by_key(|s| s.start);
        accepted
    }
}

impl Default for PiiMasker {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply spans to `original` right-to-left.
///
/// Produces the same text as [`PiiMasker::mask`] for spans it returned.
pub fn apply_spans(original: &str, spans: &[MaskedSpan]) -> String {
    let mut out = original.to_string();
    for span in spans.iter().rev() {
        out.replace_range(span.start..span.end, span.replacement);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masked(text: &str) -> String {
        PiiMasker::new().mask(text).masked_text
    }

    #[test]
    fn test_ni_number() {
        assert_eq!(masked("Employee NI: AB123456C"), "Employee NI: [NI_NUMBER]");
        assert_eq!(masked("NI number is ab123456c"), "NI number is [NI_NUMBER]");
    }

    #[test]
    fn test_email() {
        assert_eq!(masked("Contact: john.smith@company.com"), "Contact: [EMAIL]");
        assert_eq!(
            masked("From: alice@test.com To: bob@test.com"),
            "From: [EMAIL] To: [EMAIL]"
        );
        let out = masked("Email hr.team2024@example.co.uk for queries");
        assert!(!out.contains('@'));
    }

    #[test]
    fn test_phone_formats() {
        for text in [
            "Call me on 07700 900123",
            "Mobile: 07700900123",
            "Phone: +44 7700 900123",
            "Office: 0161 496 0000",
        ] {
            let out = masked(text);
            assert!(out.contains("[PHONE]"), "not masked: {} -> {}", text, out);
        }
        assert_eq!(masked("Phone: +44 7700 900123"), "Phone: [PHONE]");
    }

    #[test]
    fn test_sort_code_requires_hyphens() {
        assert_eq!(masked("Sort code: 12-34-56"), "Sort code: [SORT_CODE]");
        assert_eq!(masked("Sort code: 12 34 56"), "Sort code: 12 34 56");
    }

    #[test]
    fn test_bank_account_passport_and_dob() {
        assert_eq!(masked("Account number: 12345678"), "Account number: [BANK_ACCOUNT]");
        assert_eq!(masked("Passport: 123456789"), "Passport: [PASSPORT]");
        assert_eq!(masked("Date of birth: 15/03/1990"), "Date of birth: [DOB]");
        assert_eq!(masked("DOB: 01-12-1985"), "DOB: [DOB]");
        assert_eq!(masked("DOB: 01.12.1985"), "DOB: [DOB]");
    }

    #[test]
    fn test_postcode() {
        let out = masked("Address: 10 Downing Street, SW1A 2AA");
        assert!(out.ends_with("[POSTCODE]"));
        assert!(masked("Located in M1 1AE area").contains("[POSTCODE]"));
    }

    #[test]
    fn test_distinct_categories_one_span_each() {
        let text = "NI AB123456C, mail jo@x.org, DOB 02/02/1980, sort 11-22-33, \
                    acct 87654321, passport 987654321, postcode B33 8TH, tel 07700 900123";
        let result = PiiMasker::new().mask(text);
        assert_eq!(result.spans.len(), 8);
        let cats: BTreeSet<PiiCategory> = result.spans.iter().map(|s| s.category).collect();
        assert_eq!(cats.len(), 8);
    }

    #[test]
    fn test_spans_sorted_and_disjoint() {
        let text = "a@b.com 12-34-56 AB123456C 12345678 c@d.org";
        let spans = PiiMasker::new().find_spans(text);
        for pair in spans.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn test_right_to_left_application_matches_mask() {
        let text = "Reach jane@corp.co.uk or 07700 900123; NI QQ123456C is invalid, AB123456D is not.";
        let result = PiiMasker::new().mask(text);
        assert_eq!(apply_spans(text, &result.spans), result.masked_text);
    }

    #[test]
    fn test_longer_match_wins_overlap() {
        // The DOB matcher hits "01-02-1990" and the email matcher hits the
        // whole address; the longer email span wins.
        let text = "id 01-02-1990@mail.com";
        let masker = PiiMasker::new();
        let dob_only: BTreeSet<PiiCategory> = PiiCategory::ALL
            .into_iter()
            .filter(|c| *c != PiiCategory::DateOfBirth)
            .collect();
        let dob = PiiMasker::with_disabled(&dob_only).find_spans(text);
        assert_eq!(dob.len(), 1);
        let result = masker.mask(text);
        assert_eq!(result.spans.len(), 1);
        assert_eq!(result.spans[0].category, PiiCategory::Email);
        assert_eq!(result.masked_text, "id [EMAIL]");
    }

    fn masker_of(table: &[(PiiCategory, &str)]) -> PiiMasker {
        PiiMasker {
            matchers: table
                .iter()
                .map(|(cat, pattern)| (*cat, Regex::new(pattern).unwrap()))
                .collect(),
        }
    }

    #[test]
    fn test_equal_length_overlap_earlier_start_wins() {
        // "abc" and "bcd" are both three bytes; the later one is listed first.
        let masker = masker_of(&[(PiiCategory::Postcode, "bcd"), (PiiCategory::Email, "abc")]);
        let result = masker.mask("xx abcd");
        assert_eq!(result.spans.len(), 1);
        assert_eq!(result.spans[0].category, PiiCategory::Email);
        assert_eq!((result.spans[0].start, result.spans[0].end), (3, 6));
        assert_eq!(result.masked_text, "xx [EMAIL]d");
    }

    #[test]
    fn test_identical_spans_resolved_by_table_order() {
        let text = "acct 12345678 end";
        let bank_first = masker_of(&[
            (PiiCategory::BankAccount, r"\d{8}"),
            (PiiCategory::Passport, r"1\d{7}"),
        ]);
        assert_eq!(bank_first.mask(text).masked_text, "acct [BANK_ACCOUNT] end");

        let passport_first = masker_of(&[
            (PiiCategory::Passport, r"1\d{7}"),
            (PiiCategory::BankAccount, r"\d{8}"),
        ]);
        let result = passport_first.mask(text);
        assert_eq!(result.spans.len(), 1);
        assert_eq!(result.masked_text, "acct [PASSPORT] end");
    }

    #[test]
    fn test_idempotent() {
        let masker = PiiMasker::new();
        let first = masker.mask("Contact john@test.com, NI AB123456C, tel 07700 900123, SW1A 2AA");
        let second = masker.mask(&first.masked_text);
        assert!(second.spans.is_empty());
        assert_eq!(second.masked_text, first.masked_text);
    }

    #[test]
    fn test_no_pii_and_empty() {
        let text = "This is a normal sentence with no PII.";
        assert_eq!(masked(text), text);
        assert_eq!(masked(""), "");
    }

    #[test]
    fn test_mask_with_stats() {
        let (result, stats) = PiiMasker::new()
            .mask_with_stats("Contact john@test.com or jane@test.com about NI AB123456C");
        assert_eq!(stats.get("EMAIL"), Some(&2));
        assert_eq!(stats.get("NI_NUMBER"), Some(&1));
        assert!(result.masked_text.contains("[EMAIL]"));
    }

    #[test]
    fn test_detect_only() {
        let found = PiiMasker::new().detect_only("NI number is AB123456C and email is test@example.com");
        assert_eq!(found["NI_NUMBER"], vec!["AB123456C".to_string()]);
        assert_eq!(found["EMAIL"], vec!["test@example.com".to_string()]);
        assert!(PiiMasker::new().detect_only("nothing here").is_empty());
    }

    #[test]
    fn test_mask_bytes_rejects_invalid_utf8() {
        let masker = PiiMasker::new();
        let err = masker.mask_bytes(&[b'o', b'k', 0xff, 0xfe]).unwrap_err();
        assert_eq!(err, MaskingError::InvalidEncoding { valid_up_to: 2 });
        let ok = masker.mask_bytes("mail a@b.com".as_bytes()).unwrap();
        assert_eq!(ok.masked_text, "mail [EMAIL]");
    }

    #[test]
    fn test_disabled_category_is_left_alone() {
        let disabled: BTreeSet<PiiCategory> = [PiiCategory::Email].into_iter().collect();
        let masker = PiiMasker::with_disabled(&disabled);
        assert_eq!(masker.mask("a@b.com AB123456C").masked_text, "a@b.com [NI_NUMBER]");
        assert_eq!(PiiCategory::parse("email"), Some(PiiCategory::Email));
    }
}
