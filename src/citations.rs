//! Trailing citation block extraction
//!
//! Assistant answers end with a fenced JSON block naming the guide pages the
//! answer was drawn from:
//!
//! ````text
//! The Grand Palace is in Bangkok.
//!
//! ```json
//! {"sources": [{"page": 12}]}
//! ```
//! ````
//!
//! [`extract_citations`] strips that block from the visible text and returns
//! the pages as [`Citation`] records. Any malformed block leaves the text
//! untouched; extraction never fails.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Opening fence of a citation block
const FENCE_OPEN: &str = "```json";

/// A reference to a page of the companion travel guide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    /// One-based page number
    pub page: u32,
}

impl Citation {
    /// Creates a citation for `page`
    pub fn new(page: u32) -> Self {
        Self { page }
    }
}

/// Which extracted pages are kept as citations
///
/// The guide's first page is its cover, so the shipping client drops it as a
/// non-informative default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationPolicy {
    /// Drop citations pointing at page 1
    #[default]
    SkipFirstPage,
    /// Keep every cited page
    KeepAll,
}

impl CitationPolicy {
    /// Parses a policy name as used in config files and env vars
    ///
    /// # Examples
    ///
    /// ```
    /// use travai::citations::CitationPolicy;
    ///
    /// assert_eq!(CitationPolicy::parse_str("keep_all"), Some(CitationPolicy::KeepAll));
    /// assert_eq!(CitationPolicy::parse_str("skip-first-page"), Some(CitationPolicy::SkipFirstPage));
    /// assert_eq!(CitationPolicy::parse_str("bogus"), None);
    /// ```
    pub fn parse_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "skip_first_page" => Some(Self::SkipFirstPage),
            "keep_all" => Some(Self::KeepAll),
            _ => None,
        }
    }

    fn keeps(self, page: u32) -> bool {
        match self {
            Self::SkipFirstPage => page != 1,
            Self::KeepAll => true,
        }
    }
}

/// Result of running the extractor over an assistant message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Message text with the trailing citation block removed
    pub text: String,
    /// Cited pages in block order
    pub citations: Vec<Citation>,
}

#[derive(Debug, Deserialize)]
struct SourcesBlock {
    sources: Vec<SourceRef>,
}

#[derive(Debug, Deserialize)]
struct SourceRef {
    page: i64,
}

fn block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)\A```json\s*(\{.*\})\s*```\s*\z").expect("citation block pattern is valid")
    })
}

/// Splits a trailing citation block off `content`
///
/// Only the last fenced `json` block is considered, and only when nothing but
/// whitespace follows its closing fence. The block must parse as
/// `{"sources": [{"page": <int>}, ...]}` with a non-empty list; otherwise the
/// original text is returned with no citations.
///
/// The function is idempotent: feeding `text` back in returns it unchanged
/// with no citations.
///
/// # Examples
///
/// ```
/// use travai::citations::{extract_citations, Citation, CitationPolicy};
///
/// let answer = "It's in Bangkok.\n```json\n{\"sources\": [{\"page\": 12}]}\n```";
/// let extraction = extract_citations(answer, CitationPolicy::KeepAll);
/// assert_eq!(extraction.text, "It's in Bangkok.");
/// assert_eq!(extraction.citations, vec![Citation::new(12)]);
/// ```
pub fn extract_citations(content: &str, policy: CitationPolicy) -> Extraction {
    let Some((start, pages)) = parse_trailing_block(content) else {
        return Extraction {
            text: content.to_string(),
            citations: Vec::new(),
        };
    };

    // Earlier blocks stacked directly before the last one are dropped too,
    // otherwise a second pass would find them.
    let mut cleaned = content[..start].trim();
    while let Some((earlier, _)) = parse_trailing_block(cleaned) {
        cleaned = cleaned[..earlier].trim();
    }

    let citations = pages
        .into_iter()
        .filter(|page| policy.keeps(*page))
        .map(Citation::new)
        .collect();

    Extraction {
        text: cleaned.to_string(),
        citations,
    }
}

/// Returns the byte offset of the trailing block and its pages
fn parse_trailing_block(content: &str) -> Option<(usize, Vec<u32>)> {
    let start = content.rfind(FENCE_OPEN)?;
    let captures = block_pattern().captures(&content[start..])?;
    let json = captures.get(1)?.as_str();
    if !json.contains("\"sources\"") {
        return None;
    }

    let block: SourcesBlock = match serde_json::from_str(json) {
        Ok(block) => block,
        Err(e) => {
            tracing::warn!("Failed to parse citation block: {}", e);
            return None;
        }
    };
    if block.sources.is_empty() {
        return None;
    }

    let pages = block
        .sources
        .iter()
        .filter_map(|source| u32::try_from(source.page).ok())
        .filter(|page| *page >= 1)
        .collect();
    Some((start, pages))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_block(prose: &str, json: &str) -> String {
        format!("{}\n\n```json\n{}\n```\n", prose, json)
    }

    fn pages(extraction: &Extraction) -> Vec<u32> {
        extraction.citations.iter().map(|c| c.page).collect()
    }

    #[test]
    fn test_extracts_pages_in_block_order() {
        let text = with_block(
            "Take the river ferry.",
            r#"{"sources":[{"page":3},{"page":1},{"page":7}]}"#,
        );

        let keep_all = extract_citations(&text, CitationPolicy::KeepAll);
        assert_eq!(keep_all.text, "Take the river ferry.");
        assert_eq!(pages(&keep_all), vec![3, 1, 7]);

        let skip_first = extract_citations(&text, CitationPolicy::SkipFirstPage);
        assert_eq!(skip_first.text, "Take the river ferry.");
        assert_eq!(pages(&skip_first), vec![3, 7]);
    }

    #[test]
    fn test_missing_block_returns_text_unchanged() {
        let text = "  Chiang Mai is in the north.  ";
        let extraction = extract_citations(text, CitationPolicy::KeepAll);
        assert_eq!(extraction.text, text);
        assert!(extraction.citations.is_empty());
    }

    #[test]
    fn test_malformed_json_leaves_text_unchanged() {
        let text = with_block("Pad thai is everywhere.", r#"{"sources": [}"#);
        let extraction = extract_citations(&text, CitationPolicy::KeepAll);
        assert_eq!(extraction.text, text);
        assert!(extraction.citations.is_empty());
    }

    #[test]
    fn test_empty_sources_leaves_text_unchanged() {
        let text = with_block("Nothing cited.", r#"{"sources": []}"#);
        let extraction = extract_citations(&text, CitationPolicy::KeepAll);
        assert_eq!(extraction.text, text);
        assert!(extraction.citations.is_empty());
    }

    #[test]
    fn test_sources_not_a_list_leaves_text_unchanged() {
        let text = with_block("Odd block.", r#"{"sources": {"page": 4}}"#);
        let extraction = extract_citations(&text, CitationPolicy::KeepAll);
        assert_eq!(extraction.text, text);
        assert!(extraction.citations.is_empty());
    }

    #[test]
    fn test_block_not_at_end_is_ignored() {
        let text = "```json\n{\"sources\":[{\"page\":5}]}\n```\nMore prose after the block.";
        let extraction = extract_citations(text, CitationPolicy::KeepAll);
        assert_eq!(extraction.text, text);
        assert!(extraction.citations.is_empty());
    }

    #[test]
    fn test_only_last_block_is_cited() {
        let text = format!(
            "Intro.\n```json\n{}\n```\nMiddle.{}",
            r#"{"sources":[{"page":2}]}"#,
            with_block("", r#"{"sources":[{"page":9}]}"#)
        );
        let extraction = extract_citations(&text, CitationPolicy::KeepAll);
        assert_eq!(pages(&extraction), vec![9]);
        assert!(extraction.text.ends_with("Middle."));
        assert!(extraction.text.contains(r#"{"page":2}"#));
    }

    #[test]
    fn test_all_pages_filtered_still_cleans_text() {
        let text = with_block("Cover page only.", r#"{"sources":[{"page":1}]}"#);
        let extraction = extract_citations(&text, CitationPolicy::SkipFirstPage);
        assert_eq!(extraction.text, "Cover page only.");
        assert!(extraction.citations.is_empty());
    }

    #[test]
    fn test_non_positive_pages_are_dropped() {
        let text = with_block("Edge pages.", r#"{"sources":[{"page":0},{"page":-3},{"page":4}]}"#);
        let extraction = extract_citations(&text, CitationPolicy::KeepAll);
        assert_eq!(extraction.text, "Edge pages.");
        assert_eq!(pages(&extraction), vec![4]);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let stacked = format!(
            "{}\n```json\n{}\n```",
            with_block("Two blocks.", r#"{"sources":[{"page":2}]}"#),
            r#"{"sources":[{"page":8}]}"#
        );
        let samples = vec![
            with_block("Simple.", r#"{"sources":[{"page":12}]}"#),
            with_block("Broken.", r#"{"sources": [}"#),
            stacked,
            "plain text".to_string(),
            String::new(),
            "```json\n{\"sources\":[{\"page\":3}]}\n```".to_string(),
        ];

        for sample in samples {
            for policy in [CitationPolicy::KeepAll, CitationPolicy::SkipFirstPage] {
                let first = extract_citations(&sample, policy);
                let second = extract_citations(&first.text, policy);
                assert_eq!(second.text, first.text, "sample: {:?}", sample);
                assert!(second.citations.is_empty(), "sample: {:?}", sample);
            }
        }
    }

    #[test]
    fn test_block_without_sources_key_is_ignored() {
        let text = with_block("Config dump.", r#"{"pages":[{"page":3}]}"#);
        let extraction = extract_citations(&text, CitationPolicy::KeepAll);
        assert_eq!(extraction.text, text);
    }

    #[test]
    fn test_policy_deserializes_from_yaml() {
        let policy: CitationPolicy = serde_yaml::from_str("keep_all").unwrap();
        assert_eq!(policy, CitationPolicy::KeepAll);
        assert_eq!(CitationPolicy::default(), CitationPolicy::SkipFirstPage);
    }
}
