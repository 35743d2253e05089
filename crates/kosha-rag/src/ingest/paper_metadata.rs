//! Metadata extraction for LaTeX-generated papers.
//!
//! Works from front-matter text only. Every extracted field carries a
//! confidence in [0, 1]; the caller decides what to persist (0.6 is the
//! usual threshold).

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

static DOI_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b10\.\d{4,9}/[-._;()/:a-zA-Z0-9]+").expect("doi regex is valid")
});
static ARXIV_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)arxiv[:\s]*(\d{4}\.\d{4,5}(?:v\d+)?)").expect("arxiv regex is valid")
});
static ABSTRACT_START_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?im)^\s*abstract\b\s*[:.\u{2014}\u{2013}-]?\s*").expect("abstract start regex is valid")
});
static MAJOR_HEADING_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?im)^\s*(\d+\.?\s+)?(introduction|keywords|index terms|related work|background)\b")
        .expect("major heading regex is valid")
});
static KEYWORDS_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?im)^\s*(keywords|index terms)\s*[:—-]\s*(.+)$").expect("keywords regex is valid")
});
static VENUE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?im)^.*(IEEE\s+Transactions\s+on\s+[A-Z][A-Za-z ]+|ACM\s+[A-Z][A-Za-z ]+|Proceedings\s+of\s+[^,\n]+|arXiv\s+preprint).*$",
    )
    .expect("venue regex is valid")
});
static YEAR_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b(19|20)\d{2}\b").expect("year regex is valid")
});
static EMAIL_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+").expect("email regex is valid")
});
static AUTHOR_NAME_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z]\.?)?\s+[A-Z][a-z]+(?:-[A-Z][a-z]+)?\b")
        .expect("author name regex is valid")
});
static AFFILIATION_TERM_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b(university|department|institute|laboratory|school|college|research|center|centre)\b")
        .expect("affiliation term regex is valid")
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedField {
    pub value: String,
    pub confidence: f32,
}

impl ExtractedField {
    pub fn new(value: impl Into<String>, confidence: f32) -> Self {
        Self {
            value: value.into(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub title: Option<ExtractedField>,
    pub authors: Vec<String>,
    pub authors_confidence: f32,
    pub year: Option<ExtractedField>,
    pub venue: Option<ExtractedField>,
    pub abstract_text: Option<ExtractedField>,
    pub keywords: Vec<String>,
    pub doi: Option<ExtractedField>,
    pub arxiv_id: Option<ExtractedField>,
}

pub struct PaperMetadataExtractor;

impl PaperMetadataExtractor {
    pub fn extract(front_text: &str) -> PaperMetadata {
        let mut meta = PaperMetadata::default();

        if let Some(m) = DOI_RE.find(front_text) {
            meta.doi = Some(ExtractedField::new(
                m.as_str().trim_end_matches(['.', ',']),
                0.95,
            ));
        }
        if let Some(c) = ARXIV_RE.captures(front_text) {
            meta.arxiv_id = Some(ExtractedField::new(&c[1], 0.95));
        }

        if let Some(abstract_text) = extract_abstract(front_text) {
            meta.abstract_text = Some(ExtractedField::new(abstract_text, 0.85));
        }

        if let Some(c) = KEYWORDS_RE.captures(front_text) {
            meta.keywords = c[2]
                .split([',', ';', '·'])
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
        }

        if let Some(m) = VENUE_RE.find(front_text) {
            let line = m.as_str().trim();
            meta.venue = Some(ExtractedField::new(line, 0.7));
            if meta.year.is_none() {
                if let Some(y) = YEAR_RE.find(line) {
                    meta.year = Some(ExtractedField::new(y.as_str(), 0.7));
                }
            }
        }
        if meta.year.is_none() {
            if let Some(y) = YEAR_RE.find(front_text) {
                meta.year = Some(ExtractedField::new(y.as_str(), 0.5));
            }
        }

        let (title, title_end) = extract_title(front_text);
        if let Some(t) = title {
            meta.title = Some(t);
        }

        let (authors, confidence) = extract_authors(front_text, title_end);
        meta.authors = authors;
        meta.authors_confidence = confidence;

        meta
    }
}

/// Abstract region: from the "Abstract" marker to the next major heading
/// (or at most ~1500 chars).
fn extract_abstract(text: &str) -> Option<String> {
    let start = ABSTRACT_START_RE.find(text)?;
    let body = &text[start.end()..];
    let mut end = MAJOR_HEADING_RE
        .find(body)
        .map(|m| m.start())
        .unwrap_or_else(|| body.len().min(1_500));
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    let region = body[..end].trim();
    if region.len() < 40 {
        return None;
    }
    Some(region.to_string())
}

/// Title: the first non-skip lines before authorship signals appear.
fn extract_title(text: &str) -> (Option<ExtractedField>, usize) {
    let mut title_lines: Vec<&str> = Vec::new();
    let mut consumed = 0usize;

    for line in text.lines() {
        let offset = line.as_ptr() as usize - text.as_ptr() as usize;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !title_lines.is_empty() {
                consumed = offset;
                break;
            }
            continue;
        }
        if is_skip_line(trimmed) {
            continue;
        }
        if EMAIL_RE.is_match(trimmed) || AFFILIATION_TERM_RE.is_match(trimmed) {
            consumed = offset;
            break;
        }
        // Author rows are short runs of capitalized names; stop there too.
        if !title_lines.is_empty() && looks_like_author_row(trimmed) {
            consumed = offset;
            break;
        }
        title_lines.push(trimmed);
        if title_lines.len() >= 3 {
            consumed = offset + line.len();
            break;
        }
    }

    if title_lines.is_empty() {
        return (None, consumed);
    }
    if consumed == 0 {
        consumed = text.len();
    }
    let title = title_lines.join(" ");
    let confidence = if title.len() > 10 && title.len() < 250 { 0.7 } else { 0.4 };
    (Some(ExtractedField::new(title, confidence)), consumed)
}

fn is_skip_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.starts_with("arxiv:")
        || lower.starts_with("doi")
        || lower.starts_with("preprint")
        || lower.starts_with("under review")
        || lower.starts_with("draft")
        || YEAR_RE.is_match(line) && line.len() < 30
}

fn looks_like_author_row(line: &str) -> bool {
    let names = AUTHOR_NAME_RE.find_iter(line).count();
    names >= 1 && line.len() < 120 && !line.ends_with('.')
}

/// Authors: capitalized bigrams/trigrams between the title and the
/// abstract, minus affiliation terms.
fn extract_authors(text: &str, title_end: usize) -> (Vec<String>, f32) {
    let after_title = &text[title_end.min(text.len())..];
    let end = ABSTRACT_START_RE
        .find(after_title)
        .map(|m| m.start())
        .unwrap_or_else(|| after_title.len().min(600));
    let region = &after_title[..end];

    let mut authors: Vec<String> = Vec::new();
    for line in region.lines() {
        // Affiliation and contact rows are noise, not names.
        if AFFILIATION_TERM_RE.is_match(line) || EMAIL_RE.is_match(line) {
            continue;
        }
        for candidate in AUTHOR_NAME_RE.find_iter(line) {
            let name = candidate.as_str().trim();
            if !authors.iter().any(|a| a == name) {
                authors.push(name.to_string());
            }
            if authors.len() >= 12 {
                break;
            }
        }
    }

    let confidence = match authors.len() {
        0 => 0.0,
        1..=8 => 0.7,
        _ => 0.4,
    };
    (authors, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRONT: &str = "\
Attention Is Not All You Need Either

Ada Lovelace  Charles Babbage
Department of Analytical Engines, University of Example
ada@example.edu

Abstract
We revisit the attention mechanism and find that a small amount of
convolution recovers most of the quality at a fraction of the cost.
Experiments on three benchmarks support the claim.

Keywords: attention, convolution, efficiency

1 Introduction
The story begins.
arXiv:2310.12345v2  doi: 10.1145/1234567.8901234
";

    #[test]
    fn test_extracts_title_and_authors() {
        let meta = PaperMetadataExtractor::extract(FRONT);
        let title = meta.title.expect("title extracted");
        assert_eq!(title.value, "Attention Is Not All You Need Either");
        assert!(title.confidence >= 0.6);

        assert!(meta.authors.iter().any(|a| a == "Ada Lovelace"));
        assert!(meta.authors.iter().any(|a| a == "Charles Babbage"));
        assert!(meta.authors_confidence >= 0.6);
    }

    #[test]
    fn test_extracts_abstract_and_keywords() {
        let meta = PaperMetadataExtractor::extract(FRONT);
        let abstract_text = meta.abstract_text.expect("abstract extracted");
        assert!(abstract_text.value.starts_with("We revisit"));
        assert!(!abstract_text.value.contains("Keywords"));
        assert_eq!(meta.keywords, vec!["attention", "convolution", "efficiency"]);
    }

    #[test]
    fn test_extracts_identifiers() {
        let meta = PaperMetadataExtractor::extract(FRONT);
        assert_eq!(meta.doi.unwrap().value, "10.1145/1234567.8901234");
        assert_eq!(meta.arxiv_id.unwrap().value, "2310.12345v2");
    }

    #[test]
    fn test_missing_front_matter_yields_low_confidence() {
        let meta = PaperMetadataExtractor::extract("just a paragraph of body text without structure");
        assert!(meta.abstract_text.is_none());
        assert!(meta.doi.is_none());
        assert!(meta.authors_confidence < 0.6 || meta.authors.is_empty());
    }
}
