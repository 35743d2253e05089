//! Bibliography / reference-section detection over ordered pages.
//!
//! A header match in the last 40% of pages is preferred; when no header
//! exists (common in scanned books), a back-to-front citation-density
//! scan finds the start instead. Chunks at or after the detected page
//! are tagged `is_reference`.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

static REFERENCES_HEADER_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?im)^(\d+\.?\s*)?(references|bibliography|works cited|literature cited|cited literature)\s*$",
    )
    .expect("references header regex is valid")
});
static BRACKET_ENTRY_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?m)^\s*\[\d{1,3}\]\s+[A-Z]").expect("bracket entry regex is valid")
});
static NUMBERED_ENTRY_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?m)^\s*\d{1,3}\.\s+[A-Z][a-z]+.*,\s*[A-Z]").expect("numbered entry regex is valid")
});
static SURNAME_INITIAL_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"[A-Z][a-z]+,\s*[A-Z]\.(?:,?\s*(?:and\s+)?[A-Z][a-z]+,\s*[A-Z]\.)*")
        .expect("surname initial regex is valid")
});
static ET_AL_YEAR_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"[A-Z][a-z]+\s+et\s+al\.?\s*\(\d{4}\)").expect("et al regex is valid")
});
static INTEXT_CITATION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\[\d{1,3}(?:\s*[,\u{2013}-]\s*\d{1,3})*\]|\([A-Z][a-z]+(?:\s+et\s+al\.?)?,?\s+\d{4}\)")
        .expect("in-text citation regex is valid")
});

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReferencesDetection {
    pub found: bool,
    pub starts_at_page: Option<u32>,
    pub header_found: bool,
    pub confidence: f32,
}

/// One page of extracted text, as yielded by the document loader.
#[derive(Debug, Clone)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

pub struct ReferencesDetector;

impl ReferencesDetector {
    /// Locate the page where the reference section begins, if any.
    pub fn detect_references_start(pages: &[PageText]) -> ReferencesDetection {
        if pages.is_empty() {
            return ReferencesDetection::default();
        }

        // Header scan, restricted to the last 40% of pages.
        let tail_start = (pages.len() as f32 * 0.6).floor() as usize;
        for (i, page) in pages.iter().enumerate().skip(tail_start) {
            if !REFERENCES_HEADER_RE.is_match(&page.text) {
                continue;
            }
            let nearby_entries = citation_entry_count(&page.text)
                + pages.get(i + 1).map_or(0, |next| citation_entry_count(&next.text));
            let confidence = if nearby_entries > 0 { 0.95 } else { 0.6 };
            return ReferencesDetection {
                found: true,
                starts_at_page: Some(page.page_number),
                header_found: true,
                confidence,
            };
        }

        // No header: walk back-to-front on citation-entry density. The
        // seed must still sit in the tail region; the backward walk below
        // may extend past it.
        let mut seed: Option<usize> = None;
        for (i, page) in pages.iter().enumerate().skip(tail_start).rev() {
            if citation_entry_density(&page.text) > 0.3 {
                seed = Some(i);
                break;
            }
        }
        if let Some(seed_idx) = seed {
            let mut start_idx = seed_idx;
            while start_idx > 0 && citation_entry_density(&pages[start_idx - 1].text) > 0.2 {
                start_idx -= 1;
            }
            return ReferencesDetection {
                found: true,
                starts_at_page: Some(pages[start_idx].page_number),
                header_found: false,
                confidence: 0.7,
            };
        }

        ReferencesDetection::default()
    }

    /// Whether a chunk body carries in-text citations (`[3]`, `(Smith, 2019)`).
    pub fn contains_citations(text: &str) -> bool {
        INTEXT_CITATION_RE.is_match(text)
    }
}

fn citation_entry_count(text: &str) -> usize {
    BRACKET_ENTRY_RE.find_iter(text).count()
        + NUMBERED_ENTRY_RE.find_iter(text).count()
        + SURNAME_INITIAL_RE.find_iter(text).count()
        + ET_AL_YEAR_RE.find_iter(text).count()
}

fn citation_entry_density(text: &str) -> f32 {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return 0.0;
    }
    let matching = lines
        .iter()
        .filter(|line| {
            BRACKET_ENTRY_RE.is_match(line)
                || NUMBERED_ENTRY_RE.is_match(line)
                || SURNAME_INITIAL_RE.is_match(line)
                || ET_AL_YEAR_RE.is_match(line)
        })
        .count();
    matching as f32 / lines.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32, text: &str) -> PageText {
        PageText {
            page_number: n,
            text: text.to_string(),
        }
    }

    fn body_page(n: u32) -> PageText {
        page(
            n,
            "The experiment proceeds in three phases. First the corpus is cleaned, \
             then the index is built, and finally queries are replayed.",
        )
    }

    #[test]
    fn test_header_with_entries_is_strong() {
        let mut pages: Vec<PageText> = (1..=16).map(body_page).collect();
        pages.push(page(
            17,
            "References\n[1] Smith, J. A study of studies. Journal of Meta-Research, 2018.\n\
             [2] Jones, K. More results. 2019.",
        ));
        pages.push(body_page(18));
        pages.push(body_page(19));
        pages.push(body_page(20));

        let detection = ReferencesDetector::detect_references_start(&pages);
        assert!(detection.found);
        assert!(detection.header_found);
        assert_eq!(detection.starts_at_page, Some(17));
        assert!((detection.confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_header_without_entries_is_weak() {
        let mut pages: Vec<PageText> = (1..=18).map(body_page).collect();
        pages.push(page(19, "References"));
        pages.push(body_page(20));

        let detection = ReferencesDetector::detect_references_start(&pages);
        assert!(detection.found);
        assert!(detection.header_found);
        assert!((detection.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_header_in_first_half_is_ignored() {
        let mut pages = vec![page(1, "References\n[1] Smith, J. Early mention. 2017.")];
        pages.extend((2..=20).map(body_page));

        let detection = ReferencesDetector::detect_references_start(&pages);
        // The page-1 header is outside the last 40% and there is no dense
        // citation tail, so nothing is found.
        assert!(!detection.found);
    }

    #[test]
    fn test_density_fallback_without_header() {
        let entries = "[1] Able, B. Title one. 2011.\n\
                       [2] Baker, C. Title two. 2012.\n\
                       [3] Cook, D. Title three. 2013.\n\
                       [4] Drew, E. Title four. 2014.";
        let mut pages: Vec<PageText> = (1..=17).map(body_page).collect();
        pages.push(page(18, entries));
        pages.push(page(19, entries));
        pages.push(page(20, entries));

        let detection = ReferencesDetector::detect_references_start(&pages);
        assert!(detection.found);
        assert!(!detection.header_found);
        assert_eq!(detection.starts_at_page, Some(18));
        assert!((detection.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_contains_citations() {
        assert!(ReferencesDetector::contains_citations(
            "as shown in [3] and later confirmed"
        ));
        assert!(ReferencesDetector::contains_citations(
            "the effect replicates (Smith et al., 2019) under load"
        ));
        assert!(!ReferencesDetector::contains_citations(
            "the cache holds 4096 entries by default"
        ));
    }
}
