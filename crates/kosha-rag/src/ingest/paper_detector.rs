//! Whole-document classification: book, paper, magazine, article.
//!
//! Weighted signals from the filename, first pages, full text, and PDF
//! metadata accumulate into paper/book weights; a magazine rule-set runs
//! first because magazines look paper-ish on every other axis.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::types::DocumentKind;

static ARXIV_ID_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b(\d{2}(?:0[1-9]|1[0-2])\.\d{4,5}(?:v\d+)?)\b").expect("arxiv id regex is valid")
});
static DOI_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b10\.\d{4,9}/[-._;()/:a-zA-Z0-9]+").expect("doi regex is valid")
});
static ABSTRACT_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?im)^\s*abstract\b").expect("abstract regex is valid")
});
static ACADEMIC_HEADING_RES: LazyLock<Vec<regex::Regex>> = LazyLock::new(|| {
    [
        r"(?im)^\s*(\d+\.?\s+)?introduction\s*$",
        r"(?im)^\s*(\d+\.?\s+)?related work\s*$",
        r"(?im)^\s*(\d+\.?\s+)?method(s|ology)?\s*$",
        r"(?im)^\s*(\d+\.?\s+)?(experimental )?results\s*$",
        r"(?im)^\s*(\d+\.?\s+)?discussion\s*$",
        r"(?im)^\s*(\d+\.?\s+)?conclusions?\s*$",
        r"(?im)^\s*(\d+\.?\s+)?references\s*$",
        r"(?im)^\s*(\d+\.?\s+)?acknowledg(e)?ments?\s*$",
        r"(?im)^\s*appendix\s*[A-Z0-9]?\s*$",
    ]
    .iter()
    .map(|p| regex::Regex::new(p).expect("academic heading regex is valid"))
    .collect()
});
static BOOK_PATTERN_RES: LazyLock<Vec<regex::Regex>> = LazyLock::new(|| {
    [
        r"(?im)^\s*chapter\s+\d+",
        r"(?im)^\s*part\s+[IVX]+\b",
        r"(?im)^\s*(table of )?contents\s*$",
        r"(?im)^\s*preface\s*$",
        r"(?im)^\s*epilogue\s*$",
        r"(?im)^\s*index\s*$",
    ]
    .iter()
    .map(|p| regex::Regex::new(p).expect("book pattern regex is valid"))
    .collect()
});
static BRACKET_CITATION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\[\d{1,3}\]").expect("bracket citation regex is valid")
});
static AUTHOR_YEAR_CITATION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\([A-Z][a-z]+(?:\s+(?:et\s+al\.?|and\s+[A-Z][a-z]+))?,?\s+\d{4}\)")
        .expect("author-year citation regex is valid")
});
static ACADEMIC_AFFILIATION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)(@[a-z0-9.-]+\.edu\b|\buniversity\b|\bdepartment of\b|\binstitute of\b)")
        .expect("affiliation regex is valid")
});
static LATEX_PRODUCER_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)(latex|pdftex|xetex|luatex)").expect("latex producer regex is valid")
});
static MASTHEAD_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)(IEEE\s+Software|IEEE\s+Spectrum|IEEE\s+Computer\b|Communications\s+of\s+the\s+ACM|ACM\s+Queue|Dr\.\s*Dobb)",
    )
    .expect("masthead regex is valid")
});
static EDITOR_LINE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?im)^\s*editor(\s+in\s+chief)?\s*:\s*\S").expect("editor line regex is valid")
});

/// Inputs the detector needs; everything is optional except the text.
#[derive(Debug, Clone, Default)]
pub struct DetectionInput<'a> {
    pub filename: &'a str,
    pub first_pages: &'a str,
    pub full_text: &'a str,
    pub page_count: u32,
    pub pdf_producer: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperClassification {
    pub kind: DocumentKind,
    pub confidence: f32,
    pub arxiv_id: Option<String>,
    pub doi: Option<String>,
    pub paper_weight: f32,
    pub book_weight: f32,
}

pub struct PaperDetector;

impl PaperDetector {
    pub fn classify(input: &DetectionInput<'_>) -> PaperClassification {
        let mut paper_weight = 0.0f32;
        let mut book_weight = 0.0f32;

        let arxiv_id = ARXIV_ID_RE
            .captures(input.filename)
            .or_else(|| ARXIV_ID_RE.captures(input.first_pages))
            .map(|c| c[1].to_string());
        if arxiv_id.is_some() {
            paper_weight += 0.9;
        }

        let doi_in_filename = DOI_RE.find(input.filename);
        let doi = doi_in_filename
            .or_else(|| DOI_RE.find(input.full_text))
            .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string());
        if doi.is_some() {
            paper_weight += if doi_in_filename.is_some() { 0.85 } else { 0.7 };
        }

        match input.page_count {
            1..=30 => paper_weight += 0.6,
            31..=60 => paper_weight += 0.3,
            101.. => book_weight += 0.7,
            _ => {}
        }

        let has_abstract = ABSTRACT_RE.is_match(input.first_pages);
        if has_abstract {
            paper_weight += 0.7;
        }

        let heading_hits = ACADEMIC_HEADING_RES
            .iter()
            .filter(|re| re.is_match(input.full_text))
            .count();
        if heading_hits >= 4 {
            paper_weight += 0.6;
        }

        let citations = citation_count(input.full_text);
        if citations >= 10 {
            paper_weight += 0.5;
        } else if citations >= 3 {
            paper_weight += 0.3;
        }

        let book_hits = BOOK_PATTERN_RES
            .iter()
            .filter(|re| re.is_match(input.full_text))
            .count();
        if book_hits >= 2 {
            book_weight += 0.7;
        }

        if input
            .pdf_producer
            .is_some_and(|p| LATEX_PRODUCER_RE.is_match(p))
        {
            paper_weight += 0.6;
        }

        if ACADEMIC_AFFILIATION_RE.is_match(input.first_pages) {
            paper_weight += 0.5;
        }

        // Magazine rule-set runs first: masthead evidence is decisive.
        if let Some(confidence) = magazine_confidence(input, has_abstract, citations) {
            return PaperClassification {
                kind: DocumentKind::Magazine,
                confidence,
                arxiv_id,
                doi,
                paper_weight,
                book_weight,
            };
        }

        let paper_confidence = if paper_weight + book_weight > 0.0 {
            paper_weight / (paper_weight + book_weight)
        } else {
            0.5
        };

        if arxiv_id.is_some() || doi.is_some() {
            return PaperClassification {
                kind: DocumentKind::Paper,
                confidence: paper_confidence.max(0.85),
                arxiv_id,
                doi,
                paper_weight,
                book_weight,
            };
        }

        let (kind, confidence) = if paper_confidence >= 0.65 {
            (DocumentKind::Paper, paper_confidence)
        } else if paper_confidence <= 0.35 {
            (DocumentKind::Book, 1.0 - paper_confidence)
        } else if paper_confidence > 0.5 {
            (DocumentKind::Article, paper_confidence)
        } else {
            (DocumentKind::Unknown, 0.5)
        };

        PaperClassification {
            kind,
            confidence,
            arxiv_id,
            doi,
            paper_weight,
            book_weight,
        }
    }
}

fn citation_count(text: &str) -> usize {
    BRACKET_CITATION_RE.find_iter(text).count() + AUTHOR_YEAR_CITATION_RE.find_iter(text).count()
}

fn magazine_confidence(
    input: &DetectionInput<'_>,
    has_abstract: bool,
    citations: usize,
) -> Option<f32> {
    let masthead_hits = MASTHEAD_RE.find_iter(input.full_text).count();
    if masthead_hits == 0 {
        return None;
    }

    let mut score = 0.4 * masthead_hits.min(2) as f32;
    if EDITOR_LINE_RE.is_match(input.full_text) {
        score += 0.3;
    }
    if input.page_count > 0 && input.page_count <= 16 {
        score += 0.2;
    }
    if !has_abstract {
        score += 0.1;
    }
    if citations < 3 {
        score += 0.1;
    }

    (score >= 0.4).then(|| score.min(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arxiv_paper_is_classified_paper() {
        let full_text = "Abstract\nWe present a method.\n\
            1. Introduction\ntext [1] [2] [3] [4] [5]\n\
            2. Related Work\ntext [6] [7] [8] [9] [10]\n\
            3. Methods\ntext [11] [12] [13]\n\
            4. Results\ntext [14] [15] [16]\n\
            5. Conclusion\ntext [17] [18]\n\
            References\n";
        let input = DetectionInput {
            filename: "2310.12345v2.pdf",
            first_pages: "Abstract\nWe present a method.",
            full_text,
            page_count: 12,
            pdf_producer: Some("pdfTeX-1.40.25"),
        };
        let result = PaperDetector::classify(&input);
        assert_eq!(result.kind, DocumentKind::Paper);
        assert!(result.confidence >= 0.85);
        assert_eq!(result.arxiv_id.as_deref(), Some("2310.12345v2"));
    }

    #[test]
    fn test_long_book_is_classified_book() {
        let full_text = "Preface\nThis book took ten years.\n\
            Contents\n\
            Chapter 1\nIt begins.\n\
            Chapter 2\nIt continues.\n\
            Index\n";
        let input = DetectionInput {
            filename: "structured-design.pdf",
            first_pages: "Preface\nThis book took ten years.",
            full_text,
            page_count: 480,
            pdf_producer: None,
        };
        let result = PaperDetector::classify(&input);
        assert_eq!(result.kind, DocumentKind::Book);
        assert!(result.confidence > 0.6);
        assert!(result.arxiv_id.is_none());
        assert!(result.doi.is_none());
    }

    #[test]
    fn test_magazine_masthead_wins() {
        let full_text = "IEEE Software\nEditor: Jane Roe\n\
            The practice of code review has changed substantially over the past decade.";
        let input = DetectionInput {
            filename: "sw-2020-05.pdf",
            first_pages: full_text,
            full_text,
            page_count: 8,
            pdf_producer: None,
        };
        let result = PaperDetector::classify(&input);
        assert_eq!(result.kind, DocumentKind::Magazine);
        assert!(result.confidence >= 0.4);
    }

    #[test]
    fn test_doi_forces_paper() {
        let input = DetectionInput {
            filename: "some-download.pdf",
            first_pages: "A Study of Things",
            full_text: "A Study of Things\ndoi: 10.1145/3297280.3297641\nBody text.",
            page_count: 45,
            pdf_producer: None,
        };
        let result = PaperDetector::classify(&input);
        assert_eq!(result.kind, DocumentKind::Paper);
        assert!(result.confidence >= 0.85);
        assert_eq!(result.doi.as_deref(), Some("10.1145/3297280.3297641"));
    }

    #[test]
    fn test_ambiguous_mid_length_document() {
        let input = DetectionInput {
            filename: "notes.pdf",
            first_pages: "Assorted notes",
            full_text: "Assorted notes about gardening, without structure.",
            page_count: 80,
            pdf_producer: None,
        };
        let result = PaperDetector::classify(&input);
        assert_eq!(result.kind, DocumentKind::Unknown);
    }
}
