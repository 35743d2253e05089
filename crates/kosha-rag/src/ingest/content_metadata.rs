//! Metadata extraction for books, from front-matter chunks.
//!
//! Ordered regex families: the first family that matches wins for each
//! field. Only chunks flagged `is_front_matter` are considered (falling
//! back to pages 1-10 when ingestion produced no such flag), and ToC or
//! reference chunks are always skipped.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::ingest::paper_metadata::ExtractedField;
use crate::types::Chunk;

static AUTHOR_RES: LazyLock<Vec<(regex::Regex, f32)>> = LazyLock::new(|| {
    vec![
        (
            regex::Regex::new(r"(?i)copyright\s+©?\s*\d{4}\s+by\s+([A-Z][A-Za-z.\- ]{2,60})")
                .expect("copyright author regex is valid"),
            0.9,
        ),
        (
            regex::Regex::new(r"(?m)^\s*by\s+([A-Z][A-Za-z.\- ]{2,60})$").expect("by author regex is valid"),
            0.8,
        ),
        (
            regex::Regex::new(r"(?im)^\s*author\s*:\s*([A-Z][A-Za-z.\- ]{2,60})$")
                .expect("author label regex is valid"),
            0.85,
        ),
    ]
});
static YEAR_RES: LazyLock<Vec<(regex::Regex, f32)>> = LazyLock::new(|| {
    vec![
        (
            regex::Regex::new(r"(?i)copyright\s+©?\s*((19|20)\d{2})").expect("copyright year regex is valid"),
            0.9,
        ),
        (
            regex::Regex::new(r"(?i)published\s+(?:in\s+)?((19|20)\d{2})").expect("published year regex is valid"),
            0.8,
        ),
        (
            regex::Regex::new(r"(?i)first\s+edition[,:\s]+((19|20)\d{2})").expect("edition year regex is valid"),
            0.7,
        ),
    ]
});
static PUBLISHER_RES: LazyLock<Vec<(regex::Regex, f32)>> = LazyLock::new(|| {
    vec![
        (
            regex::Regex::new(r"(?i)published\s+by\s+([A-Z][A-Za-z&.,\- ]{2,60})")
                .expect("published by regex is valid"),
            0.9,
        ),
        (
            regex::Regex::new(
                r"\b(O'Reilly(?:\s+Media)?|Addison[\s-]Wesley|Manning(?:\s+Publications)?|No\s+Starch\s+Press|MIT\s+Press|Cambridge\s+University\s+Press|Oxford\s+University\s+Press|Springer|Elsevier|Wiley|Pearson|Apress|Packt)\b",
            )
            .expect("known publisher regex is valid"),
            0.8,
        ),
    ]
});
static TITLE_RES: LazyLock<Vec<(regex::Regex, f32)>> = LazyLock::new(|| {
    vec![(
        regex::Regex::new(r"(?im)^\s*title\s*:\s*(\S.{2,120})$").expect("title label regex is valid"),
        0.85,
    )]
});
static TITLE_BEFORE_BY_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?m)^\s*(\S.{2,120})\n\s*by\s+[A-Z]").expect("title before by regex is valid")
});
static ISBN_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)isbn(?:-1[03])?\s*:?\s*([\d][\d\- ]{8,16}[\dXx])").expect("isbn regex is valid")
});
static AUTHOR_BOUNDARY_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\s+(copyright|published|isbn|all rights|ph\.?d\.?|m\.?d\.?)\b.*$")
        .expect("author boundary regex is valid")
});

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: Option<ExtractedField>,
    pub author: Option<ExtractedField>,
    pub year: Option<ExtractedField>,
    pub publisher: Option<ExtractedField>,
    pub isbn: Option<ExtractedField>,
}

pub struct ContentMetadataExtractor;

impl ContentMetadataExtractor {
    pub fn extract(chunks: &[Chunk]) -> BookMetadata {
        let any_front_matter = chunks.iter().any(|c| c.is_front_matter);
        let eligible: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| !c.is_toc && !c.is_reference)
            .filter(|c| {
                if any_front_matter {
                    c.is_front_matter
                } else {
                    c.page_number <= 10
                }
            })
            .collect();

        let mut meta = BookMetadata::default();
        for chunk in eligible {
            Self::extract_from_text(&chunk.text, &mut meta);
        }
        meta
    }

    fn extract_from_text(text: &str, meta: &mut BookMetadata) {
        if meta.author.is_none() {
            for (re, confidence) in AUTHOR_RES.iter() {
                if let Some(c) = re.captures(text) {
                    let cleaned = clean_author(&c[1]);
                    if !cleaned.is_empty() {
                        meta.author = Some(ExtractedField::new(cleaned, *confidence));
                        break;
                    }
                }
            }
        }

        if meta.year.is_none() {
            for (re, confidence) in YEAR_RES.iter() {
                if let Some(c) = re.captures(text) {
                    meta.year = Some(ExtractedField::new(&c[1], *confidence));
                    break;
                }
            }
        }

        if meta.publisher.is_none() {
            for (re, confidence) in PUBLISHER_RES.iter() {
                if let Some(c) = re.captures(text) {
                    meta.publisher = Some(ExtractedField::new(c[1].trim().trim_end_matches(['.', ',']), *confidence));
                    break;
                }
            }
        }

        if meta.title.is_none() {
            for (re, confidence) in TITLE_RES.iter() {
                if let Some(c) = re.captures(text) {
                    meta.title = Some(ExtractedField::new(c[1].trim(), *confidence));
                    break;
                }
            }
        }
        if meta.title.is_none() {
            if let Some(c) = TITLE_BEFORE_BY_RE.captures(text) {
                meta.title = Some(ExtractedField::new(c[1].trim(), 0.6));
            }
        }

        if meta.isbn.is_none() {
            if let Some(c) = ISBN_RE.captures(text) {
                meta.isbn = Some(ExtractedField::new(c[1].trim(), 0.9));
            }
        }
    }
}

/// Strip trailing boundary tokens that leak into captured author names
/// ("Jane Roe Copyright 2019" -> "Jane Roe").
fn clean_author(raw: &str) -> String {
    AUTHOR_BOUNDARY_RE.replace(raw.trim(), "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, page: u32, front: bool, toc: bool) -> Chunk {
        Chunk {
            id: page,
            catalog_id: 1,
            text: text.to_string(),
            page_number: page,
            loc: format!("p{page}"),
            embedding: vec![0.0; 4],
            concept_ids: vec![],
            category_ids: vec![],
            concept_density: 0.0,
            is_toc: toc,
            is_front_matter: front,
            is_back_matter: false,
            is_meta_content: front || toc,
            is_reference: false,
            contains_citations: false,
            has_math: false,
            has_extraction_issues: false,
        }
    }

    #[test]
    fn test_extracts_from_copyright_page() {
        let chunks = vec![
            chunk("The Pragmatic Scheduler\nby Jane Roe", 1, true, false),
            chunk(
                "Copyright © 2019 by Jane Roe\nPublished by Orthogonal Press\nISBN: 978-1-4920-5659-8",
                2,
                true,
                false,
            ),
        ];
        let meta = ContentMetadataExtractor::extract(&chunks);
        assert_eq!(meta.author.as_ref().unwrap().value, "Jane Roe");
        assert!(meta.author.as_ref().unwrap().confidence >= 0.6);
        assert_eq!(meta.year.as_ref().unwrap().value, "2019");
        assert_eq!(meta.publisher.as_ref().unwrap().value, "Orthogonal Press");
        assert_eq!(meta.title.as_ref().unwrap().value, "The Pragmatic Scheduler");
        assert_eq!(meta.isbn.as_ref().unwrap().value, "978-1-4920-5659-8");
    }

    #[test]
    fn test_author_boundary_tokens_are_stripped() {
        assert_eq!(clean_author("Jane Roe Copyright 2019"), "Jane Roe");
        assert_eq!(clean_author("John Q. Public Ph.D."), "John Q. Public");
        assert_eq!(clean_author("  Grace Hopper  "), "Grace Hopper");
    }

    #[test]
    fn test_toc_and_reference_chunks_are_skipped() {
        let chunks = vec![chunk(
            "Contents\nCopyright © 2001 by Someone Wrong.......12",
            3,
            true,
            true,
        )];
        let meta = ContentMetadataExtractor::extract(&chunks);
        assert!(meta.author.is_none());
        assert!(meta.year.is_none());
    }

    #[test]
    fn test_falls_back_to_early_pages_without_front_matter_flags() {
        let chunks = vec![
            chunk("Copyright 2015 by Alan Turing", 4, false, false),
            chunk("Chapter body far into the book", 200, false, false),
        ];
        let meta = ContentMetadataExtractor::extract(&chunks);
        assert_eq!(meta.year.as_ref().unwrap().value, "2015");
        assert_eq!(meta.author.as_ref().unwrap().value, "Alan Turing");
    }
}
