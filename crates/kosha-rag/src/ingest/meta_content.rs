//! Chunk-level meta-content classification.
//!
//! Tables of contents, front matter, and back matter carry almost no
//! retrieval signal; tagging them lets search exclude or down-rank them.
//! Each signal contributes a weight and an aggregate of 0.5 flips the
//! corresponding flag.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::types::DocumentKind;

static TOC_HEADER_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?im)^\s*(table of contents|brief contents|contents)\s*$")
        .expect("toc header regex is valid")
});
static DOTTED_LEADER_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^.{3,100}?[.\u{00B7}]{3,}\s*\d{1,4}\s*$").expect("dotted leader regex is valid")
});
static NUMBERED_SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^\s*\d{1,2}(\.\d{1,2})*\.?\s+\S.{0,90}\s\d{1,4}\s*$")
        .expect("numbered section regex is valid")
});
static WIDE_TAIL_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^\S.{2,90}\s{3,}\d{1,4}\s*$").expect("wide tail regex is valid")
});
static FRONT_HEADER_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?im)^\s*(preface|foreword|acknowledg(e)?ments?|about this book|how to use this book|dedication|colophon)\s*$",
    )
    .expect("front header regex is valid")
});
static COPYRIGHT_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)(copyright\s+©?|©\s*\d{4}|all rights reserved|library of congress|isbn[\s:]*[\d-]{10,})")
        .expect("copyright regex is valid")
});
static BACK_HEADER_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?im)^\s*(index|glossary|appendix\s*[A-Z0-9]?|about the author(s)?|colophon)\s*$")
        .expect("back header regex is valid")
});
static BIBLIOGRAPHY_HEADER_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?im)^\s*bibliography\s*$").expect("bibliography header regex is valid")
});
static INDEX_LINE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^\s*\S.{0,60},\s*\d{1,4}([,\u{2013}-]\s*\d{1,4})*\s*$")
        .expect("index line regex is valid")
});

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MetaContentFlags {
    pub is_toc: bool,
    pub is_front_matter: bool,
    pub is_back_matter: bool,
    pub is_meta_content: bool,
    pub confidence: f32,
}

pub struct MetaContentDetector;

impl MetaContentDetector {
    pub fn classify(
        text: &str,
        page_number: u32,
        total_pages: u32,
        kind: DocumentKind,
    ) -> MetaContentFlags {
        let position = if total_pages > 0 {
            page_number as f32 / total_pages as f32
        } else {
            0.0
        };

        let toc_score = toc_score(text);
        let front_score = front_matter_score(text, position);
        let back_score = back_matter_score(text, position, kind);

        let is_toc = toc_score >= 0.5;
        let is_front_matter = !is_toc && front_score >= 0.5;
        let is_back_matter = back_score >= 0.5;

        let confidence = toc_score.max(front_score).max(back_score).min(1.0);

        MetaContentFlags {
            is_toc,
            is_front_matter,
            is_back_matter,
            is_meta_content: is_toc || is_front_matter || is_back_matter,
            confidence,
        }
    }
}

fn nonempty_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim_end).filter(|l| !l.trim().is_empty())
}

/// Fraction of lines shaped like "Title ...... 42" entries.
fn toc_line_density(text: &str) -> f32 {
    let mut total = 0usize;
    let mut matching = 0usize;
    for line in nonempty_lines(text) {
        total += 1;
        if DOTTED_LEADER_RE.is_match(line)
            || NUMBERED_SECTION_RE.is_match(line)
            || WIDE_TAIL_RE.is_match(line)
        {
            matching += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        matching as f32 / total as f32
    }
}

fn toc_score(text: &str) -> f32 {
    let mut score = 0.0;
    if TOC_HEADER_RE.is_match(text) {
        score += 0.4;
    }
    let density = toc_line_density(text);
    if density >= 0.5 {
        score += 0.6;
    } else if density >= 0.3 {
        score += 0.3;
    }
    score
}

fn front_matter_score(text: &str, position: f32) -> f32 {
    let mut score = 0.0;
    if FRONT_HEADER_RE.is_match(text) {
        score += 0.4;
    }
    if COPYRIGHT_RE.is_match(text) {
        score += 0.4;
    }
    if position <= 0.15 && score > 0.0 {
        score += 0.3;
    }
    score
}

fn back_matter_score(text: &str, position: f32, kind: DocumentKind) -> f32 {
    let mut score = 0.0;
    if BACK_HEADER_RE.is_match(text) {
        score += 0.4;
    }
    // A bibliography heading only marks back matter in books; in papers
    // it belongs to the references detector.
    if kind == DocumentKind::Book && BIBLIOGRAPHY_HEADER_RE.is_match(text) {
        score += 0.4;
    }

    let mut total = 0usize;
    let mut index_lines = 0usize;
    for line in nonempty_lines(text) {
        total += 1;
        if INDEX_LINE_RE.is_match(line) {
            index_lines += 1;
        }
    }
    if total >= 5 && index_lines as f32 / total as f32 >= 0.5 {
        score += 0.4;
    }

    if position >= 0.85 && score > 0.0 {
        score += 0.3;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toc_chunk_detected() {
        let text = "Contents\n\
                    1. Introduction..................1\n\
                    2. Background...................15\n\
                    3. Methods......................42\n\
                    4. Results......................88\n";
        let flags = MetaContentDetector::classify(text, 3, 300, DocumentKind::Book);
        assert!(flags.is_toc);
        assert!(flags.is_meta_content);
        assert!(flags.confidence >= 0.6);
    }

    #[test]
    fn test_front_matter_copyright_page() {
        let text = "Copyright © 2019 by Orthogonal Press\n\
                    All rights reserved.\n\
                    ISBN 978-1-4920-5659-8\n\
                    Library of Congress Cataloging-in-Publication Data";
        let flags = MetaContentDetector::classify(text, 2, 300, DocumentKind::Book);
        assert!(flags.is_front_matter);
        assert!(!flags.is_toc);
        assert!(flags.is_meta_content);
    }

    #[test]
    fn test_back_matter_index_page() {
        let text = "Index\n\
                    abstraction, 12, 45-47\n\
                    binary search, 102\n\
                    caching, 88, 91\n\
                    determinism, 140\n\
                    encapsulation, 33, 56\n";
        let flags = MetaContentDetector::classify(text, 290, 300, DocumentKind::Book);
        assert!(flags.is_back_matter);
        assert!(flags.is_meta_content);
    }

    #[test]
    fn test_body_text_is_not_meta() {
        let text = "The scheduler assigns each task a priority based on its deadline. \
                    When two tasks share a deadline, arrival order breaks the tie. \
                    This policy keeps the queue stable under bursty load.";
        let flags = MetaContentDetector::classify(text, 150, 300, DocumentKind::Book);
        assert!(!flags.is_meta_content);
        assert!(!flags.is_toc);
        assert!(!flags.is_front_matter);
        assert!(!flags.is_back_matter);
    }

    #[test]
    fn test_meta_flag_is_disjunction_of_the_three() {
        let samples = [
            ("Contents\n1. A.......1\n2. B.......2\n3. C.......3\n", 1u32),
            ("Copyright © 2020 by Example\nAll rights reserved.", 2u32),
            ("Plain body text about algorithms and data structures.", 50u32),
        ];
        for (text, page) in samples {
            let flags = MetaContentDetector::classify(text, page, 100, DocumentKind::Book);
            assert_eq!(
                flags.is_meta_content,
                flags.is_toc || flags.is_front_matter || flags.is_back_matter
            );
        }
    }

    #[test]
    fn test_bibliography_counts_only_for_books() {
        let text = "Bibliography\nSmith, J. (2001). On things. Journal of Stuff.";
        let book = MetaContentDetector::classify(text, 95, 100, DocumentKind::Book);
        let paper = MetaContentDetector::classify(text, 95, 100, DocumentKind::Paper);
        assert!(book.is_back_matter);
        assert!(!paper.is_back_matter);
    }
}
