//! Page-text splitting.
//!
//! Pages short enough to index whole stay whole; long pages split at the
//! best boundary available near the size limit (paragraph, sentence,
//! line, word), snapping to char boundaries for non-ASCII text.

pub struct PageChunker {
    max_len: usize,
    min_len: usize,
}

impl PageChunker {
    pub fn new(max_len: usize, min_len: usize) -> Self {
        Self { max_len, min_len }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        if trimmed.len() < self.min_len {
            return Vec::new();
        }
        if trimmed.len() <= self.max_len {
            return vec![trimmed.to_string()];
        }

        let mut segments = Vec::new();
        let mut start = 0;
        while start < trimmed.len() {
            let raw_end = (start + self.max_len).min(trimmed.len());
            let end = snap_to_char_boundary(trimmed, raw_end);
            let actual_end = if end < trimmed.len() {
                find_break_point(trimmed, start, end)
            } else {
                end
            };

            let segment = trimmed[start..actual_end].trim();
            if segment.len() >= self.min_len {
                segments.push(segment.to_string());
            }
            if actual_end <= start {
                break;
            }
            start = actual_end;
        }
        segments
    }
}

fn snap_to_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index.min(text.len())
}

/// Prefer paragraph break > sentence end > line break > word break in the
/// 200 bytes before the size limit.
fn find_break_point(text: &str, start: usize, preferred_end: usize) -> usize {
    let raw_search_start = preferred_end.saturating_sub(200).max(start);
    let search_start = snap_to_char_boundary(text, raw_search_start);
    let safe_end = snap_to_char_boundary(text, preferred_end);
    if search_start >= safe_end {
        return safe_end;
    }

    let region = &text[search_start..safe_end];
    if let Some(pos) = region.rfind("\n\n") {
        return search_start + pos + 2;
    }
    if let Some(pos) = region.rfind(". ") {
        return search_start + pos + 2;
    }
    if let Some(pos) = region.rfind(".\n") {
        return search_start + pos + 2;
    }
    if let Some(pos) = region.rfind('\n') {
        return search_start + pos + 1;
    }
    if let Some(pos) = region.rfind(' ') {
        return search_start + pos + 1;
    }
    safe_end
}
