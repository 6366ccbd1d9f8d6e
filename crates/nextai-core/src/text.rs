// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Rune-based text helpers (spec §4.E: "all width and chunk size limits are
//! expressed in code points (runes), not bytes").

/// Truncates `s` to at most `limit` runes, appending `"..."` if it was cut.
pub fn truncate_preview(s: &str, limit: usize) -> String {
    let mut chars = s.chars();
    let head: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Splits `s` into chunks of at most `width` runes each, preserving order.
/// An empty string yields no chunks.
pub fn chunk_runes(s: &str, width: usize) -> Vec<String> {
    if s.is_empty() || width == 0 {
        return Vec::new();
    }
    let chars: Vec<char> = s.chars().collect();
    chars
        .chunks(width)
        .map(|c| c.iter().collect::<String>())
        .collect()
}

/// Collapses runs of whitespace to single spaces and truncates to `budget`
/// runes, appending `"...(truncated)"` when the compacted text was cut
/// (spec §4.E: "feedback-field compaction").
pub fn compact_feedback(s: &str, budget: usize) -> String {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let head: String = chars.by_ref().take(budget).collect();
    if chars.next().is_some() {
        format!("{head}...(truncated)")
    } else {
        head
    }
}

/// Trims `s` to at most `limit` runes with no "..." suffix (used for the
/// auto chat-name assignment: "first ≤20 runes of user text").
pub fn first_runes(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_preview_adds_ellipsis_only_when_cut() {
        assert_eq!(truncate_preview("hello", 10), "hello");
        assert_eq!(truncate_preview("hello world", 5), "hello...");
    }

    #[test]
    fn truncate_preview_counts_codepoints_not_bytes() {
        let s = "héllo wörld";
        assert_eq!(truncate_preview(s, 5).chars().count(), 5 + 3);
    }

    #[test]
    fn chunk_runes_splits_into_fixed_width_pieces() {
        let chunks = chunk_runes("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn chunk_runes_empty_input_yields_no_chunks() {
        assert!(chunk_runes("", 12).is_empty());
    }

    #[test]
    fn compact_feedback_collapses_whitespace() {
        assert_eq!(compact_feedback("a   b\n\tc", 100), "a b c");
    }

    #[test]
    fn compact_feedback_truncates_with_marker() {
        let long = "word ".repeat(50);
        let out = compact_feedback(&long, 10);
        assert!(out.ends_with("...(truncated)"));
    }

    #[test]
    fn first_runes_truncates_without_ellipsis() {
        assert_eq!(first_runes("hello world", 5), "hello");
        assert_eq!(first_runes("hi", 20), "hi");
    }
}
