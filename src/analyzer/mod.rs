//! Six-dimensional conversation analyzer (spec §4.4).
//!
//! Each extractor is a pure function over `&Conversation` returning
//! `Vec<AnalysisEntry>`, driven by a per-category `const` table of
//! `PatternRule`s — the same shape as the teacher's `VIGILO_TOOLS` static
//! table and `Risk::classify` (`models.rs`), generalized from one flat
//! lookup into one table per category (`rules::USER_INTENT_RULES`,
//! `rules::AI_ACTION_RULES`, ...).

pub mod ai_action;
pub mod decision;
pub mod flow;
pub mod rules;
pub mod technical_work;
pub mod user_intent;
pub mod working_state;

use crate::model::{Analysis, AnalysisEntry, Conversation};

pub fn analyze(conversation: &Conversation) -> Analysis {
    Analysis {
        conversation_id: conversation.id.clone(),
        user_intents: user_intent::extract(conversation),
        ai_actions: ai_action::extract(conversation),
        technical_work: technical_work::extract(conversation),
        decisions: decision::extract(conversation),
        flow_events: flow::extract(conversation),
        working_state: working_state::extract(conversation),
    }
}

/// Splits `text` into sentences on `.`, `?`, `!`, `\n` (spec §4.4 "Length
/// bounds"), keeping the terminator attached and dropping empty spans.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'?' | b'!' | b'\n') {
            let candidate = text[start..=i].trim();
            if !candidate.is_empty() {
                sentences.push(candidate);
            }
            start = i + 1;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Truncates `text` to at most `bound` bytes, preferring a word boundary;
/// returns the truncated text plus whether the cut landed mid-word (spec
/// §4.4 "Length bounds": recorded in the entry's metadata).
pub fn truncate_bounded(text: &str, bound: usize) -> (String, bool) {
    if text.len() <= bound {
        return (text.to_string(), false);
    }
    let mut cut = bound;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let slice = &text[..cut];
    match slice.rfind(char::is_whitespace) {
        Some(word_boundary) if word_boundary > 0 => {
            (format!("{}…", slice[..word_boundary].trim_end()), false)
        }
        _ => (format!("{}…", slice.trim_end()), true),
    }
}

/// Merges entries whose canonical (whitespace-collapsed) text is
/// identical, keeping the earliest timestamp, then sorts by timestamp
/// ascending (spec §4.4 "Deduplication within extractor outputs").
pub fn dedup_entries(entries: Vec<AnalysisEntry>) -> Vec<AnalysisEntry> {
    use std::collections::BTreeMap;

    let mut by_canonical: BTreeMap<String, AnalysisEntry> = BTreeMap::new();
    for entry in entries {
        let canonical = crate::model::normalize_for_hash(&entry.text);
        match by_canonical.get(&canonical) {
            Some(existing) if existing.timestamp <= entry.timestamp => {}
            _ => {
                by_canonical.insert(canonical, entry);
            }
        }
    }
    let mut out: Vec<AnalysisEntry> = by_canonical.into_values().collect();
    out.sort_by_key(|e| e.timestamp);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_sentences_respects_all_four_terminators() {
        let sentences = split_sentences("First.Second?Third!Fourth\nFifth");
        assert_eq!(sentences, vec!["First.", "Second?", "Third!", "Fourth", "Fifth"]);
    }

    #[test]
    fn truncate_bounded_prefers_word_boundary() {
        let (text, mid_word) = truncate_bounded("hello world this is long", 13);
        assert_eq!(text, "hello world…");
        assert!(!mid_word);
    }

    #[test]
    fn truncate_bounded_falls_back_to_mid_word() {
        let (text, mid_word) = truncate_bounded("supercalifragilisticexpialidocious", 10);
        assert!(mid_word);
        assert!(text.ends_with('…'));
    }

    #[test]
    fn truncate_bounded_no_op_under_bound() {
        let (text, mid_word) = truncate_bounded("short", 100);
        assert_eq!(text, "short");
        assert!(!mid_word);
    }

    #[test]
    fn dedup_entries_merges_identical_canonical_text_keeping_earliest() {
        use crate::model::Priority;
        use chrono::DateTime;
        use std::collections::BTreeMap as Map;

        let e1 = AnalysisEntry {
            timestamp: "2025-10-22T09:05:00Z".parse::<DateTime<chrono::Utc>>().unwrap(),
            text: "  fix   the bug  ".to_string(),
            priority: Priority::Medium,
            metadata: Map::new(),
        };
        let e2 = AnalysisEntry {
            timestamp: "2025-10-22T09:00:00Z".parse::<DateTime<chrono::Utc>>().unwrap(),
            text: "fix the bug".to_string(),
            priority: Priority::Medium,
            metadata: Map::new(),
        };
        let out = dedup_entries(vec![e1, e2]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].timestamp.to_rfc3339(), "2025-10-22T09:00:00+00:00");
    }
}
