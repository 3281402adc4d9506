//! Decision extractor (spec §4.4): decision phrasing, capturing a bounded
//! summary, the reasoning sentence when present, and an impact estimate
//! from keyword buckets.

use std::collections::BTreeMap;

use crate::analyzer::rules::{
    DECISION_REGEXES, IMPACT_CRITICAL_REGEX, IMPACT_HIGH_REGEX, IMPACT_MEDIUM_REGEX,
};
use crate::analyzer::{dedup_entries, split_sentences, truncate_bounded};
use crate::model::{AnalysisEntry, Conversation, Priority};

const BOUND: usize = 200;

fn matches_decision(sentence: &str) -> bool {
    DECISION_REGEXES.iter().any(|r| r.is_match(sentence))
}

fn impact(sentence: &str) -> Priority {
    if IMPACT_CRITICAL_REGEX.is_match(sentence) {
        Priority::Critical
    } else if IMPACT_HIGH_REGEX.is_match(sentence) {
        Priority::High
    } else if IMPACT_MEDIUM_REGEX.is_match(sentence) {
        Priority::Medium
    } else {
        Priority::Low
    }
}

pub fn extract(conversation: &Conversation) -> Vec<AnalysisEntry> {
    let mut entries = Vec::new();

    for message in &conversation.messages {
        let sentences = split_sentences(&message.content);
        for (i, sentence) in sentences.iter().enumerate() {
            if !matches_decision(sentence) {
                continue;
            }
            let (text, truncated_mid_word) = truncate_bounded(sentence, BOUND);
            let mut metadata = BTreeMap::new();
            if let Some(reasoning) = sentences.get(i + 1) {
                metadata.insert("reasoning".to_string(), reasoning.to_string());
            }
            if text.ends_with('…') {
                metadata.insert(
                    "truncated".to_string(),
                    if truncated_mid_word {
                        "mid-word".to_string()
                    } else {
                        "word-boundary".to_string()
                    },
                );
            }
            entries.push(AnalysisEntry {
                timestamp: message.timestamp,
                text,
                priority: impact(sentence),
                metadata,
            });
        }
    }

    dedup_entries(entries)
}
