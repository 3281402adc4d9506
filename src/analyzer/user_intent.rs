//! User-intent extractor (spec §4.4): imperative statements and question
//! forms in user messages, prioritized by keyword hits.

use std::collections::BTreeMap;

use crate::analyzer::rules::USER_INTENT_REGEXES;
use crate::analyzer::{dedup_entries, split_sentences, truncate_bounded};
use crate::model::{AnalysisEntry, Conversation, Priority, Role};

const BOUND: usize = 200;

pub fn extract(conversation: &Conversation) -> Vec<AnalysisEntry> {
    let mut entries = Vec::new();

    for message in &conversation.messages {
        if message.role != Role::User {
            continue;
        }
        for sentence in split_sentences(&message.content) {
            let Some(priority) = classify(sentence) else {
                continue;
            };
            let (text, truncated_mid_word) = truncate_bounded(sentence, BOUND);
            let mut metadata = BTreeMap::new();
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
                priority,
                metadata,
            });
        }
    }

    dedup_entries(entries)
}

fn classify(sentence: &str) -> Option<Priority> {
    let mut best: Option<Priority> = None;
    for (rule, regex) in crate::analyzer::rules::USER_INTENT_RULES
        .iter()
        .zip(USER_INTENT_REGEXES.iter())
    {
        if regex.is_match(sentence) {
            best = Some(match best {
                Some(current) if current >= rule.priority => current,
                _ => rule.priority,
            });
        }
    }
    best
}
