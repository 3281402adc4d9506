//! AI-action extractor (spec §4.4): verb-led action phrases in assistant
//! messages, each tagged with its action type.

use std::collections::BTreeMap;

use crate::analyzer::rules::AI_ACTION_RULES;
use crate::analyzer::{dedup_entries, split_sentences, truncate_bounded};
use crate::model::{AnalysisEntry, Conversation, Priority, Role};

const BOUND: usize = 200;

fn action_type(sentence: &str) -> Option<(&'static str, Priority)> {
    const TYPES: &[(&str, usize)] = &[
        ("implemented", 0),
        ("fixed", 1),
        ("refactored", 2),
        ("removed", 3),
    ];
    for (rule, (label, idx)) in AI_ACTION_RULES.iter().zip(TYPES.iter()) {
        let regex = &crate::analyzer::rules::AI_ACTION_REGEXES[*idx];
        if regex.is_match(sentence) {
            return Some((label, rule.priority));
        }
    }
    None
}

pub fn extract(conversation: &Conversation) -> Vec<AnalysisEntry> {
    let mut entries = Vec::new();

    for message in &conversation.messages {
        if message.role != Role::Assistant {
            continue;
        }
        for sentence in split_sentences(&message.content) {
            let Some((action_type, priority)) = action_type(sentence) else {
                continue;
            };
            let (text, truncated_mid_word) = truncate_bounded(sentence, BOUND);
            let mut metadata = BTreeMap::new();
            metadata.insert("action_type".to_string(), action_type.to_string());
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
