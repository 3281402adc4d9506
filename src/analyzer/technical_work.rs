//! Technical-work extractor (spec §4.4): file paths, code fences, shell
//! commands, and test-runner mentions, each tagged with a status guess.

use std::collections::BTreeMap;

use crate::analyzer::rules::{
    FILE_PATH_REGEX, SHELL_COMMAND_REGEX, STATUS_COMPLETED_REGEX, STATUS_FAILED_REGEX,
    STATUS_IN_PROGRESS_REGEX, STATUS_PLANNED_REGEX, TEST_RUNNER_REGEX,
};
use crate::analyzer::{dedup_entries, split_sentences, truncate_bounded};
use crate::model::{AnalysisEntry, Conversation, Priority};

const BOUND: usize = 300;

fn is_technical(sentence: &str) -> bool {
    FILE_PATH_REGEX.is_match(sentence)
        || sentence.contains("```")
        || SHELL_COMMAND_REGEX.is_match(sentence)
        || TEST_RUNNER_REGEX.is_match(sentence)
}

fn status_guess(sentence: &str) -> &'static str {
    if STATUS_FAILED_REGEX.is_match(sentence) {
        "failed"
    } else if STATUS_COMPLETED_REGEX.is_match(sentence) {
        "completed"
    } else if STATUS_IN_PROGRESS_REGEX.is_match(sentence) {
        "in-progress"
    } else if STATUS_PLANNED_REGEX.is_match(sentence) {
        "planned"
    } else {
        "in-progress"
    }
}

pub fn extract(conversation: &Conversation) -> Vec<AnalysisEntry> {
    let mut entries = Vec::new();

    for message in &conversation.messages {
        for sentence in split_sentences(&message.content) {
            if !is_technical(sentence) {
                continue;
            }
            let status = status_guess(sentence);
            let (text, truncated_mid_word) = truncate_bounded(sentence, BOUND);
            let mut metadata = BTreeMap::new();
            metadata.insert("status".to_string(), status.to_string());
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
                priority: Priority::Medium,
                metadata,
            });
        }
    }

    dedup_entries(entries)
}
