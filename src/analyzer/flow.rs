//! Flow extractor (spec §4.4): one event per message in order, tagged by
//! role, with transitions between consecutive assistant messages flagged
//! as `ai_continuation`.

use std::collections::BTreeMap;

use crate::analyzer::{split_sentences, truncate_bounded};
use crate::model::{AnalysisEntry, Conversation, Priority, Role};

const BOUND: usize = 160;

pub fn extract(conversation: &Conversation) -> Vec<AnalysisEntry> {
    let mut entries = Vec::new();
    let mut previous_role: Option<Role> = None;

    for message in &conversation.messages {
        let first_sentence = split_sentences(&message.content)
            .into_iter()
            .next()
            .unwrap_or("");
        let (text, truncated_mid_word) = truncate_bounded(first_sentence, BOUND);

        let mut metadata = BTreeMap::new();
        metadata.insert("role".to_string(), message.role.to_string());
        if previous_role == Some(Role::Assistant) && message.role == Role::Assistant {
            metadata.insert("transition".to_string(), "ai_continuation".to_string());
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
            priority: Priority::Low,
            metadata,
        });
        previous_role = Some(message.role);
    }

    entries
}
