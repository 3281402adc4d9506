//! State extractor (spec §4.4): reduces a conversation to a single
//! `WorkingState` record summarizing what's being worked on, outstanding
//! blockers, the next action, and completion progress.

use crate::analyzer::rules::BLOCKER_REGEX;
use crate::analyzer::{split_sentences, user_intent};
use crate::model::{Conversation, Role, WorkingState};

use super::technical_work;

pub fn extract(conversation: &Conversation) -> WorkingState {
    let intents = user_intent::extract(conversation);
    let working_on = intents.last().map(|e| e.text.clone());

    let mut blockers: Vec<(chrono::DateTime<chrono::Utc>, String)> = Vec::new();
    for message in &conversation.messages {
        for sentence in split_sentences(&message.content) {
            if BLOCKER_REGEX.is_match(sentence) {
                blockers.push((message.timestamp, sentence.trim().to_string()));
            }
        }
    }
    blockers.sort_by_key(|(ts, _)| std::cmp::Reverse(*ts));
    let blockers: Vec<String> = blockers.into_iter().take(3).map(|(_, text)| text).collect();

    let next_action = conversation
        .messages
        .iter()
        .rev()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant))
        .flat_map(|m| split_sentences(&m.content))
        .find(|sentence| is_imperative(sentence))
        .map(|s| s.trim().to_string());

    let work_items = technical_work::extract(conversation);
    let progress = if work_items.is_empty() {
        None
    } else {
        let completed = work_items
            .iter()
            .filter(|e| e.metadata.get("status").map(String::as_str) == Some("completed"))
            .count();
        Some(completed as f64 / work_items.len() as f64)
    };

    WorkingState {
        working_on,
        blockers,
        next_action,
        progress,
    }
}

fn is_imperative(sentence: &str) -> bool {
    crate::analyzer::rules::USER_INTENT_REGEXES
        .iter()
        .skip(1)
        .any(|r| r.is_match(sentence))
}
