//! Parser for manually exported JSON conversation dumps.
//!
//! Grounded on spec §4.2 "JSON-export parser": walks the document's `chats`
//! array in index order, flattening each chat's `message` block list
//! through the same shared block rules (`parsers::util::flatten_blocks`)
//! the SQLite parser uses. A chat without its own timestamp falls back to
//! the processing clock, since manual exports are not guaranteed to carry
//! per-message instants; order is still preserved because survivors are
//! re-sorted by `Conversation::new`.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::{Message, Role, SourceTag};
use crate::parsers::util::{build_message, flatten_blocks, normalize_timestamp, ParseOutcome};
use crate::parsers::Parser;
use crate::sources::RawRecord;

#[derive(Debug, Deserialize)]
struct ExportDocument {
    #[serde(rename = "conversationId")]
    conversation_id: Option<String>,
    chats: Vec<ExportChat>,
}

#[derive(Debug, Deserialize)]
struct ExportChat {
    role: String,
    timestamp: Option<String>,
    #[serde(rename = "conversationId")]
    conversation_id: Option<String>,
    message: Vec<serde_json::Value>,
}

fn parse_role(raw: &str) -> Option<Role> {
    match raw {
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        _ => None,
    }
}

pub struct JsonExportParser;

impl Parser for JsonExportParser {
    fn source_tag(&self) -> SourceTag {
        SourceTag::JsonExport
    }

    fn parse(&self, records: &[RawRecord], now: DateTime<Utc>) -> (Vec<Message>, ParseOutcome) {
        let mut outcome = ParseOutcome::default();
        let mut messages = Vec::new();

        for record in records {
            let Ok(document) = serde_json::from_slice::<ExportDocument>(&record.payload) else {
                outcome.record_skipped();
                continue;
            };

            for (index, chat) in document.chats.iter().enumerate() {
                let Some(role) = parse_role(&chat.role) else {
                    outcome.record_skipped();
                    continue;
                };
                let timestamp = chat
                    .timestamp
                    .as_deref()
                    .and_then(normalize_timestamp)
                    .unwrap_or(now);
                let flattened = flatten_blocks(&chat.message);
                if flattened.text.is_empty() {
                    outcome.record_skipped();
                    continue;
                }
                let conversation_id = chat
                    .conversation_id
                    .clone()
                    .or_else(|| document.conversation_id.clone())
                    .unwrap_or_else(|| record.record_id.clone());

                match build_message(
                    format!("{}-{index}", record.record_id),
                    conversation_id,
                    timestamp,
                    role,
                    flattened.text,
                    SourceTag::JsonExport,
                    "json_export",
                    Default::default(),
                    now,
                ) {
                    Ok(m) => {
                        messages.push(m);
                        outcome.record_parsed();
                    }
                    Err(_) => outcome.record_skipped(),
                }
            }
        }

        (messages, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2026-07-28T00:00:00Z".parse().unwrap()
    }

    fn record(json: serde_json::Value) -> RawRecord {
        RawRecord {
            record_id: "fingerprint-abc".to_string(),
            payload: serde_json::to_vec(&json).unwrap(),
        }
    }

    #[test]
    fn parse_walks_chats_in_order() {
        let records = vec![record(serde_json::json!({
            "conversationId": "c1",
            "chats": [
                {"role": "user", "timestamp": "2025-10-22T09:00:00Z", "message": [{"type": "paragraph", "text": "hi"}]},
                {"role": "assistant", "timestamp": "2025-10-22T09:01:00Z", "message": [{"type": "paragraph", "text": "hello"}]}
            ]
        }))];
        let parser = JsonExportParser;
        let (messages, outcome) = parser.parse(&records, now());
        assert_eq!(outcome.parsed, 2);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[1].content, "hello");
        assert!(messages.iter().all(|m| m.conversation_id == "c1"));
    }

    #[test]
    fn parse_falls_back_to_document_id_when_chat_id_missing() {
        let records = vec![record(serde_json::json!({
            "chats": [
                {"role": "user", "timestamp": "2025-10-22T09:00:00Z", "message": [{"type": "paragraph", "text": "hi"}]}
            ]
        }))];
        let parser = JsonExportParser;
        let (messages, _) = parser.parse(&records, now());
        assert_eq!(messages[0].conversation_id, "fingerprint-abc");
    }

    #[test]
    fn parse_skips_chat_with_unrecognized_role() {
        let records = vec![record(serde_json::json!({
            "chats": [
                {"role": "narrator", "message": [{"type": "paragraph", "text": "hi"}]}
            ]
        }))];
        let parser = JsonExportParser;
        let (messages, outcome) = parser.parse(&records, now());
        assert!(messages.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn parse_skips_chat_with_no_flattenable_blocks() {
        let records = vec![record(serde_json::json!({
            "chats": [
                {"role": "user", "message": [{"type": "embed", "text": "x"}]}
            ]
        }))];
        let parser = JsonExportParser;
        let (messages, outcome) = parser.parse(&records, now());
        assert!(messages.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn parse_skips_whole_malformed_document() {
        let records = vec![RawRecord {
            record_id: "bad".to_string(),
            payload: b"not json".to_vec(),
        }];
        let parser = JsonExportParser;
        let (messages, outcome) = parser.parse(&records, now());
        assert!(messages.is_empty());
        assert_eq!(outcome.skipped, 1);
    }
}
