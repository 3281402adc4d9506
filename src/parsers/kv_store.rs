//! Parser for the key-value store reader's raw records.
//!
//! Grounded on spec §4.2 "Key-value-store parser": extracts the
//! `request_message`/`response_text` pair from each value, decoding the
//! same five backslash escapes the teacher's ledger format never needed
//! (vigilo's events are already structured JSON) but the embedded-editor
//! value blobs do. Conversation id is taken from an explicit
//! `conversationId` field when present; otherwise consecutive records
//! (sorted by timestamp) are grouped into a synthetic conversation whenever
//! the gap between them is at most 30 minutes.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::model::{Message, Role, SourceTag};
use crate::parsers::util::{build_message, decode_escapes, ParseOutcome};
use crate::parsers::Parser;
use crate::sources::RawRecord;

const SYNTHESIS_WINDOW: Duration = Duration::minutes(30);

#[derive(Debug, Deserialize)]
struct KvValue {
    request_message: Option<String>,
    response_text: Option<String>,
    #[serde(rename = "conversationId")]
    conversation_id: Option<String>,
    timestamp: Option<String>,
}

struct ParsedEntry {
    record_id: String,
    conversation_id: Option<String>,
    timestamp: DateTime<Utc>,
    user_text: Option<String>,
    assistant_text: Option<String>,
}

pub struct KvStoreParser;

impl Parser for KvStoreParser {
    fn source_tag(&self) -> SourceTag {
        SourceTag::KvStore
    }

    fn parse(&self, records: &[RawRecord], now: DateTime<Utc>) -> (Vec<Message>, ParseOutcome) {
        let mut outcome = ParseOutcome::default();
        let mut entries = Vec::with_capacity(records.len());

        for record in records {
            let Ok(value) = serde_json::from_slice::<KvValue>(&record.payload) else {
                outcome.record_skipped();
                continue;
            };
            if value.request_message.is_none() && value.response_text.is_none() {
                outcome.record_skipped();
                continue;
            }
            let timestamp = value
                .timestamp
                .as_deref()
                .and_then(super::util::normalize_timestamp)
                .unwrap_or(now);

            entries.push(ParsedEntry {
                record_id: record.record_id.clone(),
                conversation_id: value.conversation_id,
                timestamp,
                user_text: value.request_message.map(|s| decode_escapes(&s)),
                assistant_text: value.response_text.map(|s| decode_escapes(&s)),
            });
        }

        assign_synthetic_conversation_ids(&mut entries);

        let mut messages = Vec::new();
        for entry in entries {
            let conversation_id = entry
                .conversation_id
                .clone()
                .unwrap_or_else(|| unreachable!("assigned by assign_synthetic_conversation_ids"));

            if let Some(text) = entry.user_text {
                match build_message(
                    format!("{}-user", entry.record_id),
                    conversation_id.clone(),
                    entry.timestamp,
                    Role::User,
                    text,
                    SourceTag::KvStore,
                    "kv_store",
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
            if let Some(text) = entry.assistant_text {
                match build_message(
                    format!("{}-assistant", entry.record_id),
                    conversation_id.clone(),
                    entry.timestamp,
                    Role::Assistant,
                    text,
                    SourceTag::KvStore,
                    "kv_store",
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

fn assign_synthetic_conversation_ids(entries: &mut [ParsedEntry]) {
    let mut order: Vec<usize> = (0..entries.len())
        .filter(|&i| entries[i].conversation_id.is_none())
        .collect();
    order.sort_by_key(|&i| entries[i].timestamp);

    let mut group_start: Option<DateTime<Utc>> = None;
    let mut last_timestamp: Option<DateTime<Utc>> = None;
    let mut current_id = String::new();

    for i in order {
        let ts = entries[i].timestamp;
        let starts_new_group = match last_timestamp {
            Some(last) => ts - last > SYNTHESIS_WINDOW,
            None => true,
        };
        if starts_new_group {
            group_start = Some(ts);
            current_id = format!("kv-synth-{}", group_start.unwrap().timestamp_millis());
        }
        entries[i].conversation_id = Some(current_id.clone());
        last_timestamp = Some(ts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2026-07-28T00:00:00Z".parse().unwrap()
    }

    fn record(payload: &str, id: &str) -> RawRecord {
        RawRecord {
            record_id: id.to_string(),
            payload: payload.as_bytes().to_vec(),
        }
    }

    #[test]
    fn parse_extracts_explicit_conversation_id() {
        let records = vec![record(
            r#"{"request_message":"hi","response_text":"hello","conversationId":"c1","timestamp":"2025-10-22T09:00:00Z"}"#,
            "k1",
        )];
        let parser = KvStoreParser;
        let (messages, outcome) = parser.parse(&records, now());
        assert_eq!(outcome.parsed, 2);
        assert!(messages.iter().all(|m| m.conversation_id == "c1"));
    }

    #[test]
    fn parse_decodes_escape_sequences() {
        let records = vec![record(
            r#"{"request_message":"line1\\nline2","response_text":null,"conversationId":"c1","timestamp":"2025-10-22T09:00:00Z"}"#,
            "k1",
        )];
        let parser = KvStoreParser;
        let (messages, _) = parser.parse(&records, now());
        assert_eq!(messages[0].content, "line1\nline2");
    }

    #[test]
    fn parse_groups_missing_conversation_ids_within_window() {
        let records = vec![
            record(
                r#"{"request_message":"first","timestamp":"2025-10-22T09:00:00Z"}"#,
                "k1",
            ),
            record(
                r#"{"request_message":"second","timestamp":"2025-10-22T09:10:00Z"}"#,
                "k2",
            ),
            record(
                r#"{"request_message":"much later","timestamp":"2025-10-22T11:00:00Z"}"#,
                "k3",
            ),
        ];
        let parser = KvStoreParser;
        let (messages, _) = parser.parse(&records, now());
        let ids: Vec<&str> = messages.iter().map(|m| m.conversation_id.as_str()).collect();
        assert_eq!(ids[0], ids[1]);
        assert_ne!(ids[0], ids[2]);
    }

    #[test]
    fn parse_skips_malformed_json() {
        let records = vec![record("not json", "k1")];
        let parser = KvStoreParser;
        let (messages, outcome) = parser.parse(&records, now());
        assert!(messages.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn parse_skips_values_with_neither_field() {
        let records = vec![record(r#"{"unrelated":"x"}"#, "k1")];
        let parser = KvStoreParser;
        let (messages, outcome) = parser.parse(&records, now());
        assert!(messages.is_empty());
        assert_eq!(outcome.skipped, 1);
    }
}
