//! Parser for the desktop app's SQLite reader raw records.
//!
//! Grounded on spec §4.2 "SQLite parser": maps each row to a Message,
//! preserving the database's own timestamp column. When the content column
//! holds a JSON array of structured blocks rather than plain text, it is
//! flattened through the shared block rules (`parsers::util::
//! flatten_blocks`) instead of a parser-local reimplementation.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::{Message, Role, SourceTag};
use crate::parsers::util::{build_message, flatten_blocks, normalize_timestamp, ParseOutcome};
use crate::parsers::Parser;
use crate::sources::RawRecord;

#[derive(Debug, Deserialize)]
struct SqliteRow {
    id: i64,
    conversation_id: String,
    role: String,
    content: serde_json::Value,
    timestamp: String,
}

fn parse_role(raw: &str) -> Option<Role> {
    match raw {
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        _ => None,
    }
}

fn resolve_content(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(blocks) => Some(flatten_blocks(blocks).text),
        _ => None,
    }
}

pub struct SqliteAppParser;

impl Parser for SqliteAppParser {
    fn source_tag(&self) -> SourceTag {
        SourceTag::SqliteApp
    }

    fn parse(&self, records: &[RawRecord], now: DateTime<Utc>) -> (Vec<Message>, ParseOutcome) {
        let mut outcome = ParseOutcome::default();
        let mut messages = Vec::with_capacity(records.len());

        for record in records {
            let Ok(row) = serde_json::from_slice::<SqliteRow>(&record.payload) else {
                outcome.record_skipped();
                continue;
            };
            let Some(role) = parse_role(&row.role) else {
                outcome.record_skipped();
                continue;
            };
            let Some(timestamp) = normalize_timestamp(&row.timestamp) else {
                outcome.record_skipped();
                continue;
            };
            let Some(content) = resolve_content(&row.content) else {
                outcome.record_skipped();
                continue;
            };

            match build_message(
                row.id.to_string(),
                row.conversation_id,
                timestamp,
                role,
                content,
                SourceTag::SqliteApp,
                "sqlite_app",
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

        (messages, outcome)
    }
}
