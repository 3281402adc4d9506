//! Shared helpers every parser must call instead of reimplementing.
//!
//! Grounded on the teacher's transcript-scanning code in `hook_helpers.rs`
//! (`scan_transcript_usage`, `check_transcript_format`): the same
//! tail-reading/line-by-line-JSON style, generalized here to read whole
//! files rather than a fixed tail, since full ingestion (not just the last
//! tool call) is the point.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::model::{Message, MessageInvariantError, Role, SourceTag};

/// Decodes the five escape sequences specified in spec §4.2, idempotent on
/// already-decoded input (an already-decoded `\n` substring has no leading
/// backslash, so a second pass leaves it untouched).
pub fn decode_escapes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('n') => {
                out.push('\n');
                chars.next();
            }
            Some('t') => {
                out.push('\t');
                chars.next();
            }
            Some('r') => {
                out.push('\r');
                chars.next();
            }
            Some('"') => {
                out.push('"');
                chars.next();
            }
            Some('\\') => {
                out.push('\\');
                chars.next();
            }
            _ => out.push('\\'),
        }
    }
    out
}

/// Joins non-empty content blocks with a blank line, trimming only the
/// outer whitespace (internal whitespace is preserved byte-for-byte), per
/// spec §4.2 "Content assembly".
pub fn assemble_content<I, S>(blocks: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = blocks
        .into_iter()
        .map(|b| b.as_ref().to_string())
        .filter(|b| !b.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    joined.trim().to_string()
}

/// Accepts ISO-8601 (with or without fractional seconds/timezone) or
/// `YYYY-MM-DD HH:MM:SS` as local time (treated as UTC, since the pipeline
/// doesn't carry a timezone database); rejects anything else. Output is
/// always UTC to millisecond precision, per spec §4.2.
pub fn normalize_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(truncate_millis(dt.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(truncate_millis(Utc.from_utc_datetime(&naive)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(truncate_millis(Utc.from_utc_datetime(&naive)));
    }
    None
}

fn truncate_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    let millis = dt.timestamp_millis();
    Utc.timestamp_millis_opt(millis).single().unwrap_or(dt)
}

/// Builds a Message, always filling id/conversation_id/timestamp/role/
/// content/metadata.source/metadata.extracted_from per spec §4.2 "Message
/// construction". `extra_metadata` may carry additional reserved fields
/// (`message_type`, `thinking`, `cwd`, `branch`, ...).
#[allow(clippy::too_many_arguments)]
pub fn build_message(
    id: String,
    conversation_id: String,
    timestamp: DateTime<Utc>,
    role: Role,
    content: String,
    source: SourceTag,
    extracted_from: &str,
    extra_metadata: BTreeMap<String, String>,
    now: DateTime<Utc>,
) -> Result<Message, MessageInvariantError> {
    Message::new(
        id,
        conversation_id,
        timestamp,
        role,
        content,
        source,
        extracted_from,
        extra_metadata,
        now,
    )
}

/// Tracks per-parser skip counts so a single bad record never fails the
/// whole batch (spec §4.2: "malformed entries are skipped and counted").
#[derive(Debug, Default, Clone, Copy)]
pub struct ParseOutcome {
    pub parsed: usize,
    pub skipped: usize,
}

impl ParseOutcome {
    pub fn record_parsed(&mut self) {
        self.parsed += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }
}

/// Result of flattening a content-block array (spec §4.2 "shared block
/// rules"): both the SQLite parser (structured-JSON content columns) and
/// the JSON-export parser (`chats[].message` blocks) flatten through this
/// one function.
#[derive(Debug, Default, Clone)]
pub struct BlockFlattenResult {
    pub text: String,
    pub skipped: usize,
}

/// Flattens one ordered list of content blocks into plain text per spec
/// §4.2: paragraph -> plain text, preformatted -> fenced code with its
/// declared language, list -> item lines, table -> row text, unknown types
/// are skipped and counted. Blocks are joined with `assemble_content`.
pub fn flatten_blocks(blocks: &[serde_json::Value]) -> BlockFlattenResult {
    let mut pieces = Vec::with_capacity(blocks.len());
    let mut skipped = 0usize;

    for block in blocks {
        let kind = block.get("type").and_then(|v| v.as_str()).unwrap_or("");
        match kind {
            "paragraph" => {
                if let Some(text) = block.get("text").and_then(|v| v.as_str()) {
                    pieces.push(text.to_string());
                }
            }
            "preformatted" => {
                let language = block.get("language").and_then(|v| v.as_str()).unwrap_or("");
                let text = block.get("text").and_then(|v| v.as_str()).unwrap_or("");
                pieces.push(format!("```{language}\n{text}\n```"));
            }
            "list" => {
                if let Some(items) = block.get("items").and_then(|v| v.as_array()) {
                    let lines = items
                        .iter()
                        .filter_map(|i| i.as_str())
                        .map(|i| format!("- {i}"))
                        .collect::<Vec<_>>()
                        .join("\n");
                    pieces.push(lines);
                }
            }
            "table" => {
                if let Some(rows) = block.get("rows").and_then(|v| v.as_array()) {
                    let lines = rows
                        .iter()
                        .filter_map(|row| row.as_array())
                        .map(|row| {
                            row.iter()
                                .filter_map(|cell| cell.as_str())
                                .collect::<Vec<_>>()
                                .join(" | ")
                        })
                        .collect::<Vec<_>>()
                        .join("\n");
                    pieces.push(lines);
                }
            }
            _ => skipped += 1,
        }
    }

    BlockFlattenResult {
        text: assemble_content(pieces),
        skipped,
    }
}
