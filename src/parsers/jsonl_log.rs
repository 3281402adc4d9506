//! Parser for the CLI agent's line-delimited transcript records.
//!
//! Grounded on spec §4.2 "Log parser" and the teacher's transcript shape
//! in `hook_helpers.rs`'s `scan_transcript_usage`/`check_transcript_format`:
//! `{"type", "timestamp", "sessionId", "message": {"role", "content",
//! "usage"}, "cwd", "gitBranch"}`. Role always comes from `message.role`,
//! never the outer `type` (which names the record kind, not the speaker).
//! Thinking text is captured into metadata only, never the message content
//! (spec §9 open question decision). Conversation id comes from `sessionId`
//! when present; the transcript file path is only a fallback for records
//! that predate it.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::{Message, Role, SourceTag};
use crate::parsers::util::{assemble_content, build_message, normalize_timestamp, ParseOutcome};
use crate::parsers::Parser;
use crate::sources::RawRecord;

#[derive(Debug, Deserialize)]
struct LogLine {
    #[serde(rename = "type")]
    line_type: Option<String>,
    timestamp: Option<String>,
    message: Option<LogMessage>,
    cwd: Option<String>,
    #[serde(rename = "gitBranch")]
    git_branch: Option<String>,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogMessage {
    role: Option<String>,
    content: serde_json::Value,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

fn parse_role(raw: &str) -> Option<Role> {
    match raw {
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        _ => None,
    }
}

/// Splits `message.content` into assembled text blocks and any `thinking`
/// text, mirroring the content-block shape Claude-style transcripts use
/// (`{"type": "text", "text": ...}` / `{"type": "thinking", ...}`).
fn extract_text_and_thinking(content: &serde_json::Value) -> (String, Option<String>) {
    match content {
        serde_json::Value::String(s) => (s.clone(), None),
        serde_json::Value::Array(blocks) => {
            let mut texts = Vec::new();
            let mut thinking_parts = Vec::new();
            for block in blocks {
                match block.get("type").and_then(|v| v.as_str()) {
                    Some("text") => {
                        if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                            texts.push(t.to_string());
                        }
                    }
                    Some("thinking") => {
                        if let Some(t) = block.get("thinking").and_then(|v| v.as_str()) {
                            thinking_parts.push(t.to_string());
                        }
                    }
                    _ => {}
                }
            }
            let thinking = if thinking_parts.is_empty() {
                None
            } else {
                Some(thinking_parts.join("\n\n"))
            };
            (assemble_content(texts), thinking)
        }
        _ => (String::new(), None),
    }
}

/// Derives a fallback conversation id from the file-scoped record id
/// (`"<relative-path>:<offset>"`, per `sources::jsonl_log`): the path
/// without its `.jsonl` extension, one conversation per transcript file.
/// Used only when the record carries no `sessionId`.
fn conversation_id_from_record_id(record_id: &str) -> String {
    let path_part = record_id.rsplit_once(':').map(|(p, _)| p).unwrap_or(record_id);
    path_part.strip_suffix(".jsonl").unwrap_or(path_part).to_string()
}

pub struct JsonlLogParser;

impl Parser for JsonlLogParser {
    fn source_tag(&self) -> SourceTag {
        SourceTag::JsonlCli
    }

    fn parse(&self, records: &[RawRecord], now: DateTime<Utc>) -> (Vec<Message>, ParseOutcome) {
        let mut outcome = ParseOutcome::default();
        let mut messages = Vec::with_capacity(records.len());

        for record in records {
            let Ok(line) = serde_json::from_slice::<LogLine>(&record.payload) else {
                outcome.record_skipped();
                continue;
            };
            let Some(log_message) = &line.message else {
                outcome.record_skipped();
                continue;
            };
            let Some(role) = log_message.role.as_deref().and_then(parse_role) else {
                outcome.record_skipped();
                continue;
            };
            let Some(timestamp) = line.timestamp.as_deref().and_then(normalize_timestamp) else {
                outcome.record_skipped();
                continue;
            };

            let (content, thinking) = extract_text_and_thinking(&log_message.content);
            let is_system = line.line_type.as_deref() == Some("system");
            if content.is_empty() && !is_system {
                outcome.record_skipped();
                continue;
            }

            let mut extra_metadata = std::collections::BTreeMap::new();
            if is_system {
                extra_metadata.insert("message_type".to_string(), "system".to_string());
            }
            if let Some(cwd) = &line.cwd {
                extra_metadata.insert("cwd".to_string(), cwd.clone());
            }
            if let Some(branch) = &line.git_branch {
                extra_metadata.insert("branch".to_string(), branch.clone());
            }
            if let Some(thinking) = thinking {
                extra_metadata.insert("thinking".to_string(), thinking);
            }
            if let Some(usage) = &log_message.usage {
                if let Some(v) = usage.input_tokens {
                    extra_metadata.insert("input_tokens".to_string(), v.to_string());
                }
                if let Some(v) = usage.output_tokens {
                    extra_metadata.insert("output_tokens".to_string(), v.to_string());
                }
            }

            let conversation_id = line
                .session_id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| conversation_id_from_record_id(&record.record_id));
            match build_message(
                record.record_id.clone(),
                conversation_id,
                timestamp,
                role,
                content,
                SourceTag::JsonlCli,
                "jsonl_log",
                extra_metadata,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2026-07-28T00:00:00Z".parse().unwrap()
    }

    fn record(id: &str, json: serde_json::Value) -> RawRecord {
        RawRecord {
            record_id: id.to_string(),
            payload: serde_json::to_vec(&json).unwrap(),
        }
    }

    #[test]
    fn parse_extracts_role_from_message_not_outer_type() {
        let records = vec![record(
            "proj/s1.jsonl:0",
            serde_json::json!({
                "type": "assistant",
                "timestamp": "2025-10-22T09:00:00Z",
                "message": {
                    "role": "assistant",
                    "content": [{"type": "text", "text": "done"}]
                }
            }),
        )];
        let parser = JsonlLogParser;
        let (messages, outcome) = parser.parse(&records, now());
        assert_eq!(outcome.parsed, 1);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[0].content, "done");
    }

    #[test]
    fn parse_captures_thinking_into_metadata_not_content() {
        let records = vec![record(
            "proj/s1.jsonl:0",
            serde_json::json!({
                "type": "assistant",
                "timestamp": "2025-10-22T09:00:00Z",
                "message": {
                    "role": "assistant",
                    "content": [
                        {"type": "thinking", "thinking": "pondering"},
                        {"type": "text", "text": "answer"}
                    ]
                }
            }),
        )];
        let parser = JsonlLogParser;
        let (messages, _) = parser.parse(&records, now());
        assert_eq!(messages[0].content, "answer");
        assert_eq!(messages[0].metadata.get("thinking").unwrap(), "pondering");
    }

    #[test]
    fn parse_allows_empty_content_for_system_marker() {
        let records = vec![record(
            "proj/s1.jsonl:0",
            serde_json::json!({
                "type": "system",
                "timestamp": "2025-10-22T09:00:00Z",
                "message": { "role": "user", "content": "" }
            }),
        )];
        let parser = JsonlLogParser;
        let (messages, outcome) = parser.parse(&records, now());
        assert_eq!(outcome.parsed, 1);
        assert_eq!(messages[0].metadata.get("message_type").unwrap(), "system");
    }

    #[test]
    fn parse_drops_empty_content_without_system_marker() {
        let records = vec![record(
            "proj/s1.jsonl:0",
            serde_json::json!({
                "type": "user",
                "timestamp": "2025-10-22T09:00:00Z",
                "message": { "role": "user", "content": "" }
            }),
        )];
        let parser = JsonlLogParser;
        let (messages, outcome) = parser.parse(&records, now());
        assert!(messages.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn parse_captures_cwd_branch_and_usage() {
        let records = vec![record(
            "proj/s1.jsonl:0",
            serde_json::json!({
                "type": "assistant",
                "timestamp": "2025-10-22T09:00:00Z",
                "cwd": "/home/user/proj",
                "gitBranch": "main",
                "message": {
                    "role": "assistant",
                    "content": "ok",
                    "usage": {"input_tokens": 10, "output_tokens": 20}
                }
            }),
        )];
        let parser = JsonlLogParser;
        let (messages, _) = parser.parse(&records, now());
        assert_eq!(messages[0].metadata.get("cwd").unwrap(), "/home/user/proj");
        assert_eq!(messages[0].metadata.get("branch").unwrap(), "main");
        assert_eq!(messages[0].metadata.get("input_tokens").unwrap(), "10");
        assert_eq!(messages[0].metadata.get("output_tokens").unwrap(), "20");
    }

    #[test]
    fn conversation_id_derived_from_file_path() {
        let id = conversation_id_from_record_id("proj/sub/session-1.jsonl:128");
        assert_eq!(id, "proj/sub/session-1");
    }

    #[test]
    fn parse_uses_session_id_as_conversation_id_when_present() {
        let records = vec![record(
            "deeply/nested/project/2f9a-uuid.jsonl:0",
            serde_json::json!({
                "type": "user",
                "timestamp": "2025-10-22T09:00:00Z",
                "sessionId": "S1",
                "message": { "role": "user", "content": "hi" }
            }),
        )];
        let parser = JsonlLogParser;
        let (messages, _) = parser.parse(&records, now());
        assert_eq!(messages[0].conversation_id, "S1");
    }

    #[test]
    fn parse_falls_back_to_file_path_when_session_id_absent() {
        let records = vec![record(
            "proj/sub/session-1.jsonl:0",
            serde_json::json!({
                "type": "user",
                "timestamp": "2025-10-22T09:00:00Z",
                "message": { "role": "user", "content": "hi" }
            }),
        )];
        let parser = JsonlLogParser;
        let (messages, _) = parser.parse(&records, now());
        assert_eq!(messages[0].conversation_id, "proj/sub/session-1");
    }

    #[test]
    fn parse_skips_line_with_no_message() {
        let records = vec![record(
            "proj/s1.jsonl:0",
            serde_json::json!({"type": "summary"}),
        )];
        let parser = JsonlLogParser;
        let (messages, outcome) = parser.parse(&records, now());
        assert!(messages.is_empty());
        assert_eq!(outcome.skipped, 1);
    }
}
