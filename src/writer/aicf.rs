//! AICF wire format (spec §4.5/§6): one logical record per line, `key|field1
//! |field2|…`, fixed header then fixed category order. Round-trip fidelity
//! (spec §8.5) requires the reader to preserve unknown keys verbatim so a
//! parse-then-rewrite cycle with no intermediate mutation reproduces the
//! original bytes.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::error::{CoreError, Result};
use crate::model::{Analysis, AnalysisEntry, Priority, WorkingState};

pub const SPEC_VERSION: &str = "1";

/// An AICF document as read back off disk: the header fields, one entry
/// list per known category, and any lines under keys this writer doesn't
/// recognize, kept verbatim for round-trip fidelity.
#[derive(Debug, Clone, PartialEq)]
pub struct AicfDocument {
    pub spec_version: String,
    pub generated_at: DateTime<Utc>,
    pub conversation_id: String,
    pub user_intents: Vec<AnalysisEntry>,
    pub ai_actions: Vec<AnalysisEntry>,
    pub technical_work: Vec<AnalysisEntry>,
    pub decisions: Vec<AnalysisEntry>,
    pub flow_events: Vec<AnalysisEntry>,
    pub working_state: WorkingState,
    /// Lines whose key wasn't one of the header fields or the six
    /// categories above, kept verbatim in the order they appeared.
    pub unknown_lines: Vec<String>,
}

/// Renders `analysis` as an AICF document (spec §4.5 header + fixed
/// category order).
pub fn render(analysis: &Analysis, generated_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "version|{SPEC_VERSION}");
    let _ = writeln!(out, "timestamp|{}", generated_at.to_rfc3339());
    let _ = writeln!(out, "conversationId|{}", escape_field(&analysis.conversation_id));

    render_category(&mut out, "userIntents", &analysis.user_intents);
    render_category(&mut out, "aiActions", &analysis.ai_actions);
    render_category(&mut out, "technicalWork", &analysis.technical_work);
    render_category(&mut out, "decisions", &analysis.decisions);
    render_category(&mut out, "flow", &analysis.flow_events);
    render_working_state(&mut out, &analysis.working_state);

    out
}

fn render_category(out: &mut String, key: &str, entries: &[AnalysisEntry]) {
    for entry in entries {
        let _ = writeln!(
            out,
            "{key}|{}|{}|{}|{}",
            entry.timestamp.to_rfc3339(),
            entry.priority,
            escape_field(&entry.text),
            escape_field(&encode_metadata(&entry.metadata)),
        );
    }
}

fn render_working_state(out: &mut String, state: &WorkingState) {
    let working_on = state.working_on.as_deref().unwrap_or("");
    let blockers = state
        .blockers
        .iter()
        .map(|b| escape_meta_token(b))
        .collect::<Vec<_>>()
        .join(";");
    let next_action = state.next_action.as_deref().unwrap_or("");
    let progress = state
        .progress
        .map(|p| p.to_string())
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "workingState|{}|{}|{}|{}",
        escape_field(working_on),
        escape_field(&blockers),
        escape_field(next_action),
        progress,
    );
}

/// Parses an AICF document, returning a typed error naming the 1-based
/// line number of the first unparseable line (spec §6 "Lines that fail to
/// parse cause the reader to abort with a typed error and ... line
/// number").
pub fn parse(input: &str) -> Result<AicfDocument> {
    let mut lines = input.lines().enumerate();

    let mut spec_version = None;
    let mut generated_at = None;
    let mut conversation_id = None;

    let mut doc = AicfDocument {
        spec_version: String::new(),
        generated_at: Utc::now(),
        conversation_id: String::new(),
        user_intents: Vec::new(),
        ai_actions: Vec::new(),
        technical_work: Vec::new(),
        decisions: Vec::new(),
        flow_events: Vec::new(),
        working_state: WorkingState::default(),
        unknown_lines: Vec::new(),
    };

    for (idx, line) in &mut lines {
        let lineno = idx + 1;
        if line.is_empty() {
            continue;
        }
        let mut fields = line.splitn(2, '|');
        let key = fields.next().unwrap_or("");
        let rest = fields.next().unwrap_or("");

        match key {
            "version" => spec_version = Some(rest.to_string()),
            "timestamp" => {
                generated_at = Some(parse_timestamp(rest, lineno)?);
            }
            "conversationId" => conversation_id = Some(unescape_field(rest)),
            "userIntents" => doc.user_intents.push(parse_entry(rest, lineno)?),
            "aiActions" => doc.ai_actions.push(parse_entry(rest, lineno)?),
            "technicalWork" => doc.technical_work.push(parse_entry(rest, lineno)?),
            "decisions" => doc.decisions.push(parse_entry(rest, lineno)?),
            "flow" => doc.flow_events.push(parse_entry(rest, lineno)?),
            "workingState" => doc.working_state = parse_working_state(rest, lineno)?,
            _ => doc.unknown_lines.push(line.to_string()),
        }
    }

    doc.spec_version = spec_version.ok_or_else(|| {
        CoreError::Parse {
            source: "aicf".to_string(),
            detail: "missing version header".to_string(),
        }
    })?;
    doc.generated_at = generated_at.ok_or_else(|| CoreError::Parse {
        source: "aicf".to_string(),
        detail: "missing timestamp header".to_string(),
    })?;
    doc.conversation_id = conversation_id.ok_or_else(|| CoreError::Parse {
        source: "aicf".to_string(),
        detail: "missing conversationId header".to_string(),
    })?;

    Ok(doc)
}

fn parse_timestamp(raw: &str, lineno: usize) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::Parse {
            source: "aicf".to_string(),
            detail: format!("line {lineno}: bad timestamp: {e}"),
        })
}

fn parse_entry(rest: &str, lineno: usize) -> Result<AnalysisEntry> {
    let parts: Vec<&str> = rest.splitn(4, '|').collect();
    if parts.len() != 4 {
        return Err(CoreError::Parse {
            source: "aicf".to_string(),
            detail: format!("line {lineno}: expected 4 fields, got {}", parts.len()),
        });
    }
    let timestamp = parse_timestamp(parts[0], lineno)?;
    let priority = parse_priority(parts[1], lineno)?;
    let text = unescape_field(parts[2]);
    let metadata = decode_metadata(&unescape_field(parts[3]));
    Ok(AnalysisEntry {
        timestamp,
        text,
        priority,
        metadata,
    })
}

fn parse_priority(raw: &str, lineno: usize) -> Result<Priority> {
    match raw {
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        "critical" => Ok(Priority::Critical),
        other => Err(CoreError::Parse {
            source: "aicf".to_string(),
            detail: format!("line {lineno}: unknown priority {other:?}"),
        }),
    }
}

fn parse_working_state(rest: &str, lineno: usize) -> Result<WorkingState> {
    let parts: Vec<&str> = rest.splitn(4, '|').collect();
    if parts.len() != 4 {
        return Err(CoreError::Parse {
            source: "aicf".to_string(),
            detail: format!(
                "line {lineno}: expected 4 fields for workingState, got {}",
                parts.len()
            ),
        });
    }
    let working_on = unescape_field(parts[0]);
    let blockers_raw = unescape_field(parts[1]);
    let next_action = unescape_field(parts[2]);
    let progress_raw = parts[3];

    let blockers = split_unescaped(&blockers_raw, ';')
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(|s| unescape_meta_token(&s))
        .collect();
    let progress = if progress_raw.is_empty() {
        None
    } else {
        Some(progress_raw.parse::<f64>().map_err(|e| CoreError::Parse {
            source: "aicf".to_string(),
            detail: format!("line {lineno}: bad progress value: {e}"),
        })?)
    };

    Ok(WorkingState {
        working_on: if working_on.is_empty() {
            None
        } else {
            Some(working_on)
        },
        blockers,
        next_action: if next_action.is_empty() {
            None
        } else {
            Some(next_action)
        },
        progress,
    })
}

fn escape_field(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '|' => out.push_str("\\|"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_field(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('|') => out.push('|'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn escape_meta_token(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            '=' => out.push_str("\\="),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_meta_token(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn split_unescaped(s: &str, delim: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
            continue;
        }
        if c == delim {
            parts.push(std::mem::take(&mut current));
            continue;
        }
        current.push(c);
    }
    parts.push(current);
    parts
}

fn split_unescaped_once(s: &str, delim: char) -> Option<(String, String)> {
    let mut escaped = false;
    for (pos, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
            continue;
        }
        if c == delim {
            return Some((s[..pos].to_string(), s[pos + delim.len_utf8()..].to_string()));
        }
    }
    None
}

/// `key1=value1;key2=value2;…`, with `;`, `=`, and `\` escaped within each
/// token. This is an internal sub-encoding of the already-escaped AICF
/// field it lives in, not part of the on-the-wire escape set.
fn encode_metadata(metadata: &BTreeMap<String, String>) -> String {
    metadata
        .iter()
        .map(|(k, v)| format!("{}={}", escape_meta_token(k), escape_meta_token(v)))
        .collect::<Vec<_>>()
        .join(";")
}

fn decode_metadata(s: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if s.is_empty() {
        return map;
    }
    for pair in split_unescaped(s, ';') {
        if pair.is_empty() {
            continue;
        }
        if let Some((k, v)) = split_unescaped_once(&pair, '=') {
            map.insert(unescape_meta_token(&k), unescape_meta_token(&v));
        }
    }
    map
}
