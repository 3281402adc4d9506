use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `metadata.source`: which backend a message was harvested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceTag {
    KvStore,
    SqliteApp,
    JsonlCli,
    JsonExport,
    Generic,
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceTag::KvStore => "kv-store",
            SourceTag::SqliteApp => "sqlite-app",
            SourceTag::JsonlCli => "jsonl-cli",
            SourceTag::JsonExport => "json-export",
            SourceTag::Generic => "generic",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        })
    }
}

/// Maximum tolerated difference between a message's claimed timestamp and
/// the clock at construction time, per spec §3 "Message" invariant.
pub const CLOCK_SKEW_TOLERANCE: Duration = Duration::seconds(60);

/// The normalized, immutable unit the whole pipeline operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInvariantError(pub String);

impl fmt::Display for MessageInvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "message invariant violated: {}", self.0)
    }
}

impl Message {
    /// Constructs a Message, checking the invariants from spec §3 at the
    /// boundary so nothing downstream has to re-check them.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        conversation_id: String,
        timestamp: DateTime<Utc>,
        role: Role,
        content: String,
        source: SourceTag,
        extracted_from: &str,
        mut extra_metadata: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<Self, MessageInvariantError> {
        if timestamp > now + CLOCK_SKEW_TOLERANCE {
            return Err(MessageInvariantError(format!(
                "timestamp {timestamp} is beyond clock-skew tolerance of now ({now})"
            )));
        }

        if content.is_empty()
            && extra_metadata.get("message_type").map(String::as_str) != Some("system")
        {
            return Err(MessageInvariantError(
                "content may be empty only for message_type=system".to_string(),
            ));
        }

        extra_metadata.insert("source".to_string(), source.to_string());
        extra_metadata.insert("extracted_from".to_string(), extracted_from.to_string());

        Ok(Message {
            id,
            conversation_id,
            timestamp,
            role,
            content,
            metadata: extra_metadata,
        })
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").map(String::as_str)
    }

    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of(self.role, &self.content)
    }
}

/// 256-bit digest over `(role, normalized content)`, the cross-source
/// deduplication key (spec §3 "ContentHash").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(role: Role, content: &str) -> Self {
        let normalized = normalize_for_hash(content);
        let mut hasher = Sha256::new();
        hasher.update([role as u8]);
        hasher.update(normalized.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        ContentHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Strip leading/trailing whitespace and collapse internal whitespace runs,
/// per spec §3 "ContentHash" normalization rule.
pub fn normalize_for_hash(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A set of Messages sharing a `conversation_id`, ordered by timestamp
/// ascending with `id` as tiebreaker (spec §3 "Conversation").
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCounts {
    pub total: usize,
    pub user: usize,
    pub assistant: usize,
}

impl Conversation {
    /// Builds a Conversation from messages already known to share one
    /// `conversation_id`, sorting them per the ordering invariant.
    pub fn new(id: String, mut messages: Vec<Message>) -> Self {
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Conversation { id, messages }
    }

    pub fn source_mix(&self) -> Vec<SourceTag> {
        let mut tags: Vec<SourceTag> = self
            .messages
            .iter()
            .filter_map(|m| match m.source() {
                Some("kv-store") => Some(SourceTag::KvStore),
                Some("sqlite-app") => Some(SourceTag::SqliteApp),
                Some("jsonl-cli") => Some(SourceTag::JsonlCli),
                Some("json-export") => Some(SourceTag::JsonExport),
                Some(_) => Some(SourceTag::Generic),
                None => None,
            })
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }

    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.messages.first()?.timestamp;
        let last = self.messages.last()?.timestamp;
        Some((first, last))
    }

    pub fn counts(&self) -> MessageCounts {
        let mut counts = MessageCounts::default();
        for m in &self.messages {
            counts.total += 1;
            match m.role {
                Role::User => counts.user += 1,
                Role::Assistant => counts.assistant += 1,
            }
        }
        counts
    }

    /// The conversation's end date in UTC, used for artifact filenames and
    /// tier placement (spec §3 "Artifact").
    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        self.span().map(|(_, end)| end)
    }
}

/// Confidence/priority on an analysis entry (spec §3 "Analysis").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        })
    }
}

/// One entry in an analyzer category list (user intent, AI action, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisEntry {
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub priority: Priority,
    /// e.g. "truncated=word-boundary" or category-specific tags like
    /// "status=completed". Free-form, never required by downstream code.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkingState {
    pub working_on: Option<String>,
    pub blockers: Vec<String>,
    pub next_action: Option<String>,
    pub progress: Option<f64>,
}

/// Output of the six extractors for one Conversation (spec §3 "Analysis").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub conversation_id: String,
    pub user_intents: Vec<AnalysisEntry>,
    pub ai_actions: Vec<AnalysisEntry>,
    pub technical_work: Vec<AnalysisEntry>,
    pub decisions: Vec<AnalysisEntry>,
    pub flow_events: Vec<AnalysisEntry>,
    pub working_state: WorkingState,
}

/// One of the four age-ranked storage tiers (spec §3 "Tier").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Recent,
    Medium,
    Old,
    Archive,
}

impl Tier {
    pub const fn dir_name(&self) -> &'static str {
        match self {
            Tier::Recent => "recent",
            Tier::Medium => "medium",
            Tier::Old => "old",
            Tier::Archive => "archive",
        }
    }

    /// Computes the tier for an artifact whose date prefix is `age` old
    /// relative to `today`. Boundaries: recent [0,7) medium [7,30) old
    /// [30,90) archive [90, inf).
    pub fn for_age(age: Duration) -> Tier {
        let days = age.num_days();
        if days < 7 {
            Tier::Recent
        } else if days < 30 {
            Tier::Medium
        } else if days < 90 {
            Tier::Old
        } else {
            Tier::Archive
        }
    }
}
