//! Multi-source orchestrator (spec §4.3): merges normalized messages from
//! every source, deduplicates by content hash with earliest-timestamp wins,
//! and groups survivors into Conversations.
//!
//! The dedup map is a plain `HashMap` scoped to one `consolidate()` call —
//! spec §9's "arena" design note is just ordinary stack-scoped ownership in
//! Rust, no custom allocator needed. Grounded in the teacher's preference
//! for straightforward, locally-scoped data structures over shared state
//! (`ledger.rs` never threads a map across calls either).

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::error::{CoreError, Result};
use crate::model::{Conversation, ContentHash, Message};

#[derive(Debug, Clone, Default)]
pub struct ConsolidationStats {
    pub total_seen: usize,
    pub total_unique: usize,
    pub duplicates_removed: usize,
    pub per_source_counts: BTreeMap<String, usize>,
}

/// Merges messages from all sources, deduplicating by `ContentHash` with
/// earliest-timestamp-wins (spec §4.3 step 2). Aborts early with
/// `CoreError::OrchestratorLimit` if the in-flight map would exceed
/// `dedup_ceiling`, rather than building the full map first (spec §5).
pub fn consolidate(
    messages: &[Message],
    dedup_ceiling: usize,
) -> Result<(Vec<Message>, ConsolidationStats)> {
    let mut survivors: HashMap<ContentHash, Message> = HashMap::new();
    let mut stats = ConsolidationStats::default();

    for message in messages {
        stats.total_seen += 1;
        if let Some(source) = message.source() {
            *stats.per_source_counts.entry(source.to_string()).or_insert(0) += 1;
        }

        let hash = message.content_hash();
        match survivors.get_mut(&hash) {
            Some(existing) => {
                stats.duplicates_removed += 1;
                let union = union_seen_in_sources(existing, message);
                let earlier = message.timestamp < existing.timestamp
                    || (message.timestamp == existing.timestamp && message.id < existing.id);
                if earlier {
                    let mut winner = message.clone();
                    winner.metadata.insert("seen_in_sources".to_string(), union);
                    *existing = winner;
                } else {
                    existing.metadata.insert("seen_in_sources".to_string(), union);
                }
            }
            None => {
                if survivors.len() >= dedup_ceiling {
                    return Err(CoreError::OrchestratorLimit(dedup_ceiling));
                }
                let mut survivor = message.clone();
                if let Some(source) = survivor.source() {
                    let source = source.to_string();
                    survivor
                        .metadata
                        .insert("seen_in_sources".to_string(), source);
                }
                survivors.insert(hash, survivor);
            }
        }
    }

    stats.total_unique = survivors.len();
    let canonical: Vec<Message> = survivors.into_values().collect();
    Ok((canonical, stats))
}

/// Computes the union of `existing`'s accumulated `seen_in_sources` tags
/// with `incoming`'s own source tag (comma-separated, deduplicated,
/// sorted), without mutating either message, per spec §4.3 step 2.
fn union_seen_in_sources(existing: &Message, incoming: &Message) -> String {
    let mut tags: Vec<String> = existing
        .metadata
        .get("seen_in_sources")
        .map(|s| s.split(',').map(|t| t.to_string()).collect())
        .unwrap_or_default();
    if let Some(source) = incoming.source() {
        tags.push(source.to_string());
    }
    tags.sort();
    tags.dedup();
    tags.join(",")
}

/// Groups canonical messages by `conversation_id` into Conversation views
/// (spec §4.3 step 4). Conversations are rebuilt each cycle, never
/// persisted (spec §3 "Lifecycles").
pub fn group_into_conversations(messages: Vec<Message>) -> Vec<Conversation> {
    let mut by_id: BTreeMap<String, Vec<Message>> = BTreeMap::new();
    for message in messages {
        by_id.entry(message.conversation_id.clone()).or_default().push(message);
    }

    let mut conversations = Vec::new();
    for (id, msgs) in by_id {
        for (split_id, split_msgs) in split_on_source_collision(&id, msgs) {
            conversations.push(Conversation::new(split_id, split_msgs));
        }
    }
    conversations
}

/// Handles the spec §9 open question "two sources carry the same
/// conversation id for different conversations": when every per-source
/// subgroup under one `conversation_id` has a time span disjoint from every
/// other subgroup's, they're treated as a coincidental id collision rather
/// than one conversation harvested through multiple tools, and each
/// subgroup is split out under `"{source}:{conversation_id}"`. The ordinary
/// case — one conversation whose messages interleave across sources, which
/// is exactly what cross-source deduplication is for — is left as a single
/// group under the original id.
fn split_on_source_collision(id: &str, messages: Vec<Message>) -> Vec<(String, Vec<Message>)> {
    let mut by_source: BTreeMap<String, Vec<Message>> = BTreeMap::new();
    for message in messages {
        let source = message.source().unwrap_or("generic").to_string();
        by_source.entry(source).or_default().push(message);
    }

    if by_source.len() < 2 {
        return by_source
            .into_iter()
            .map(|(_, msgs)| (id.to_string(), msgs))
            .collect();
    }

    let spans: Vec<(DateTime<Utc>, DateTime<Utc>)> = by_source
        .values()
        .map(|msgs| {
            let start = msgs.iter().map(|m| m.timestamp).min().expect("non-empty group");
            let end = msgs.iter().map(|m| m.timestamp).max().expect("non-empty group");
            (start, end)
        })
        .collect();

    let disjoint = spans.iter().enumerate().all(|(i, (a_start, a_end))| {
        spans
            .iter()
            .enumerate()
            .all(|(j, (b_start, b_end))| i == j || *a_end < *b_start || *b_end < *a_start)
    });

    if disjoint {
        by_source
            .into_iter()
            .map(|(source, msgs)| (format!("{source}:{id}"), msgs))
            .collect()
    } else {
        vec![(id.to_string(), by_source.into_values().flatten().collect())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceTag;
    use chrono::{DateTime, Utc};
    use std::collections::BTreeMap as Map;

    fn now() -> DateTime<Utc> {
        "2026-07-28T00:00:00Z".parse().unwrap()
    }

    fn msg(id: &str, conv: &str, ts: &str, content: &str, source: SourceTag) -> Message {
        Message::new(
            id.to_string(),
            conv.to_string(),
            ts.parse().unwrap(),
            crate::model::Role::User,
            content.to_string(),
            source,
            "test",
            Map::new(),
            now(),
        )
        .unwrap()
    }

    #[test]
    fn consolidate_deduplicates_identical_content_keeping_earliest() {
        let messages = vec![
            msg("b", "c1", "2025-10-22T09:05:00Z", "hello", SourceTag::SqliteApp),
            msg("a", "c1", "2025-10-22T09:00:00Z", "hello", SourceTag::KvStore),
        ];
        let (canonical, stats) = consolidate(&messages, 1_000_000).unwrap();
        assert_eq!(canonical.len(), 1);
        assert_eq!(canonical[0].id, "a");
        assert_eq!(stats.total_seen, 2);
        assert_eq!(stats.total_unique, 1);
        assert_eq!(stats.duplicates_removed, 1);
    }

    #[test]
    fn consolidate_accumulates_seen_in_sources() {
        let messages = vec![
            msg("a", "c1", "2025-10-22T09:00:00Z", "hello", SourceTag::KvStore),
            msg("b", "c1", "2025-10-22T09:05:00Z", "hello", SourceTag::SqliteApp),
        ];
        let (canonical, _) = consolidate(&messages, 1_000_000).unwrap();
        let seen = canonical[0].metadata.get("seen_in_sources").unwrap();
        assert!(seen.contains("kv-store"));
        assert!(seen.contains("sqlite-app"));
    }

    #[test]
    fn consolidate_keeps_distinct_content_separate() {
        let messages = vec![
            msg("a", "c1", "2025-10-22T09:00:00Z", "hello", SourceTag::KvStore),
            msg("b", "c1", "2025-10-22T09:05:00Z", "goodbye", SourceTag::KvStore),
        ];
        let (canonical, stats) = consolidate(&messages, 1_000_000).unwrap();
        assert_eq!(canonical.len(), 2);
        assert_eq!(stats.duplicates_removed, 0);
    }

    #[test]
    fn consolidate_aborts_when_ceiling_exceeded() {
        let messages = vec![
            msg("a", "c1", "2025-10-22T09:00:00Z", "one", SourceTag::KvStore),
            msg("b", "c1", "2025-10-22T09:01:00Z", "two", SourceTag::KvStore),
        ];
        let result = consolidate(&messages, 1);
        assert!(matches!(result, Err(CoreError::OrchestratorLimit(1))));
    }

    #[test]
    fn group_into_conversations_splits_by_id() {
        let messages = vec![
            msg("a", "c1", "2025-10-22T09:00:00Z", "one", SourceTag::KvStore),
            msg("b", "c2", "2025-10-22T09:01:00Z", "two", SourceTag::KvStore),
        ];
        let conversations = group_into_conversations(messages);
        assert_eq!(conversations.len(), 2);
    }

    #[test]
    fn group_into_conversations_keeps_interleaved_multi_source_id_together() {
        // Same conversation, harvested through two tools with overlapping
        // time spans — the ordinary cross-source case, not a collision.
        let messages = vec![
            msg("a", "shared", "2025-10-22T09:00:00Z", "one", SourceTag::KvStore),
            msg("b", "shared", "2025-10-22T09:05:00Z", "two", SourceTag::SqliteApp),
            msg("c", "shared", "2025-10-22T09:10:00Z", "three", SourceTag::KvStore),
        ];
        let conversations = group_into_conversations(messages);
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].id, "shared");
        assert_eq!(conversations[0].messages.len(), 3);
    }

    #[test]
    fn group_into_conversations_splits_disjoint_id_collision_by_source() {
        // Same id, but two sources' messages never overlap in time — a
        // coincidental reuse of the id for unrelated conversations.
        let messages = vec![
            msg("a", "dup", "2025-01-01T09:00:00Z", "jan one", SourceTag::KvStore),
            msg("b", "dup", "2025-01-01T09:05:00Z", "jan two", SourceTag::KvStore),
            msg("c", "dup", "2025-06-01T09:00:00Z", "jun one", SourceTag::SqliteApp),
            msg("d", "dup", "2025-06-01T09:05:00Z", "jun two", SourceTag::SqliteApp),
        ];
        let mut conversations = group_into_conversations(messages);
        conversations.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(conversations.len(), 2);
        assert_eq!(conversations[0].id, "kv-store:dup");
        assert_eq!(conversations[1].id, "sqlite-app:dup");
    }
}
