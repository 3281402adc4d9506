//! Cycle scheduler (spec §4.8): acquires the output-root lock, runs the
//! four sources' read→parse steps with bounded concurrency, then
//! consolidates, analyzes, writes, and ages sequentially. Per-step
//! timeouts are grounded in the teacher's `server::dispatch`/
//! `server::execute`, which wraps each tool call in
//! `tokio::time::timeout` and treats a timeout as "this step didn't
//! happen," never as a hard error.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::analyzer;
use crate::clock::Clock;
use crate::config::Config;
use crate::cursor::{Cursor, CursorStore};
use crate::error::Result;
use crate::model::{Message, SourceTag};
use crate::orchestrator;
use crate::parsers::json_export::JsonExportParser;
use crate::parsers::jsonl_log::JsonlLogParser;
use crate::parsers::kv_store::KvStoreParser;
use crate::parsers::sqlite_app::SqliteAppParser;
use crate::parsers::Parser;
use crate::sources::json_export::JsonExportReader;
use crate::sources::jsonl_log::JsonlLogReader;
use crate::sources::kv_store::KvStoreReader;
use crate::sources::sqlite_app::SqliteAppReader;
use crate::sources::SourceReader;
use crate::stats::Stats;
use crate::workspace;
use crate::writer::{artifact_path, atomic_write};
use crate::{aging, writer};

/// One enabled source: its reader, its paired parser, and the cursor key
/// it's stored under in `.cursors`.
enum EnabledSource {
    KvStore(KvStoreReader),
    SqliteApp(SqliteAppReader),
    JsonlLog(JsonlLogReader),
    JsonExport(JsonExportReader),
}

impl EnabledSource {
    fn source_tag(&self) -> SourceTag {
        match self {
            EnabledSource::KvStore(_) => SourceTag::KvStore,
            EnabledSource::SqliteApp(_) => SourceTag::SqliteApp,
            EnabledSource::JsonlLog(_) => SourceTag::JsonlCli,
            EnabledSource::JsonExport(_) => SourceTag::JsonExport,
        }
    }

    fn read_since(&self, cursor: &Cursor) -> Result<(Vec<crate::sources::RawRecord>, Cursor)> {
        match self {
            EnabledSource::KvStore(r) => r.read_since(cursor),
            EnabledSource::SqliteApp(r) => r.read_since(cursor),
            EnabledSource::JsonlLog(r) => r.read_since(cursor),
            EnabledSource::JsonExport(r) => r.read_since(cursor),
        }
    }

    fn parse(
        &self,
        records: &[crate::sources::RawRecord],
        now: chrono::DateTime<chrono::Utc>,
    ) -> (Vec<Message>, crate::parsers::util::ParseOutcome) {
        match self {
            EnabledSource::KvStore(_) => KvStoreParser.parse(records, now),
            EnabledSource::SqliteApp(_) => SqliteAppParser.parse(records, now),
            EnabledSource::JsonlLog(_) => JsonlLogParser.parse(records, now),
            EnabledSource::JsonExport(_) => JsonExportParser.parse(records, now),
        }
    }
}

fn enabled_sources(config: &Config) -> Vec<EnabledSource> {
    let mut sources = Vec::new();

    if let Some(storage_root) = &config.sources.kv_store_workspace_storage {
        if let Some(db_path) = workspace::resolve_db_path(storage_root, &config.project_name) {
            sources.push(EnabledSource::KvStore(KvStoreReader::new(db_path)));
        }
    }
    if let Some(db_path) = &config.sources.sqlite_app_db {
        sources.push(EnabledSource::SqliteApp(SqliteAppReader::new(db_path.clone())));
    }
    if let Some(root) = &config.sources.jsonl_log_root {
        sources.push(EnabledSource::JsonlLog(JsonlLogReader::new(root.clone())));
    }
    if let Some(root) = &config.sources.json_export_root {
        sources.push(EnabledSource::JsonExport(
            JsonExportReader::new(root.clone())
                .with_max_export_bytes(config.json_export_max_bytes),
        ));
    }

    sources
}

fn lock_path(output_root: &std::path::Path) -> PathBuf {
    output_root.join(".lock")
}

fn cursors_path(output_root: &std::path::Path) -> PathBuf {
    output_root.join(".cursors")
}

/// Runs one full cycle (spec §4.8 steps 1-7). Returns `Ok(false)` without
/// doing any work if the output-root lock is already held, matching step
/// 1's "if held, skip the cycle."
pub async fn run_one_cycle(config: &Config, stats: &Stats, clock: &dyn Clock) -> Result<bool> {
    std::fs::create_dir_all(&config.output_root)?;
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(lock_path(&config.output_root))?;

    if lock_file.try_lock_exclusive().is_err() {
        info!("output root locked, skipping cycle");
        return Ok(false);
    }

    let result = run_locked_cycle(config, stats, clock).await;
    lock_file.unlock().ok();
    result.map(|()| true)
}

async fn run_locked_cycle(config: &Config, stats: &Stats, clock: &dyn Clock) -> Result<()> {
    let now = clock.now();
    let mut cursor_store = CursorStore::load(&cursors_path(&config.output_root))?;
    let sources = enabled_sources(config);

    let semaphore = Arc::new(Semaphore::new(sources.len().max(1)));
    let mut handles = Vec::new();

    for source in sources {
        let permit = Arc::clone(&semaphore);
        let cursor = cursor_store
            .get(&source.source_tag().to_string())
            .cloned()
            .unwrap_or_else(|| Cursor::empty_for(source.source_tag()));
        let reader_timeout = config.reader_timeout;
        let parser_timeout = config.parser_timeout;

        handles.push(tokio::spawn(async move {
            let _permit = permit.acquire_owned().await.expect("semaphore not closed");
            read_and_parse_one_source(source, cursor, reader_timeout, parser_timeout, now).await
        }));
    }

    let mut all_messages = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Some((tag, new_cursor, messages))) => {
                cursor_store.set(&tag.to_string(), new_cursor);
                all_messages.extend(messages);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "source task panicked"),
        }
    }

    let (canonical, consolidation_stats) =
        orchestrator::consolidate(&all_messages, config.dedup_ceiling)?;
    let conversations = orchestrator::group_into_conversations(canonical);

    for conversation in &conversations {
        let Some(end_date) = conversation.end_date() else {
            continue;
        };
        let analysis = analyzer::analyze(conversation);
        let age = now.signed_duration_since(end_date);
        let tier = crate::model::Tier::for_age(age);

        let aicf_path = artifact_path(&config.output_root, tier, end_date, &conversation.id, "aicf");
        atomic_write(&aicf_path, writer::aicf::render(&analysis, now).as_bytes())?;

        let md_path = artifact_path(&config.output_root, tier, end_date, &conversation.id, "md");
        atomic_write(&md_path, writer::markdown::render(&analysis, Some(conversation)).as_bytes())?;
    }

    let aging_stats = aging::run(&config.output_root, now)?;
    cursor_store.save(&cursors_path(&config.output_root), now)?;

    stats.record_cycle(&consolidation_stats, conversations.len(), aging_stats);
    Ok(())
}

async fn read_and_parse_one_source(
    source: EnabledSource,
    cursor: Cursor,
    reader_timeout: Duration,
    parser_timeout: Duration,
    now: chrono::DateTime<chrono::Utc>,
) -> Option<(SourceTag, Cursor, Vec<Message>)> {
    let tag = source.source_tag();

    let read_result = tokio::time::timeout(
        reader_timeout,
        tokio::task::spawn_blocking(move || {
            let result = source.read_since(&cursor);
            (source, result)
        }),
    )
    .await;

    let (source, records_result) = match read_result {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => {
            warn!(source = %tag, error = %e, "reader task join failed");
            return None;
        }
        Err(_) => {
            warn!(source = %tag, "reader timed out, cursor left untouched");
            return None;
        }
    };

    let (records, new_cursor) = match records_result {
        Ok(pair) => pair,
        Err(e) => {
            warn!(source = %tag, error = %e, "reader failed, cursor left untouched");
            return None;
        }
    };

    let parse_result = tokio::time::timeout(
        parser_timeout,
        tokio::task::spawn_blocking(move || {
            let (messages, outcome) = source.parse(&records, now);
            if outcome.skipped > 0 {
                warn!(source = %tag, skipped = outcome.skipped, "parser skipped malformed records");
            }
            messages
        }),
    )
    .await;

    match parse_result {
        Ok(Ok(messages)) => Some((tag, new_cursor, messages)),
        Ok(Err(e)) => {
            warn!(source = %tag, error = %e, "parser task join failed, cursor left untouched");
            None
        }
        Err(_) => {
            warn!(source = %tag, "parser timed out, cursor left untouched");
            None
        }
    }
}
