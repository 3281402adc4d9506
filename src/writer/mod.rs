//! Writers (spec §4.5): both projections are regenerated from scratch and
//! written atomically. `atomic_write` is grounded in the teacher's
//! `ledger::append_event`, which only commits once the write is durable —
//! generalized here from "lock, append, maybe rotate" to "write to a
//! temp file, fsync, rename onto the final path," since these artifacts are
//! rewritten whole rather than appended to.

pub mod aicf;
pub mod markdown;

use std::fs;
use std::path::Path;
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::Tier;

/// Writes `contents` to `path` atomically: write to `<path>.tmp-<pid>-
/// <nanos>`, `sync_all()`, then `rename()` onto `path` (spec §4.5).
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let tmp_path = path.with_extension(format!(
        "{}.tmp-{}-{}",
        path.extension().and_then(|e| e.to_str()).unwrap_or(""),
        process::id(),
        nanos
    ));

    let mut file = fs::File::create(&tmp_path)?;
    use std::io::Write;
    file.write_all(contents)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// `{YYYY-MM-DD}_{conversation_id}.{ext}` (spec §3 "Artifact", §4.5
/// "Filename and location"). `conversation_id` is used verbatim — callers
/// are expected to have already sanitized ids that came from untrusted
/// sources, since ids are opaque identifiers by contract (spec §3).
pub fn artifact_filename(date: DateTime<Utc>, conversation_id: &str, ext: &str) -> String {
    format!("{}_{conversation_id}.{ext}", date.format("%Y-%m-%d"))
}

/// `<output-root>/<tier>/<filename>` (spec §4.5).
pub fn artifact_path(
    output_root: &Path,
    tier: Tier,
    date: DateTime<Utc>,
    conversation_id: &str,
    ext: &str,
) -> std::path::PathBuf {
    output_root
        .join(tier.dir_name())
        .join(artifact_filename(date, conversation_id, ext))
}
