//! Per-source progress markers (spec §3 "Cursor") and their persistence in
//! the `.cursors` file (spec §6), one JSON line per source, owned
//! exclusively by the scheduler across cycle boundaries — never read or
//! written by readers directly (spec §5 "Shared-resource policy").

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::model::SourceTag;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvStoreCursor {
    pub last_record_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteAppCursor {
    pub last_modified_ms: Option<i64>,
    pub last_row_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOffset {
    pub byte_offset: u64,
    pub pending_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonlLogCursor {
    pub offsets: BTreeMap<String, FileOffset>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonExportCursor {
    pub imported_fingerprints: BTreeSet<String>,
}

/// Per-source progress marker (spec §3 "Cursor"). The shape differs per
/// source, matching what each backend can cheaply express as "new since".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Cursor {
    KvStore(KvStoreCursor),
    SqliteApp(SqliteAppCursor),
    JsonlLog(JsonlLogCursor),
    JsonExport(JsonExportCursor),
}

impl Cursor {
    pub fn empty_for(tag: SourceTag) -> Cursor {
        match tag {
            SourceTag::KvStore => Cursor::KvStore(KvStoreCursor::default()),
            SourceTag::SqliteApp => Cursor::SqliteApp(SqliteAppCursor::default()),
            SourceTag::JsonlCli => Cursor::JsonlLog(JsonlLogCursor::default()),
            SourceTag::JsonExport => Cursor::JsonExport(JsonExportCursor::default()),
            SourceTag::Generic => Cursor::JsonlLog(JsonlLogCursor::default()),
        }
    }
}

/// Per-cycle timestamp attached to the `.cursors` persistence record so the
/// scheduler can reason about "did this source make progress this cycle".
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CursorRecord {
    source: String,
    cursor: Cursor,
    updated_at: DateTime<Utc>,
}

/// Loads/saves the `.cursors` file: one JSON line per source, 0600
/// permissions on unix.
#[derive(Debug, Default, Clone)]
pub struct CursorStore {
    entries: BTreeMap<String, Cursor>,
}

impl CursorStore {
    pub fn new() -> Self {
        CursorStore::default()
    }

    pub fn get(&self, source: &str) -> Option<&Cursor> {
        self.entries.get(source)
    }

    pub fn set(&mut self, source: &str, cursor: Cursor) {
        self.entries.insert(source.to_string(), cursor);
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(CursorStore::default());
        }
        let content = fs::read_to_string(path)?;
        let mut entries = BTreeMap::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let record: CursorRecord = serde_json::from_str(line)?;
            entries.insert(record.source, record.cursor);
        }
        Ok(CursorStore { entries })
    }

    /// Writes the whole cursor set atomically (temp file + rename), the
    /// same discipline the writers use for artifacts (spec §4.5).
    pub fn save(&self, path: &Path, now: DateTime<Utc>) -> Result<()> {
        let tmp_path = path.with_extension("cursors.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            for (source, cursor) in &self.entries {
                let record = CursorRecord {
                    source: source.clone(),
                    cursor: cursor.clone(),
                    updated_at: now,
                };
                let line = serde_json::to_string(&record)?;
                writeln!(file, "{line}")?;
            }
            file.sync_all()?;
        }
        set_owner_only_permissions(&tmp_path)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, perms).map_err(CoreError::Io)
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
