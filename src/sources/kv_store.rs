//! Reader for the editor extension's embedded key-value store.
//!
//! Grounded on the teacher's `cursor::platform` module: a single-writer
//! SQLite-backed `ItemTable(key TEXT, value BLOB)` opened read-only via
//! `SQLITE_OPEN_READ_ONLY`, the same way the teacher opens the Cursor
//! editor's `state.vscdb`. Retry-with-backoff on a locked database mirrors
//! spec §4.1's "tolerate concurrent mutation" requirement.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use rusqlite::Connection;

use crate::cursor::{Cursor, KvStoreCursor};
use crate::error::{CoreError, Result};
use crate::model::SourceTag;
use crate::sources::{RawRecord, SourceReader};

const BACKOFF_START: Duration = Duration::from_millis(100);
const BACKOFF_CAP: Duration = Duration::from_secs(3);
const MAX_ATTEMPTS: u32 = 5;

pub struct KvStoreReader {
    db_path: PathBuf,
}

impl KvStoreReader {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        KvStoreReader {
            db_path: db_path.into(),
        }
    }

    fn open_read_only(&self) -> Result<Connection> {
        let mut attempt = 0;
        let mut backoff = BACKOFF_START;
        let mut waited = Duration::ZERO;
        loop {
            match Connection::open_with_flags(
                &self.db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
            ) {
                Ok(conn) => return Ok(conn),
                Err(e) if attempt + 1 < MAX_ATTEMPTS && waited + backoff <= BACKOFF_CAP => {
                    thread::sleep(backoff);
                    waited += backoff;
                    backoff *= 2;
                    attempt += 1;
                    let _ = e;
                }
                Err(_) => {
                    return Err(CoreError::SourceUnavailable(format!(
                        "kv-store snapshot unavailable at {}",
                        self.db_path.display()
                    )));
                }
            }
        }
    }
}

impl SourceReader for KvStoreReader {
    fn source_tag(&self) -> SourceTag {
        SourceTag::KvStore
    }

    fn read_since(&self, cursor: &Cursor) -> Result<(Vec<RawRecord>, Cursor)> {
        let last_id = match cursor {
            Cursor::KvStore(c) => c.last_record_id,
            _ => None,
        };

        if !Path::new(&self.db_path).exists() {
            return Err(CoreError::SourceUnavailable(format!(
                "kv-store db not found at {}",
                self.db_path.display()
            )));
        }

        let conn = self.open_read_only()?;
        let mut stmt = conn.prepare(
            "SELECT rowid, key, value FROM ItemTable \
             WHERE rowid > ?1 \
               AND (value LIKE '%request_message%' OR value LIKE '%response_text%') \
             ORDER BY rowid ASC",
        )?;

        let mut records = Vec::new();
        let mut max_id = last_id.unwrap_or(0);

        let rows = stmt.query_map([last_id.unwrap_or(0)], |row| {
            let rowid: i64 = row.get(0)?;
            let key: String = row.get(1)?;
            let value: Vec<u8> = row.get(2)?;
            Ok((rowid, key, value))
        })?;

        for row in rows {
            let (rowid, key, value) = row?;
            max_id = max_id.max(rowid);
            records.push(RawRecord {
                record_id: key,
                payload: value,
            });
        }

        let new_cursor = Cursor::KvStore(KvStoreCursor {
            last_record_id: Some(max_id),
        });
        Ok((records, new_cursor))
    }
}
