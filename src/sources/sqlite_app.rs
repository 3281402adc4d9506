//! Reader for the desktop app's relational database.
//!
//! Grounded on the teacher's `cursor::platform::open_db` (read-only SQLite
//! open) generalized with a ranked candidate list of table/column names,
//! since the desktop app's schema is not canonically specified across
//! versions (spec §4.1, §9 open question).

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::cursor::{Cursor, SqliteAppCursor};
use crate::error::{CoreError, Result};
use crate::model::SourceTag;
use crate::sources::{RawRecord, SourceReader};

/// One guess at the desktop app's schema shape.
struct SchemaCandidate {
    messages_table: &'static str,
    id_column: &'static str,
    content_column: &'static str,
    timestamp_column: &'static str,
    conversation_id_column: &'static str,
    role_column: &'static str,
}

const SCHEMA_CANDIDATES: &[SchemaCandidate] = &[
    SchemaCandidate {
        messages_table: "messages",
        id_column: "id",
        content_column: "content",
        timestamp_column: "created_at",
        conversation_id_column: "conversation_id",
        role_column: "role",
    },
    SchemaCandidate {
        messages_table: "chat_messages",
        id_column: "id",
        content_column: "text",
        timestamp_column: "timestamp",
        conversation_id_column: "session_id",
        role_column: "sender",
    },
    SchemaCandidate {
        messages_table: "ChatMessage",
        id_column: "rowid",
        content_column: "body",
        timestamp_column: "createdAt",
        conversation_id_column: "conversationId",
        role_column: "author",
    },
];

fn table_exists(conn: &Connection, table: &str) -> bool {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |_| Ok(()),
    )
    .is_ok()
}

fn find_schema(conn: &Connection) -> Option<&'static SchemaCandidate> {
    SCHEMA_CANDIDATES
        .iter()
        .find(|c| table_exists(conn, c.messages_table))
}

pub struct SqliteAppReader {
    db_path: PathBuf,
}

impl SqliteAppReader {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        SqliteAppReader {
            db_path: db_path.into(),
        }
    }
}

impl SourceReader for SqliteAppReader {
    fn source_tag(&self) -> SourceTag {
        SourceTag::SqliteApp
    }

    fn read_since(&self, cursor: &Cursor) -> Result<(Vec<RawRecord>, Cursor)> {
        if !Path::new(&self.db_path).exists() {
            return Err(CoreError::SourceUnavailable(format!(
                "sqlite app db not found at {}",
                self.db_path.display()
            )));
        }

        let last_row_id = match cursor {
            Cursor::SqliteApp(c) => c.last_row_id,
            _ => None,
        }
        .unwrap_or(0);

        let conn = Connection::open_with_flags(
            &self.db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?;

        let schema = find_schema(&conn).ok_or_else(|| {
            CoreError::SchemaNotRecognized(self.db_path.display().to_string())
        })?;

        let query = format!(
            "SELECT {id}, {conv}, {role}, {content}, {ts} FROM {table} \
             WHERE {id} > ?1 ORDER BY {id} ASC",
            id = schema.id_column,
            conv = schema.conversation_id_column,
            role = schema.role_column,
            content = schema.content_column,
            ts = schema.timestamp_column,
            table = schema.messages_table,
        );
        let mut stmt = conn.prepare(&query)?;
        let mut records = Vec::new();
        let mut max_id = last_row_id;

        let rows = stmt.query_map([last_row_id], |row| {
            let id: i64 = row.get(0)?;
            let conversation_id: String = row.get(1)?;
            let role: String = row.get(2)?;
            let content: String = row.get(3)?;
            let timestamp: String = row.get(4)?;
            Ok((id, conversation_id, role, content, timestamp))
        })?;

        for row in rows {
            let (id, conversation_id, role, content, timestamp) = row?;
            max_id = max_id.max(id);
            let record = serde_json::json!({
                "id": id,
                "conversation_id": conversation_id,
                "role": role,
                "content": content,
                "timestamp": timestamp,
            });
            records.push(RawRecord {
                record_id: id.to_string(),
                payload: serde_json::to_vec(&record)?,
            });
        }

        let new_cursor = Cursor::SqliteApp(SqliteAppCursor {
            last_modified_ms: None,
            last_row_id: Some(max_id),
        });
        Ok((records, new_cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_db(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute(
            "CREATE TABLE messages (id INTEGER PRIMARY KEY, conversation_id TEXT, \
             role TEXT, content TEXT, created_at TEXT)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO messages (conversation_id, role, content, created_at) \
             VALUES ('c1', 'user', 'hello', '2025-10-22T09:00:00Z')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn read_since_recognizes_primary_schema() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("app.db");
        make_db(&db_path);

        let reader = SqliteAppReader::new(&db_path);
        let (records, cursor) = reader
            .read_since(&Cursor::SqliteApp(SqliteAppCursor::default()))
            .unwrap();

        assert_eq!(records.len(), 1);
        match cursor {
            Cursor::SqliteApp(c) => assert_eq!(c.last_row_id, Some(1)),
            _ => panic!("wrong cursor variant"),
        }
    }

    #[test]
    fn unrecognized_schema_errors_typed() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("app.db");
        let conn = Connection::open(&db_path).unwrap();
        conn.execute("CREATE TABLE nonsense (x INTEGER)", []).unwrap();
        drop(conn);

        let reader = SqliteAppReader::new(&db_path);
        let result = reader.read_since(&Cursor::SqliteApp(SqliteAppCursor::default()));
        assert!(matches!(result, Err(CoreError::SchemaNotRecognized(_))));
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let dir = tempdir().unwrap();
        let reader = SqliteAppReader::new(dir.path().join("missing.db"));
        let result = reader.read_since(&Cursor::SqliteApp(SqliteAppCursor::default()));
        assert!(matches!(result, Err(CoreError::SourceUnavailable(_))));
    }
}
