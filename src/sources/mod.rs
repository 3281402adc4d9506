pub mod json_export;
pub mod jsonl_log;
pub mod kv_store;
pub mod sqlite_app;

use crate::cursor::Cursor;
use crate::error::Result;
use crate::model::SourceTag;

/// One raw record yielded by a reader: an opaque payload plus the
/// record-identifier the parser and cursor need (spec §4.1).
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub record_id: String,
    pub payload: Vec<u8>,
}

/// Shared shape for all four source readers (spec §4.1): `read_since`
/// returns new records plus the cursor advanced past them. Implementations
/// must not hold locks or file handles across calls.
pub trait SourceReader {
    fn source_tag(&self) -> SourceTag;
    fn read_since(&self, cursor: &Cursor) -> Result<(Vec<RawRecord>, Cursor)>;
}
