pub mod json_export;
pub mod jsonl_log;
pub mod kv_store;
pub mod sqlite_app;
pub mod util;

use chrono::{DateTime, Utc};

use crate::model::{Message, SourceTag};
use crate::sources::RawRecord;
use util::ParseOutcome;

/// Shared shape for all four format parsers (spec §4.2): `parse` never
/// fails the whole batch — malformed records are skipped and counted in
/// the returned `ParseOutcome`.
pub trait Parser {
    fn source_tag(&self) -> SourceTag;
    fn parse(&self, records: &[RawRecord], now: DateTime<Utc>) -> (Vec<Message>, ParseOutcome);
}
