use thiserror::Error;

/// Typed error taxonomy for the consolidation pipeline.
///
/// Parse-errors never reach this type: each parser catches and counts
/// malformed records itself (see `parsers::util::ParseOutcome`). Everything
/// here is a cycle- or startup-level failure.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("schema not recognized in {0}")]
    SchemaNotRecognized(String),

    #[error("parse error in {source}: {detail}")]
    Parse { source: String, detail: String },

    #[error("dedup ceiling exceeded ({0} entries)")]
    OrchestratorLimit(usize),

    #[error("writer error: {0}")]
    Writer(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
