//! Conversation-memory consolidator: harvests AI-assistant conversations
//! from four local sources, normalizes them into a single Message model,
//! deduplicates across sources, and emits AICF + markdown projections
//! organized into an age-tiered folder hierarchy.
//!
//! Two public operations (spec §6): [`run_one_cycle`] runs one full
//! harvest-consolidate-write-age cycle, and [`Stats::snapshot`] reads back
//! the cumulative counters a running process has accumulated.

pub mod aging;
pub mod analyzer;
pub mod clock;
pub mod config;
pub mod cursor;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod parsers;
pub mod scheduler;
pub mod sources;
pub mod stats;
pub mod workspace;
pub mod writer;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::{CoreError, Result};
pub use scheduler::run_one_cycle;
pub use stats::{Stats, StatsSnapshot};

/// Installs a `tracing` subscriber reading `RUST_LOG` (default `info`),
/// the same env-filter convention the teacher's MCP server assumes its
/// host process sets up before dispatch.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
