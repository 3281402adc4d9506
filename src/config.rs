//! Runtime configuration (ambient stack addition: the teacher reads
//! individual settings out of a flat `HashMap<String,String>` loaded from
//! a dotfile via `models::load_config()`; this pipeline has enough
//! distinct knobs — four source locations, a dedup ceiling, a cycle
//! cadence, per-step timeouts — to warrant a typed `Config` struct built
//! once at startup instead, validated eagerly so a bad value fails at
//! construction rather than deep inside a cycle.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Where each of the four sources keeps its data, and the project scope
/// the KV-store reader filters to (spec §4.1, §4.7).
#[derive(Debug, Clone)]
pub struct SourcePaths {
    pub kv_store_workspace_storage: Option<PathBuf>,
    pub sqlite_app_db: Option<PathBuf>,
    pub jsonl_log_root: Option<PathBuf>,
    pub json_export_root: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub output_root: PathBuf,
    pub sources: SourcePaths,
    pub project_name: String,
    pub cycle_interval: Duration,
    pub reader_timeout: Duration,
    pub parser_timeout: Duration,
    pub dedup_ceiling: usize,
    pub json_export_max_bytes: u64,
}

impl Config {
    /// Defaults matching spec §4.8 (300s cadence, 30s reader / 60s parser
    /// timeouts) and §5 (1,000,000-entry dedup ceiling), with every source
    /// disabled until a path is supplied.
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Config {
            output_root: output_root.into(),
            sources: SourcePaths {
                kv_store_workspace_storage: None,
                sqlite_app_db: None,
                jsonl_log_root: None,
                json_export_root: None,
            },
            project_name: crate::workspace::default_project_name()
                .unwrap_or_else(|| "default".to_string()),
            cycle_interval: Duration::from_secs(300),
            reader_timeout: Duration::from_secs(30),
            parser_timeout: Duration::from_secs(60),
            dedup_ceiling: 1_000_000,
            json_export_max_bytes: 64 * 1024 * 1024,
        }
    }

    /// Checks the invariants a cycle relies on, so a misconfiguration
    /// surfaces at startup (`CoreError::Configuration`) rather than
    /// mid-cycle.
    pub fn validate(&self) -> Result<()> {
        if self.project_name.trim().is_empty() {
            return Err(CoreError::Configuration(
                "project_name must not be empty".to_string(),
            ));
        }
        if self.dedup_ceiling == 0 {
            return Err(CoreError::Configuration(
                "dedup_ceiling must be greater than zero".to_string(),
            ));
        }
        if self.cycle_interval.is_zero() {
            return Err(CoreError::Configuration(
                "cycle_interval must be greater than zero".to_string(),
            ));
        }
        if self.json_export_max_bytes == 0 {
            return Err(CoreError::Configuration(
                "json_export_max_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds a `Config` from environment variables, the invocation
    /// surface this system uses in place of CLI flags (spec §9
    /// "out of scope: invocation surface"). Unset source paths leave that
    /// source disabled for the cycle.
    pub fn from_env() -> Result<Self> {
        let output_root = std::env::var("AICF_OUTPUT_ROOT")
            .map_err(|_| CoreError::Configuration("AICF_OUTPUT_ROOT is required".to_string()))?;
        let mut config = Config::new(output_root);

        if let Ok(path) = std::env::var("AICF_KV_STORE_WORKSPACE_STORAGE") {
            config.sources.kv_store_workspace_storage = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("AICF_SQLITE_APP_DB") {
            config.sources.sqlite_app_db = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("AICF_JSONL_LOG_ROOT") {
            config.sources.jsonl_log_root = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("AICF_JSON_EXPORT_ROOT") {
            config.sources.json_export_root = Some(PathBuf::from(path));
        }
        if let Ok(name) = std::env::var("AICF_PROJECT_NAME") {
            config.project_name = name;
        }
        if let Ok(secs) = std::env::var("AICF_CYCLE_INTERVAL_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| CoreError::Configuration("AICF_CYCLE_INTERVAL_SECS must be a number".to_string()))?;
            config.cycle_interval = Duration::from_secs(secs);
        }
        if let Ok(ceiling) = std::env::var("AICF_DEDUP_CEILING") {
            config.dedup_ceiling = ceiling
                .parse()
                .map_err(|_| CoreError::Configuration("AICF_DEDUP_CEILING must be a number".to_string()))?;
        }

        config.validate()?;
        Ok(config)
    }
}
