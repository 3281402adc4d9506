//! Per-category pattern tables for the analyzer's extractors.
//!
//! Same static-table-plus-classify shape as the teacher's `VIGILO_TOOLS` /
//! `Risk::classify` (`models.rs`), split into one table per extractor
//! category since each category matches independently rather than sharing
//! one flat lookup. Compiled once via `std::sync::LazyLock` over the
//! `regex` crate the teacher already depends on.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::Priority;

pub struct PatternRule {
    pub pattern: &'static str,
    pub priority: Priority,
}

fn compile(rules: &[PatternRule]) -> Vec<Regex> {
    rules
        .iter()
        .map(|r| Regex::new(r.pattern).expect("static pattern is valid regex"))
        .collect()
}

pub const USER_INTENT_RULES: &[PatternRule] = &[
    PatternRule {
        pattern: r"(?i)\b(critical|urgent|block(?:er|ed))\b",
        priority: Priority::Critical,
    },
    PatternRule {
        pattern: r"(?i)^(please\s+)?(implement|add|fix|create|write|make|update|remove|refactor|investigate)\b",
        priority: Priority::Medium,
    },
    PatternRule {
        pattern: r"(?i)\b(can you|could you|would you|should we|let's|we need to)\b",
        priority: Priority::Medium,
    },
    PatternRule {
        pattern: r"\?\s*$",
        priority: Priority::Medium,
    },
];

pub static USER_INTENT_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(USER_INTENT_RULES));

pub const AI_ACTION_RULES: &[PatternRule] = &[
    PatternRule {
        pattern: r"(?i)\b(implemented|added|created|wrote)\b",
        priority: Priority::Medium,
    },
    PatternRule {
        pattern: r"(?i)\b(fixed|resolved|patched)\b",
        priority: Priority::High,
    },
    PatternRule {
        pattern: r"(?i)\b(refactored|renamed|reorganized)\b",
        priority: Priority::Medium,
    },
    PatternRule {
        pattern: r"(?i)\b(deleted|removed)\b",
        priority: Priority::Medium,
    },
];

pub static AI_ACTION_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(AI_ACTION_RULES));

pub const DECISION_RULES: &[PatternRule] = &[
    PatternRule {
        pattern: r"(?i)\bwe decided to\b",
        priority: Priority::High,
    },
    PatternRule {
        pattern: r"(?i)\blet's use\b",
        priority: Priority::Medium,
    },
    PatternRule {
        pattern: r"(?i)\bthe approach is\b",
        priority: Priority::Medium,
    },
    PatternRule {
        pattern: r"(?i)\b(chose|selected)\b",
        priority: Priority::Medium,
    },
];

pub static DECISION_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(DECISION_RULES));

pub const IMPACT_CRITICAL_RULE: &str = r"(?i)\b(architecture|security)\b";
pub const IMPACT_HIGH_RULE: &str = r"(?i)\b(feature|component)\b";
pub const IMPACT_MEDIUM_RULE: &str = r"(?i)\b(style|comment|formatting)\b";

pub static IMPACT_CRITICAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(IMPACT_CRITICAL_RULE).unwrap());
pub static IMPACT_HIGH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(IMPACT_HIGH_RULE).unwrap());
pub static IMPACT_MEDIUM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(IMPACT_MEDIUM_RULE).unwrap());

pub const FILE_PATH_RULE: &str = r"(?x)
    (?:[\w./-]+/)+[\w-]+\.(?:rs|py|js|ts|tsx|jsx|go|java|c|cpp|h|hpp|rb|toml|yaml|yml|json|md|sh)
";
pub const SHELL_COMMAND_RULE: &str = r"(?m)^\s*[$>]\s+\S+";
pub const TEST_RUNNER_RULE: &str =
    r"(?i)\b(cargo test|pytest|npm test|go test|jest|mocha|rspec)\b";

pub static FILE_PATH_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(FILE_PATH_RULE).unwrap());
pub static SHELL_COMMAND_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(SHELL_COMMAND_RULE).unwrap());
pub static TEST_RUNNER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TEST_RUNNER_RULE).unwrap());

pub const STATUS_PLANNED_RULE: &str = r"(?i)\b(todo|will|plan to|going to)\b";
pub const STATUS_IN_PROGRESS_RULE: &str = r"(?i)\b(in progress|running|working on)\b";
pub const STATUS_COMPLETED_RULE: &str = r"(?i)\b(done|completed|passed|finished)\b";
pub const STATUS_FAILED_RULE: &str = r"(?i)\b(failed|error|broke|broken)\b";

pub static STATUS_PLANNED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(STATUS_PLANNED_RULE).unwrap());
pub static STATUS_IN_PROGRESS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(STATUS_IN_PROGRESS_RULE).unwrap());
pub static STATUS_COMPLETED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(STATUS_COMPLETED_RULE).unwrap());
pub static STATUS_FAILED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(STATUS_FAILED_RULE).unwrap());

pub const BLOCKER_RULE: &str = r"(?i)\b(blocked by|blocker|can't proceed|waiting on|stuck on)\b";
pub static BLOCKER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(BLOCKER_RULE).unwrap());
