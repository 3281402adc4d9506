//! Aging service (spec §4.6): at the end of each cycle, re-files artifacts
//! whose date prefix has crossed a tier boundary. Grounded in the
//! teacher's `ledger::rotate_and_cleanup`, generalized from "rotate one
//! active file past a size threshold" to "move many dated files past an
//! age threshold," keeping the same discipline: rename onto the new
//! location, never edit in place.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use std::sync::LazyLock;

use crate::error::Result;
use crate::model::{Analysis, Tier, WorkingState};
use crate::writer::{aicf, artifact_path, atomic_write, markdown};

static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})_(.+)\.(aicf|md)$").unwrap());

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AgingStats {
    pub moved: usize,
    pub compressed: usize,
}

fn parse_artifact_filename(name: &str) -> Option<(NaiveDate, String, String)> {
    let caps = FILENAME_RE.captures(name)?;
    let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
    Some((date, caps[2].to_string(), caps[3].to_string()))
}

/// Scans every tier directory under `output_root` and relocates artifacts
/// whose age no longer matches their current tier. Idempotent: artifacts
/// already in the correct tier are left untouched.
pub fn run(output_root: &Path, today: DateTime<Utc>) -> Result<AgingStats> {
    let mut stats = AgingStats::default();

    for tier in [Tier::Recent, Tier::Medium, Tier::Old, Tier::Archive] {
        let dir = output_root.join(tier.dir_name());
        if !dir.is_dir() {
            continue;
        }

        let mut groups: BTreeMap<(NaiveDate, String), Vec<String>> = BTreeMap::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some((date, conversation_id, ext)) = parse_artifact_filename(name) {
                groups.entry((date, conversation_id)).or_default().push(ext);
            }
        }

        for ((date, conversation_id), exts) in groups {
            let artifact_date = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
            let age = today.signed_duration_since(artifact_date);
            let target_tier = Tier::for_age(age);
            if target_tier == tier {
                continue;
            }
            relocate(
                output_root,
                &dir,
                tier,
                target_tier,
                date,
                artifact_date,
                &conversation_id,
                &exts,
                &mut stats,
            )?;
        }
    }

    Ok(stats)
}

#[allow(clippy::too_many_arguments)]
fn relocate(
    output_root: &Path,
    source_dir: &Path,
    from_tier: Tier,
    to_tier: Tier,
    date: NaiveDate,
    artifact_date: DateTime<Utc>,
    conversation_id: &str,
    exts: &[String],
    stats: &mut AgingStats,
) -> Result<()> {
    let compress = from_tier == Tier::Old && to_tier == Tier::Archive;

    if !compress {
        for ext in exts {
            let source = source_dir.join(format!("{}_{conversation_id}.{ext}", date.format("%Y-%m-%d")));
            let dest = artifact_path(output_root, to_tier, artifact_date, conversation_id, ext);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(&source, &dest)?;
            stats.moved += 1;
        }
        return Ok(());
    }

    let aicf_path = source_dir.join(format!("{}_{conversation_id}.aicf", date.format("%Y-%m-%d")));
    let raw = fs::read_to_string(&aicf_path)?;
    let doc = aicf::parse(&raw)?;

    let compressed = Analysis {
        conversation_id: doc.conversation_id.clone(),
        user_intents: Vec::new(),
        ai_actions: Vec::new(),
        technical_work: doc.technical_work,
        decisions: doc.decisions,
        flow_events: Vec::new(),
        working_state: doc.working_state,
    };

    let aicf_dest = artifact_path(output_root, to_tier, artifact_date, conversation_id, "aicf");
    atomic_write(&aicf_dest, aicf::render(&compressed, doc.generated_at).as_bytes())?;
    fs::remove_file(&aicf_path)?;
    stats.moved += 1;
    stats.compressed += 1;

    let md_path = source_dir.join(format!("{}_{conversation_id}.md", date.format("%Y-%m-%d")));
    if md_path.is_file() {
        if has_renderable_content(&compressed.working_state) || !compressed.decisions.is_empty() {
            let md_dest = artifact_path(output_root, to_tier, artifact_date, conversation_id, "md");
            atomic_write(&md_dest, markdown::render(&compressed, None).as_bytes())?;
        }
        fs::remove_file(&md_path)?;
        stats.moved += 1;
    }

    Ok(())
}

fn has_renderable_content(state: &WorkingState) -> bool {
    state.working_on.is_some()
        || !state.blockers.is_empty()
        || state.next_action.is_some()
        || state.progress.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalysisEntry, Priority};
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        "2026-07-28T00:00:00Z".parse().unwrap()
    }

    fn write_artifact(root: &Path, tier: Tier, date: &str, conv_id: &str) {
        let dir = root.join(tier.dir_name());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{date}_{conv_id}.aicf")), "version|1\n").unwrap();
        fs::write(dir.join(format!("{date}_{conv_id}.md")), "# x\n").unwrap();
    }

    #[test]
    fn run_moves_artifact_whose_age_crossed_a_tier_boundary() {
        let root = tempdir().unwrap();
        write_artifact(root.path(), Tier::Recent, "2026-06-01", "c1");
        let stats = run(root.path(), now()).unwrap();
        assert!(stats.moved > 0);
        assert!(root.path().join("old/2026-06-01_c1.aicf").is_file());
        assert!(!root.path().join("recent/2026-06-01_c1.aicf").exists());
    }

    #[test]
    fn run_is_idempotent_for_artifacts_already_in_the_right_tier() {
        let root = tempdir().unwrap();
        write_artifact(root.path(), Tier::Recent, "2026-07-27", "c1");
        let stats = run(root.path(), now()).unwrap();
        assert_eq!(stats.moved, 0);
        assert!(root.path().join("recent/2026-07-27_c1.aicf").is_file());
    }

    #[test]
    fn run_compresses_low_priority_fields_on_old_to_archive_move() {
        let root = tempdir().unwrap();
        let dir = root.path().join("old");
        fs::create_dir_all(&dir).unwrap();

        let analysis = Analysis {
            conversation_id: "c1".to_string(),
            user_intents: vec![AnalysisEntry {
                timestamp: now(),
                text: "should be dropped".to_string(),
                priority: Priority::Low,
                metadata: Default::default(),
            }],
            ai_actions: Vec::new(),
            technical_work: Vec::new(),
            decisions: vec![AnalysisEntry {
                timestamp: now(),
                text: "keep this decision".to_string(),
                priority: Priority::High,
                metadata: Default::default(),
            }],
            flow_events: Vec::new(),
            working_state: WorkingState::default(),
        };
        fs::write(
            dir.join("2026-01-01_c1.aicf"),
            aicf::render(&analysis, now()),
        )
        .unwrap();
        fs::write(dir.join("2026-01-01_c1.md"), "# c1\n").unwrap();

        let stats = run(root.path(), now()).unwrap();
        assert_eq!(stats.compressed, 1);

        let archived = fs::read_to_string(root.path().join("archive/2026-01-01_c1.aicf")).unwrap();
        assert!(!archived.contains("should be dropped"));
        assert!(archived.contains("keep this decision"));
    }

    #[test]
    fn run_ignores_files_that_do_not_match_the_artifact_filename_pattern() {
        let root = tempdir().unwrap();
        let dir = root.path().join("recent");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("not-an-artifact.txt"), "x").unwrap();
        let stats = run(root.path(), now()).unwrap();
        assert_eq!(stats.moved, 0);
    }
}
