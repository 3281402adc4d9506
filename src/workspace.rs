//! Workspace/project detection (spec §4.7): the key-value-store reader
//! only emits records from the workspace matching "this project." Grounded
//! in the teacher's `cursor::platform::discover_db`, which enumerates a
//! ranked list of candidate paths and verifies existence — generalized
//! here from "pick the first path that exists" to "pick the workspace
//! whose manifest names this project," since a KV-store host keeps one
//! storage directory per workspace rather than one global database.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct WorkspaceManifest {
    folder: String,
}

/// Resolves the `state.vscdb` belonging to the workspace whose folder
/// basename matches `project_name`, by scanning `storage_root`'s
/// per-workspace subdirectories for a `workspace.json` manifest. Returns
/// `None` (and logs a warning) if no workspace matches — never falls back
/// to "all workspaces" (spec §4.7).
pub fn resolve_db_path(storage_root: &Path, project_name: &str) -> Option<PathBuf> {
    let entries = match fs::read_dir(storage_root) {
        Ok(entries) => entries,
        Err(_) => {
            warn!(
                storage_root = %storage_root.display(),
                "workspace storage root not found, emitting zero kv-store records"
            );
            return None;
        }
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let workspace_dir = entry.path();
        if !workspace_dir.is_dir() {
            continue;
        }
        let Some(manifest) = read_manifest(&workspace_dir.join("workspace.json")) else {
            continue;
        };
        if folder_basename(&manifest.folder).as_deref() == Some(project_name) {
            let db_path = workspace_dir.join("state.vscdb");
            if db_path.is_file() {
                return Some(db_path);
            }
        }
    }

    warn!(
        project_name,
        storage_root = %storage_root.display(),
        "no workspace matched this project, emitting zero kv-store records"
    );
    None
}

fn read_manifest(path: &Path) -> Option<WorkspaceManifest> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

/// `folder` is a `file://` URI in practice; strips the scheme and returns
/// the final path component.
fn folder_basename(folder: &str) -> Option<String> {
    let path_part = folder.strip_prefix("file://").unwrap_or(folder);
    Path::new(path_part)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

/// Default project name when none is configured: the basename of the
/// process's current working directory (spec §4.7).
pub fn default_project_name() -> Option<String> {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| cwd.file_name().map(|n| n.to_string_lossy().into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_workspace(root: &Path, hash: &str, folder_uri: &str, with_db: bool) {
        let dir = root.join(hash);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("workspace.json"),
            format!(r#"{{"folder":"{folder_uri}"}}"#),
        )
        .unwrap();
        if with_db {
            fs::write(dir.join("state.vscdb"), b"").unwrap();
        }
    }

    #[test]
    fn resolve_db_path_matches_workspace_by_folder_basename() {
        let root = tempdir().unwrap();
        make_workspace(root.path(), "abc123", "file:///home/user/my-project", true);
        make_workspace(root.path(), "def456", "file:///home/user/other-project", true);

        let resolved = resolve_db_path(root.path(), "my-project").unwrap();
        assert_eq!(resolved, root.path().join("abc123/state.vscdb"));
    }

    #[test]
    fn resolve_db_path_returns_none_when_no_workspace_matches() {
        let root = tempdir().unwrap();
        make_workspace(root.path(), "abc123", "file:///home/user/other-project", true);
        assert!(resolve_db_path(root.path(), "my-project").is_none());
    }

    #[test]
    fn resolve_db_path_skips_workspace_missing_the_db_file() {
        let root = tempdir().unwrap();
        make_workspace(root.path(), "abc123", "file:///home/user/my-project", false);
        assert!(resolve_db_path(root.path(), "my-project").is_none());
    }

    #[test]
    fn resolve_db_path_returns_none_for_missing_storage_root() {
        let root = tempdir().unwrap();
        let missing = root.path().join("does-not-exist");
        assert!(resolve_db_path(&missing, "my-project").is_none());
    }

    #[test]
    fn resolve_db_path_exact_match_does_not_leak_substring_matches() {
        // Scenario 5 (spec §8): three workspaces, one whose basename is a
        // substring of the configured project name. Only the exact match
        // may be returned.
        let root = tempdir().unwrap();
        make_workspace(
            root.path(),
            "exp",
            "file:///home/user/create-ai-chat-context-experimental",
            true,
        );
        make_workspace(root.path(), "base", "file:///home/user/create-ai-chat-context", true);
        make_workspace(root.path(), "other", "file:///home/user/other", true);

        let resolved =
            resolve_db_path(root.path(), "create-ai-chat-context-experimental").unwrap();
        assert_eq!(resolved, root.path().join("exp/state.vscdb"));
    }

    #[test]
    fn folder_basename_strips_file_scheme() {
        assert_eq!(
            folder_basename("file:///home/user/my-project"),
            Some("my-project".to_string())
        );
    }
}
