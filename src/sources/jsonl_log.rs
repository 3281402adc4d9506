//! Reader for the CLI agent's line-delimited transcript logs.
//!
//! Grounded on the teacher's `hook_helpers.rs` transcript scanning
//! (`scan_transcript_usage`, `check_transcript_format`): line-by-line JSON
//! parsing with a per-file byte offset, generalized from a fixed tail read
//! to a full read since every message (not just the latest tool call)
//! matters here. The directory walk is a small recursive helper rather than
//! a `walkdir` dependency, since the teacher doesn't carry one and the tree
//! depth here is shallow (one level of session files per project).

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::cursor::{Cursor, FileOffset, JsonlLogCursor};
use crate::error::Result;
use crate::model::SourceTag;
use crate::sources::{RawRecord, SourceReader};

fn collect_jsonl_files(root: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if !root.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_jsonl_files(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
            out.push(path);
        }
    }
    Ok(())
}

pub struct JsonlLogReader {
    root: PathBuf,
}

impl JsonlLogReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonlLogReader { root: root.into() }
    }

    fn relative_key(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

impl SourceReader for JsonlLogReader {
    fn source_tag(&self) -> SourceTag {
        SourceTag::JsonlCli
    }

    fn read_since(&self, cursor: &Cursor) -> Result<(Vec<RawRecord>, Cursor)> {
        let mut offsets = match cursor {
            Cursor::JsonlLog(c) => c.offsets.clone(),
            _ => BTreeMap::new(),
        };

        let mut files = Vec::new();
        collect_jsonl_files(&self.root, &mut files)?;
        files.sort();

        let mut records = Vec::new();

        for path in &files {
            let key = self.relative_key(path);
            let metadata = fs::metadata(path)?;
            let file_len = metadata.len();

            let prior = offsets.get(&key).cloned().unwrap_or_default();
            let mut start = prior.byte_offset;
            if file_len < start {
                tracing::warn!(file = %key, "jsonl log shorter than recorded offset, treating as rotated");
                start = 0;
            }

            let mut file = File::open(path)?;
            file.seek(SeekFrom::Start(start))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;

            let mut consumed = 0u64;
            let mut reader = BufReader::new(buf.as_slice());
            let mut line = String::new();
            loop {
                line.clear();
                let bytes_read = reader.read_line(&mut line)?;
                if bytes_read == 0 {
                    break;
                }
                if !line.ends_with('\n') {
                    // trailing partial line: do not consume, wait for more data
                    break;
                }
                consumed += bytes_read as u64;
                let trimmed = line.trim_end_matches(['\n', '\r']);
                if trimmed.is_empty() {
                    continue;
                }
                records.push(RawRecord {
                    record_id: format!("{key}:{}", start + consumed - bytes_read as u64),
                    payload: trimmed.as_bytes().to_vec(),
                });
            }

            let pending_bytes = buf.len() as u64 - consumed;
            offsets.insert(
                key,
                FileOffset {
                    byte_offset: start + consumed,
                    pending_bytes,
                },
            );
        }

        let new_cursor = Cursor::JsonlLog(JsonlLogCursor { offsets });
        Ok((records, new_cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(path: &Path, content: &str) {
        let mut f = File::create(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn read_since_picks_up_new_complete_lines() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("session-1.jsonl");
        write_file(&log, "{\"a\":1}\n{\"a\":2}\n");

        let reader = JsonlLogReader::new(dir.path());
        let (records, cursor) = reader
            .read_since(&Cursor::JsonlLog(JsonlLogCursor::default()))
            .unwrap();

        assert_eq!(records.len(), 2);
        match cursor {
            Cursor::JsonlLog(c) => {
                let offset = c.offsets.get("session-1.jsonl").unwrap();
                assert_eq!(offset.byte_offset, 16);
                assert_eq!(offset.pending_bytes, 0);
            }
            _ => panic!("wrong cursor variant"),
        }
    }

    #[test]
    fn read_since_holds_back_partial_trailing_line() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("session-1.jsonl");
        write_file(&log, "{\"a\":1}\n{\"a\":2");

        let reader = JsonlLogReader::new(dir.path());
        let (records, cursor) = reader
            .read_since(&Cursor::JsonlLog(JsonlLogCursor::default()))
            .unwrap();

        assert_eq!(records.len(), 1);
        match cursor {
            Cursor::JsonlLog(c) => {
                let offset = c.offsets.get("session-1.jsonl").unwrap();
                assert_eq!(offset.byte_offset, 8);
                assert_eq!(offset.pending_bytes, 6);
            }
            _ => panic!("wrong cursor variant"),
        }
    }

    #[test]
    fn read_since_resumes_from_prior_offset() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("session-1.jsonl");
        write_file(&log, "{\"a\":1}\n");

        let reader = JsonlLogReader::new(dir.path());
        let (_, cursor_after_first) = reader
            .read_since(&Cursor::JsonlLog(JsonlLogCursor::default()))
            .unwrap();

        write_file(&log, "{\"a\":1}\n{\"a\":2}\n");
        let (records, _) = reader.read_since(&cursor_after_first).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn read_since_walks_nested_project_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("project-a").join("sub");
        fs::create_dir_all(&nested).unwrap();
        write_file(&nested.join("s1.jsonl"), "{\"a\":1}\n");

        let reader = JsonlLogReader::new(dir.path());
        let (records, _) = reader
            .read_since(&Cursor::JsonlLog(JsonlLogCursor::default()))
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn read_since_resets_offset_on_truncated_file() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("session-1.jsonl");
        write_file(&log, "{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n");

        let reader = JsonlLogReader::new(dir.path());
        let (_, cursor_after_first) = reader
            .read_since(&Cursor::JsonlLog(JsonlLogCursor::default()))
            .unwrap();

        write_file(&log, "{\"a\":9}\n");
        let (records, _) = reader.read_since(&cursor_after_first).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn read_since_empty_directory_yields_no_records() {
        let dir = tempdir().unwrap();
        let reader = JsonlLogReader::new(dir.path());
        let (records, _) = reader
            .read_since(&Cursor::JsonlLog(JsonlLogCursor::default()))
            .unwrap();
        assert!(records.is_empty());
    }
}
