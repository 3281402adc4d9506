//! Reader for manually exported JSON conversation dumps.
//!
//! Grounded on the teacher's ledger file-identity approach (`ledger::
//! rotate_and_cleanup` distinguishes rotated files by name) generalized
//! here to content-addressed identity: each export file is fingerprinted
//! with the same SHA-256 primitive `model::ContentHash` uses, and a file
//! whose fingerprint has already been imported is skipped even if it was
//! renamed or moved (spec §4.1 "JSON export reader").

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::cursor::{Cursor, JsonExportCursor};
use crate::error::{CoreError, Result};
use crate::model::SourceTag;
use crate::sources::{RawRecord, SourceReader};

pub const DEFAULT_MAX_EXPORT_BYTES: u64 = 64 * 1024 * 1024;

fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn collect_export_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !root.exists() {
        return Ok(out);
    }
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

pub struct JsonExportReader {
    root: PathBuf,
    max_export_bytes: u64,
}

impl JsonExportReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonExportReader {
            root: root.into(),
            max_export_bytes: DEFAULT_MAX_EXPORT_BYTES,
        }
    }

    pub fn with_max_export_bytes(mut self, max_export_bytes: u64) -> Self {
        self.max_export_bytes = max_export_bytes;
        self
    }
}

impl SourceReader for JsonExportReader {
    fn source_tag(&self) -> SourceTag {
        SourceTag::JsonExport
    }

    fn read_since(&self, cursor: &Cursor) -> Result<(Vec<RawRecord>, Cursor)> {
        let mut imported = match cursor {
            Cursor::JsonExport(c) => c.imported_fingerprints.clone(),
            _ => Default::default(),
        };

        let files = collect_export_files(&self.root)?;
        let mut records = Vec::new();

        for path in files {
            let metadata = fs::metadata(&path)?;
            if metadata.len() > self.max_export_bytes {
                return Err(CoreError::SourceUnavailable(format!(
                    "export file {} exceeds max_export_bytes ({} > {})",
                    path.display(),
                    metadata.len(),
                    self.max_export_bytes
                )));
            }

            let bytes = fs::read(&path)?;
            let fp = fingerprint(&bytes);
            if imported.contains(&fp) {
                continue;
            }

            records.push(RawRecord {
                record_id: fp.clone(),
                payload: bytes,
            });
            imported.insert(fp);
        }

        let new_cursor = Cursor::JsonExport(JsonExportCursor {
            imported_fingerprints: imported,
        });
        Ok((records, new_cursor))
    }
}
