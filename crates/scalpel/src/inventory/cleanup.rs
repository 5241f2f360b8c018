//! Pre-scan removal of aborted exports.
//!
//! A failed or cancelled export leaves a stub of a few MB in the camera
//! folder, which would make the camera look Incomplete instead of Missing.
//! Every file of the tree's extension below `below_mb` anywhere under the
//! root is a candidate; candidates are deleted only when applying.

use super::classify::BYTES_PER_MB;
use super::error::{Result, ScanError};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize)]
pub struct SmallFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SmallFileReport {
    pub root: PathBuf,
    pub below_mb: u64,
    pub applied: bool,
    pub candidates: Vec<SmallFile>,
    pub removed: Vec<PathBuf>,
    /// Files that could not be deleted, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

impl SmallFileReport {
    pub fn candidate_bytes(&self) -> u64 {
        self.candidates.iter().map(|f| f.size_bytes).sum()
    }
}

/// Find `*.<extension>` files under `root` smaller than `below_mb` and, with
/// `apply`, delete them.
pub fn remove_small_files(
    root: &Path,
    extension: &str,
    below_mb: u64,
    apply: bool,
) -> Result<SmallFileReport> {
    if !root.exists() {
        return Err(ScanError::RootNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ScanError::RootNotADirectory(root.to_path_buf()));
    }

    let below_bytes = below_mb.saturating_mul(BYTES_PER_MB);
    let mut candidates = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!(error = %err, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if !matches_ext {
            continue;
        }
        let size_bytes = match entry.metadata() {
            Ok(m) => m.len(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Cannot stat file");
                continue;
            }
        };
        if size_bytes < below_bytes {
            candidates.push(SmallFile {
                path: path.to_path_buf(),
                size_bytes,
            });
        }
    }

    let mut report = SmallFileReport {
        root: root.to_path_buf(),
        below_mb,
        applied: apply,
        candidates,
        ..SmallFileReport::default()
    };

    if apply {
        for file in &report.candidates {
            match fs::remove_file(&file.path) {
                Ok(()) => {
                    debug!(path = %file.path.display(), size = file.size_bytes, "Removed small file");
                    report.removed.push(file.path.clone());
                }
                Err(err) => {
                    warn!(path = %file.path.display(), error = %err, "Could not delete small file");
                    report.failed.push((file.path.clone(), err.to_string()));
                }
            }
        }
    }

    info!(
        root = %root.display(),
        below_mb,
        candidates = report.candidates.len(),
        removed = report.removed.len(),
        failed = report.failed.len(),
        apply,
        "Small file sweep finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn sized(path: &Path, bytes: u64) -> PathBuf {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap().set_len(bytes).unwrap();
        path.to_path_buf()
    }

    #[test]
    fn test_reports_without_deleting() {
        let tmp = TempDir::new().unwrap();
        let camera = tmp.path().join("DATA_24-01-15/Case1/Monitor");
        let stub = sized(&camera.join("Monitor_1.mp4"), 3_000_000);
        let full = sized(&camera.join("Monitor.mp4"), 250_000_000);

        let report = remove_small_files(tmp.path(), "mp4", 10, false).unwrap();
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].path, stub);
        assert_eq!(report.candidate_bytes(), 3_000_000);
        assert!(report.removed.is_empty());
        assert!(stub.exists());
        assert!(full.exists());
    }

    #[test]
    fn test_apply_deletes_only_small_files_of_the_extension() {
        let tmp = TempDir::new().unwrap();
        let camera = tmp.path().join("DATA_24-01-15/Case2/General_3");
        let stub = sized(&camera.join("General_3.MP4"), 9_999_999);
        let at_limit = sized(&camera.join("General_3_2.mp4"), 10_000_000);
        let seq = sized(&camera.join("General_3.seq"), 100);
        let nested = sized(&camera.join("export/part.mp4"), 0);

        let report = remove_small_files(tmp.path(), "mp4", 10, true).unwrap();
        assert_eq!(report.removed.len(), 2);
        assert!(report.failed.is_empty());
        assert!(!stub.exists());
        assert!(!nested.exists());
        assert!(at_limit.exists());
        assert!(seq.exists());
    }

    #[test]
    fn test_missing_root() {
        let tmp = TempDir::new().unwrap();
        let err = remove_small_files(&tmp.path().join("gone"), "mp4", 10, true).unwrap_err();
        assert!(matches!(err, ScanError::RootNotFound(_)));
    }
}
