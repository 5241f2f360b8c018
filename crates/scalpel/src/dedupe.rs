//! Duplicate export cleanup.
//!
//! Re-exporting a camera often leaves `General_3.mp4` next to
//! `General_3 (1).mp4` or `General_3_2.mp4`. Files are grouped by
//! (directory, camera base name, extension); one file per group is kept and
//! the rest are reported, or deleted when applying.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::inventory::BYTES_PER_MB;

/// Exported camera names that get duplicated.
pub const BASE_NAMES: [&str; 4] = ["Cart_Center_2", "Cart_LT_4", "Cart_RT_1", "General_3"];
/// What may follow the base name in a duplicate's stem.
pub const SEPARATORS: [char; 4] = ['_', ' ', '-', '('];
pub const EXTENSIONS: [&str; 2] = ["mp4", "avi"];
pub const DEFAULT_MIN_VALID_MB: u64 = 1;

#[derive(Error, Debug)]
pub enum DedupeError {
    #[error("Root path not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Root path is not a directory: {0}")]
    RootNotADirectory(PathBuf),
}

#[derive(Debug, Clone, Copy)]
pub struct DedupeOptions {
    /// Delete the duplicates instead of only reporting them
    pub apply: bool,
    /// Files smaller than this are never preferred as the keeper
    pub min_valid_mb: u64,
}

impl Default for DedupeOptions {
    fn default() -> Self {
        Self {
            apply: false,
            min_valid_mb: DEFAULT_MIN_VALID_MB,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    #[serde(skip)]
    pub modified: Option<SystemTime>,
    pub canonical: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub dir: PathBuf,
    pub base: &'static str,
    pub extension: String,
    pub keep: ExportFile,
    pub remove: Vec<ExportFile>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupeReport {
    pub root: PathBuf,
    pub files_seen: usize,
    pub groups: Vec<DuplicateGroup>,
    pub applied: bool,
    pub removed: Vec<PathBuf>,
    /// Files that could not be deleted, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

impl DedupeReport {
    pub fn duplicate_count(&self) -> usize {
        self.groups.iter().map(|g| g.remove.len()).sum()
    }

    pub fn reclaimable_bytes(&self) -> u64 {
        self.groups
            .iter()
            .flat_map(|g| g.remove.iter())
            .map(|f| f.size_bytes)
            .sum()
    }
}

/// Base name whose duplicate pattern `stem` matches.
pub fn match_base(stem: &str) -> Option<&'static str> {
    BASE_NAMES.into_iter().find(|base| {
        stem == *base
            || stem
                .strip_prefix(base)
                .and_then(|rest| rest.chars().next())
                .is_some_and(|c| SEPARATORS.contains(&c))
    })
}

/// Find duplicate exports under `root` and, with `apply`, delete them.
pub fn dedupe_exports(root: &Path, options: &DedupeOptions) -> Result<DedupeReport, DedupeError> {
    if !root.exists() {
        return Err(DedupeError::RootNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(DedupeError::RootNotADirectory(root.to_path_buf()));
    }

    let mut grouped: BTreeMap<(PathBuf, &'static str, String), Vec<ExportFile>> = BTreeMap::new();
    let mut files_seen = 0;

    for entry in WalkDir::new(root).follow_links(false) {
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
        let Some(ext) = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|e| EXTENSIONS.contains(&e.as_str()))
        else {
            continue;
        };
        let Some(base) = path.file_stem().and_then(|s| s.to_str()).and_then(match_base) else {
            continue;
        };
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Cannot stat file");
                continue;
            }
        };

        files_seen += 1;
        let canonical = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case(&format!("{}.{}", base, ext)));
        let dir = path.parent().unwrap_or(root).to_path_buf();
        grouped.entry((dir, base, ext)).or_default().push(ExportFile {
            path: path.to_path_buf(),
            size_bytes: meta.len(),
            modified: meta.modified().ok(),
            canonical,
        });
    }

    let min_valid_bytes = options.min_valid_mb.saturating_mul(BYTES_PER_MB);
    let groups: Vec<DuplicateGroup> = grouped
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .filter_map(|((dir, base, extension), files)| {
            let (keep, remove) = choose_keeper(files, min_valid_bytes)?;
            Some(DuplicateGroup {
                dir,
                base,
                extension,
                keep,
                remove,
            })
        })
        .collect();

    let mut report = DedupeReport {
        root: root.to_path_buf(),
        files_seen,
        groups,
        applied: options.apply,
        ..DedupeReport::default()
    };
    info!(
        root = %root.display(),
        files = files_seen,
        groups = report.groups.len(),
        duplicates = report.duplicate_count(),
        apply = options.apply,
        "Duplicate scan finished"
    );

    if options.apply {
        let targets: Vec<PathBuf> = report
            .groups
            .iter()
            .flat_map(|g| g.remove.iter().map(|f| f.path.clone()))
            .collect();
        for path in targets {
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed duplicate");
                    report.removed.push(path);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Could not delete duplicate");
                    report.failed.push((path, err.to_string()));
                }
            }
        }
    }

    Ok(report)
}

/// Keep the canonical `<base>.<ext>` file when it is big enough, otherwise
/// the largest file, then the newest.
fn choose_keeper(
    mut files: Vec<ExportFile>,
    min_valid_bytes: u64,
) -> Option<(ExportFile, Vec<ExportFile>)> {
    let canonical = files
        .iter()
        .position(|f| f.canonical && f.size_bytes >= min_valid_bytes);
    let idx = match canonical {
        Some(idx) => idx,
        None => {
            files
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| {
                    (a.size_bytes, a.modified).cmp(&(b.size_bytes, b.modified))
                })?
                .0
        }
    };
    let keep = files.remove(idx);
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Some((keep, files))
}
