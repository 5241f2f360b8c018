//! Directory scanner for recording trees.
//!
//! Walks exactly three levels below the root (date, case, camera) and lists
//! matching files directly inside each camera directory. Every case yields
//! all eight cameras, so a camera with no directory still produces an entry
//! with no files.

use super::error::{Result, ScanError};
use super::layout::{DirLayout, NameError};
use chrono::NaiveDate;
use scalpel_db::{Camera, StatusKey, StatusKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Files found for one (date, case, camera).
#[derive(Debug, Clone, Serialize)]
pub struct CameraFiles {
    pub key: StatusKey,
    pub dir: PathBuf,
    /// Sizes in bytes of matching files, in directory order
    pub sizes: Vec<u64>,
    /// False when the camera directory is absent or unreadable
    pub present: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotADateDir,
    InvalidDate,
    NotACaseDir,
    DuplicateCase,
    UnknownCamera,
    NonUtf8Name,
    Unreadable(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotADateDir => f.write_str("not a DATA_YY-MM-DD directory"),
            Self::InvalidDate => f.write_str("not a calendar date"),
            Self::NotACaseDir => f.write_str("not a CaseN directory"),
            Self::DuplicateCase => f.write_str("case number already seen for this date"),
            Self::UnknownCamera => f.write_str("not a known camera"),
            Self::NonUtf8Name => f.write_str("name is not valid UTF-8"),
            Self::Unreadable(err) => write!(f, "unreadable: {}", err),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub root: PathBuf,
    pub extension: String,
    pub dates_scanned: usize,
    pub cases_scanned: usize,
    /// Ordered by date, case, then camera
    pub cameras: Vec<CameraFiles>,
    pub skipped: Vec<SkippedEntry>,
}

impl ScanReport {
    pub fn files_found(&self) -> usize {
        self.cameras.iter().map(|c| c.sizes.len()).sum()
    }
}

/// Scanner for one file extension.
#[derive(Debug, Clone)]
pub struct Scanner {
    layout: DirLayout,
    extension: String,
}

impl Scanner {
    /// `extension` is matched case-insensitively, without the dot.
    pub fn new(extension: &str) -> Result<Self> {
        Ok(Self {
            layout: DirLayout::new()?,
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
        })
    }

    pub fn for_kind(kind: StatusKind) -> Result<Self> {
        Self::new(kind.extension())
    }

    pub fn scan(&self, root: &Path) -> Result<ScanReport> {
        if !root.exists() {
            return Err(ScanError::RootNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::RootNotADirectory(root.to_path_buf()));
        }

        let mut report = ScanReport {
            root: root.to_path_buf(),
            extension: self.extension.clone(),
            dates_scanned: 0,
            cases_scanned: 0,
            cameras: Vec::new(),
            skipped: Vec::new(),
        };

        let entries = fs::read_dir(root).map_err(|source| ScanError::RootUnreadable {
            path: root.to_path_buf(),
            source,
        })?;

        let mut dates: BTreeMap<NaiveDate, PathBuf> = BTreeMap::new();
        for (path, name) in subdirectories(entries, root, &mut report.skipped) {
            match self.layout.parse_date_dir(&name) {
                Ok(date) => {
                    dates.insert(date, path);
                }
                Err(err) => {
                    let reason = match err {
                        NameError::Calendar => SkipReason::InvalidDate,
                        _ => SkipReason::NotADateDir,
                    };
                    skip(&mut report.skipped, path, reason);
                }
            }
        }

        for (date, date_path) in dates {
            report.dates_scanned += 1;
            self.scan_date(date, &date_path, &mut report);
        }

        info!(
            root = %root.display(),
            extension = %self.extension,
            dates = report.dates_scanned,
            cases = report.cases_scanned,
            files = report.files_found(),
            skipped = report.skipped.len(),
            "Scan complete"
        );
        Ok(report)
    }

    fn scan_date(&self, date: NaiveDate, date_path: &Path, report: &mut ScanReport) {
        let entries = match fs::read_dir(date_path) {
            Ok(entries) => entries,
            Err(err) => {
                skip(
                    &mut report.skipped,
                    date_path.to_path_buf(),
                    SkipReason::Unreadable(err.to_string()),
                );
                return;
            }
        };

        let mut cases: BTreeMap<u32, PathBuf> = BTreeMap::new();
        for (path, name) in subdirectories(entries, date_path, &mut report.skipped) {
            match self.layout.parse_case_dir(&name) {
                Ok(case_no) if cases.contains_key(&case_no) => {
                    skip(&mut report.skipped, path, SkipReason::DuplicateCase);
                }
                Ok(case_no) => {
                    cases.insert(case_no, path);
                }
                Err(_) => skip(&mut report.skipped, path, SkipReason::NotACaseDir),
            }
        }

        for (case_no, case_path) in cases {
            report.cases_scanned += 1;
            self.scan_case(date, case_no, &case_path, report);
        }
    }

    fn scan_case(&self, date: NaiveDate, case_no: u32, case_path: &Path, report: &mut ScanReport) {
        match fs::read_dir(case_path) {
            Ok(entries) => {
                for (path, name) in subdirectories(entries, case_path, &mut report.skipped) {
                    if Camera::parse(&name).is_none() {
                        skip(&mut report.skipped, path, SkipReason::UnknownCamera);
                    }
                }
            }
            Err(err) => {
                warn!(path = %case_path.display(), error = %err, "Cannot list case directory");
            }
        }

        for camera in Camera::ALL {
            let dir = case_path.join(camera.as_str());
            let (sizes, present) = self.list_camera_files(&dir);
            report.cameras.push(CameraFiles {
                key: StatusKey::new(date, case_no, camera),
                dir,
                sizes,
                present,
            });
        }
    }

    /// Sizes of matching regular files directly inside `dir`.
    fn list_camera_files(&self, dir: &Path) -> (Vec<u64>, bool) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %dir.display(), "Camera directory missing");
                return (Vec::new(), false);
            }
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "Camera directory unreadable");
                return (Vec::new(), false);
            }
        };

        let mut sizes = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "Skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            if !self.matches_extension(&path) {
                continue;
            }
            // fs::metadata follows symlinks
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => sizes.push(meta.len()),
                Ok(_) => debug!(path = %path.display(), "Ignoring non-file entry"),
                Err(err) => warn!(path = %path.display(), error = %err, "Cannot stat file"),
            }
        }
        (sizes, true)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}

/// Convenience wrapper: scan `root` for the files of one status kind.
pub fn scan_tree(root: &Path, kind: StatusKind) -> Result<ScanReport> {
    Scanner::for_kind(kind)?.scan(root)
}

/// Directory children with UTF-8 names. Files are ignored at debug level;
/// unreadable entries and non-UTF-8 names are recorded as skipped.
fn subdirectories(
    entries: fs::ReadDir,
    parent: &Path,
    skipped: &mut Vec<SkippedEntry>,
) -> Vec<(PathBuf, String)> {
    let mut out = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                skip(skipped, parent.to_path_buf(), SkipReason::Unreadable(err.to_string()));
                continue;
            }
        };
        let path = entry.path();
        if !path.is_dir() {
            debug!(path = %path.display(), "Ignoring non-directory entry");
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => out.push((path, name)),
            Err(_) => skip(skipped, path, SkipReason::NonUtf8Name),
        }
    }
    out.sort();
    out
}

fn skip(skipped: &mut Vec<SkippedEntry>, path: PathBuf, reason: SkipReason) {
    warn!(path = %path.display(), reason = %reason, "Skipping entry");
    skipped.push(SkippedEntry { path, reason });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(path: &Path, len: u64) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = fs::File::create(path).unwrap();
        file.set_len(len).unwrap();
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = scan_tree(&tmp.path().join("nope"), StatusKind::Mp4).unwrap_err();
        assert!(matches!(err, ScanError::RootNotFound(_)));

        let file = tmp.path().join("file.txt");
        write_file(&file, 1);
        let err = scan_tree(&file, StatusKind::Mp4).unwrap_err();
        assert!(matches!(err, ScanError::RootNotADirectory(_)));
    }

    #[test]
    fn test_every_case_yields_all_cameras() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write_file(&root.join("DATA_24-01-15/Case1/Monitor/a.mp4"), 10);
        fs::create_dir_all(root.join("DATA_24-01-15/Case2")).unwrap();

        let report = scan_tree(root, StatusKind::Mp4).unwrap();
        assert_eq!(report.dates_scanned, 1);
        assert_eq!(report.cases_scanned, 2);
        assert_eq!(report.cameras.len(), 16);
        assert!(report.skipped.is_empty());

        let monitor = report
            .cameras
            .iter()
            .find(|c| c.key.case_no == 1 && c.key.camera == Camera::Monitor)
            .unwrap();
        assert_eq!(monitor.sizes, vec![10]);
        assert!(monitor.present);
        assert!(report
            .cameras
            .iter()
            .filter(|c| c.key.case_no == 2)
            .all(|c| c.sizes.is_empty() && !c.present));
    }

    #[test]
    fn test_only_direct_files_with_matching_extension_count() {
        let tmp = TempDir::new().unwrap();
        let cam = tmp.path().join("DATA_24-01-15/Case1/General_3");
        write_file(&cam.join("a.MP4"), 5);
        write_file(&cam.join("b.mp4"), 7);
        write_file(&cam.join("c.avi"), 100);
        write_file(&cam.join("notes.txt"), 100);
        write_file(&cam.join("nested/d.mp4"), 100);

        let report = scan_tree(tmp.path(), StatusKind::Mp4).unwrap();
        let general = report
            .cameras
            .iter()
            .find(|c| c.key.camera == Camera::General3)
            .unwrap();
        let mut sizes = general.sizes.clone();
        sizes.sort();
        assert_eq!(sizes, vec![5, 7]);
    }

    #[test]
    fn test_malformed_names_are_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write_file(&root.join("DATA_24-01-15/Case1/Monitor/a.seq"), 1);
        fs::create_dir_all(root.join("misc")).unwrap();
        fs::create_dir_all(root.join("DATA_23-02-30/Case1")).unwrap();
        fs::create_dir_all(root.join("DATA_24-01-15/Backup")).unwrap();
        fs::create_dir_all(root.join("DATA_24-01-15/Case1/Front_Door")).unwrap();
        write_file(&root.join("readme.txt"), 1);

        let report = scan_tree(root, StatusKind::Seq).unwrap();
        assert_eq!(report.cameras.len(), 8);

        let reasons: Vec<(String, SkipReason)> = report
            .skipped
            .iter()
            .map(|s| {
                (
                    s.path.file_name().unwrap().to_string_lossy().into_owned(),
                    s.reason.clone(),
                )
            })
            .collect();
        assert!(reasons.contains(&("misc".to_string(), SkipReason::NotADateDir)));
        assert!(reasons.contains(&("DATA_23-02-30".to_string(), SkipReason::InvalidDate)));
        assert!(reasons.contains(&("Backup".to_string(), SkipReason::NotACaseDir)));
        assert!(reasons.contains(&("Front_Door".to_string(), SkipReason::UnknownCamera)));
        assert_eq!(reasons.len(), 4);
    }

    #[test]
    fn test_duplicate_case_numbers_are_skipped() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("DATA_24-01-15/Case1")).unwrap();
        fs::create_dir_all(tmp.path().join("DATA_24-01-15/Case01")).unwrap();

        let report = scan_tree(tmp.path(), StatusKind::Mp4).unwrap();
        assert_eq!(report.cases_scanned, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, SkipReason::DuplicateCase);
    }

    #[test]
    fn test_results_are_ordered() {
        let tmp = TempDir::new().unwrap();
        for dir in ["DATA_24-02-01/Case10", "DATA_24-02-01/Case2", "DATA_23-12-31/Case1"] {
            fs::create_dir_all(tmp.path().join(dir)).unwrap();
        }

        let report = scan_tree(tmp.path(), StatusKind::Mp4).unwrap();
        let keys: Vec<StatusKey> = report.cameras.iter().map(|c| c.key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(keys[0].recording_date, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(keys[8].case_no, 2);
        assert_eq!(keys[16].case_no, 10);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_are_skipped_at_any_level() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write_file(&root.join("DATA_24-01-15/Case1/Monitor/a.mp4"), 10);
        let bad = OsStr::from_bytes(b"Case\xff");
        fs::create_dir_all(root.join("DATA_24-01-15").join(bad)).unwrap();
        let bad_camera = OsStr::from_bytes(b"Mon\xfe");
        fs::create_dir_all(root.join("DATA_24-01-15/Case1").join(bad_camera)).unwrap();

        let report = scan_tree(root, StatusKind::Mp4).unwrap();
        assert_eq!(report.cases_scanned, 1);
        let reasons: Vec<&SkipReason> = report.skipped.iter().map(|s| &s.reason).collect();
        assert_eq!(reasons, vec![&SkipReason::NonUtf8Name, &SkipReason::NonUtf8Name]);
    }
}
