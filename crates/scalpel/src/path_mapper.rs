//! Query/path mapper.
//!
//! Turns rows from a read-only query (or from a [`StatusQuery`]) into
//! directories of the recording tree:
//! `<root>/DATA_YY-MM-DD/CaseN[/<camera_name>]`.
//!
//! Column checks happen before any path is built. The database is never
//! written: raw SQL goes through [`scalpel_db::sql_guard`] and runs on a
//! handle opened with [`ScalpelDb::open_read_only`].

use crate::inventory::layout::case_dir;
use chrono::NaiveDate;
use scalpel_db::{
    parse_sql_date, DbError, ScalpelDb, StatusQuery, StatusRow, TableRows,
};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DATE_COLUMN: &str = "recording_date";
pub const CASE_COLUMN: &str = "case_no";
pub const CAMERA_COLUMN: &str = "camera_name";
pub const STATUS_COLUMN: &str = "value";

#[derive(Error, Debug)]
pub enum MapError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Path queries must run on a read-only database handle")]
    NotReadOnly,

    #[error("Query must select {}; it returned columns: {}", .missing.join(", "), .found.join(", "))]
    MissingColumns {
        missing: Vec<&'static str>,
        found: Vec<String>,
    },

    #[error("Filtering by status needs a `value` column in the query result")]
    StatusColumnRequired,

    #[error("Row {row}: recording_date {value} is not YYYY-MM-DD")]
    BadDate { row: usize, value: String },

    #[error("Row {row}: case_no {value} is not a positive integer")]
    BadCase { row: usize, value: String },

    #[error("Row {row}: camera_name {value} is not a plain directory name")]
    BadCamera { row: usize, value: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Path resolution task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// How rows are filtered and resolved.
#[derive(Debug, Clone)]
pub struct MapOptions {
    pub root: PathBuf,
    /// Extension of listed files, without the dot
    pub extension: String,
    /// Keep only rows whose `value` equals this
    pub status: Option<i64>,
    /// Keep only rows whose camera is one of these (empty keeps all)
    pub only_cameras: Vec<String>,
    /// List matching files under each directory
    pub list_files: bool,
    /// Keep only the largest file per directory (implies `list_files`)
    pub largest_only: bool,
}

impl MapOptions {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            status: None,
            only_cameras: Vec::new(),
            list_files: false,
            largest_only: false,
        }
    }

    fn wants_files(&self) -> bool {
        self.list_files || self.largest_only
    }

    fn camera_allowed(&self, camera: Option<&str>) -> bool {
        if self.only_cameras.is_empty() {
            return true;
        }
        camera.is_some_and(|c| self.only_cameras.iter().any(|o| o == c))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// One resolved directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappedPath {
    pub recording_date: NaiveDate,
    pub case_no: u32,
    pub camera: Option<String>,
    pub status: Option<i64>,
    pub path: PathBuf,
    pub exists: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<MappedFile>,
}

/// Run a read-only SQL query and resolve every returned row.
pub async fn map_sql(
    db: &ScalpelDb,
    sql: &str,
    options: &MapOptions,
) -> Result<Vec<MappedPath>, MapError> {
    if !db.is_read_only() {
        return Err(MapError::NotReadOnly);
    }
    let rows = db.query_rows(sql).await?;
    // Fail on the shape of the result before touching the filesystem.
    check_columns(&rows, options)?;
    debug!(rows = rows.rows.len(), "Query returned");

    let options = options.clone();
    let mapped = tokio::task::spawn_blocking(move || resolve_rows(&rows, &options)).await??;
    info!(paths = mapped.len(), "Resolved query rows");
    Ok(mapped)
}

/// Resolve rows selected by a [`StatusQuery`] on `table`.
pub async fn map_status_query(
    db: &ScalpelDb,
    table: &str,
    query: &StatusQuery,
    options: &MapOptions,
) -> Result<Vec<MappedPath>, MapError> {
    let rows = db.query_status(table, query).await?;
    let options = options.clone();
    let mapped =
        tokio::task::spawn_blocking(move || resolve_status_rows(&rows, &options)).await?;
    info!(table, paths = mapped.len(), "Resolved status rows");
    Ok(mapped)
}

/// Check that `rows` carries the columns the mapper needs.
pub fn check_columns(rows: &TableRows, options: &MapOptions) -> Result<(), MapError> {
    let missing: Vec<&'static str> = [DATE_COLUMN, CASE_COLUMN]
        .into_iter()
        .filter(|c| rows.column_index(c).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(MapError::MissingColumns {
            missing,
            found: rows.columns.clone(),
        });
    }
    if options.status.is_some() && rows.column_index(STATUS_COLUMN).is_none() {
        return Err(MapError::StatusColumnRequired);
    }
    Ok(())
}

/// Filter and resolve generic query rows.
pub fn resolve_rows(rows: &TableRows, options: &MapOptions) -> Result<Vec<MappedPath>, MapError> {
    check_columns(rows, options)?;
    let date_idx = rows.column_index(DATE_COLUMN);
    let case_idx = rows.column_index(CASE_COLUMN);
    let camera_idx = rows.column_index(CAMERA_COLUMN);
    let status_idx = rows.column_index(STATUS_COLUMN);

    let mut out = Vec::new();
    for (i, row) in rows.rows.iter().enumerate() {
        let row_no = i + 1;
        let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i)).unwrap_or(&Value::Null);

        let recording_date = parse_date_cell(row_no, cell(date_idx))?;
        let case_no = parse_case_cell(row_no, cell(case_idx))?;
        let camera = parse_camera_cell(row_no, cell(camera_idx))?;
        let status = as_integer(cell(status_idx));

        if options.status.is_some() && status != options.status {
            continue;
        }
        if !options.camera_allowed(camera.as_deref()) {
            continue;
        }
        out.push(resolve(recording_date, case_no, camera, status, options));
    }
    Ok(out)
}

/// Filter and resolve typed status rows.
pub fn resolve_status_rows(rows: &[StatusRow], options: &MapOptions) -> Vec<MappedPath> {
    rows.iter()
        .filter(|r| options.status.map_or(true, |s| s == r.status.code()))
        .filter(|r| options.camera_allowed(Some(r.key.camera.as_str())))
        .map(|r| {
            resolve(
                r.key.recording_date,
                r.key.case_no,
                Some(r.key.camera.as_str().to_string()),
                Some(r.status.code()),
                options,
            )
        })
        .collect()
}

fn resolve(
    recording_date: NaiveDate,
    case_no: u32,
    camera: Option<String>,
    status: Option<i64>,
    options: &MapOptions,
) -> MappedPath {
    let mut path = case_dir(&options.root, recording_date, case_no);
    if let Some(camera) = &camera {
        path.push(camera);
    }
    let exists = path.is_dir();

    let mut files = if options.wants_files() && exists {
        list_files(&path, &options.extension)
    } else {
        Vec::new()
    };
    if options.largest_only {
        files = largest(files).into_iter().collect();
    }

    MappedPath {
        recording_date,
        case_no,
        camera,
        status,
        path,
        exists,
        files,
    }
}

/// Files with `extension` directly under `dir`, sorted by path.
pub fn list_files(dir: &Path, extension: &str) -> Vec<MappedFile> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "Cannot list directory");
            return Vec::new();
        }
    };

    let mut files: Vec<MappedFile> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        })
        .filter_map(|path| match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Some(MappedFile {
                path,
                size_bytes: meta.len(),
            }),
            Ok(_) => None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Cannot stat file");
                None
            }
        })
        .collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

/// Largest file; the first by path wins a tie.
fn largest(files: Vec<MappedFile>) -> Option<MappedFile> {
    files.into_iter().fold(None, |best, f| match best {
        Some(b) if b.size_bytes >= f.size_bytes => Some(b),
        _ => Some(f),
    })
}

fn parse_date_cell(row: usize, value: &Value) -> Result<NaiveDate, MapError> {
    let bad = || MapError::BadDate {
        row,
        value: value.to_string(),
    };
    let text = value.as_str().ok_or_else(bad)?;
    parse_sql_date(text).map_err(|_| bad())
}

fn parse_case_cell(row: usize, value: &Value) -> Result<u32, MapError> {
    as_integer(value)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|&n| n > 0)
        .ok_or_else(|| MapError::BadCase {
            row,
            value: value.to_string(),
        })
}

fn parse_camera_cell(row: usize, value: &Value) -> Result<Option<String>, MapError> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::String(s) => s.trim(),
        other => {
            return Err(MapError::BadCamera {
                row,
                value: other.to_string(),
            })
        }
    };
    let mut components = Path::new(text).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(Some(text.to_string())),
        _ => Err(MapError::BadCamera {
            row,
            value: value.to_string(),
        }),
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    recording_date: String,
    case_no: u32,
    camera: &'a str,
    status: Option<i64>,
    path: String,
    exists: bool,
    size_bytes: Option<u64>,
}

/// Write mapped paths as CSV, one line per listed file (or per directory
/// when no files were listed).
pub fn write_csv<W: io::Write>(writer: W, mapped: &[MappedPath]) -> Result<(), MapError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for m in mapped {
        let base = |path: &Path, size_bytes: Option<u64>| CsvRow {
            recording_date: scalpel_db::date_to_sql(m.recording_date),
            case_no: m.case_no,
            camera: m.camera.as_deref().unwrap_or(""),
            status: m.status,
            path: path.display().to_string(),
            exists: m.exists,
            size_bytes,
        };
        if m.files.is_empty() {
            wtr.serialize(base(&m.path, None))?;
        } else {
            for f in &m.files {
                wtr.serialize(base(&f.path, Some(f.size_bytes)))?;
            }
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Write CSV to `path`, creating parent directories.
pub fn save_csv(path: &Path, mapped: &[MappedPath]) -> Result<(), MapError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = fs::File::create(path)?;
    write_csv(io::BufWriter::new(file), mapped)?;
    info!(path = %path.display(), rows = mapped.len(), "Saved CSV");
    Ok(())
}
