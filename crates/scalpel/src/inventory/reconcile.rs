//! Scanner -> classifier -> writer for one recording tree.

use super::classify::{classify, threshold_bytes};
use super::cleanup::{remove_small_files, SmallFileReport};
use super::error::ReconcileError;
use super::scanner::{ScanReport, Scanner, SkippedEntry};
use scalpel_db::{diff_status, ScalpelDb, StatusDiff, StatusKind, StatusRecord, WriteSummary};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub kind: StatusKind,
    pub root: PathBuf,
    pub table: String,
    pub threshold_mb: u64,
    /// Compute the diff without writing
    pub dry_run: bool,
    /// Delete files below this many MB before scanning. Listed, not deleted,
    /// on a dry run.
    pub delete_small_mb: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub kind: StatusKind,
    pub table: String,
    pub root: PathBuf,
    pub dates_scanned: usize,
    pub cases_scanned: usize,
    pub files_found: usize,
    pub skipped: Vec<SkippedEntry>,
    pub records: Vec<StatusRecord>,
    pub dry_run: bool,
    /// Present when a small-file sweep was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<SmallFileReport>,
    /// Present after a dry run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<StatusDiff>,
    /// Present after a committed write
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written: Option<WriteSummary>,
}

/// One status record per scanned camera.
pub fn classify_report(report: &ScanReport, threshold_mb: u64) -> Vec<StatusRecord> {
    let threshold = threshold_bytes(threshold_mb);
    report
        .cameras
        .iter()
        .map(|camera| {
            let c = classify(&camera.sizes, threshold);
            StatusRecord {
                key: camera.key,
                status: c.status,
                size_mb: c.size_mb,
                comments: None,
            }
        })
        .collect()
}

/// Run the requested small-file sweep on a blocking thread. Never deletes on
/// a dry run.
pub async fn sweep_small_files(
    options: &ReconcileOptions,
) -> Result<Option<SmallFileReport>, ReconcileError> {
    let Some(below_mb) = options.delete_small_mb else {
        return Ok(None);
    };
    let root = options.root.clone();
    let extension = options.kind.extension();
    let apply = !options.dry_run;
    let report =
        tokio::task::spawn_blocking(move || remove_small_files(&root, extension, below_mb, apply))
            .await??;
    Ok(Some(report))
}

/// Scan `options.root` on a blocking thread and classify every camera.
pub async fn scan_and_classify(
    options: &ReconcileOptions,
) -> Result<(ScanReport, Vec<StatusRecord>), ReconcileError> {
    let scanner = Scanner::for_kind(options.kind)?;
    let root = options.root.clone();
    let report = tokio::task::spawn_blocking(move || scanner.scan(&root)).await??;
    let records = classify_report(&report, options.threshold_mb);
    Ok((report, records))
}

/// Rescan `options.root` and bring `options.table` in line with it.
///
/// All rows are written in one transaction; a failed write leaves the
/// table as it was.
pub async fn reconcile(
    db: &ScalpelDb,
    options: &ReconcileOptions,
) -> Result<ReconcileOutcome, ReconcileError> {
    let cleanup = sweep_small_files(options).await?;
    let (report, records) = scan_and_classify(options).await?;

    let (diff, written) = if options.dry_run {
        let diff = db.preview_status_batch(&options.table, &records).await?;
        log_preview(&options.table, &diff);
        (Some(diff), None)
    } else {
        let summary = db.write_status_batch(&options.table, &records).await?;
        (None, Some(summary))
    };

    Ok(outcome(options, report, records, cleanup, diff, written))
}

/// Dry run against a database that does not exist yet: every row is new.
pub async fn preview_fresh(options: &ReconcileOptions) -> Result<ReconcileOutcome, ReconcileError> {
    let cleanup = sweep_small_files(options).await?;
    let (report, records) = scan_and_classify(options).await?;
    let diff = diff_status(&HashMap::new(), &records);
    log_preview(&options.table, &diff);
    Ok(outcome(options, report, records, cleanup, Some(diff), None))
}

fn log_preview(table: &str, diff: &StatusDiff) {
    info!(
        table,
        new = diff.inserted.len(),
        changed = diff.changed.len(),
        unchanged = diff.unchanged,
        "Dry run, nothing written"
    );
}

fn outcome(
    options: &ReconcileOptions,
    report: ScanReport,
    records: Vec<StatusRecord>,
    cleanup: Option<SmallFileReport>,
    diff: Option<StatusDiff>,
    written: Option<WriteSummary>,
) -> ReconcileOutcome {
    ReconcileOutcome {
        kind: options.kind,
        table: options.table.clone(),
        files_found: report.files_found(),
        root: report.root,
        dates_scanned: report.dates_scanned,
        cases_scanned: report.cases_scanned,
        skipped: report.skipped,
        records,
        dry_run: options.dry_run,
        cleanup,
        diff,
        written,
    }
}
