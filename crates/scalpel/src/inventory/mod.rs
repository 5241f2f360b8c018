//! Recording inventory.
//!
//! Scans `<root>/DATA_YY-MM-DD/CaseN/<Camera>/` trees, classifies each
//! camera's files and reconciles the result into a status table. An optional
//! sweep removes aborted-export stubs first.

mod classify;
mod cleanup;
mod error;
pub mod layout;
mod reconcile;
mod scanner;

pub use classify::{classify, threshold_bytes, Classification, BYTES_PER_MB, DEFAULT_THRESHOLD_MB};
pub use cleanup::{remove_small_files, SmallFile, SmallFileReport};
pub use error::{ReconcileError, Result, ScanError};
pub use layout::DirLayout;
pub use reconcile::{
    classify_report, preview_fresh, reconcile, scan_and_classify, sweep_small_files,
    ReconcileOptions, ReconcileOutcome,
};
pub use scanner::{scan_tree, CameraFiles, ScanReport, Scanner, SkipReason, SkippedEntry};
