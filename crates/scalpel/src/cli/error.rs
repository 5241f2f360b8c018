//! Operator-facing errors for CLI commands
//!
//! Every error says what went wrong, where, and what to try next.

use crate::cli::output::MAX_LISTED_ROWS;
use scalpel_db::StatusKey;
use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    /// Items the error is about, one per line
    pub details: Vec<String>,
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            details: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_details(mut self, details: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.details.extend(details.into_iter().map(|d| d.into()));
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    /// No root directory configured for a tree
    pub fn root_not_configured(kind: &str) -> Self {
        Self::new(format!("No {} root directory configured", kind))
            .with_context(format!(
                "The {kind} command needs the root of the recording tree (DATA_YY-MM-DD folders)"
            ))
            .with_suggestions([
                format!("TRY: scalpel {kind} --root /path/to/Recordings"),
                format!("TRY: Set {kind}_root in the config file (scalpel config shows its path)"),
            ])
    }

    /// Root path does not exist or is not a directory
    pub fn root_not_found(path: &Path) -> Self {
        Self::new(format!("Root path not found: {}", path.display()))
            .with_context("The recording root must be an existing directory")
            .with_suggestions([
                format!("TRY: Check that the path exists: ls -la {}", path.display()),
                "TRY: Check that the drive or network share is mounted".to_string(),
            ])
    }

    /// Database file missing for a read-only command
    pub fn database_not_found(path: &Path) -> Self {
        Self::new("Database not found")
            .with_context(format!("Expected database at: {}", path.display()))
            .with_suggestions([
                "TRY: scalpel mp4 --root /path/to/Recordings   # creates the database".to_string(),
                "TRY: Pass the database explicitly: scalpel --db /path/to/ScalpelDatabase.sqlite ..."
                    .to_string(),
            ])
    }

    /// Query rejected before it ran
    pub fn query_rejected(details: &str) -> Self {
        Self::new(format!("Query rejected: {}", details))
            .with_context("Path queries are read-only: a single SELECT, WITH or EXPLAIN statement")
            .with_suggestions([
                "TRY: SELECT recording_date, case_no, camera_name, value FROM mp4_status WHERE value = 1"
                    .to_string(),
                "TRY: Use builder flags instead of SQL: --from 2024-01-01 --camera Monitor --value 1"
                    .to_string(),
            ])
    }

    /// A status batch was rolled back. Lists the rows that were not committed.
    pub fn write_aborted(table: &str, cause: &str, uncommitted: &[StatusKey]) -> Self {
        let mut rows: Vec<String> = uncommitted
            .iter()
            .take(MAX_LISTED_ROWS)
            .map(|key| format!("not committed: {}", key))
            .collect();
        if uncommitted.len() > MAX_LISTED_ROWS {
            rows.push(format!("... and {} more", uncommitted.len() - MAX_LISTED_ROWS));
        }

        Self::new(format!("Write to {} aborted", table))
            .with_context(format!(
                "{} row(s) were not committed; the table is unchanged. Cause: {}",
                uncommitted.len(),
                cause
            ))
            .with_details(rows)
            .with_suggestions([
                "TRY: Re-run with --dry-run to inspect the pending changes".to_string(),
                "TRY: Re-run with -v for debug logs".to_string(),
            ])
    }

    /// Cannot read a file given on the command line
    pub fn cannot_read_file(path: &Path, reason: &str) -> Self {
        Self::new(format!("Cannot read file: {}", path.display()))
            .with_context(reason.to_string())
            .with_suggestion(format!("TRY: Check file permissions: ls -la {}", path.display()))
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        for detail in &self.details {
            writeln!(f, "  {}", detail)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}
