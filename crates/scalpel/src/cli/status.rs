//! `scalpel mp4` / `scalpel seq`: rescan a recording tree and reconcile its
//! status table.

use crate::cli::error::HelpfulError;
use crate::cli::output::{
    format_size, print_json, print_table, print_table_colored, status_color, MAX_LISTED_ROWS,
};
use crate::cli::{block_on, resolve_root};
use scalpel::inventory::{
    preview_fresh, reconcile, ReconcileError, ReconcileOptions, ReconcileOutcome, ScanError,
    SmallFileReport,
};
use scalpel::ScalpelConfig;
use scalpel_db::{validate_table_name, DbError, ScalpelDb, StatusKey, StatusKind};
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Debug, clap::Args)]
pub struct ReconcileArgs {
    /// Root of the recording tree (overrides the config)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Status table to reconcile (default: mp4_status / seq_status)
    #[arg(long)]
    pub table: Option<String>,

    /// A camera is Complete once one file reaches this many MB
    #[arg(long)]
    pub threshold_mb: Option<u64>,

    /// Show what would change without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Before scanning, delete files of the tree's type smaller than N MB
    /// (aborted exports). Only listed with --dry-run.
    #[arg(long, value_name = "N")]
    pub delete_small_mb: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(kind: StatusKind, args: ReconcileArgs, config: &ScalpelConfig) -> anyhow::Result<()> {
    let root = resolve_root(args.root, config, kind)?;
    let table = args
        .table
        .unwrap_or_else(|| config.table_for(kind).to_string());
    validate_table_name(&table)?;

    let options = ReconcileOptions {
        kind,
        root,
        table,
        threshold_mb: args.threshold_mb.unwrap_or(config.threshold_mb),
        dry_run: args.dry_run,
        delete_small_mb: args.delete_small_mb,
    };

    let outcome = match block_on(execute(&options, config))? {
        Ok(outcome) => outcome,
        Err(err) => {
            if args.json {
                print_json(&failure_json(&err))?;
            }
            return Err(explain(err, &options));
        }
    };

    if args.json {
        print_json(&outcome)
    } else {
        print_outcome(&outcome);
        Ok(())
    }
}

async fn execute(
    options: &ReconcileOptions,
    config: &ScalpelConfig,
) -> Result<ReconcileOutcome, ReconcileError> {
    if !options.dry_run {
        let db = ScalpelDb::open(&config.database_path).await?;
        let outcome = reconcile(&db, options).await;
        db.close().await;
        return outcome;
    }
    if config.database_path.is_file() {
        let db = ScalpelDb::open_read_only(&config.database_path).await?;
        reconcile(&db, options).await
    } else {
        preview_fresh(options).await
    }
}

fn explain(err: ReconcileError, options: &ReconcileOptions) -> anyhow::Error {
    match err {
        ReconcileError::Scan(ScanError::RootNotFound(path))
        | ReconcileError::Scan(ScanError::RootNotADirectory(path)) => {
            HelpfulError::root_not_found(&path).into()
        }
        ReconcileError::Db(DbError::BatchWrite {
            table,
            failed,
            uncommitted,
            source,
        }) => {
            let cause = match failed {
                Some(key) => format!("{} (at {})", source, key),
                None => source.to_string(),
            };
            HelpfulError::write_aborted(&table, &cause, &uncommitted).into()
        }
        other => anyhow::Error::new(other).context(format!(
            "Reconciling {} under {}",
            options.table,
            options.root.display()
        )),
    }
}

/// Machine-readable failure for `--json`. Aborted writes carry every
/// uncommitted key.
fn failure_json(err: &ReconcileError) -> Value {
    match err {
        ReconcileError::Db(DbError::BatchWrite {
            table,
            failed,
            uncommitted,
            source,
        }) => batch_failure_json(table, failed.as_ref(), uncommitted, &source.to_string()),
        other => json!({ "error": other.to_string() }),
    }
}

fn batch_failure_json(
    table: &str,
    failed: Option<&StatusKey>,
    uncommitted: &[StatusKey],
    cause: &str,
) -> Value {
    json!({
        "error": format!("Write to {} aborted: {}", table, cause),
        "table": table,
        "failed": failed,
        "uncommitted": uncommitted,
    })
}

fn print_outcome(outcome: &ReconcileOutcome) {
    let mode = if outcome.dry_run { " (dry run)" } else { "" };
    println!(
        "{} status for {} -> {}{}",
        outcome.kind.extension().to_uppercase(),
        outcome.root.display(),
        outcome.table,
        mode
    );
    println!();

    let mut rows = vec![
        vec!["Dates scanned".to_string(), outcome.dates_scanned.to_string()],
        vec!["Cases scanned".to_string(), outcome.cases_scanned.to_string()],
        vec!["Camera rows".to_string(), outcome.records.len().to_string()],
        vec!["Files found".to_string(), outcome.files_found.to_string()],
    ];
    if let Some(written) = &outcome.written {
        rows.push(vec!["Inserted".to_string(), written.inserted.to_string()]);
        rows.push(vec!["Updated".to_string(), written.updated.to_string()]);
        rows.push(vec!["Unchanged".to_string(), written.unchanged.to_string()]);
    }
    if let Some(diff) = &outcome.diff {
        rows.push(vec!["Would insert".to_string(), diff.inserted.len().to_string()]);
        rows.push(vec!["Would update".to_string(), diff.changed.len().to_string()]);
        rows.push(vec!["Unchanged".to_string(), diff.unchanged.to_string()]);
    }
    rows.push(vec!["Skipped entries".to_string(), outcome.skipped.len().to_string()]);
    print_table(&["Metric", "Value"], rows);

    if let Some(cleanup) = &outcome.cleanup {
        print_cleanup(cleanup);
    }

    if let Some(diff) = &outcome.diff {
        if !diff.changed.is_empty() {
            println!();
            println!("Changed rows:");
            let rows = diff
                .changed
                .iter()
                .take(MAX_LISTED_ROWS)
                .map(|c| {
                    vec![
                        (c.key.to_string(), None),
                        (
                            format!(
                                "{} / {} MB",
                                c.old_status,
                                c.old_size_mb.map_or("-".to_string(), |s| s.to_string())
                            ),
                            Some(status_color(c.old_status)),
                        ),
                        (
                            format!("{} / {} MB", c.new_status, c.new_size_mb),
                            Some(status_color(c.new_status)),
                        ),
                    ]
                })
                .collect();
            print_table_colored(&["Row", "Old", "New"], rows);
            print_more(diff.changed.len());
        }
        if !diff.inserted.is_empty() {
            println!();
            println!("New rows:");
            let rows = diff
                .inserted
                .iter()
                .take(MAX_LISTED_ROWS)
                .map(|r| {
                    vec![
                        (r.key.to_string(), None),
                        (r.status.to_string(), Some(status_color(r.status))),
                        (format!("{} MB", r.size_mb), None),
                    ]
                })
                .collect();
            print_table_colored(&["Row", "Status", "Size"], rows);
            print_more(diff.inserted.len());
        }
    }

    if !outcome.skipped.is_empty() {
        println!();
        println!("Skipped:");
        for entry in &outcome.skipped {
            println!("  {}  ({})", entry.path.display(), entry.reason);
        }
    }
}

fn print_cleanup(report: &SmallFileReport) {
    println!();
    if report.candidates.is_empty() {
        println!("No files under {} MB found.", report.below_mb);
        return;
    }
    let verb = if report.applied { "Deleted" } else { "Would delete" };
    println!(
        "{} {} file(s) under {} MB ({}):",
        verb,
        if report.applied { report.removed.len() } else { report.candidates.len() },
        report.below_mb,
        format_size(report.candidate_bytes())
    );
    for file in report.candidates.iter().take(MAX_LISTED_ROWS) {
        println!("  {}  ({})", file.path.display(), format_size(file.size_bytes));
    }
    print_more(report.candidates.len());
    for (path, reason) in &report.failed {
        println!("  could not delete {}: {}", path.display(), reason);
    }
}

fn print_more(total: usize) {
    if total > MAX_LISTED_ROWS {
        println!("  ... and {} more", total - MAX_LISTED_ROWS);
    }
}
