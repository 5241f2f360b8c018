//! `scalpel dedupe`: find duplicate camera exports and optionally delete them.

use crate::cli::output::{format_size, print_json, print_table};
use crate::cli::resolve_root;
use scalpel::dedupe::{dedupe_exports, DedupeOptions, DedupeReport, DEFAULT_MIN_VALID_MB};
use scalpel::ScalpelConfig;
use scalpel_db::StatusKind;
use std::path::PathBuf;

#[derive(Debug, clap::Args)]
pub struct DedupeArgs {
    /// Directory to clean (default: the configured MP4 root)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Delete the duplicates (default only reports them)
    #[arg(long)]
    pub apply: bool,

    /// Files under this size (MB) are not preferred as the one to keep
    #[arg(long, default_value_t = DEFAULT_MIN_VALID_MB)]
    pub min_valid_mb: u64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: DedupeArgs, config: &ScalpelConfig) -> anyhow::Result<()> {
    let root = resolve_root(args.root, config, StatusKind::Mp4)?;
    let options = DedupeOptions {
        apply: args.apply,
        min_valid_mb: args.min_valid_mb,
    };
    let report = dedupe_exports(&root, &options)?;

    if args.json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &DedupeReport) {
    if report.groups.is_empty() {
        println!("No duplicates found under {}", report.root.display());
        return;
    }

    let rows = report
        .groups
        .iter()
        .flat_map(|g| {
            g.remove.iter().map(move |f| {
                vec![
                    f.path.display().to_string(),
                    format_size(f.size_bytes),
                    g.keep
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                ]
            })
        })
        .collect();
    print_table(&["Duplicate", "Size", "Kept"], rows);
    println!(
        "{} duplicate(s) in {} group(s), {} reclaimable",
        report.duplicate_count(),
        report.groups.len(),
        format_size(report.reclaimable_bytes())
    );

    if !report.applied {
        println!("Dry run: nothing deleted. Re-run with --apply to delete.");
        return;
    }
    println!("Removed {} file(s).", report.removed.len());
    for (path, reason) in &report.failed {
        println!("  could not delete {}: {}", path.display(), reason);
    }
}
