//! `scalpel summary`: per-camera status distribution of both status tables.

use crate::cli::output::{print_json, print_table_colored, status_color};
use crate::cli::{block_on, open_read_only};
use comfy_table::Color;
use scalpel::ScalpelConfig;
use scalpel_db::{CameraCounts, StatusCode, StatusKind, StatusSummary};

#[derive(Debug, clap::Args)]
pub struct SummaryArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: SummaryArgs, config: &ScalpelConfig) -> anyhow::Result<()> {
    let summaries = block_on(load(config))??;

    if args.json {
        return print_json(&summaries);
    }
    for (i, summary) in summaries.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_summary(summary);
    }
    Ok(())
}

async fn load(config: &ScalpelConfig) -> anyhow::Result<Vec<StatusSummary>> {
    let db = open_read_only(config).await?;
    let mut out = Vec::with_capacity(2);
    for kind in [StatusKind::Mp4, StatusKind::Seq] {
        let table = config.table_for(kind);
        match db.status_summary(table).await {
            Ok(summary) => out.push(summary),
            Err(e) => tracing::warn!(table, error = %e, "Skipping status table"),
        }
    }
    db.close().await;
    Ok(out)
}

fn count_cell(count: u64, status: StatusCode) -> (String, Option<Color>) {
    let color = (count > 0).then(|| status_color(status));
    (count.to_string(), color)
}

fn row(counts: &CameraCounts) -> Vec<(String, Option<Color>)> {
    vec![
        (counts.camera.clone(), None),
        count_cell(counts.complete, StatusCode::Complete),
        count_cell(counts.incomplete, StatusCode::Incomplete),
        count_cell(counts.missing, StatusCode::Missing),
        (counts.total().to_string(), None),
    ]
}

fn print_summary(summary: &StatusSummary) {
    println!("{} ({} cases)", summary.table, summary.total_cases);
    let mut rows: Vec<_> = summary.cameras.iter().map(row).collect();
    rows.push(row(&summary.totals));
    print_table_colored(
        &["Camera", "1 Complete", "2 Incomplete", "3 Missing", "Total"],
        rows,
    );
}
