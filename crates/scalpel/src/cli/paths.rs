//! `scalpel paths`: map query rows to recording directories.

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_size, print_json, print_table};
use crate::cli::{block_on, open_read_only, resolve_root};
use chrono::NaiveDate;
use scalpel::path_mapper::{map_sql, map_status_query, save_csv, MapError, MapOptions, MappedPath};
use scalpel::ScalpelConfig;
use scalpel_db::{
    date_to_sql, parse_sql_date, Camera, DbError, StatusCode, StatusKind, StatusQuery,
};
use std::path::PathBuf;

#[derive(Debug, clap::Args)]
pub struct PathsArgs {
    /// Read-only SQL returning recording_date, case_no and optionally camera_name / value
    #[arg(long, conflicts_with = "sql_file")]
    pub sql: Option<String>,

    /// File containing the SQL query
    #[arg(long)]
    pub sql_file: Option<PathBuf>,

    /// Which tree and status table: mp4 or seq
    #[arg(long, default_value = "mp4", value_parser = parse_kind)]
    pub kind: StatusKind,

    /// Status table for builder queries (default from config)
    #[arg(long, conflicts_with_all = ["sql", "sql_file"])]
    pub table: Option<String>,

    /// Recording tree root (overrides the config)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Builder: first recording date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date, conflicts_with_all = ["sql", "sql_file"])]
    pub from: Option<NaiveDate>,

    /// Builder: last recording date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date, conflicts_with_all = ["sql", "sql_file"])]
    pub to: Option<NaiveDate>,

    /// Builder: case number
    #[arg(long = "case", conflicts_with_all = ["sql", "sql_file"])]
    pub case_no: Option<u32>,

    /// Builder: camera (repeatable)
    #[arg(long = "camera", conflicts_with_all = ["sql", "sql_file"])]
    pub cameras: Vec<Camera>,

    /// Builder: status code 1, 2 or 3 (repeatable)
    #[arg(long = "value", value_parser = parse_status, conflicts_with_all = ["sql", "sql_file"])]
    pub statuses: Vec<StatusCode>,

    /// Builder: maximum rows
    #[arg(long, conflicts_with_all = ["sql", "sql_file"])]
    pub limit: Option<u32>,

    /// Keep only rows whose `value` column equals N
    #[arg(long)]
    pub status: Option<i64>,

    /// Keep only these cameras (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub only_cameras: Vec<String>,

    /// List matching files under each directory
    #[arg(long)]
    pub files: bool,

    /// Keep only the largest file per directory
    #[arg(long)]
    pub largest_only: bool,

    /// Also write the result as CSV
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_kind(s: &str) -> Result<StatusKind, String> {
    StatusKind::parse(s).ok_or_else(|| format!("unknown kind '{}', use mp4 or seq", s))
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    parse_sql_date(s).map_err(|e| e.to_string())
}

fn parse_status(s: &str) -> Result<StatusCode, String> {
    s.trim()
        .parse::<i64>()
        .ok()
        .and_then(StatusCode::from_code)
        .ok_or_else(|| format!("unknown status '{}', use 1, 2 or 3", s))
}

enum Source {
    Sql(String),
    Builder { table: String, query: StatusQuery },
}

pub fn run(args: PathsArgs, config: &ScalpelConfig) -> anyhow::Result<()> {
    let root = resolve_root(args.root.clone(), config, args.kind)?;
    let source = source(&args, config)?;

    let mut options = MapOptions::new(root, args.kind.extension());
    options.status = args.status;
    options.only_cameras = args
        .only_cameras
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    options.list_files = args.files;
    options.largest_only = args.largest_only;

    let mapped = block_on(execute(&source, &options, config))??;

    if let Some(path) = &args.csv {
        save_csv(path, &mapped)?;
    }
    if args.json {
        return print_json(&mapped);
    }
    print_mapped(&mapped, options.list_files || options.largest_only);
    if let Some(path) = &args.csv {
        println!();
        println!("Saved CSV with {} paths -> {}", mapped.len(), path.display());
    }
    Ok(())
}

fn source(args: &PathsArgs, config: &ScalpelConfig) -> anyhow::Result<Source> {
    if let Some(sql) = &args.sql {
        return Ok(Source::Sql(sql.clone()));
    }
    if let Some(path) = &args.sql_file {
        let sql = std::fs::read_to_string(path)
            .map_err(|e| HelpfulError::cannot_read_file(path, &e.to_string()))?;
        return Ok(Source::Sql(sql));
    }

    let mut query = StatusQuery::new().between(args.from, args.to);
    if let Some(case_no) = args.case_no {
        query = query.case(case_no);
    }
    for &camera in &args.cameras {
        query = query.camera(camera);
    }
    for &status in &args.statuses {
        query = query.status(status);
    }
    if let Some(limit) = args.limit {
        query = query.limit(limit);
    }
    let table = args
        .table
        .clone()
        .unwrap_or_else(|| config.table_for(args.kind).to_string());
    Ok(Source::Builder { table, query })
}

async fn execute(
    source: &Source,
    options: &MapOptions,
    config: &ScalpelConfig,
) -> anyhow::Result<Vec<MappedPath>> {
    let db = open_read_only(config).await?;
    let result = match source {
        Source::Sql(sql) => map_sql(&db, sql, options).await,
        Source::Builder { table, query } => map_status_query(&db, table, query, options).await,
    };
    db.close().await;
    result.map_err(explain)
}

fn explain(err: MapError) -> anyhow::Error {
    match err {
        MapError::Db(DbError::ReadOnlyViolation(e)) => {
            HelpfulError::query_rejected(&e.to_string()).into()
        }
        MapError::MissingColumns { .. } | MapError::StatusColumnRequired => {
            HelpfulError::new(err.to_string())
                .with_context("Paths are built from recording_date and case_no (camera_name optional)")
                .with_suggestion(
                    "TRY: SELECT recording_date, case_no, camera_name, value FROM mp4_status ...",
                )
                .into()
        }
        other => other.into(),
    }
}

fn print_mapped(mapped: &[MappedPath], with_files: bool) {
    if mapped.is_empty() {
        println!("No matching rows.");
        return;
    }

    let status_text = |m: &MappedPath| m.status.map(|s| s.to_string()).unwrap_or_default();
    let mut rows = Vec::new();
    for m in mapped {
        let head = vec![
            date_to_sql(m.recording_date),
            m.case_no.to_string(),
            m.camera.clone().unwrap_or_default(),
            status_text(m),
        ];
        if with_files && !m.files.is_empty() {
            for f in &m.files {
                let mut row = head.clone();
                row.push(format_size(f.size_bytes));
                row.push(f.path.display().to_string());
                rows.push(row);
            }
        } else {
            let mut row = head;
            row.push(if m.exists { "-" } else { "missing" }.to_string());
            row.push(m.path.display().to_string());
            rows.push(row);
        }
    }
    print_table(&["Date", "Case", "Camera", "Value", "Size", "Path"], rows);
    println!("{} path(s)", mapped.len());
}
