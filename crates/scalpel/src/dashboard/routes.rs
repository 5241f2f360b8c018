use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::Json;
use chrono::{Local, NaiveDate};
use scalpel_db::seniority::months_between;
use scalpel_db::{
    seniority_at, AnalysisInfo, Anesthetist, Camera, ColumnInfo, ForeignKey, NewAnesthetist,
    NewRecording, Recording, Seniority, StatusEdit, StatusKey, StatusKind, StatusQuery, StatusRow,
    StatusSummary, TableRows,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use super::error::{AppError, Result};
use super::AppState;
use crate::dedupe::{dedupe_exports, DedupeOptions, DedupeReport, DEFAULT_MIN_VALID_MB};
use crate::inventory::{reconcile, ReconcileOptions, ReconcileOutcome};

const INDEX_HTML: &str = include_str!("index.html");

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn list_tables(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.db.list_tables().await?))
}

pub async fn list_views(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.db.list_views().await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct BrowseParams {
    pub q: Option<String>,
    pub limit: Option<u32>,
}

pub async fn browse_table(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<BrowseParams>,
) -> Result<Json<TableRows>> {
    let rows = state
        .db
        .browse_rows(&name, params.q.as_deref(), params.limit)
        .await?;
    Ok(Json(rows))
}

#[derive(Debug, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKey>,
}

pub async fn table_schema(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TableSchema>> {
    let columns = state.db.table_schema(&name).await?;
    let foreign_keys = state.db.foreign_keys(&name).await?;
    Ok(Json(TableSchema {
        name,
        columns,
        foreign_keys,
    }))
}

pub async fn table_csv(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<BrowseParams>,
) -> Result<impl IntoResponse> {
    let rows = state
        .db
        .browse_rows(&name, params.q.as_deref(), Some(scalpel_db::MAX_BROWSE_LIMIT))
        .await?;
    let body = rows_to_csv(&rows)?;
    let disposition = format!("attachment; filename=\"{}.csv\"", name);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

pub(crate) fn rows_to_csv(rows: &TableRows) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(&rows.columns)?;
    for row in &rows.rows {
        wtr.write_record(row.iter().map(cell_text))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| AppError::InternalServerError(anyhow::anyhow!(e.to_string())))?;
    String::from_utf8(bytes).map_err(|e| AppError::InternalServerError(e.into()))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Serialize)]
pub struct Inserted {
    pub table: String,
    pub rowid: u64,
}

pub async fn insert_row(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(values): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<Inserted>)> {
    let rowid = state.db.insert_row(&name, &values).await?;
    info!(table = %name, rowid, "Row inserted from dashboard");
    Ok((StatusCode::CREATED, Json(Inserted { table: name, rowid })))
}

/// An anesthetist with seniority as of today.
#[derive(Debug, Serialize)]
pub struct AnesthetistView {
    #[serde(flatten)]
    pub anesthetist: Anesthetist,
    pub months_of_experience: i32,
    pub seniority: Seniority,
}

impl AnesthetistView {
    pub fn as_of(anesthetist: Anesthetist, today: NaiveDate) -> Self {
        Self {
            months_of_experience: months_between(anesthetist.start_date, today),
            seniority: seniority_at(anesthetist.start_date, today),
            anesthetist,
        }
    }
}

pub async fn list_anesthetists(
    State(state): State<AppState>,
) -> Result<Json<Vec<AnesthetistView>>> {
    let today = Local::now().date_naive();
    let list = state.db.list_anesthetists().await?;
    Ok(Json(
        list.into_iter()
            .map(|a| AnesthetistView::as_of(a, today))
            .collect(),
    ))
}

pub async fn create_anesthetist(
    State(state): State<AppState>,
    Json(new): Json<NewAnesthetist>,
) -> Result<(StatusCode, Json<Anesthetist>)> {
    let created = state.db.create_anesthetist(&new).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_recordings(State(state): State<AppState>) -> Result<Json<Vec<Recording>>> {
    Ok(Json(state.db.list_recordings().await?))
}

pub async fn create_recording(
    State(state): State<AppState>,
    Json(new): Json<NewRecording>,
) -> Result<(StatusCode, Json<Recording>)> {
    let created = state.db.create_recording(&new).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_analysis(State(state): State<AppState>) -> Result<Json<Vec<AnalysisInfo>>> {
    Ok(Json(state.db.list_analysis().await?))
}

pub async fn upsert_analysis(
    State(state): State<AppState>,
    Json(info): Json<AnalysisInfo>,
) -> Result<Json<AnalysisInfo>> {
    state.db.upsert_analysis(&info).await?;
    Ok(Json(info))
}

fn parse_kind(kind: &str) -> Result<StatusKind> {
    StatusKind::parse(kind)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown status kind '{}', use mp4 or seq", kind)))
}

pub async fn edit_status(
    State(state): State<AppState>,
    Path((kind, date, case_no, camera)): Path<(String, String, u32, String)>,
    Json(edit): Json<StatusEdit>,
) -> Result<Json<StatusRow>> {
    let kind = parse_kind(&kind)?;
    let recording_date = scalpel_db::parse_sql_date(&date)?;
    let camera: Camera = camera.parse()?;
    let key = StatusKey::new(recording_date, case_no, camera);

    let table = state.config.table_for(kind);
    let row = state.db.update_status_manual(table, &key, &edit).await?;
    info!(table, key = %key, status = row.status.code(), "Status edited from dashboard");
    Ok(Json(row))
}

pub async fn query_status(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(query): Json<StatusQuery>,
) -> Result<Json<Vec<StatusRow>>> {
    let kind = parse_kind(&kind)?;
    let rows = state
        .db
        .query_status(state.config.table_for(kind), &query)
        .await?;
    Ok(Json(rows))
}

pub async fn summary(State(state): State<AppState>) -> Result<Json<Vec<StatusSummary>>> {
    let mut out = Vec::with_capacity(2);
    for kind in [StatusKind::Mp4, StatusKind::Seq] {
        out.push(state.db.status_summary(state.config.table_for(kind)).await?);
    }
    Ok(Json(out))
}

fn configured_root(state: &AppState, kind: StatusKind) -> Result<std::path::PathBuf> {
    state
        .config
        .root_for(kind)
        .map(|p| p.to_path_buf())
        .ok_or_else(|| AppError::BadRequest(format!("No {} root directory configured", kind)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileParams {
    #[serde(default)]
    pub dry_run: bool,
}

/// Rescan the configured tree of `kind` into its status table.
pub async fn run_reconcile(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<ReconcileParams>,
) -> Result<Json<ReconcileOutcome>> {
    let kind = parse_kind(&kind)?;
    let options = ReconcileOptions {
        kind,
        root: configured_root(&state, kind)?,
        table: state.config.table_for(kind).to_string(),
        threshold_mb: state.config.threshold_mb,
        dry_run: params.dry_run,
        delete_small_mb: None,
    };
    let outcome = reconcile(&state.db, &options).await?;
    info!(
        table = %options.table,
        dry_run = options.dry_run,
        rows = outcome.records.len(),
        "Reconciliation run from dashboard"
    );
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct DedupeParams {
    #[serde(default)]
    pub apply: bool,
    #[serde(default = "default_min_valid_mb")]
    pub min_valid_mb: u64,
}

fn default_min_valid_mb() -> u64 {
    DEFAULT_MIN_VALID_MB
}

/// Duplicate export scan of the configured MP4 tree.
pub async fn run_dedupe(
    State(state): State<AppState>,
    Query(params): Query<DedupeParams>,
) -> Result<Json<DedupeReport>> {
    let root = configured_root(&state, StatusKind::Mp4)?;
    let options = DedupeOptions {
        apply: params.apply,
        min_valid_mb: params.min_valid_mb,
    };
    let report = tokio::task::spawn_blocking(move || dedupe_exports(&root, &options)).await??;
    Ok(Json(report))
}
