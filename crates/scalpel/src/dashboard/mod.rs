//! Web dashboard over the recording database.
//!
//! A JSON API plus one static page. Status queries go through
//! [`scalpel_db::StatusQuery`] only; free-form SQL is not accepted here.

mod error;
mod routes;

pub use error::AppError;

use axum::extract::Request;
use axum::routing::{get, post, put};
use axum::Router;
use scalpel_db::ScalpelDb;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span};

use crate::config::ScalpelConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: ScalpelDb,
    pub config: Arc<ScalpelConfig>,
}

impl AppState {
    pub fn new(db: ScalpelDb, config: ScalpelConfig) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/api/tables", get(routes::list_tables))
        .route("/api/views", get(routes::list_views))
        .route("/api/tables/:name", get(routes::browse_table))
        .route("/api/tables/:name/schema", get(routes::table_schema))
        .route("/api/tables/:name/csv", get(routes::table_csv))
        .route("/api/tables/:name/rows", post(routes::insert_row))
        .route(
            "/api/anesthetists",
            get(routes::list_anesthetists).post(routes::create_anesthetist),
        )
        .route(
            "/api/recordings",
            get(routes::list_recordings).post(routes::create_recording),
        )
        .route(
            "/api/analysis",
            get(routes::list_analysis).post(routes::upsert_analysis),
        )
        .route(
            "/api/status/:kind/:date/:case/:camera",
            put(routes::edit_status),
        )
        .route("/api/status/:kind/query", post(routes::query_status))
        .route("/api/summary", get(routes::summary))
        .route("/api/reconcile/:kind", post(routes::run_reconcile))
        .route("/api/dedupe", post(routes::run_dedupe))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                info_span!(
                    "http_request",
                    method = ?request.method(),
                    uri = ?request.uri(),
                )
            }),
        )
}

/// Serve the dashboard until `signal` resolves.
pub async fn serve<F>(state: AppState, listener: TcpListener, signal: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, db = %state.db.path().display(), "Dashboard listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(signal)
        .await
}

#[cfg(test)]
mod tests {
    use super::routes::*;
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::Json;
    use chrono::NaiveDate;
    use scalpel_db::{
        Camera, NewAnesthetist, NewRecording, Seniority, StatusCode as Status, StatusEdit,
        StatusKind, StatusQuery, StatusRecord, StatusKey,
    };
    use serde_json::{json, Map};
    use tempfile::TempDir;

    async fn state() -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        let db = ScalpelDb::open(dir.path().join("scalpel.sqlite")).await.unwrap();
        let config = ScalpelConfig {
            database_path: db.path().to_path_buf(),
            ..ScalpelConfig::default()
        };
        (dir, AppState::new(db, config))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_router_builds() {
        let (_dir, state) = state().await;
        let _ = router(state);
    }

    #[tokio::test]
    async fn test_lists_tables_and_views() {
        let (_dir, state) = state().await;
        let Json(tables) = list_tables(State(state.clone())).await.unwrap();
        assert!(tables.contains(&"mp4_status".to_string()));
        assert!(tables.contains(&"anesthetic".to_string()));
        let Json(views) = list_views(State(state)).await.unwrap();
        assert!(views.contains(&"cur_mp4_missing".to_string()));
    }

    #[tokio::test]
    async fn test_anesthetist_and_recording_flow() {
        let (_dir, state) = state().await;
        let (code, Json(created)) = create_anesthetist(
            State(state.clone()),
            Json(NewAnesthetist {
                anesthetic_key: None,
                name: "Dr. Levi".to_string(),
                code: Some("LV".to_string()),
                start_date: date(2015, 3, 1),
                grade_a_date: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(code, StatusCode::CREATED);
        assert_eq!(created.anesthetic_key, 1);

        let Json(list) = list_anesthetists(State(state.clone())).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].seniority, Seniority::Attending);

        let (_, Json(recording)) = create_recording(
            State(state.clone()),
            Json(NewRecording {
                recording_date: date(2017, 3, 1),
                case_no: 1,
                signature_time: None,
                anesthetic_key: Some(1),
            }),
        )
        .await
        .unwrap();
        assert_eq!(recording.anesthetic_seniority, Some(Seniority::Resident));

        let err = create_recording(
            State(state),
            Json(NewRecording {
                recording_date: date(2017, 3, 1),
                case_no: 1,
                signature_time: None,
                anesthetic_key: Some(1),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_insert_row_rejects_unknown_columns() {
        let (_dir, state) = state().await;
        let mut values = Map::new();
        values.insert("recording_date".to_string(), json!("2024-01-15"));
        values.insert("case_no".to_string(), json!(1));
        values.insert("surgeon".to_string(), json!("nobody"));

        let err = insert_row(
            State(state.clone()),
            Path("analysis_information".to_string()),
            Json(values.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        values.remove("surgeon");
        let (code, _) = insert_row(
            State(state.clone()),
            Path("analysis_information".to_string()),
            Json(values),
        )
        .await
        .unwrap();
        assert_eq!(code, StatusCode::CREATED);

        let Json(rows) = browse_table(
            State(state),
            Path("analysis_information".to_string()),
            Query(BrowseParams {
                q: Some("2024-01".to_string()),
                limit: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(rows.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_status_edit_and_query() {
        let (_dir, state) = state().await;
        let key = StatusKey::new(date(2024, 1, 15), 1, Camera::Monitor);
        state
            .db
            .write_status_batch(
                "mp4_status",
                &[StatusRecord {
                    key,
                    status: Status::Incomplete,
                    size_mb: 140,
                    comments: None,
                }],
            )
            .await
            .unwrap();

        let Json(row) = edit_status(
            State(state.clone()),
            Path((
                "mp4".to_string(),
                "2024-01-15".to_string(),
                1,
                "Monitor".to_string(),
            )),
            Json(StatusEdit {
                comments: Some("cable loose".to_string()),
                ..StatusEdit::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(row.status, Status::Incomplete);
        assert_eq!(row.comments.as_deref(), Some("cable loose"));

        let err = edit_status(
            State(state.clone()),
            Path((
                "mp4".to_string(),
                "2024-01-15".to_string(),
                1,
                "Hallway".to_string(),
            )),
            Json(StatusEdit::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let Json(rows) = query_status(
            State(state.clone()),
            Path("mp4".to_string()),
            Json(StatusQuery::new().status(Status::Incomplete)),
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);

        let err = query_status(
            State(state.clone()),
            Path("avi".to_string()),
            Json(StatusQuery::new()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let Json(summaries) = summary(State(state)).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].table, StatusKind::Mp4.default_table());
        assert_eq!(summaries[0].totals.incomplete, 1);
        assert_eq!(summaries[1].total_cases, 0);
    }

    #[tokio::test]
    async fn test_status_edit_rejects_two_digit_year() {
        let (_dir, state) = state().await;
        let err = edit_status(
            State(state.clone()),
            Path((
                "mp4".to_string(),
                "24-01-15".to_string(),
                1,
                "Monitor".to_string(),
            )),
            Json(StatusEdit {
                value: Some(Status::Missing),
                ..StatusEdit::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(state.db.load_status_rows("mp4_status").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_and_dedupe_from_dashboard() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("Recordings");
        let camera = root.join("DATA_24-01-15").join("Case1").join("General_3");
        std::fs::create_dir_all(&camera).unwrap();
        std::fs::File::create(camera.join("General_3.mp4"))
            .unwrap()
            .set_len(250_000_000)
            .unwrap();
        std::fs::File::create(camera.join("General_3 (1).mp4"))
            .unwrap()
            .set_len(1_000)
            .unwrap();

        let db = ScalpelDb::open(dir.path().join("scalpel.sqlite")).await.unwrap();
        let config = ScalpelConfig {
            database_path: db.path().to_path_buf(),
            mp4_root: Some(root),
            ..ScalpelConfig::default()
        };
        let state = AppState::new(db, config);

        let Json(preview) = run_reconcile(
            State(state.clone()),
            Path("mp4".to_string()),
            Query(ReconcileParams { dry_run: true }),
        )
        .await
        .unwrap();
        assert_eq!(preview.diff.as_ref().map(|d| d.inserted.len()), Some(8));
        assert!(state.db.load_status_rows("mp4_status").await.unwrap().is_empty());

        let Json(written) = run_reconcile(
            State(state.clone()),
            Path("mp4".to_string()),
            Query(ReconcileParams::default()),
        )
        .await
        .unwrap();
        assert_eq!(written.written.map(|w| w.inserted), Some(8));

        let Json(report) = run_dedupe(
            State(state.clone()),
            Query(DedupeParams {
                apply: false,
                min_valid_mb: 1,
            }),
        )
        .await
        .unwrap();
        assert_eq!(report.duplicate_count(), 1);
        assert!(!report.applied);

        let err = run_reconcile(
            State(state),
            Path("seq".to_string()),
            Query(ReconcileParams::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_csv_export() {
        let (_dir, state) = state().await;
        state
            .db
            .upsert_analysis(&scalpel_db::AnalysisInfo {
                recording_date: date(2024, 1, 15),
                case_no: 2,
                label_by: Some("Noa, R.".to_string()),
            })
            .await
            .unwrap();
        let rows = state
            .db
            .browse_rows("analysis_information", None, None)
            .await
            .unwrap();
        let csv = rows_to_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("recording_date,case_no,label_by"));
        assert_eq!(lines.next(), Some("2024-01-15,2,\"Noa, R.\""));

        let missing = table_schema(State(state), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
