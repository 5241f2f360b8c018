//! Status writer behavior against a real database file.

use chrono::NaiveDate;
use scalpel_db::{
    Camera, DbError, ScalpelDb, StatusCode, StatusEdit, StatusKey, StatusQuery, StatusRecord,
};
use tempfile::TempDir;

const TABLE: &str = "mp4_status";

struct TestDb {
    _tmp: TempDir,
    db: ScalpelDb,
}

impl TestDb {
    async fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let db = ScalpelDb::open(tmp.path().join("scalpel.sqlite")).await.unwrap();
        Self { _tmp: tmp, db }
    }

    async fn dump(&self) -> Vec<(String, i64, String, i64, Option<i64>, Option<String>)> {
        sqlx::query_as(
            "SELECT recording_date, case_no, camera_name, value, size_mb, comments FROM mp4_status ORDER BY recording_date, case_no, camera_name",
        )
        .fetch_all(self.db.pool())
        .await
        .unwrap()
    }
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
}

fn record(case_no: u32, camera: Camera, status: StatusCode, size_mb: u64) -> StatusRecord {
    StatusRecord {
        key: StatusKey::new(date(), case_no, camera),
        status,
        size_mb,
        comments: None,
    }
}

fn full_case(case_no: u32) -> Vec<StatusRecord> {
    Camera::ALL
        .iter()
        .map(|&camera| match camera {
            Camera::Monitor => record(case_no, camera, StatusCode::Complete, 250),
            Camera::CartLt4 => record(case_no, camera, StatusCode::Incomplete, 140),
            _ => record(case_no, camera, StatusCode::Missing, 0),
        })
        .collect()
}

#[tokio::test]
async fn test_first_write_inserts_every_row() {
    let env = TestDb::new().await;

    let summary = env.db.write_status_batch(TABLE, &full_case(1)).await.unwrap();
    assert_eq!(summary.inserted, 8);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.unchanged, 0);

    let monitor = env
        .db
        .get_status(TABLE, &StatusKey::new(date(), 1, Camera::Monitor))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(monitor.status, StatusCode::Complete);
    assert_eq!(monitor.size_mb, Some(250));
}

#[tokio::test]
async fn test_rewrite_is_idempotent() {
    let env = TestDb::new().await;
    env.db.write_status_batch(TABLE, &full_case(1)).await.unwrap();
    let before = env.dump().await;

    let summary = env.db.write_status_batch(TABLE, &full_case(1)).await.unwrap();
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.unchanged, 8);
    assert_eq!(env.dump().await, before);
}

#[tokio::test]
async fn test_rescan_keeps_manual_comments() {
    let env = TestDb::new().await;
    env.db.write_status_batch(TABLE, &full_case(1)).await.unwrap();

    let key = StatusKey::new(date(), 1, Camera::Monitor);
    env.db
        .update_status_manual(
            TABLE,
            &key,
            &StatusEdit {
                comments: Some("reviewed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let mut rescan = full_case(1);
    for r in rescan.iter_mut().filter(|r| r.key == key) {
        r.size_mb = 310;
    }
    let summary = env.db.write_status_batch(TABLE, &rescan).await.unwrap();
    assert_eq!(summary.updated, 1);

    let row = env.db.get_status(TABLE, &key).await.unwrap().unwrap();
    assert_eq!(row.size_mb, Some(310));
    assert_eq!(row.comments.as_deref(), Some("reviewed"));
}

#[tokio::test]
async fn test_explicit_comment_override_replaces_comment() {
    let env = TestDb::new().await;
    env.db.write_status_batch(TABLE, &full_case(1)).await.unwrap();

    let mut batch = full_case(1);
    batch[0].comments = Some("re-exported".to_string());
    env.db.write_status_batch(TABLE, &batch).await.unwrap();

    let row = env.db.get_status(TABLE, &batch[0].key).await.unwrap().unwrap();
    assert_eq!(row.comments.as_deref(), Some("re-exported"));
}

#[tokio::test]
async fn test_failed_batch_commits_nothing_and_names_rows() {
    let env = TestDb::new().await;
    env.db.write_status_batch(TABLE, &full_case(1)).await.unwrap();
    let before = env.dump().await;

    sqlx::query(
        r#"CREATE TRIGGER reject_injection_port BEFORE INSERT ON mp4_status
        WHEN NEW.camera_name = 'Injection_Port'
        BEGIN SELECT RAISE(ABORT, 'injection port rejected'); END"#,
    )
    .execute(env.db.pool())
    .await
    .unwrap();

    let err = env
        .db
        .write_status_batch(TABLE, &full_case(2))
        .await
        .unwrap_err();

    match err {
        DbError::BatchWrite {
            failed,
            uncommitted,
            ..
        } => {
            assert_eq!(failed, Some(StatusKey::new(date(), 2, Camera::InjectionPort)));
            assert_eq!(uncommitted.len(), 8);
            assert!(uncommitted.iter().all(|k| k.case_no == 2));
        }
        other => panic!("expected BatchWrite, got {other:?}"),
    }

    assert_eq!(env.dump().await, before);
}

#[tokio::test]
async fn test_preview_does_not_write() {
    let env = TestDb::new().await;

    let diff = env.db.preview_status_batch(TABLE, &full_case(1)).await.unwrap();
    assert_eq!(diff.inserted.len(), 8);
    assert!(env.dump().await.is_empty());

    let diff = env
        .db
        .preview_status_batch("mp4_status_next", &full_case(1))
        .await
        .unwrap();
    assert_eq!(diff.inserted.len(), 8);
}

#[tokio::test]
async fn test_summary_and_query_builder() {
    let env = TestDb::new().await;
    env.db.write_status_batch(TABLE, &full_case(1)).await.unwrap();
    env.db.write_status_batch(TABLE, &full_case(2)).await.unwrap();

    let summary = env.db.status_summary(TABLE).await.unwrap();
    assert_eq!(summary.total_cases, 2);
    assert_eq!(summary.totals.total(), 16);
    assert_eq!(summary.totals.complete, 2);
    assert_eq!(summary.totals.incomplete, 2);
    assert_eq!(summary.totals.missing, 12);
    let monitor = summary.cameras.iter().find(|c| c.camera == "Monitor").unwrap();
    assert_eq!(monitor.complete, 2);

    let missing_general = env
        .db
        .query_status(
            TABLE,
            &StatusQuery::new()
                .camera(Camera::General3)
                .status(StatusCode::Missing)
                .case(2),
        )
        .await
        .unwrap();
    assert_eq!(missing_general.len(), 1);
    assert_eq!(missing_general[0].key.case_no, 2);
}

#[tokio::test]
async fn test_manual_edit_of_absent_row_needs_status() {
    let env = TestDb::new().await;
    let key = StatusKey::new(date(), 9, Camera::Monitor);

    let err = env
        .db
        .update_status_manual(
            TABLE,
            &key,
            &StatusEdit {
                comments: Some("lost".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));

    let row = env
        .db
        .update_status_manual(
            TABLE,
            &key,
            &StatusEdit {
                value: Some(StatusCode::Missing),
                size_mb: Some(0),
                comments: Some("lost".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(row.status, StatusCode::Missing);

    let negative = env
        .db
        .update_status_manual(
            TABLE,
            &key,
            &StatusEdit {
                size_mb: Some(-1),
                ..Default::default()
            },
        )
        .await;
    assert!(negative.is_err());
}
