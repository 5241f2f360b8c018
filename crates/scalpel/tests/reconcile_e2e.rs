//! Scan a real directory tree and reconcile it into a fresh database.

use chrono::NaiveDate;
use scalpel::inventory::{reconcile, ReconcileOptions, SkipReason, DEFAULT_THRESHOLD_MB};
use scalpel_db::{Camera, ScalpelDb, StatusCode, StatusEdit, StatusKey, StatusKind, StatusRow};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    db: ScalpelDb,
}

impl Fixture {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("Recordings");
        fs::create_dir_all(&root).unwrap();
        let db = ScalpelDb::open(dir.path().join("ScalpelDatabase.sqlite"))
            .await
            .unwrap();
        Self { _dir: dir, root, db }
    }

    /// Create a file of `bytes` length without writing its contents.
    fn file(&self, rel: &str, bytes: u64) {
        let path = self.root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(&path).unwrap().set_len(bytes).unwrap();
    }

    fn dir(&self, rel: &str) {
        fs::create_dir_all(self.root.join(rel)).unwrap();
    }

    fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            kind: StatusKind::Mp4,
            root: self.root.clone(),
            table: "mp4_status".to_string(),
            threshold_mb: DEFAULT_THRESHOLD_MB,
            dry_run: false,
            delete_small_mb: None,
        }
    }

    async fn row(&self, case_no: u32, camera: Camera) -> StatusRow {
        self.db
            .get_status("mp4_status", &key(case_no, camera))
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("no row for case {} {}", case_no, camera))
    }
}

fn jan15() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
}

fn key(case_no: u32, camera: Camera) -> StatusKey {
    StatusKey::new(jan15(), case_no, camera)
}

fn skipped_names(outcome: &scalpel::inventory::ReconcileOutcome) -> Vec<(String, SkipReason)> {
    outcome
        .skipped
        .iter()
        .map(|s| {
            (
                s.path.file_name().unwrap().to_string_lossy().into_owned(),
                s.reason.clone(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_classifies_each_camera_of_a_case() {
    let fx = Fixture::new().await;
    fx.file("DATA_24-01-15/Case1/General_3/General_3.mp4", 250_000_000);
    fx.file("DATA_24-01-15/Case1/Cart_LT_4/part1.mp4", 50_000_000);
    fx.file("DATA_24-01-15/Case1/Cart_LT_4/part2.MP4", 90_000_000);
    fx.file("DATA_24-01-15/Case1/Cart_RT_1/notes.txt", 900_000_000);
    fx.dir("DATA_24-01-15/Case1/Patient_Monitor");

    let outcome = reconcile(&fx.db, &fx.options()).await.unwrap();
    assert_eq!(outcome.dates_scanned, 1);
    assert_eq!(outcome.cases_scanned, 1);
    assert_eq!(outcome.records.len(), 8);
    assert_eq!(outcome.files_found, 3);
    let written = outcome.written.unwrap();
    assert_eq!(written.inserted, 8);
    assert_eq!(written.updated, 0);

    let general = fx.row(1, Camera::General3).await;
    assert_eq!(general.status, StatusCode::Complete);
    assert_eq!(general.size_mb, Some(250));

    let cart = fx.row(1, Camera::CartLt4).await;
    assert_eq!(cart.status, StatusCode::Incomplete);
    assert_eq!(cart.size_mb, Some(140));

    // Only .mp4 files count.
    assert_eq!(fx.row(1, Camera::CartRt1).await.status, StatusCode::Missing);
    // Empty and absent camera folders are both Missing.
    assert_eq!(fx.row(1, Camera::PatientMonitor).await.status, StatusCode::Missing);
    let monitor = fx.row(1, Camera::Monitor).await;
    assert_eq!(monitor.status, StatusCode::Missing);
    assert_eq!(monitor.size_mb, Some(0));
}

#[tokio::test]
async fn test_threshold_is_inclusive() {
    let fx = Fixture::new().await;
    fx.file("DATA_24-01-15/Case1/Monitor/a.mp4", 200_000_000);
    fx.file("DATA_24-01-15/Case2/Monitor/a.mp4", 199_999_999);

    reconcile(&fx.db, &fx.options()).await.unwrap();
    assert_eq!(fx.row(1, Camera::Monitor).await.status, StatusCode::Complete);
    let below = fx.row(2, Camera::Monitor).await;
    assert_eq!(below.status, StatusCode::Incomplete);
    assert_eq!(below.size_mb, Some(199));
}

#[tokio::test]
async fn test_malformed_names_are_skipped() {
    let fx = Fixture::new().await;
    fx.file("DATA_24-01-15/Case1/Monitor/a.mp4", 1);
    fx.dir("DATA_24-02-30/Case1/Monitor");
    fx.dir("Backup_old");
    fx.dir("DATA_24-01-15/Case");
    fx.dir("DATA_24-01-15/Case1/Hallway");
    fs::write(fx.root.join("readme.txt"), "x").unwrap();

    let outcome = reconcile(&fx.db, &fx.options()).await.unwrap();
    assert_eq!(outcome.dates_scanned, 1);
    assert_eq!(outcome.cases_scanned, 1);
    assert_eq!(outcome.records.len(), 8);

    let skipped = skipped_names(&outcome);
    assert!(skipped.contains(&("DATA_24-02-30".to_string(), SkipReason::InvalidDate)));
    assert!(skipped.contains(&("Backup_old".to_string(), SkipReason::NotADateDir)));
    assert!(skipped.contains(&("Case".to_string(), SkipReason::NotACaseDir)));
    assert!(skipped.contains(&("Hallway".to_string(), SkipReason::UnknownCamera)));
}

#[tokio::test]
async fn test_rescan_is_idempotent_and_tracks_changes() {
    let fx = Fixture::new().await;
    fx.file("DATA_24-01-15/Case1/Monitor/a.mp4", 50_000_000);

    let first = reconcile(&fx.db, &fx.options()).await.unwrap();
    assert_eq!(first.written.unwrap().inserted, 8);

    let again = reconcile(&fx.db, &fx.options()).await.unwrap();
    let written = again.written.unwrap();
    assert_eq!((written.inserted, written.updated, written.unchanged), (0, 0, 8));

    // The export finishes: Monitor becomes Complete.
    fx.file("DATA_24-01-15/Case1/Monitor/a.mp4", 300_000_000);
    let mut dry = fx.options();
    dry.dry_run = true;
    let preview = reconcile(&fx.db, &dry).await.unwrap();
    let diff = preview.diff.unwrap();
    assert_eq!(diff.changed.len(), 1);
    assert_eq!(diff.changed[0].old_status, StatusCode::Incomplete);
    assert_eq!(diff.changed[0].new_status, StatusCode::Complete);
    assert!(preview.written.is_none());
    assert_eq!(fx.row(1, Camera::Monitor).await.status, StatusCode::Incomplete);

    let applied = reconcile(&fx.db, &fx.options()).await.unwrap();
    let written = applied.written.unwrap();
    assert_eq!((written.inserted, written.updated, written.unchanged), (0, 1, 7));
    assert_eq!(fx.row(1, Camera::Monitor).await.size_mb, Some(300));
}

#[tokio::test]
async fn test_rescan_keeps_operator_comments() {
    let fx = Fixture::new().await;
    fx.file("DATA_24-01-15/Case3/Monitor/a.mp4", 10);
    reconcile(&fx.db, &fx.options()).await.unwrap();

    fx.db
        .update_status_manual(
            "mp4_status",
            &key(3, Camera::Monitor),
            &StatusEdit {
                comments: Some("camera unplugged mid-case".to_string()),
                ..StatusEdit::default()
            },
        )
        .await
        .unwrap();

    fx.file("DATA_24-01-15/Case3/Monitor/a.mp4", 400_000_000);
    reconcile(&fx.db, &fx.options()).await.unwrap();

    let row = fx.row(3, Camera::Monitor).await;
    assert_eq!(row.status, StatusCode::Complete);
    assert_eq!(row.comments.as_deref(), Some("camera unplugged mid-case"));
}

#[tokio::test]
async fn test_missing_root_is_fatal() {
    let fx = Fixture::new().await;
    let mut options = fx.options();
    options.root = Path::new(&fx.root).join("not-there");
    let err = reconcile(&fx.db, &options).await.unwrap_err();
    assert!(matches!(
        err,
        scalpel::inventory::ReconcileError::Scan(scalpel::inventory::ScanError::RootNotFound(_))
    ));
    assert!(fx.db.load_status_rows("mp4_status").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_seq_tree_uses_seq_table() {
    let fx = Fixture::new().await;
    fx.file("DATA_24-01-15/Case1/Monitor/Monitor.seq", 250_000_000);
    fx.file("DATA_24-01-15/Case1/Monitor/Monitor.mp4", 250_000_000);

    let options = ReconcileOptions {
        kind: StatusKind::Seq,
        table: "seq_status".to_string(),
        ..fx.options()
    };
    let outcome = reconcile(&fx.db, &options).await.unwrap();
    assert_eq!(outcome.files_found, 1);

    let row = fx
        .db
        .get_status("seq_status", &key(1, Camera::Monitor))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, StatusCode::Complete);
    assert!(fx.db.load_status_rows("mp4_status").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_small_file_sweep_runs_before_classifying() {
    let fx = Fixture::new().await;
    fx.file("DATA_24-01-15/Case1/Monitor/Monitor_aborted.mp4", 2_000_000);
    fx.file("DATA_24-01-15/Case1/General_3/General_3.mp4", 250_000_000);
    let stub = fx.root.join("DATA_24-01-15/Case1/Monitor/Monitor_aborted.mp4");

    // A dry run only lists the stub and still sees it.
    let mut dry = fx.options();
    dry.dry_run = true;
    dry.delete_small_mb = Some(10);
    let preview = reconcile(&fx.db, &dry).await.unwrap();
    let listed = preview.cleanup.unwrap();
    assert!(!listed.applied);
    assert_eq!(listed.candidates.len(), 1);
    assert!(stub.exists());
    let monitor = preview
        .records
        .iter()
        .find(|r| r.key == key(1, Camera::Monitor))
        .unwrap();
    assert_eq!(monitor.status, StatusCode::Incomplete);

    let mut apply = fx.options();
    apply.delete_small_mb = Some(10);
    let outcome = reconcile(&fx.db, &apply).await.unwrap();
    let swept = outcome.cleanup.unwrap();
    assert_eq!(swept.removed, vec![stub.clone()]);
    assert!(!stub.exists());
    assert_eq!(fx.row(1, Camera::Monitor).await.status, StatusCode::Missing);
    assert_eq!(fx.row(1, Camera::General3).await.status, StatusCode::Complete);
}
