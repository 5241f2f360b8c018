//! Database schema creation for all ScalpelLab tables and views.
//!
//! All CREATE statements live here. Column names follow the historical
//! database so existing files open unchanged.

use crate::error::Result;
use crate::status::validate_table_name;
use crate::types::{Camera, StatusCode, StatusKind};
use crate::ScalpelDb;
use tracing::{debug, info};

impl ScalpelDb {
    /// Ensure all tables and views exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        self.create_record_tables().await?;
        self.ensure_status_table(StatusKind::Mp4.default_table())
            .await?;
        self.ensure_status_table(StatusKind::Seq.default_table())
            .await?;
        self.create_views().await?;

        info!("Database schema verified");
        Ok(())
    }

    async fn create_record_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS anesthetic (
                anesthetic_key INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                code TEXT,
                start_date TEXT NOT NULL,
                grade_a_date TEXT
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS recording_details (
                recording_date TEXT NOT NULL,
                case_no INTEGER NOT NULL,
                signature_time TEXT,
                anesthetic_key INTEGER REFERENCES anesthetic(anesthetic_key),
                anesthetic_seniority TEXT,
                PRIMARY KEY (recording_date, case_no)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS analysis_information (
                recording_date TEXT NOT NULL,
                case_no INTEGER NOT NULL,
                label_by TEXT,
                PRIMARY KEY (recording_date, case_no)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create a status table with the given name if it is absent.
    ///
    /// The name must pass [`validate_table_name`].
    pub async fn ensure_status_table(&self, table: &str) -> Result<()> {
        validate_table_name(table)?;
        sqlx::query(&status_table_ddl(table))
            .execute(&self.pool)
            .await?;
        debug!(table, "Status table verified");
        Ok(())
    }

    async fn create_views(&self) -> Result<()> {
        let missing = StatusCode::Missing.code();
        for (view, table) in [
            ("cur_mp4_missing", StatusKind::Mp4.default_table()),
            ("cur_seq_missing", StatusKind::Seq.default_table()),
        ] {
            sqlx::query(&format!(
                r#"CREATE VIEW IF NOT EXISTS {view} AS
                    SELECT recording_date, case_no, camera_name, comments
                    FROM {table}
                    WHERE value = {missing}"#
            ))
            .execute(&self.pool)
            .await?;
        }

        // Whole months since start_date, against the live clock. Rust callers
        // use seniority::seniority_at with an explicit reference date instead.
        sqlx::query(
            r#"CREATE VIEW IF NOT EXISTS cur_seniority AS
                SELECT
                    anesthetic_key,
                    name,
                    code,
                    start_date,
                    grade_a_date,
                    CASE WHEN (
                        (CAST(strftime('%Y', 'now') AS INTEGER) - CAST(strftime('%Y', start_date) AS INTEGER)) * 12
                        + CAST(strftime('%m', 'now') AS INTEGER) - CAST(strftime('%m', start_date) AS INTEGER)
                        - CASE WHEN CAST(strftime('%d', 'now') AS INTEGER) < CAST(strftime('%d', start_date) AS INTEGER)
                               THEN 1 ELSE 0 END
                    ) > 60 THEN 'Attending' ELSE 'Resident' END AS seniority
                FROM anesthetic"#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// `CREATE TABLE IF NOT EXISTS` for one status table.
pub(crate) fn status_table_ddl(table: &str) -> String {
    let cameras = Camera::ALL
        .iter()
        .map(|c| format!("'{}'", c.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    let codes = StatusCode::ALL
        .iter()
        .map(|s| s.code().to_string())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"CREATE TABLE IF NOT EXISTS "{table}" (
            recording_date TEXT NOT NULL,
            case_no INTEGER NOT NULL,
            camera_name TEXT NOT NULL CHECK (camera_name IN ({cameras})),
            value INTEGER NOT NULL CHECK (value IN ({codes})),
            comments TEXT,
            size_mb INTEGER CHECK (size_mb IS NULL OR size_mb >= 0),
            PRIMARY KEY (recording_date, case_no, camera_name)
        )"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_status_ddl_lists_every_camera() {
        let ddl = status_table_ddl("mp4_status");
        for camera in Camera::ALL {
            assert!(ddl.contains(&format!("'{}'", camera.as_str())));
        }
        assert!(ddl.contains("CHECK (value IN (1, 2, 3))"));
    }

    #[tokio::test]
    async fn test_schema_is_idempotent_and_creates_views() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("scalpel.sqlite");

        let db = ScalpelDb::open(&path).await.unwrap();
        db.ensure_schema().await.unwrap();
        db.close().await;

        let db = ScalpelDb::open(&path).await.unwrap();
        let views: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'view' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        assert_eq!(views, vec!["cur_mp4_missing", "cur_seniority", "cur_seq_missing"]);
    }

    #[tokio::test]
    async fn test_status_table_rejects_unknown_camera_and_code() {
        let tmp = TempDir::new().unwrap();
        let db = ScalpelDb::open(tmp.path().join("scalpel.sqlite")).await.unwrap();

        let bad_camera = sqlx::query(
            "INSERT INTO mp4_status (recording_date, case_no, camera_name, value) VALUES ('2024-01-15', 1, 'Door', 1)",
        )
        .execute(db.pool())
        .await;
        assert!(bad_camera.is_err());

        let bad_code = sqlx::query(
            "INSERT INTO mp4_status (recording_date, case_no, camera_name, value) VALUES ('2024-01-15', 1, 'Monitor', 4)",
        )
        .execute(db.pool())
        .await;
        assert!(bad_code.is_err());
    }

    #[tokio::test]
    async fn test_custom_status_table_name_is_validated() {
        let tmp = TempDir::new().unwrap();
        let db = ScalpelDb::open(tmp.path().join("scalpel.sqlite")).await.unwrap();

        db.ensure_status_table("mp4_status_2024").await.unwrap();
        assert!(db.ensure_status_table("mp4; DROP TABLE x").await.is_err());
    }
}
