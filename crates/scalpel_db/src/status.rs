//! Status table operations: batch reconciliation writes, manual edits and
//! per-camera summaries.

use crate::error::{DbError, Result};
use crate::types::{
    date_to_sql, parse_sql_date, Camera, CameraCounts, StatusChange, StatusCode, StatusDiff,
    StatusEdit, StatusKey, StatusRecord, StatusRow, StatusSummary, WriteSummary,
};
use crate::ScalpelDb;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::HashMap;
use tracing::{debug, info, warn};

const MAX_TABLE_NAME_LEN: usize = 64;

/// Status table names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || table.len() > MAX_TABLE_NAME_LEN {
        return Err(DbError::invalid_input(format!(
            "Invalid table name '{}': use letters, digits and underscores only",
            table
        )));
    }
    if table.to_ascii_lowercase().starts_with("sqlite_") {
        return Err(DbError::invalid_input(format!(
            "Table name '{}' is reserved by SQLite",
            table
        )));
    }
    Ok(())
}

/// Compare classified records with the rows already stored.
///
/// A stored row counts as changed when its status or size differs, or when the
/// record carries a comment override different from the stored comment.
pub fn diff_status(existing: &HashMap<StatusKey, StatusRow>, records: &[StatusRecord]) -> StatusDiff {
    let mut diff = StatusDiff::default();
    let mut seen: HashMap<StatusKey, &StatusRecord> = HashMap::new();

    for record in records {
        let previous = match seen.get(&record.key) {
            Some(earlier) => Some((earlier.status, Some(size_to_sql(earlier.size_mb)), None)),
            None => existing
                .get(&record.key)
                .map(|row| (row.status, row.size_mb, row.comments.as_deref())),
        };

        match previous {
            None => diff.inserted.push(record.clone()),
            Some((old_status, old_size, old_comments)) => {
                let comment_changed = record
                    .comments
                    .as_deref()
                    .map(|c| Some(c) != old_comments)
                    .unwrap_or(false);
                if old_status != record.status
                    || old_size != Some(size_to_sql(record.size_mb))
                    || comment_changed
                {
                    diff.changed.push(StatusChange {
                        key: record.key,
                        old_status,
                        old_size_mb: old_size,
                        new_status: record.status,
                        new_size_mb: record.size_mb,
                    });
                } else {
                    diff.unchanged += 1;
                }
            }
        }
        seen.insert(record.key, record);
    }

    diff
}

/// Records to write for `diff`: inserts first, then the latest record of each
/// changed key.
fn pending_records<'a>(
    diff: &'a StatusDiff,
    records: &'a [StatusRecord],
) -> Vec<&'a StatusRecord> {
    let latest: HashMap<StatusKey, &StatusRecord> = records.iter().map(|r| (r.key, r)).collect();
    diff.inserted
        .iter()
        .chain(diff.changed.iter().filter_map(|c| latest.get(&c.key).copied()))
        .collect()
}

fn size_to_sql(size_mb: u64) -> i64 {
    i64::try_from(size_mb).unwrap_or(i64::MAX)
}

fn upsert_sql(table: &str) -> String {
    format!(
        r#"INSERT INTO "{table}" (recording_date, case_no, camera_name, value, size_mb, comments)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (recording_date, case_no, camera_name) DO UPDATE SET
            value = excluded.value,
            size_mb = excluded.size_mb,
            comments = COALESCE(excluded.comments, comments)"#
    )
}

impl ScalpelDb {
    /// All decodable rows of a status table, ordered by date, case and camera.
    pub async fn load_status_rows(&self, table: &str) -> Result<Vec<StatusRow>> {
        validate_table_name(table)?;
        let mut conn = self.pool.acquire().await?;
        let mut rows: Vec<StatusRow> = load_rows(&mut conn, table).await?.into_values().collect();
        rows.sort_by_key(|r| r.key);
        Ok(rows)
    }

    /// One status row by key.
    pub async fn get_status(&self, table: &str, key: &StatusKey) -> Result<Option<StatusRow>> {
        validate_table_name(table)?;
        let row = sqlx::query(&format!(
            r#"SELECT recording_date, case_no, camera_name, value, size_mb, comments
            FROM "{table}"
            WHERE recording_date = ? AND case_no = ? AND camera_name = ?"#
        ))
        .bind(date_to_sql(key.recording_date))
        .bind(i64::from(key.case_no))
        .bind(key.camera.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().and_then(row_to_status))
    }

    /// What [`write_status_batch`](Self::write_status_batch) would do, without writing.
    ///
    /// A table that does not exist yet is treated as empty.
    pub async fn preview_status_batch(
        &self,
        table: &str,
        records: &[StatusRecord],
    ) -> Result<StatusDiff> {
        validate_table_name(table)?;
        let mut conn = self.pool.acquire().await?;
        let existing = if table_exists(&mut conn, table).await? {
            load_rows(&mut conn, table).await?
        } else {
            HashMap::new()
        };
        Ok(diff_status(&existing, records))
    }

    /// Upsert a reconciliation batch in a single transaction.
    ///
    /// New keys are inserted. Existing keys get `value` and `size_mb`
    /// overwritten while `comments` is kept unless the record overrides it.
    /// Unchanged rows are not rewritten. On any failure the transaction is
    /// rolled back and [`DbError::BatchWrite`] lists every pending row.
    pub async fn write_status_batch(
        &self,
        table: &str,
        records: &[StatusRecord],
    ) -> Result<WriteSummary> {
        self.ensure_status_table(table).await?;

        let mut tx = self.pool.begin().await?;
        let existing = load_rows(&mut tx, table).await?;
        let diff = diff_status(&existing, records);

        let pending = pending_records(&diff, records);
        let pending_keys: Vec<StatusKey> = pending.iter().map(|r| r.key).collect();

        let sql = upsert_sql(table);
        for record in &pending {
            let result = sqlx::query(&sql)
                .bind(date_to_sql(record.key.recording_date))
                .bind(i64::from(record.key.case_no))
                .bind(record.key.camera.as_str())
                .bind(record.status.code())
                .bind(size_to_sql(record.size_mb))
                .bind(record.comments.as_deref())
                .execute(&mut *tx)
                .await;

            if let Err(source) = result {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed; SQLite discards the transaction on close");
                }
                warn!(table, key = %record.key, error = %source, "Status batch aborted");
                return Err(DbError::BatchWrite {
                    table: table.to_string(),
                    failed: Some(record.key),
                    uncommitted: pending_keys,
                    source,
                });
            }
        }

        if let Err(source) = tx.commit().await {
            warn!(table, error = %source, "Status batch commit failed");
            return Err(DbError::BatchWrite {
                table: table.to_string(),
                failed: None,
                uncommitted: pending_keys,
                source,
            });
        }

        let summary = WriteSummary {
            inserted: diff.inserted.len(),
            updated: diff.changed.len(),
            unchanged: diff.unchanged,
        };
        info!(
            table,
            inserted = summary.inserted,
            updated = summary.updated,
            unchanged = summary.unchanged,
            "Status batch committed"
        );
        Ok(summary)
    }

    /// Apply a manual edit from the dashboard.
    ///
    /// A missing row is created only when the edit carries a status value.
    /// An empty comment clears the stored one.
    pub async fn update_status_manual(
        &self,
        table: &str,
        key: &StatusKey,
        edit: &StatusEdit,
    ) -> Result<StatusRow> {
        validate_table_name(table)?;
        if let Some(size) = edit.size_mb {
            if size < 0 {
                return Err(DbError::invalid_input("size_mb must not be negative"));
            }
        }
        let comments = edit
            .comments
            .as_deref()
            .map(str::trim)
            .map(|c| if c.is_empty() { None } else { Some(c.to_string()) });

        let current = self.get_status(table, key).await?;
        let next = match current {
            Some(row) => StatusRow {
                key: *key,
                status: edit.value.unwrap_or(row.status),
                size_mb: edit.size_mb.or(row.size_mb),
                comments: comments.unwrap_or(row.comments),
            },
            None => {
                let status = edit.value.ok_or_else(|| {
                    DbError::not_found(format!("No {} row for {}", table, key))
                })?;
                StatusRow {
                    key: *key,
                    status,
                    size_mb: edit.size_mb,
                    comments: comments.flatten(),
                }
            }
        };

        sqlx::query(&format!(
            r#"INSERT INTO "{table}" (recording_date, case_no, camera_name, value, size_mb, comments)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (recording_date, case_no, camera_name) DO UPDATE SET
                value = excluded.value,
                size_mb = excluded.size_mb,
                comments = excluded.comments"#
        ))
        .bind(date_to_sql(key.recording_date))
        .bind(i64::from(key.case_no))
        .bind(key.camera.as_str())
        .bind(next.status.code())
        .bind(next.size_mb)
        .bind(next.comments.as_deref())
        .execute(&self.pool)
        .await?;

        debug!(table, key = %key, status = next.status.code(), "Status row edited");
        Ok(next)
    }

    /// Per-camera status distribution and distinct case count.
    pub async fn status_summary(&self, table: &str) -> Result<StatusSummary> {
        validate_table_name(table)?;

        let counts = sqlx::query(&format!(
            r#"SELECT camera_name, value, COUNT(*) AS n
            FROM "{table}"
            GROUP BY camera_name, value"#
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut per_camera: Vec<CameraCounts> = Camera::ALL
            .iter()
            .map(|c| CameraCounts {
                camera: c.as_str().to_string(),
                ..Default::default()
            })
            .collect();
        let mut totals = CameraCounts {
            camera: "Total".to_string(),
            ..Default::default()
        };

        for row in &counts {
            let camera: String = row.try_get("camera_name")?;
            let value: Option<i64> = row.try_get("value")?;
            let n: i64 = row.try_get("n")?;
            let Some(status) = value.and_then(StatusCode::from_code) else {
                warn!(table, camera = %camera, ?value, "Ignoring row with unknown status code");
                continue;
            };
            let Some(slot) = per_camera.iter_mut().find(|c| c.camera == camera) else {
                warn!(table, camera = %camera, "Ignoring row with unknown camera");
                continue;
            };
            let n = u64::try_from(n).unwrap_or(0);
            slot.add(status, n);
            totals.add(status, n);
        }

        let total_cases: i64 = sqlx::query_scalar(&format!(
            r#"SELECT COUNT(*) FROM (SELECT DISTINCT recording_date, case_no FROM "{table}")"#
        ))
        .fetch_one(&self.pool)
        .await?;

        Ok(StatusSummary {
            table: table.to_string(),
            total_cases: u64::try_from(total_cases).unwrap_or(0),
            cameras: per_camera,
            totals,
        })
    }
}

async fn table_exists(conn: &mut SqliteConnection, table: &str) -> Result<bool> {
    let found: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(found.is_some())
}

async fn load_rows(conn: &mut SqliteConnection, table: &str) -> Result<HashMap<StatusKey, StatusRow>> {
    let rows = sqlx::query(&format!(
        r#"SELECT recording_date, case_no, camera_name, value, size_mb, comments FROM "{table}""#
    ))
    .fetch_all(&mut *conn)
    .await?;

    let mut out = HashMap::with_capacity(rows.len());
    for row in &rows {
        match row_to_status(row) {
            Some(status) => {
                out.insert(status.key, status);
            }
            None => debug!(table, "Skipping status row that does not decode"),
        }
    }
    Ok(out)
}

/// Decode a status row. Rows written by older tools with unknown cameras,
/// bad dates or NULL codes yield `None`.
pub(crate) fn row_to_status(row: &SqliteRow) -> Option<StatusRow> {
    let date: String = row.try_get("recording_date").ok()?;
    let case_no: i64 = row.try_get("case_no").ok()?;
    let camera: String = row.try_get("camera_name").ok()?;
    let value: Option<i64> = row.try_get("value").ok()?;

    Some(StatusRow {
        key: StatusKey {
            recording_date: parse_sql_date(&date).ok()?,
            case_no: u32::try_from(case_no).ok()?,
            camera: Camera::parse(&camera)?,
        },
        status: value.and_then(StatusCode::from_code)?,
        size_mb: row.try_get("size_mb").ok()?,
        comments: row.try_get("comments").ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn key(camera: Camera) -> StatusKey {
        StatusKey::new(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), 1, camera)
    }

    fn record(camera: Camera, status: StatusCode, size_mb: u64) -> StatusRecord {
        StatusRecord {
            key: key(camera),
            status,
            size_mb,
            comments: None,
        }
    }

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("mp4_status").is_ok());
        assert!(validate_table_name("_scratch2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2fast").is_err());
        assert!(validate_table_name("mp4 status").is_err());
        assert!(validate_table_name("x\"; DROP TABLE y; --").is_err());
        assert!(validate_table_name("sqlite_master").is_err());
    }

    #[test]
    fn test_diff_classifies_rows() {
        let mut existing = HashMap::new();
        existing.insert(
            key(Camera::Monitor),
            StatusRow {
                key: key(Camera::Monitor),
                status: StatusCode::Complete,
                size_mb: Some(250),
                comments: Some("reviewed".to_string()),
            },
        );
        existing.insert(
            key(Camera::CartLt4),
            StatusRow {
                key: key(Camera::CartLt4),
                status: StatusCode::Missing,
                size_mb: Some(0),
                comments: None,
            },
        );

        let records = vec![
            record(Camera::Monitor, StatusCode::Complete, 250),
            record(Camera::CartLt4, StatusCode::Incomplete, 140),
            record(Camera::General3, StatusCode::Missing, 0),
        ];
        let diff = diff_status(&existing, &records);

        assert_eq!(diff.unchanged, 1);
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].old_status, StatusCode::Missing);
        assert_eq!(diff.changed[0].new_size_mb, 140);
        assert_eq!(diff.inserted.len(), 1);
        assert_eq!(diff.inserted[0].key.camera, Camera::General3);
    }

    #[test]
    fn test_pending_records_take_latest_per_key() {
        let mut existing = HashMap::new();
        existing.insert(
            key(Camera::Monitor),
            StatusRow {
                key: key(Camera::Monitor),
                status: StatusCode::Missing,
                size_mb: Some(0),
                comments: None,
            },
        );
        let records = vec![
            record(Camera::Monitor, StatusCode::Incomplete, 50),
            record(Camera::General3, StatusCode::Missing, 0),
            record(Camera::Monitor, StatusCode::Complete, 300),
        ];
        let diff = diff_status(&existing, &records);
        let pending = pending_records(&diff, &records);

        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].key.camera, Camera::General3);
        // Both changes of Monitor resolve to the last record in the batch.
        assert!(pending[1..]
            .iter()
            .all(|r| r.key.camera == Camera::Monitor && r.size_mb == 300));
    }

    #[test]
    fn test_diff_counts_comment_override_as_change() {
        let mut existing = HashMap::new();
        existing.insert(
            key(Camera::Monitor),
            StatusRow {
                key: key(Camera::Monitor),
                status: StatusCode::Complete,
                size_mb: Some(250),
                comments: Some("reviewed".to_string()),
            },
        );
        let mut same = record(Camera::Monitor, StatusCode::Complete, 250);
        same.comments = Some("reviewed".to_string());
        assert_eq!(diff_status(&existing, &[same.clone()]).unchanged, 1);

        same.comments = Some("re-exported".to_string());
        assert_eq!(diff_status(&existing, &[same]).changed.len(), 1);
    }
}
