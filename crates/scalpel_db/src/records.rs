//! Anesthetists, recordings and analysis annotations.

use crate::error::{DbError, Result};
use crate::seniority::{seniority_at, Seniority};
use crate::types::{
    date_to_sql, parse_sql_date, AnalysisInfo, Anesthetist, NewAnesthetist, NewRecording,
    Recording,
};
use crate::ScalpelDb;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{info, warn};

impl ScalpelDb {
    // ========================================================================
    // Anesthetists
    // ========================================================================

    pub async fn list_anesthetists(&self) -> Result<Vec<Anesthetist>> {
        let rows = sqlx::query(
            "SELECT anesthetic_key, name, code, start_date, grade_a_date FROM anesthetic ORDER BY anesthetic_key",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_rows("anesthetic", &rows, row_to_anesthetist))
    }

    pub async fn get_anesthetist(&self, anesthetic_key: i64) -> Result<Option<Anesthetist>> {
        let row = sqlx::query(
            "SELECT anesthetic_key, name, code, start_date, grade_a_date FROM anesthetic WHERE anesthetic_key = ?",
        )
        .bind(anesthetic_key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_anesthetist).transpose()
    }

    /// Insert an anesthetist. Without an explicit key the next free one
    /// (`MAX(anesthetic_key) + 1`) is assigned.
    pub async fn create_anesthetist(&self, new: &NewAnesthetist) -> Result<Anesthetist> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(DbError::invalid_input("Anesthetist name is required"));
        }

        let mut tx = self.pool.begin().await?;
        let anesthetic_key = match new.anesthetic_key {
            Some(key) => key,
            None => {
                let max: Option<i64> = sqlx::query_scalar("SELECT MAX(anesthetic_key) FROM anesthetic")
                    .fetch_one(&mut *tx)
                    .await?;
                max.unwrap_or(0) + 1
            }
        };

        let result = sqlx::query(
            "INSERT INTO anesthetic (anesthetic_key, name, code, start_date, grade_a_date) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(anesthetic_key)
        .bind(name)
        .bind(new.code.as_deref())
        .bind(date_to_sql(new.start_date))
        .bind(new.grade_a_date.map(date_to_sql))
        .execute(&mut *tx)
        .await;
        map_constraint(result, || format!("Anesthetist {} already exists", anesthetic_key))?;
        tx.commit().await?;

        info!(anesthetic_key, name, "Anesthetist created");
        Ok(Anesthetist {
            anesthetic_key,
            name: name.to_string(),
            code: new.code.clone(),
            start_date: new.start_date,
            grade_a_date: new.grade_a_date,
        })
    }

    // ========================================================================
    // Recordings
    // ========================================================================

    pub async fn list_recordings(&self) -> Result<Vec<Recording>> {
        let rows = sqlx::query(
            r#"SELECT recording_date, case_no, signature_time, anesthetic_key, anesthetic_seniority
            FROM recording_details
            ORDER BY recording_date, case_no"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_rows("recording_details", &rows, row_to_recording))
    }

    /// Insert a recording, snapshotting the anesthetist's seniority on the
    /// recording date.
    pub async fn create_recording(&self, new: &NewRecording) -> Result<Recording> {
        let seniority = match new.anesthetic_key {
            Some(key) => {
                let anesthetist = self.get_anesthetist(key).await?.ok_or_else(|| {
                    DbError::not_found(format!("Anesthetist {} not found", key))
                })?;
                Some(seniority_at(anesthetist.start_date, new.recording_date))
            }
            None => None,
        };

        let result = sqlx::query(
            r#"INSERT INTO recording_details
                (recording_date, case_no, signature_time, anesthetic_key, anesthetic_seniority)
            VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(date_to_sql(new.recording_date))
        .bind(i64::from(new.case_no))
        .bind(new.signature_time.as_deref())
        .bind(new.anesthetic_key)
        .bind(seniority.map(|s| s.as_str()))
        .execute(&self.pool)
        .await;
        map_constraint(result, || {
            format!(
                "Recording {} Case{} already exists",
                date_to_sql(new.recording_date),
                new.case_no
            )
        })?;

        info!(
            recording_date = %new.recording_date,
            case_no = new.case_no,
            seniority = ?seniority,
            "Recording created"
        );
        Ok(Recording {
            recording_date: new.recording_date,
            case_no: new.case_no,
            signature_time: new.signature_time.clone(),
            anesthetic_key: new.anesthetic_key,
            anesthetic_seniority: seniority,
        })
    }

    // ========================================================================
    // Analysis information
    // ========================================================================

    pub async fn list_analysis(&self) -> Result<Vec<AnalysisInfo>> {
        let rows = sqlx::query(
            "SELECT recording_date, case_no, label_by FROM analysis_information ORDER BY recording_date, case_no",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_rows("analysis_information", &rows, row_to_analysis))
    }

    /// Insert or replace the labeler of one recording.
    pub async fn upsert_analysis(&self, info: &AnalysisInfo) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO analysis_information (recording_date, case_no, label_by)
            VALUES (?, ?, ?)
            ON CONFLICT (recording_date, case_no) DO UPDATE SET label_by = excluded.label_by"#,
        )
        .bind(date_to_sql(info.recording_date))
        .bind(i64::from(info.case_no))
        .bind(info.label_by.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn map_constraint<T>(
    result: std::result::Result<T, sqlx::Error>,
    message: impl FnOnce() -> String,
) -> Result<T> {
    result.map_err(|err| {
        let err = DbError::from(err);
        if err.is_constraint_violation() {
            DbError::constraint(message())
        } else {
            err
        }
    })
}

/// Decode every row, skipping legacy rows that do not decode.
fn decode_rows<T>(
    table: &str,
    rows: &[SqliteRow],
    decode: impl Fn(&SqliteRow) -> Result<T>,
) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match decode(row) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(table, error = %err, "Skipping row that does not decode");
                None
            }
        })
        .collect()
}

fn case_no_from(row: &SqliteRow) -> Result<u32> {
    let case_no: i64 = row.try_get("case_no")?;
    u32::try_from(case_no)
        .map_err(|_| DbError::invalid_input(format!("case_no {} out of range", case_no)))
}

fn optional_date(value: Option<String>) -> Result<Option<chrono::NaiveDate>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_sql_date(s).map(Some),
    }
}

fn row_to_anesthetist(row: &SqliteRow) -> Result<Anesthetist> {
    Ok(Anesthetist {
        anesthetic_key: row.try_get("anesthetic_key")?,
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        start_date: parse_sql_date(&row.try_get::<String, _>("start_date")?)?,
        grade_a_date: optional_date(row.try_get("grade_a_date")?)?,
    })
}

fn row_to_recording(row: &SqliteRow) -> Result<Recording> {
    let seniority: Option<String> = row.try_get("anesthetic_seniority")?;
    Ok(Recording {
        recording_date: parse_sql_date(&row.try_get::<String, _>("recording_date")?)?,
        case_no: case_no_from(row)?,
        signature_time: row.try_get("signature_time")?,
        anesthetic_key: row.try_get("anesthetic_key")?,
        anesthetic_seniority: seniority.as_deref().and_then(Seniority::parse),
    })
}

fn row_to_analysis(row: &SqliteRow) -> Result<AnalysisInfo> {
    Ok(AnalysisInfo {
        recording_date: parse_sql_date(&row.try_get::<String, _>("recording_date")?)?,
        case_no: case_no_from(row)?,
        label_by: row.try_get("label_by")?,
    })
}
