//! Parameterized status queries.
//!
//! [`StatusQuery`] is the only query surface the dashboard exposes: filters
//! are bound as parameters and the table name must be a plain identifier.

use crate::error::{DbError, Result};
use crate::status::{row_to_status, validate_table_name};
use crate::types::{date_to_sql, Camera, StatusCode, StatusRow};
use crate::ScalpelDb;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteArguments;
use sqlx::Arguments;
use tracing::{debug, warn};

/// Filters over one status table. Empty lists mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusQuery {
    #[serde(with = "crate::types::sql_date::option")]
    pub date_from: Option<NaiveDate>,
    #[serde(with = "crate::types::sql_date::option")]
    pub date_to: Option<NaiveDate>,
    pub case_no: Option<u32>,
    pub cameras: Vec<Camera>,
    pub statuses: Vec<StatusCode>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Param {
    Text(String),
    Int(i64),
}

impl StatusQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inclusive date range. Either end may be open.
    pub fn between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn case(mut self, case_no: u32) -> Self {
        self.case_no = Some(case_no);
        self
    }

    pub fn camera(mut self, camera: Camera) -> Self {
        if !self.cameras.contains(&camera) {
            self.cameras.push(camera);
        }
        self
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        if !self.statuses.contains(&status) {
            self.statuses.push(status);
        }
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// SQL text and its parameters, in placeholder order.
    pub(crate) fn build(&self, table: &str) -> Result<(String, Vec<Param>)> {
        validate_table_name(table)?;
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(DbError::invalid_input(format!(
                    "date_from {} is after date_to {}",
                    from, to
                )));
            }
        }

        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(from) = self.date_from {
            clauses.push("recording_date >= ?".to_string());
            params.push(Param::Text(date_to_sql(from)));
        }
        if let Some(to) = self.date_to {
            clauses.push("recording_date <= ?".to_string());
            params.push(Param::Text(date_to_sql(to)));
        }
        if let Some(case_no) = self.case_no {
            clauses.push("case_no = ?".to_string());
            params.push(Param::Int(i64::from(case_no)));
        }
        if !self.cameras.is_empty() {
            clauses.push(format!("camera_name IN ({})", placeholders(self.cameras.len())));
            params.extend(self.cameras.iter().map(|c| Param::Text(c.as_str().to_string())));
        }
        if !self.statuses.is_empty() {
            clauses.push(format!("value IN ({})", placeholders(self.statuses.len())));
            params.extend(self.statuses.iter().map(|s| Param::Int(s.code())));
        }

        let mut sql = format!(
            r#"SELECT recording_date, case_no, camera_name, value, size_mb, comments FROM "{table}""#
        );
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY recording_date, case_no, camera_name");
        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            params.push(Param::Int(i64::from(limit)));
        }

        Ok((sql, params))
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl ScalpelDb {
    /// Run a [`StatusQuery`] against a status table.
    pub async fn query_status(&self, table: &str, query: &StatusQuery) -> Result<Vec<StatusRow>> {
        let (sql, params) = query.build(table)?;

        let mut args = SqliteArguments::default();
        for param in params {
            let added = match param {
                Param::Text(s) => args.add(s),
                Param::Int(i) => args.add(i),
            };
            added.map_err(|e| DbError::invalid_input(e.to_string()))?;
        }

        debug!(table, sql = %sql, "Running status query");
        let rows = sqlx::query_with(&sql, args).fetch_all(&self.pool).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_status(row) {
                Some(status) => out.push(status),
                None => warn!(table, "Skipping status row that does not decode"),
            }
        }
        Ok(out)
    }
}
