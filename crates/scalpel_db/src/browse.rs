//! Generic table browsing used by the dashboard and the path mapper.
//!
//! Table and view names accepted here must exist in `sqlite_master`; they are
//! quoted before interpolation.

use crate::error::{DbError, Result};
use crate::sql_guard::{strip_trailing_semicolon, validate_read_only};
use crate::types::{ColumnInfo, ForeignKey, TableRows};
use crate::ScalpelDb;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Arguments, Column, Executor, Row, Statement, TypeInfo, ValueRef};
use tracing::debug;

/// Default and maximum row count for browsing.
pub const DEFAULT_BROWSE_LIMIT: u32 = 500;
pub const MAX_BROWSE_LIMIT: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectKind {
    Table,
    View,
}

impl ScalpelDb {
    /// User tables, excluding SQLite internals.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.list_objects("table").await
    }

    pub async fn list_views(&self) -> Result<Vec<String>> {
        self.list_objects("view").await
    }

    async fn list_objects(&self, kind: &str) -> Result<Vec<String>> {
        let names = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = ? AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn object_kind(&self, name: &str) -> Result<ObjectKind> {
        let kind: Option<String> = sqlx::query_scalar(
            "SELECT type FROM sqlite_master WHERE name = ? AND type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match kind.as_deref() {
            Some("table") => Ok(ObjectKind::Table),
            Some("view") => Ok(ObjectKind::View),
            _ => Err(DbError::not_found(format!("No table or view named '{}'", name))),
        }
    }

    /// Column metadata of a table or view.
    pub async fn table_schema(&self, name: &str) -> Result<Vec<ColumnInfo>> {
        self.object_kind(name).await?;
        let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(name)))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(ColumnInfo {
                    cid: row.try_get("cid")?,
                    name: row.try_get("name")?,
                    decl_type: row.try_get::<Option<String>, _>("type")?.unwrap_or_default(),
                    not_null: row.try_get::<i64, _>("notnull")? != 0,
                    default_value: row.try_get("dflt_value")?,
                    pk: row.try_get("pk")?,
                })
            })
            .collect()
    }

    /// Outgoing foreign keys of a table.
    pub async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        self.object_kind(table).await?;
        let rows = sqlx::query(&format!("PRAGMA foreign_key_list({})", quote_ident(table)))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(ForeignKey {
                    from: row.try_get("from")?,
                    table: row.try_get("table")?,
                    to: row.try_get("to")?,
                })
            })
            .collect()
    }

    /// Rows of a table or view, optionally filtered by a case-insensitive
    /// substring matched against every column.
    pub async fn browse_rows(
        &self,
        name: &str,
        search: Option<&str>,
        limit: Option<u32>,
    ) -> Result<TableRows> {
        let columns: Vec<String> = self
            .table_schema(name)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        let limit = limit.unwrap_or(DEFAULT_BROWSE_LIMIT).clamp(1, MAX_BROWSE_LIMIT);

        let mut sql = format!("SELECT * FROM {}", quote_ident(name));
        let mut args = SqliteArguments::default();
        let needle = search.map(str::trim).filter(|s| !s.is_empty());

        if let Some(needle) = needle {
            let pattern = format!("%{}%", escape_like(needle));
            let clauses: Vec<String> = columns
                .iter()
                .map(|c| format!("CAST({} AS TEXT) LIKE ? ESCAPE '\\'", quote_ident(c)))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" OR "));
            for _ in &columns {
                args.add(pattern.clone()).map_err(DbError::invalid_input_boxed)?;
            }
        }
        sql.push_str(" LIMIT ?");
        args.add(i64::from(limit)).map_err(DbError::invalid_input_boxed)?;

        debug!(table = name, search = ?needle, limit, "Browsing rows");
        let rows = sqlx::query_with(&sql, args).fetch_all(&self.pool).await?;

        Ok(TableRows {
            columns,
            rows: rows.iter().map(row_to_json).collect::<Result<_>>()?,
        })
    }

    /// Insert one row into a table from a JSON object.
    ///
    /// Keys must be existing column names; values must be scalars.
    pub async fn insert_row(&self, table: &str, values: &Map<String, Value>) -> Result<u64> {
        if self.object_kind(table).await? != ObjectKind::Table {
            return Err(DbError::invalid_input(format!("'{}' is a view, not a table", table)));
        }
        if values.is_empty() {
            return Err(DbError::invalid_input("No values to insert"));
        }

        let columns: Vec<String> = self
            .table_schema(table)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        if let Some(unknown) = values.keys().find(|k| !columns.contains(k)) {
            return Err(DbError::invalid_input(format!(
                "Unknown column '{}' for table '{}'",
                unknown, table
            )));
        }

        let mut args = SqliteArguments::default();
        for (column, value) in values {
            bind_json(&mut args, column, value)?;
        }
        let names: Vec<String> = values.keys().map(|k| quote_ident(k)).collect();
        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            names.join(", "),
            placeholders
        );

        let result = sqlx::query_with(&sql, args).execute(&self.pool).await;
        let done = result.map_err(|err| {
            let err = DbError::from(err);
            if err.is_constraint_violation() {
                DbError::constraint(format!("{}: {}", table, err))
            } else {
                err
            }
        })?;
        debug!(table, rows = done.rows_affected(), "Row inserted");
        Ok(done.rows_affected())
    }

    /// Run a guarded read-only query and collect every row.
    ///
    /// Column names come from the prepared statement, so they are known even
    /// when the query returns no rows.
    pub async fn query_rows(&self, sql: &str) -> Result<TableRows> {
        validate_read_only(sql)?;
        let sql = strip_trailing_semicolon(sql);

        let statement = self.pool.prepare(sql).await?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        debug!(columns = columns.len(), rows = rows.len(), "Read-only query executed");

        Ok(TableRows {
            columns,
            rows: rows.iter().map(row_to_json).collect::<Result<_>>()?,
        })
    }
}

impl DbError {
    fn invalid_input_boxed(err: sqlx::error::BoxDynError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// Double-quote an identifier, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn bind_json(args: &mut SqliteArguments<'_>, column: &str, value: &Value) -> Result<()> {
    let added = match value {
        Value::Null => args.add(Option::<String>::None),
        Value::Bool(b) => args.add(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => args.add(i),
            None => args.add(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => args.add(s.clone()),
        Value::Array(_) | Value::Object(_) => {
            return Err(DbError::invalid_input(format!(
                "Column '{}' needs a scalar value",
                column
            )))
        }
    };
    added.map_err(DbError::invalid_input_boxed)
}

/// Decode a row into JSON values using each value's storage class.
pub(crate) fn row_to_json(row: &SqliteRow) -> Result<Vec<Value>> {
    let mut out = Vec::with_capacity(row.columns().len());
    for index in 0..row.columns().len() {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            out.push(Value::Null);
            continue;
        }
        let storage = raw.type_info().name().to_ascii_uppercase();
        let value = match storage.as_str() {
            "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
            "REAL" | "NUMERIC" => Value::from(row.try_get_unchecked::<f64, _>(index)?),
            "BLOB" => {
                let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
                Value::from(format!("<blob {} bytes>", bytes.len()))
            }
            _ => Value::from(row.try_get_unchecked::<String, _>(index)?),
        };
        out.push(value);
    }
    Ok(out)
}
