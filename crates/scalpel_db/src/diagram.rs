//! Schema export in dbdiagram.io DSL.

use crate::error::Result;
use crate::types::ColumnInfo;
use crate::ScalpelDb;
use chrono::NaiveDate;
use std::fmt::Write as _;

/// Known tables, in the order they are drawn, with their notes.
const TABLE_NOTES: &[(&str, &str)] = &[
    ("analysis_information", "Per case labeling metadata"),
    ("anesthetic", "Anesthetist roster"),
    (
        "recording_details",
        "Authoritative case list, parent for case scoped tables",
    ),
    (
        "mp4_status",
        "MP4 export status per camera. 1 complete, 2 under threshold, 3 missing",
    ),
    (
        "seq_status",
        "SEQ recording status per camera. 1 complete, 2 under threshold, 3 missing",
    ),
];

impl ScalpelDb {
    /// Render every user table as dbdiagram.io DSL.
    ///
    /// Known tables come first in a fixed order, any others follow by name.
    pub async fn export_dbdiagram(&self, exported_on: NaiveDate) -> Result<String> {
        let tables = self.list_tables().await?;
        let mut ordered: Vec<&str> = TABLE_NOTES
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| tables.iter().any(|t| t == name))
            .collect();
        ordered.extend(
            tables
                .iter()
                .map(String::as_str)
                .filter(|t| !TABLE_NOTES.iter().any(|(name, _)| name == t)),
        );

        let mut out = String::new();
        let _ = writeln!(out, "//// ScalpelLab Database, exported {}", exported_on.format("%Y-%m-%d"));
        let _ = writeln!(out, "//// Paste into https://dbdiagram.io");
        out.push('\n');

        let mut refs = Vec::new();
        for table in &ordered {
            let columns = self.table_schema(table).await?;
            render_table(&mut out, table, &columns);

            for fk in self.foreign_keys(table).await? {
                let target = match fk.to {
                    Some(to) => to,
                    None => self.primary_key_of(&fk.table).await?,
                };
                refs.push(format!("Ref: {}.{} > {}.{}", table, fk.from, fk.table, target));
            }
        }

        if refs.is_empty() {
            out.push_str("// No foreign key relationships detected in database schema\n");
        } else {
            out.push_str("// Relationships detected from database:\n");
            for line in refs {
                out.push_str(&line);
                out.push('\n');
            }
        }
        Ok(out)
    }

    async fn primary_key_of(&self, table: &str) -> Result<String> {
        let pk: Option<String> = sqlx::query_scalar(&format!(
            "SELECT name FROM pragma_table_info({}) WHERE pk = 1",
            quote_literal(table)
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(pk.unwrap_or_else(|| "rowid".to_string()))
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn dbdiagram_type(decl: &str) -> &'static str {
    let decl = decl.to_ascii_uppercase();
    if decl.contains("INT") {
        "int"
    } else if decl.contains("REAL") || decl.contains("FLOA") || decl.contains("DOUB") {
        "decimal"
    } else {
        "varchar"
    }
}

fn render_table(out: &mut String, table: &str, columns: &[ColumnInfo]) {
    let _ = writeln!(out, "Table {} {{", table);
    for col in columns {
        let mut line = format!("  {:<20} {}", col.name, dbdiagram_type(&col.decl_type));
        let mut constraints = Vec::new();
        if col.pk > 0 {
            constraints.push("pk".to_string());
        }
        if col.not_null && col.pk == 0 {
            constraints.push("not null".to_string());
        }
        if let Some(default) = &col.default_value {
            constraints.push(format!("default: {}", default));
        }
        if !constraints.is_empty() {
            let _ = write!(line, " [{}]", constraints.join(", "));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    if let Some((_, note)) = TABLE_NOTES.iter().find(|(name, _)| *name == table) {
        let _ = writeln!(out, "  Note: '{}'", note);
    }
    out.push_str("}\n\n");
}
