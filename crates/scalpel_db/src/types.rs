//! Types for every entity stored in the ScalpelLab database.
//!
//! These types are the single source of truth. The CLI, the dashboard and
//! the reconciler all go through them.

use crate::error::{DbError, Result};
use crate::seniority::Seniority;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Date format used for every `*_date` TEXT column.
pub const SQL_DATE_FORMAT: &str = "%Y-%m-%d";

pub fn date_to_sql(date: NaiveDate) -> String {
    date.format(SQL_DATE_FORMAT).to_string()
}

/// Strict `YYYY-MM-DD`: four-digit year, zero-padded month and day.
///
/// chrono's `%Y` alone would read `24-01-15` as the year 24.
pub fn parse_sql_date(value: &str) -> Result<NaiveDate> {
    let bad = || DbError::invalid_input(format!("Bad date '{}', expected YYYY-MM-DD", value));
    let text = value.trim();
    let shaped = text.len() == 10
        && text.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shaped {
        return Err(bad());
    }
    NaiveDate::parse_from_str(text, SQL_DATE_FORMAT).map_err(|_| bad())
}

/// Serde adapter for `NaiveDate` fields: `#[serde(with = "sql_date")]`.
pub mod sql_date {
    use super::{date_to_sql, parse_sql_date};
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date_to_sql(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_sql_date(&text).map_err(serde::de::Error::custom)
    }

    /// Same, for `Option<NaiveDate>`. Pair with `#[serde(default)]`.
    pub mod option {
        use super::{date_to_sql, parse_sql_date};
        use chrono::NaiveDate;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            date: &Option<NaiveDate>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match date {
                Some(d) => serializer.serialize_some(&date_to_sql(*d)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDate>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(text) => parse_sql_date(&text)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

// ============================================================================
// Cameras & status codes
// ============================================================================

/// One of the eight fixed video/data sources of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Camera {
    #[serde(rename = "Cart_Center_2")]
    CartCenter2,
    #[serde(rename = "Cart_LT_4")]
    CartLt4,
    #[serde(rename = "Cart_RT_1")]
    CartRt1,
    #[serde(rename = "General_3")]
    General3,
    Monitor,
    #[serde(rename = "Patient_Monitor")]
    PatientMonitor,
    #[serde(rename = "Ventilator_Monitor")]
    VentilatorMonitor,
    #[serde(rename = "Injection_Port")]
    InjectionPort,
}

impl Camera {
    pub const ALL: [Camera; 8] = [
        Camera::CartCenter2,
        Camera::CartLt4,
        Camera::CartRt1,
        Camera::General3,
        Camera::Monitor,
        Camera::PatientMonitor,
        Camera::VentilatorMonitor,
        Camera::InjectionPort,
    ];

    /// Directory and `camera_name` column spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CartCenter2 => "Cart_Center_2",
            Self::CartLt4 => "Cart_LT_4",
            Self::CartRt1 => "Cart_RT_1",
            Self::General3 => "General_3",
            Self::Monitor => "Monitor",
            Self::PatientMonitor => "Patient_Monitor",
            Self::VentilatorMonitor => "Ventilator_Monitor",
            Self::InjectionPort => "Injection_Port",
        }
    }

    /// Exact match on the directory spelling.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl std::fmt::Display for Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Camera {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s.trim()).ok_or_else(|| {
            DbError::invalid_input(format!(
                "Unknown camera '{}'. Expected one of: {}",
                s,
                Camera::ALL.map(|c| c.as_str()).join(", ")
            ))
        })
    }
}

/// Classification of one camera's file set. Stored in the `value` column.
///
/// Serialized by lowercase name. Deserializes from the name or from the
/// stored integer code, so `3` and `"missing"` are the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusCode {
    /// At least one file at or above the size threshold
    Complete,
    /// Files exist but all are below the threshold
    Incomplete,
    /// No matching files
    Missing,
}

impl StatusCode {
    pub const ALL: [StatusCode; 3] = [Self::Complete, Self::Incomplete, Self::Missing];

    pub fn code(&self) -> i64 {
        match self {
            Self::Complete => 1,
            Self::Incomplete => 2,
            Self::Missing => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Complete),
            2 => Some(Self::Incomplete),
            3 => Some(Self::Missing),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Complete => "Complete",
            Self::Incomplete => "Incomplete",
            Self::Missing => "Missing",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code(), self.label())
    }
}

impl Serialize for StatusCode {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label().to_ascii_lowercase())
    }
}

impl<'de> Deserialize<'de> for StatusCode {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Code(i64),
            Name(String),
        }

        let parsed = match Repr::deserialize(deserializer)? {
            Repr::Code(code) => Self::from_code(code),
            Repr::Name(name) => Self::ALL
                .into_iter()
                .find(|s| s.label().eq_ignore_ascii_case(name.trim())),
        };
        parsed.ok_or_else(|| {
            serde::de::Error::custom("status must be 1, 2, 3 or complete / incomplete / missing")
        })
    }
}

/// Which file tree / status table a run is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Mp4,
    Seq,
}

impl StatusKind {
    pub fn default_table(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4_status",
            Self::Seq => "seq_status",
        }
    }

    /// File extension the scanner looks for, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Seq => "seq",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Some(Self::Mp4),
            "seq" => Some(Self::Seq),
            _ => None,
        }
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

// ============================================================================
// Status rows
// ============================================================================

/// Primary key of a status row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StatusKey {
    #[serde(with = "sql_date")]
    pub recording_date: NaiveDate,
    pub case_no: u32,
    pub camera: Camera,
}

impl StatusKey {
    pub fn new(recording_date: NaiveDate, case_no: u32, camera: Camera) -> Self {
        Self {
            recording_date,
            case_no,
            camera,
        }
    }
}

impl std::fmt::Display for StatusKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Case{} {}",
            date_to_sql(self.recording_date),
            self.case_no,
            self.camera
        )
    }
}

/// A classified row ready to be written by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub key: StatusKey,
    pub status: StatusCode,
    pub size_mb: u64,
    /// When set, replaces the stored comment. When `None` the stored comment is kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

/// A row as stored in a status table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRow {
    pub key: StatusKey,
    pub status: StatusCode,
    pub size_mb: Option<i64>,
    pub comments: Option<String>,
}

/// Manual edit coming from the dashboard. `None` fields are left as they are.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusEdit {
    #[serde(default)]
    pub value: Option<StatusCode>,
    #[serde(default)]
    pub size_mb: Option<i64>,
    /// An empty string clears the comment.
    #[serde(default)]
    pub comments: Option<String>,
}

/// Old and new values of a row whose status or size changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub key: StatusKey,
    pub old_status: StatusCode,
    pub old_size_mb: Option<i64>,
    pub new_status: StatusCode,
    pub new_size_mb: u64,
}

/// What a batch would do (or did) to a status table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusDiff {
    pub inserted: Vec<StatusRecord>,
    pub changed: Vec<StatusChange>,
    pub unchanged: usize,
}

impl StatusDiff {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.changed.is_empty()
    }
}

/// Counts reported after a committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Per-camera distribution of status codes in one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CameraCounts {
    pub camera: String,
    pub complete: u64,
    pub incomplete: u64,
    pub missing: u64,
}

impl CameraCounts {
    pub fn total(&self) -> u64 {
        self.complete + self.incomplete + self.missing
    }

    pub(crate) fn add(&mut self, status: StatusCode, count: u64) {
        match status {
            StatusCode::Complete => self.complete += count,
            StatusCode::Incomplete => self.incomplete += count,
            StatusCode::Missing => self.missing += count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub table: String,
    pub total_cases: u64,
    pub cameras: Vec<CameraCounts>,
    pub totals: CameraCounts,
}

// ============================================================================
// Recordings, anesthetists, analysis
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anesthetist {
    pub anesthetic_key: i64,
    pub name: String,
    pub code: Option<String>,
    #[serde(with = "sql_date")]
    pub start_date: NaiveDate,
    /// Promotion date
    #[serde(default, with = "sql_date::option")]
    pub grade_a_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAnesthetist {
    /// Assigned as MAX(anesthetic_key) + 1 when absent
    #[serde(default)]
    pub anesthetic_key: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(with = "sql_date")]
    pub start_date: NaiveDate,
    #[serde(default, with = "sql_date::option")]
    pub grade_a_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    #[serde(with = "sql_date")]
    pub recording_date: NaiveDate,
    pub case_no: u32,
    pub signature_time: Option<String>,
    pub anesthetic_key: Option<i64>,
    /// Seniority of the anesthetist on the recording date
    pub anesthetic_seniority: Option<Seniority>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecording {
    #[serde(with = "sql_date")]
    pub recording_date: NaiveDate,
    pub case_no: u32,
    #[serde(default)]
    pub signature_time: Option<String>,
    #[serde(default)]
    pub anesthetic_key: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisInfo {
    #[serde(with = "sql_date")]
    pub recording_date: NaiveDate,
    pub case_no: u32,
    #[serde(default)]
    pub label_by: Option<String>,
}

// ============================================================================
// Generic browsing
// ============================================================================

/// One row of `PRAGMA table_info`.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    pub decl_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    /// 1-based position in the primary key, 0 when not part of it
    pub pk: i64,
}

/// One row of `PRAGMA foreign_key_list`.
#[derive(Debug, Clone, Serialize)]
pub struct ForeignKey {
    pub from: String,
    pub table: String,
    pub to: Option<String>,
}

/// Column names plus rows of JSON values, for anything shown generically.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl TableRows {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}
