//! The on-disk recording layout: `<root>/DATA_YY-MM-DD/CaseN/<Camera>/`.
//!
//! Parsing and formatting live together so the scanner and the path mapper
//! can never disagree about a directory name.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use scalpel_db::Camera;
use std::path::{Path, PathBuf};

const DATE_DIR_PATTERN: &str = r"^DATA_(\d{2})-(\d{2})-(\d{2})$";
const CASE_DIR_PATTERN: &str = r"^Case(\d+)$";

/// Two-digit years up to this value belong to the 2000s.
pub const YEAR_PIVOT: u32 = 69;

/// Why a directory name did not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// Does not have the `DATA_YY-MM-DD` / `CaseN` shape at all
    Pattern,
    /// Has the right shape but names a day that does not exist
    Calendar,
    /// Case number does not fit
    CaseNumber,
}

/// Compiled directory-name patterns.
#[derive(Debug, Clone)]
pub struct DirLayout {
    date_dir: Regex,
    case_dir: Regex,
}

impl DirLayout {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            date_dir: Regex::new(DATE_DIR_PATTERN)?,
            case_dir: Regex::new(CASE_DIR_PATTERN)?,
        })
    }

    /// `DATA_24-01-15` -> 2024-01-15, `DATA_98-12-31` -> 1998-12-31.
    pub fn parse_date_dir(&self, name: &str) -> Result<NaiveDate, NameError> {
        let caps = self.date_dir.captures(name).ok_or(NameError::Pattern)?;
        let field = |i: usize| -> Result<u32, NameError> {
            caps.get(i)
                .and_then(|m| m.as_str().parse().ok())
                .ok_or(NameError::Pattern)
        };
        let year = expand_year(field(1)?);
        NaiveDate::from_ymd_opt(year, field(2)?, field(3)?).ok_or(NameError::Calendar)
    }

    /// `Case7` -> 7.
    pub fn parse_case_dir(&self, name: &str) -> Result<u32, NameError> {
        let caps = self.case_dir.captures(name).ok_or(NameError::Pattern)?;
        caps.get(1)
            .ok_or(NameError::Pattern)?
            .as_str()
            .parse()
            .map_err(|_| NameError::CaseNumber)
    }
}

pub fn expand_year(yy: u32) -> i32 {
    let yy = yy as i32;
    if yy <= YEAR_PIVOT as i32 {
        2000 + yy
    } else {
        1900 + yy
    }
}

/// Directory name for a recording date. Only the last two digits of the
/// year are kept.
pub fn date_dir_name(date: NaiveDate) -> String {
    format!(
        "DATA_{:02}-{:02}-{:02}",
        date.year().rem_euclid(100),
        date.month(),
        date.day()
    )
}

pub fn case_dir_name(case_no: u32) -> String {
    format!("Case{}", case_no)
}

/// `<root>/DATA_YY-MM-DD/CaseN`
pub fn case_dir(root: &Path, date: NaiveDate, case_no: u32) -> PathBuf {
    root.join(date_dir_name(date)).join(case_dir_name(case_no))
}

/// `<root>/DATA_YY-MM-DD/CaseN/<Camera>`
pub fn camera_dir(root: &Path, date: NaiveDate, case_no: u32, camera: Camera) -> PathBuf {
    case_dir(root, date, case_no).join(camera.as_str())
}
