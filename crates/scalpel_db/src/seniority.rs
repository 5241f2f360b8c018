//! Anesthetist seniority.
//!
//! Seniority is derived from the anesthetist's start date and a reference
//! date, never from the wall clock, so snapshots taken at recording time stay
//! reproducible.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Whole months after which a resident is counted as an attending.
pub const ATTENDING_AFTER_MONTHS: i32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Seniority {
    Resident,
    Attending,
}

impl Seniority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resident => "Resident",
            Self::Attending => "Attending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resident" => Some(Self::Resident),
            "attending" => Some(Self::Attending),
            _ => None,
        }
    }
}

impl std::fmt::Display for Seniority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whole calendar months elapsed from `start` to `reference`.
///
/// Negative when `reference` is before `start`.
pub fn months_between(start: NaiveDate, reference: NaiveDate) -> i32 {
    let mut months =
        (reference.year() - start.year()) * 12 + reference.month() as i32 - start.month() as i32;
    if months > 0 && reference.day() < start.day() {
        months -= 1;
    } else if months < 0 && reference.day() > start.day() {
        months += 1;
    }
    months
}

/// Seniority of someone who started on `start_date`, as of `reference_date`.
pub fn seniority_at(start_date: NaiveDate, reference_date: NaiveDate) -> Seniority {
    if months_between(start_date, reference_date) > ATTENDING_AFTER_MONTHS {
        Seniority::Attending
    } else {
        Seniority::Resident
    }
}
