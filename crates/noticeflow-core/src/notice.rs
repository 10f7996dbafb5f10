//! Structured fields extracted from a single regulatory notice.
//!
//! The text oracle returns a [`RawNoticeExtract`] with dates still as
//! strings. [`NoticeRecord::from_raw`] normalises it: dates that fail to
//! parse as `YYYY-mm-dd`, malformed email addresses, blank strings and
//! negative fines all become absent rather than partial values.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Date format the extraction prompt asks the model to emit.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

/// Extraction result as produced by the model, before normalisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawNoticeExtract {
    pub date_of_notice_str: Option<String>,
    pub entity_name: Option<String>,
    pub entity_phone: Option<String>,
    pub entity_email: Option<String>,
    pub project_id: Option<i64>,
    pub site_location: Option<String>,
    pub violation_type: Option<String>,
    pub required_changes: Option<String>,
    pub compliance_deadline_str: Option<String>,
    pub max_potential_fine: Option<f64>,
}

/// Normalised notice fields. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoticeRecord {
    pub date_of_notice: Option<NaiveDate>,
    pub entity_name: Option<String>,
    pub entity_phone: Option<String>,
    pub entity_email: Option<String>,
    pub project_id: Option<i64>,
    pub site_location: Option<String>,
    pub violation_type: Option<String>,
    pub required_changes: Option<String>,
    pub compliance_deadline: Option<NaiveDate>,
    pub max_potential_fine: Option<f64>,
}

impl NoticeRecord {
    pub fn from_raw(raw: RawNoticeExtract) -> Self {
        Self {
            date_of_notice: parse_date(raw.date_of_notice_str.as_deref()),
            entity_name: non_blank(raw.entity_name),
            entity_phone: non_blank(raw.entity_phone),
            entity_email: valid_email(raw.entity_email),
            project_id: raw.project_id,
            site_location: non_blank(raw.site_location),
            violation_type: non_blank(raw.violation_type),
            required_changes: non_blank(raw.required_changes),
            compliance_deadline: parse_date(raw.compliance_deadline_str.as_deref()),
            max_potential_fine: raw
                .max_potential_fine
                .filter(|fine| fine.is_finite() && *fine >= 0.0),
        }
    }

    /// True when no field could be extracted.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Parse a `YYYY-mm-dd` date. Anything else is absent.
pub fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }
    match NaiveDate::parse_from_str(s, DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(e) => {
            debug!(value = %s, error = %e, "discarding unparsable date");
            None
        }
    }
}

/// Syntactic email check used for extracted sender addresses.
pub fn is_valid_email(s: &str) -> bool {
    EMAIL.is_match(s)
}

fn valid_email(raw: Option<String>) -> Option<String> {
    let email = non_blank(raw)?;
    if is_valid_email(&email) {
        Some(email)
    } else {
        debug!(value = %email, "discarding malformed email");
        None
    }
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
