use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::identity::IdentityKind;

/// One row per (owner, calendar day). A row only exists once the owner has
/// checked in, so `check_in` and `is_late` are always set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = 10)]
    pub id: u64,

    #[schema(example = 1)]
    pub owner_id: u64,

    #[schema(example = "2026-03-02", format = "date", value_type = String)]
    pub date: NaiveDate,

    #[schema(example = "2026-03-02T08:55:00Z", format = "date-time", value_type = String)]
    pub check_in: DateTime<Utc>,

    #[schema(example = false)]
    pub is_late: bool,

    #[schema(example = "2026-03-02T17:00:00Z", format = "date-time", value_type = String, nullable = true)]
    pub check_out: Option<DateTime<Utc>>,
}

impl AttendanceRecord {
    pub fn state(&self) -> AttendanceState {
        match self.check_out {
            Some(_) => AttendanceState::CheckedOut,
            None => AttendanceState::CheckedIn,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAttendanceRecord {
    pub owner_id: u64,
    pub date: NaiveDate,
    pub check_in: DateTime<Utc>,
    pub is_late: bool,
}

/// Daily state of one owner.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AttendanceState {
    NoRecord,
    CheckedIn,
    CheckedOut,
}

impl AttendanceState {
    pub fn of(record: Option<&AttendanceRecord>) -> Self {
        record.map_or(AttendanceState::NoRecord, AttendanceRecord::state)
    }
}

/// A record joined with the identity columns reports and exports need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceEntry {
    #[serde(flatten)]
    pub record: AttendanceRecord,

    pub kind: IdentityKind,

    #[schema(example = "APP-2026-0001")]
    pub matricule: String,

    #[schema(example = "Awa")]
    pub first_name: String,

    #[schema(example = "Diop")]
    pub last_name: String,

    #[schema(example = 4, nullable = true)]
    pub cohort_id: Option<u64>,
}

/// Inclusive day range plus identity filters.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub kind: Option<IdentityKind>,
    pub cohort_id: Option<u64>,
}

impl RecordFilter {
    pub fn day(date: NaiveDate) -> Self {
        Self {
            from: date,
            to: date,
            kind: None,
            cohort_id: None,
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

impl Page {
    /// 1-based page number, `per_page` clamped to 1..=100.
    /// `None` when the page lies beyond any addressable offset.
    pub fn new(page: Option<u64>, per_page: Option<u64>) -> Option<Self> {
        let per_page = per_page.unwrap_or(20).clamp(1, 100);
        let page = page.unwrap_or(1).max(1);
        let offset = (page - 1).checked_mul(per_page)?;
        // MySQL binds LIMIT/OFFSET as signed 64-bit
        i64::try_from(offset).ok()?;
        Some(Self {
            limit: per_page,
            offset,
        })
    }

    pub fn number(&self) -> u64 {
        self.offset / self.limit + 1
    }
}
