//! Read-only views over attendance records.

use chrono::NaiveDate;
use thiserror::Error;

use crate::store::StoreError;

pub mod csv;
pub mod service;
pub mod summary;

pub use service::{ReportQuery, ReportService};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("`from` ({from}) is after `to` ({to})")]
    InvalidRange { from: NaiveDate, to: NaiveDate },

    #[error("range of {days} days exceeds the {max}-day limit")]
    RangeTooLong { days: i64, max: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}
