//! Scan resolution and the daily check-in/check-out state machine.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::StoreError;

pub mod meal;
pub mod payload;
pub mod policy;
pub mod resolver;
pub mod service;

pub use resolver::IdentityResolver;
pub use service::{AttendanceService, ScanOutcome, Transition};

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("invalid QR code")]
    InvalidPayload,

    #[error("no identity matches this QR code")]
    IdentityNotFound,

    #[error("identity is inactive")]
    InactiveIdentity,

    #[error("identity is not eligible for this scan")]
    NotEligible,

    /// Check-out at or before check-in; the record is left untouched.
    #[error("check-out at {attempted} is not after check-in at {check_in}")]
    CheckOutNotAfterCheckIn {
        check_in: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },

    #[error("storage unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error(transparent)]
    Storage(StoreError),
}

impl From<StoreError> for AttendanceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable(reason) => Self::PersistenceUnavailable(reason),
            other => Self::Storage(other),
        }
    }
}
