//! Persistence seam shared by the scan flow, reports and admin handlers.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::error::{DatabaseError, ErrorKind};
use thiserror::Error;

use crate::model::{
    attendance::{AttendanceEntry, AttendanceRecord, NewAttendanceRecord, Page, RecordFilter},
    identity::{Identity, IdentityFilter, NewIdentity},
    meal::{MealScan, NewMealScan},
    user::{NewUser, User},
};

mod memory;
mod mysql;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated")]
    Conflict,

    #[error("row not found")]
    NotFound,

    /// Connection, pool or I/O failure; worth retrying.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Row could not be mapped to a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("storage error")]
    Sql(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => return Self::NotFound,
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_) => return Self::Unavailable(error.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                return Self::Corrupt(error.to_string());
            }
            _ => {}
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::UniqueViolation) => Self::Conflict,
            _ => Self::Sql(error),
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // identities

    async fn create_identity(&self, identity: NewIdentity) -> Result<Identity, StoreError>;

    async fn find_identity(&self, id: u64) -> Result<Option<Identity>, StoreError>;

    /// Lookup used by QR resolution; matricules are unique across kinds.
    async fn find_identity_by_matricule(
        &self,
        matricule: &str,
    ) -> Result<Option<Identity>, StoreError>;

    async fn list_identities(
        &self,
        filter: &IdentityFilter,
        page: Option<Page>,
    ) -> Result<Vec<Identity>, StoreError>;

    async fn count_identities(&self, filter: &IdentityFilter) -> Result<u64, StoreError>;

    /// Returns `false` when no identity has this id.
    async fn set_identity_active(&self, id: u64, active: bool) -> Result<bool, StoreError>;

    // attendance

    async fn find_attendance_record(
        &self,
        owner_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    /// Atomic insert. Fails with [`StoreError::Conflict`] when a record for
    /// (owner, date) already exists.
    async fn create_attendance_record(
        &self,
        record: NewAttendanceRecord,
    ) -> Result<AttendanceRecord, StoreError>;

    /// Sets `check_out` only if it is still unset and strictly after
    /// `check_in`. Returns the updated record, or `None` when the condition
    /// did not hold.
    async fn update_attendance_record_check_out(
        &self,
        record_id: u64,
        check_out: DateTime<Utc>,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    async fn list_attendance_entries(
        &self,
        filter: &RecordFilter,
        page: Option<Page>,
    ) -> Result<Vec<AttendanceEntry>, StoreError>;

    async fn count_attendance_entries(&self, filter: &RecordFilter) -> Result<u64, StoreError>;

    // meals

    /// Fails with [`StoreError::Conflict`] on a second scan of the same meal.
    async fn create_meal_scan(&self, scan: NewMealScan) -> Result<MealScan, StoreError>;

    async fn list_meal_scans(&self, date: NaiveDate) -> Result<Vec<MealScan>, StoreError>;

    // operators

    async fn create_user(&self, user: NewUser) -> Result<u64, StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Returns `false` when no such user exists.
    async fn set_user_active(&self, id: u64, active: bool) -> Result<bool, StoreError>;

    async fn store_refresh_token(
        &self,
        user_id: u64,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Revokes an active token. Returns `false` if it was unknown or already
    /// revoked, which makes every refresh token single-use.
    async fn revoke_refresh_token(&self, jti: &str) -> Result<bool, StoreError>;
}
