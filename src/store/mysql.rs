use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, MySql, MySqlPool, Row, mysql::MySqlRow, query::QueryAs};

use super::{Store, StoreError};
use crate::model::{
    attendance::{AttendanceEntry, AttendanceRecord, NewAttendanceRecord, Page, RecordFilter},
    identity::{Identity, IdentityFilter, IdentityKind, NewIdentity},
    meal::{MealKind, MealScan, NewMealScan},
    role::Role,
    user::{NewUser, User},
};

const IDENTITY_COLUMNS: &str = "id, kind, matricule, first_name, last_name, email, cohort_id, \
                                active, qr_payload, created_at";

const RECORD_COLUMNS: &str = "id, owner_id, date, check_in, is_late, check_out";

const ENTRY_SELECT: &str = r#"
    SELECT a.id, a.owner_id, a.date, a.check_in, a.is_late, a.check_out,
           i.kind, i.matricule, i.first_name, i.last_name, i.cohort_id
    FROM attendance_records a
    JOIN identities i ON i.id = a.owner_id
"#;

/// MySQL-backed store. Uniqueness lives in the schema's unique indexes.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    Str(&'static str),
    Bool(bool),
    Date(NaiveDate),
}

fn bind_all<'q, O>(
    mut query: QueryAs<'q, MySql, O, sqlx::mysql::MySqlArguments>,
    args: &[FilterValue],
) -> QueryAs<'q, MySql, O, sqlx::mysql::MySqlArguments> {
    for arg in args {
        query = match arg {
            FilterValue::U64(v) => query.bind(*v),
            FilterValue::Str(s) => query.bind(*s),
            FilterValue::Bool(b) => query.bind(*b),
            FilterValue::Date(d) => query.bind(*d),
        };
    }
    query
}

fn identity_where(filter: &IdentityFilter) -> (String, Vec<FilterValue>) {
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args = Vec::new();

    if let Some(kind) = filter.kind {
        where_sql.push_str(" AND kind = ?");
        args.push(FilterValue::Str(kind_str(kind)));
    }
    if let Some(cohort_id) = filter.cohort_id {
        where_sql.push_str(" AND cohort_id = ?");
        args.push(FilterValue::U64(cohort_id));
    }
    if let Some(active) = filter.active {
        where_sql.push_str(" AND active = ?");
        args.push(FilterValue::Bool(active));
    }

    (where_sql, args)
}

fn record_where(filter: &RecordFilter) -> (String, Vec<FilterValue>) {
    let mut where_sql = String::from(" WHERE a.date BETWEEN ? AND ?");
    let mut args = vec![FilterValue::Date(filter.from), FilterValue::Date(filter.to)];

    if let Some(kind) = filter.kind {
        where_sql.push_str(" AND i.kind = ?");
        args.push(FilterValue::Str(kind_str(kind)));
    }
    if let Some(cohort_id) = filter.cohort_id {
        where_sql.push_str(" AND i.cohort_id = ?");
        args.push(FilterValue::U64(cohort_id));
    }

    (where_sql, args)
}

fn kind_str(kind: IdentityKind) -> &'static str {
    match kind {
        IdentityKind::Learner => "learner",
        IdentityKind::Coach => "coach",
    }
}

fn decode_err(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unexpected value {value:?}").into(),
    }
}

fn parse_kind(row: &MySqlRow) -> sqlx::Result<IdentityKind> {
    let raw: String = row.try_get("kind")?;
    IdentityKind::from_str(&raw).map_err(|_| decode_err("kind", &raw))
}

impl<'r> FromRow<'r, MySqlRow> for Identity {
    fn from_row(row: &'r MySqlRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            kind: parse_kind(row)?,
            matricule: row.try_get("matricule")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            cohort_id: row.try_get("cohort_id")?,
            active: row.try_get("active")?,
            qr_payload: row.try_get("qr_payload")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> FromRow<'r, MySqlRow> for AttendanceRecord {
    fn from_row(row: &'r MySqlRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            date: row.try_get("date")?,
            check_in: row.try_get("check_in")?,
            is_late: row.try_get("is_late")?,
            check_out: row.try_get("check_out")?,
        })
    }
}

impl<'r> FromRow<'r, MySqlRow> for AttendanceEntry {
    fn from_row(row: &'r MySqlRow) -> sqlx::Result<Self> {
        Ok(Self {
            record: AttendanceRecord::from_row(row)?,
            kind: parse_kind(row)?,
            matricule: row.try_get("matricule")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            cohort_id: row.try_get("cohort_id")?,
        })
    }
}

impl<'r> FromRow<'r, MySqlRow> for MealScan {
    fn from_row(row: &'r MySqlRow) -> sqlx::Result<Self> {
        let meal: String = row.try_get("meal")?;
        Ok(Self {
            id: row.try_get("id")?,
            identity_id: row.try_get("identity_id")?,
            date: row.try_get("date")?,
            meal: MealKind::from_str(&meal).map_err(|_| decode_err("meal", &meal))?,
            scanned_at: row.try_get("scanned_at")?,
        })
    }
}

impl<'r> FromRow<'r, MySqlRow> for User {
    fn from_row(row: &'r MySqlRow) -> sqlx::Result<Self> {
        let role_id: u8 = row.try_get("role_id")?;
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password: row.try_get("password")?,
            role: Role::from_id(role_id)
                .ok_or_else(|| decode_err("role_id", &role_id.to_string()))?,
            is_active: row.try_get("is_active")?,
        })
    }
}

#[async_trait]
impl Store for MySqlStore {
    async fn create_identity(&self, identity: NewIdentity) -> Result<Identity, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO identities
                (kind, matricule, first_name, last_name, email, cohort_id, active, qr_payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?, TRUE, ?, ?)
            "#,
        )
        .bind(kind_str(identity.kind))
        .bind(&identity.matricule)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(&identity.email)
        .bind(identity.cohort_id)
        .bind(&identity.qr_payload)
        .bind(identity.created_at)
        .execute(&self.pool)
        .await?;

        Ok(Identity {
            id: result.last_insert_id(),
            kind: identity.kind,
            matricule: identity.matricule,
            first_name: identity.first_name,
            last_name: identity.last_name,
            email: identity.email,
            cohort_id: identity.cohort_id,
            active: true,
            qr_payload: identity.qr_payload,
            created_at: identity.created_at,
        })
    }

    async fn find_identity(&self, id: u64) -> Result<Option<Identity>, StoreError> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = ?");
        Ok(sqlx::query_as::<_, Identity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_identity_by_matricule(
        &self,
        matricule: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE matricule = ?");
        Ok(sqlx::query_as::<_, Identity>(&sql)
            .bind(matricule)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_identities(
        &self,
        filter: &IdentityFilter,
        page: Option<Page>,
    ) -> Result<Vec<Identity>, StoreError> {
        let (where_sql, args) = identity_where(filter);
        let mut sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities{where_sql} ORDER BY id");
        if page.is_some() {
            sql.push_str(" LIMIT ? OFFSET ?");
        }

        let mut query = bind_all(sqlx::query_as::<_, Identity>(&sql), &args);
        if let Some(page) = page {
            query = query.bind(page.limit).bind(page.offset);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn count_identities(&self, filter: &IdentityFilter) -> Result<u64, StoreError> {
        let (where_sql, args) = identity_where(filter);
        let sql = format!("SELECT COUNT(*) FROM identities{where_sql}");
        let (total,): (i64,) = bind_all(sqlx::query_as(&sql), &args)
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as u64)
    }

    async fn set_identity_active(&self, id: u64, active: bool) -> Result<bool, StoreError> {
        // MySQL reports 0 affected rows when the value is unchanged, so check existence.
        sqlx::query("UPDATE identities SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;
        let exists: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM identities WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists.0 > 0)
    }

    async fn find_attendance_record(
        &self,
        owner_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE owner_id = ? AND date = ?"
        );
        Ok(sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(owner_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_attendance_record(
        &self,
        record: NewAttendanceRecord,
    ) -> Result<AttendanceRecord, StoreError> {
        // UNIQUE(owner_id, date) turns a concurrent duplicate into ER_DUP_ENTRY.
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_records (owner_id, date, check_in, is_late)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(record.owner_id)
        .bind(record.date)
        .bind(record.check_in)
        .bind(record.is_late)
        .execute(&self.pool)
        .await?;

        Ok(AttendanceRecord {
            id: result.last_insert_id(),
            owner_id: record.owner_id,
            date: record.date,
            check_in: record.check_in,
            is_late: record.is_late,
            check_out: None,
        })
    }

    async fn update_attendance_record_check_out(
        &self,
        record_id: u64,
        check_out: DateTime<Utc>,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE attendance_records
            SET check_out = ?
            WHERE id = ?
            AND check_out IS NULL
            AND check_in < ?
            "#,
        )
        .bind(check_out)
        .bind(record_id)
        .bind(check_out)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let sql = format!("SELECT {RECORD_COLUMNS} FROM attendance_records WHERE id = ?");
        Ok(sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_attendance_entries(
        &self,
        filter: &RecordFilter,
        page: Option<Page>,
    ) -> Result<Vec<AttendanceEntry>, StoreError> {
        let (where_sql, args) = record_where(filter);
        let mut sql = format!("{ENTRY_SELECT}{where_sql} ORDER BY a.date, a.check_in");
        if page.is_some() {
            sql.push_str(" LIMIT ? OFFSET ?");
        }

        let mut query = bind_all(sqlx::query_as::<_, AttendanceEntry>(&sql), &args);
        if let Some(page) = page {
            query = query.bind(page.limit).bind(page.offset);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn count_attendance_entries(&self, filter: &RecordFilter) -> Result<u64, StoreError> {
        let (where_sql, args) = record_where(filter);
        let sql = format!(
            "SELECT COUNT(*) FROM attendance_records a JOIN identities i ON i.id = a.owner_id{where_sql}"
        );
        let (total,): (i64,) = bind_all(sqlx::query_as(&sql), &args)
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as u64)
    }

    async fn create_meal_scan(&self, scan: NewMealScan) -> Result<MealScan, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO meal_scans (identity_id, date, meal, scanned_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(scan.identity_id)
        .bind(scan.date)
        .bind(scan.meal.as_ref())
        .bind(scan.scanned_at)
        .execute(&self.pool)
        .await?;

        Ok(MealScan {
            id: result.last_insert_id(),
            identity_id: scan.identity_id,
            date: scan.date,
            meal: scan.meal,
            scanned_at: scan.scanned_at,
        })
    }

    async fn list_meal_scans(&self, date: NaiveDate) -> Result<Vec<MealScan>, StoreError> {
        Ok(sqlx::query_as::<_, MealScan>(
            r#"
            SELECT id, identity_id, date, meal, scanned_at
            FROM meal_scans
            WHERE date = ?
            ORDER BY scanned_at
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_user(&self, user: NewUser) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"INSERT INTO users (username, password, role_id) VALUES (?, ?, ?)"#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.id())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_id())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password, role_id, is_active
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn set_user_active(&self, id: u64, active: bool) -> Result<bool, StoreError> {
        sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;
        let exists: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists.0 > 0)
    }

    async fn store_refresh_token(
        &self,
        user_id: u64,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, jti, expires_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(jti)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_refresh_token(&self, jti: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE jti = ?
            AND revoked = FALSE
            "#,
        )
        .bind(jti)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
