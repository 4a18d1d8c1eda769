use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::{Store, StoreError};
use crate::model::{
    attendance::{AttendanceEntry, AttendanceRecord, NewAttendanceRecord, Page, RecordFilter},
    identity::{Identity, IdentityFilter, NewIdentity},
    meal::{MealKind, MealScan, NewMealScan},
    user::{NewUser, User},
};

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    identities: Vec<Identity>,
    records: Vec<AttendanceRecord>,
    record_index: HashMap<(u64, NaiveDate), usize>,
    meals: Vec<MealScan>,
    meal_index: HashMap<(u64, NaiveDate, MealKind), usize>,
    users: Vec<User>,
    // jti -> revoked
    refresh_tokens: HashMap<String, bool>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process store with the same uniqueness guarantees as the MySQL schema.
/// Every check-and-insert happens under one lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

fn entry_for(state: &State, record: &AttendanceRecord) -> Option<AttendanceEntry> {
    let owner = state.identities.iter().find(|i| i.id == record.owner_id)?;
    Some(AttendanceEntry {
        record: record.clone(),
        kind: owner.kind,
        matricule: owner.matricule.clone(),
        first_name: owner.first_name.clone(),
        last_name: owner.last_name.clone(),
        cohort_id: owner.cohort_id,
    })
}

fn matching_entries(state: &State, filter: &RecordFilter) -> Vec<AttendanceEntry> {
    let mut entries: Vec<AttendanceEntry> = state
        .records
        .iter()
        .filter(|r| r.date >= filter.from && r.date <= filter.to)
        .filter_map(|r| entry_for(state, r))
        .filter(|e| filter.kind.is_none_or(|k| k == e.kind))
        .filter(|e| filter.cohort_id.is_none_or(|c| e.cohort_id == Some(c)))
        .collect();
    entries.sort_by(|a, b| {
        a.record
            .date
            .cmp(&b.record.date)
            .then(a.record.check_in.cmp(&b.record.check_in))
    });
    entries
}

fn paginate<T>(items: Vec<T>, page: Option<Page>) -> Vec<T> {
    match page {
        Some(p) => items
            .into_iter()
            .skip(usize::try_from(p.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(p.limit).unwrap_or(usize::MAX))
            .collect(),
        None => items,
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_identity(&self, identity: NewIdentity) -> Result<Identity, StoreError> {
        let mut state = self.lock()?;
        if state
            .identities
            .iter()
            .any(|i| i.matricule == identity.matricule)
        {
            return Err(StoreError::Conflict);
        }

        let created = Identity {
            id: state.next_id(),
            kind: identity.kind,
            matricule: identity.matricule,
            first_name: identity.first_name,
            last_name: identity.last_name,
            email: identity.email,
            cohort_id: identity.cohort_id,
            active: true,
            qr_payload: identity.qr_payload,
            created_at: identity.created_at,
        };
        state.identities.push(created.clone());
        Ok(created)
    }

    async fn find_identity(&self, id: u64) -> Result<Option<Identity>, StoreError> {
        let state = self.lock()?;
        Ok(state.identities.iter().find(|i| i.id == id).cloned())
    }

    async fn find_identity_by_matricule(
        &self,
        matricule: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .identities
            .iter()
            .find(|i| i.matricule == matricule)
            .cloned())
    }

    async fn list_identities(
        &self,
        filter: &IdentityFilter,
        page: Option<Page>,
    ) -> Result<Vec<Identity>, StoreError> {
        let state = self.lock()?;
        let matching = state
            .identities
            .iter()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        Ok(paginate(matching, page))
    }

    async fn count_identities(&self, filter: &IdentityFilter) -> Result<u64, StoreError> {
        let state = self.lock()?;
        Ok(state.identities.iter().filter(|i| filter.matches(i)).count() as u64)
    }

    async fn set_identity_active(&self, id: u64, active: bool) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.identities.iter_mut().find(|i| i.id == id) {
            Some(identity) => {
                identity.active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_attendance_record(
        &self,
        owner_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .record_index
            .get(&(owner_id, date))
            .and_then(|&idx| state.records.get(idx))
            .cloned())
    }

    async fn create_attendance_record(
        &self,
        record: NewAttendanceRecord,
    ) -> Result<AttendanceRecord, StoreError> {
        let mut state = self.lock()?;
        let key = (record.owner_id, record.date);
        if state.record_index.contains_key(&key) {
            return Err(StoreError::Conflict);
        }

        let created = AttendanceRecord {
            id: state.next_id(),
            owner_id: record.owner_id,
            date: record.date,
            check_in: record.check_in,
            is_late: record.is_late,
            check_out: None,
        };
        let idx = state.records.len();
        state.records.push(created.clone());
        state.record_index.insert(key, idx);
        Ok(created)
    }

    async fn update_attendance_record_check_out(
        &self,
        record_id: u64,
        check_out: DateTime<Utc>,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let mut state = self.lock()?;
        let Some(record) = state.records.iter_mut().find(|r| r.id == record_id) else {
            return Ok(None);
        };
        if record.check_out.is_some() || check_out <= record.check_in {
            return Ok(None);
        }
        record.check_out = Some(check_out);
        Ok(Some(record.clone()))
    }

    async fn list_attendance_entries(
        &self,
        filter: &RecordFilter,
        page: Option<Page>,
    ) -> Result<Vec<AttendanceEntry>, StoreError> {
        let state = self.lock()?;
        Ok(paginate(matching_entries(&state, filter), page))
    }

    async fn count_attendance_entries(&self, filter: &RecordFilter) -> Result<u64, StoreError> {
        let state = self.lock()?;
        Ok(matching_entries(&state, filter).len() as u64)
    }

    async fn create_meal_scan(&self, scan: NewMealScan) -> Result<MealScan, StoreError> {
        let mut state = self.lock()?;
        let key = (scan.identity_id, scan.date, scan.meal);
        if state.meal_index.contains_key(&key) {
            return Err(StoreError::Conflict);
        }

        let created = MealScan {
            id: state.next_id(),
            identity_id: scan.identity_id,
            date: scan.date,
            meal: scan.meal,
            scanned_at: scan.scanned_at,
        };
        let idx = state.meals.len();
        state.meals.push(created.clone());
        state.meal_index.insert(key, idx);
        Ok(created)
    }

    async fn list_meal_scans(&self, date: NaiveDate) -> Result<Vec<MealScan>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .meals
            .iter()
            .filter(|m| m.date == date)
            .cloned()
            .collect())
    }

    async fn create_user(&self, user: NewUser) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        if state
            .users
            .iter()
            .any(|u| u.username.eq_ignore_ascii_case(&user.username))
        {
            return Err(StoreError::Conflict);
        }

        let id = state.next_id();
        state.users.push(User {
            id,
            username: user.username,
            password: user.password_hash,
            role: user.role,
            is_active: true,
        });
        Ok(id)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .users
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn set_user_active(&self, id: u64, active: bool) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn store_refresh_token(
        &self,
        _user_id: u64,
        jti: &str,
        _expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.refresh_tokens.contains_key(jti) {
            return Err(StoreError::Conflict);
        }
        state.refresh_tokens.insert(jti.to_string(), false);
        Ok(())
    }

    async fn revoke_refresh_token(&self, jti: &str) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.refresh_tokens.get_mut(jti) {
            Some(revoked) if !*revoked => {
                *revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use testresult::TestResult;

    use super::*;
    use crate::model::identity::IdentityKind;

    fn new_identity(matricule: &str) -> NewIdentity {
        NewIdentity {
            kind: IdentityKind::Learner,
            matricule: matricule.to_string(),
            first_name: "Awa".to_string(),
            last_name: "Diop".to_string(),
            email: None,
            cohort_id: Some(1),
            qr_payload: String::new(),
            created_at: Utc::now(),
        }
    }

    #[actix_web::test]
    async fn duplicate_matricule_conflicts() -> TestResult {
        let store = MemoryStore::new();
        store.create_identity(new_identity("APP-1")).await?;

        let result = store.create_identity(new_identity("APP-1")).await;
        assert!(matches!(result, Err(StoreError::Conflict)), "got {result:?}");
        Ok(())
    }

    #[actix_web::test]
    async fn second_record_for_same_day_conflicts() -> TestResult {
        let store = MemoryStore::new();
        let owner = store.create_identity(new_identity("APP-1")).await?;
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let new = NewAttendanceRecord {
            owner_id: owner.id,
            date: at.date_naive(),
            check_in: at,
            is_late: false,
        };

        store.create_attendance_record(new.clone()).await?;
        let result = store.create_attendance_record(new).await;
        assert!(matches!(result, Err(StoreError::Conflict)), "got {result:?}");

        let next_day = NewAttendanceRecord {
            owner_id: owner.id,
            date: at.date_naive().succ_opt().unwrap(),
            check_in: at + Duration::days(1),
            is_late: false,
        };
        store.create_attendance_record(next_day).await?;
        Ok(())
    }

    #[actix_web::test]
    async fn check_out_update_is_conditional() -> TestResult {
        let store = MemoryStore::new();
        let owner = store.create_identity(new_identity("APP-1")).await?;
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let record = store
            .create_attendance_record(NewAttendanceRecord {
                owner_id: owner.id,
                date: at.date_naive(),
                check_in: at,
                is_late: false,
            })
            .await?;

        assert!(store.update_attendance_record_check_out(record.id, at).await?.is_none());

        let out = at + Duration::hours(8);
        let updated = store.update_attendance_record_check_out(record.id, out).await?;
        assert_eq!(updated.and_then(|r| r.check_out), Some(out));

        let again = store
            .update_attendance_record_check_out(record.id, out + Duration::hours(1))
            .await?;
        assert!(again.is_none());
        Ok(())
    }

    #[actix_web::test]
    async fn refresh_tokens_revoke_once() -> TestResult {
        let store = MemoryStore::new();
        store.store_refresh_token(1, "jti-1", Utc::now()).await?;

        assert!(store.revoke_refresh_token("jti-1").await?);
        assert!(!store.revoke_refresh_token("jti-1").await?);
        assert!(!store.revoke_refresh_token("unknown").await?);
        Ok(())
    }
}
