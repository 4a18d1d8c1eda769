use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::{AttendanceError, IdentityResolver, policy::LatenessPolicy};
use crate::{
    clock::Clock,
    model::{
        attendance::{AttendanceRecord, AttendanceState, NewAttendanceRecord},
        identity::Identity,
    },
    store::{Store, StoreError},
};

/// What a scan did to the owner's record for the day.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema)]
pub enum Transition {
    #[serde(rename = "checkin")]
    CheckIn,
    #[serde(rename = "checkout")]
    CheckOut,
    /// A concurrent scan created the record first.
    #[serde(rename = "already-checked-in")]
    AlreadyCheckedIn,
    #[serde(rename = "already-checked-out")]
    AlreadyCheckedOut,
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub transition: Transition,
    pub identity: Identity,
    pub record: AttendanceRecord,
}

/// Owns the only write path to attendance records.
#[derive(Clone)]
pub struct AttendanceService {
    pub(super) store: Arc<dyn Store>,
    pub(super) resolver: IdentityResolver,
    pub(super) policy: LatenessPolicy,
    pub(super) clock: Arc<dyn Clock>,
}

impl AttendanceService {
    pub fn new(
        store: Arc<dyn Store>,
        resolver: IdentityResolver,
        policy: LatenessPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            resolver,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &LatenessPolicy {
        &self.policy
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Resolves a raw QR payload and applies one transition at server time.
    pub async fn scan(&self, raw: &str) -> Result<ScanOutcome, AttendanceError> {
        let now = self.clock.now();
        let identity = self.resolver.resolve(raw).await?;
        self.record_scan(identity, now).await
    }

    /// `NoRecord -> CheckedIn -> CheckedOut`, one step per call.
    pub async fn record_scan(
        &self,
        identity: Identity,
        now: DateTime<Utc>,
    ) -> Result<ScanOutcome, AttendanceError> {
        let date = self.policy.calendar_day(now);
        let existing = self.store.find_attendance_record(identity.id, date).await?;

        match (AttendanceState::of(existing.as_ref()), existing) {
            (AttendanceState::CheckedIn, Some(record)) => {
                self.check_out(identity, record, now).await
            }
            (AttendanceState::CheckedOut, Some(record)) => {
                info!(owner_id = identity.id, %date, "Already checked out today");
                Ok(ScanOutcome {
                    transition: Transition::AlreadyCheckedOut,
                    identity,
                    record,
                })
            }
            _ => self.check_in(identity, date, now).await,
        }
    }

    async fn check_in(
        &self,
        identity: Identity,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<ScanOutcome, AttendanceError> {
        let is_late = self.policy.is_late(identity.cohort_id, now);
        let new = NewAttendanceRecord {
            owner_id: identity.id,
            date,
            check_in: now,
            is_late,
        };

        match self.store.create_attendance_record(new).await {
            Ok(record) => {
                info!(owner_id = identity.id, %date, is_late, "Checked in");
                Ok(ScanOutcome {
                    transition: Transition::CheckIn,
                    identity,
                    record,
                })
            }
            Err(StoreError::Conflict) => {
                // Lost the insert race; report whatever the winner left behind.
                let record = self
                    .store
                    .find_attendance_record(identity.id, date)
                    .await?
                    .ok_or(StoreError::NotFound)?;
                let transition = match record.state() {
                    AttendanceState::CheckedOut => Transition::AlreadyCheckedOut,
                    _ => Transition::AlreadyCheckedIn,
                };
                info!(owner_id = identity.id, %date, ?transition, "Concurrent check-in resolved");
                Ok(ScanOutcome {
                    transition,
                    identity,
                    record,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn check_out(
        &self,
        identity: Identity,
        record: AttendanceRecord,
        now: DateTime<Utc>,
    ) -> Result<ScanOutcome, AttendanceError> {
        if now <= record.check_in {
            warn!(owner_id = identity.id, check_in = %record.check_in, %now, "Check-out not after check-in");
            return Err(AttendanceError::CheckOutNotAfterCheckIn {
                check_in: record.check_in,
                attempted: now,
            });
        }

        if let Some(updated) = self
            .store
            .update_attendance_record_check_out(record.id, now)
            .await?
        {
            info!(owner_id = identity.id, date = %updated.date, "Checked out");
            return Ok(ScanOutcome {
                transition: Transition::CheckOut,
                identity,
                record: updated,
            });
        }

        // The conditional update did not apply: another scan checked out first.
        let current = self
            .store
            .find_attendance_record(identity.id, record.date)
            .await?
            .ok_or(StoreError::NotFound)?;
        match current.state() {
            AttendanceState::CheckedOut => Ok(ScanOutcome {
                transition: Transition::AlreadyCheckedOut,
                identity,
                record: current,
            }),
            _ => Err(AttendanceError::CheckOutNotAfterCheckIn {
                check_in: current.check_in,
                attempted: now,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::{Duration, FixedOffset, NaiveTime, TimeZone};
    use testresult::TestResult;
    use tokio::sync::Barrier;

    use super::*;
    use crate::{
        attendance::payload,
        clock::FixedClock,
        model::{
            attendance::{AttendanceEntry, Page, RecordFilter},
            identity::{IdentityFilter, IdentityKind, NewIdentity},
            meal::{MealScan, NewMealScan},
            user::{NewUser, User},
        },
        store::MemoryStore,
    };

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn policy() -> LatenessPolicy {
        LatenessPolicy::new(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            FixedOffset::east_opt(0).unwrap(),
        )
    }

    fn service_over(store: Arc<dyn Store>, clock: Arc<FixedClock>) -> AttendanceService {
        let resolver = IdentityResolver::new(store.clone(), 100, StdDuration::from_secs(60));
        AttendanceService::new(store, resolver, policy(), clock)
    }

    async fn enroll(store: &dyn Store, matricule: &str) -> Result<Identity, StoreError> {
        store
            .create_identity(NewIdentity {
                kind: IdentityKind::Learner,
                matricule: matricule.to_string(),
                first_name: "Awa".to_string(),
                last_name: "Diop".to_string(),
                email: None,
                cohort_id: Some(1),
                qr_payload: payload::encode(IdentityKind::Learner, matricule, "Awa", "Diop"),
                created_at: at(7, 0),
            })
            .await
    }

    #[actix_web::test]
    async fn first_scan_checks_in_with_lateness() -> TestResult {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(at(8, 55)));
        let service = service_over(store.clone(), clock.clone());
        enroll(store.as_ref(), "APP-1").await?;
        enroll(store.as_ref(), "APP-2").await?;

        let first = service.scan("APP-1").await?;
        assert_eq!(first.transition, Transition::CheckIn);
        assert_eq!(first.record.check_in, at(8, 55));
        assert!(!first.record.is_late);

        clock.set(at(9, 10));
        let second = service.scan("APP-2").await?;
        assert_eq!(second.transition, Transition::CheckIn);
        assert_eq!(second.record.check_in, at(9, 10));
        assert!(second.record.is_late);

        clock.set(at(17, 0));
        let out = service.scan("APP-1").await?;
        assert_eq!(out.transition, Transition::CheckOut);
        assert_eq!(out.record.check_out, Some(at(17, 0)));
        assert_eq!(out.record.check_in, at(8, 55));
        assert!(!out.record.is_late);
        Ok(())
    }

    #[actix_web::test]
    async fn third_scan_reports_already_checked_out() -> TestResult {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(at(8, 0)));
        let service = service_over(store.clone(), clock.clone());
        let owner = enroll(store.as_ref(), "APP-1").await?;

        service.scan("APP-1").await?;
        clock.set(at(17, 0));
        let out = service.scan("APP-1").await?;

        clock.set(at(18, 0));
        let third = service.scan("APP-1").await?;
        assert_eq!(third.transition, Transition::AlreadyCheckedOut);
        assert_eq!(third.record, out.record);

        let stored = store.find_attendance_record(owner.id, at(8, 0).date_naive()).await?;
        assert_eq!(stored.and_then(|r| r.check_out), Some(at(17, 0)));
        Ok(())
    }

    #[actix_web::test]
    async fn check_out_at_or_before_check_in_is_rejected() -> TestResult {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(at(10, 0)));
        let service = service_over(store.clone(), clock.clone());
        let owner = enroll(store.as_ref(), "APP-1").await?;
        service.scan("APP-1").await?;

        for skewed in [at(10, 0), at(9, 30)] {
            clock.set(skewed);
            let result = service.scan("APP-1").await;
            assert!(
                matches!(result, Err(AttendanceError::CheckOutNotAfterCheckIn { .. })),
                "got {result:?}"
            );
        }

        let stored = store.find_attendance_record(owner.id, at(10, 0).date_naive()).await?;
        let stored = stored.ok_or("record missing")?;
        assert_eq!(stored.check_in, at(10, 0));
        assert_eq!(stored.check_out, None);
        Ok(())
    }

    #[actix_web::test]
    async fn a_new_day_starts_a_new_record() -> TestResult {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(at(8, 0)));
        let service = service_over(store.clone(), clock.clone());
        enroll(store.as_ref(), "APP-1").await?;

        service.scan("APP-1").await?;
        clock.advance(Duration::hours(9));
        service.scan("APP-1").await?;

        clock.advance(Duration::hours(15));
        let next_day = service.scan("APP-1").await?;
        assert_eq!(next_day.transition, Transition::CheckIn);
        assert_eq!(next_day.record.date, at(8, 0).date_naive().succ_opt().ok_or("date")?);
        Ok(())
    }

    /// Holds every attendance read at a barrier so all scans see `NoRecord`
    /// before any of them inserts.
    struct RacingStore {
        inner: MemoryStore,
        barrier: Barrier,
        armed: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl Store for RacingStore {
        async fn create_identity(&self, i: NewIdentity) -> Result<Identity, StoreError> {
            self.inner.create_identity(i).await
        }
        async fn find_identity(&self, id: u64) -> Result<Option<Identity>, StoreError> {
            self.inner.find_identity(id).await
        }
        async fn find_identity_by_matricule(
            &self,
            m: &str,
        ) -> Result<Option<Identity>, StoreError> {
            self.inner.find_identity_by_matricule(m).await
        }
        async fn list_identities(
            &self,
            f: &IdentityFilter,
            p: Option<Page>,
        ) -> Result<Vec<Identity>, StoreError> {
            self.inner.list_identities(f, p).await
        }
        async fn count_identities(&self, f: &IdentityFilter) -> Result<u64, StoreError> {
            self.inner.count_identities(f).await
        }
        async fn set_identity_active(&self, id: u64, a: bool) -> Result<bool, StoreError> {
            self.inner.set_identity_active(id, a).await
        }
        async fn find_attendance_record(
            &self,
            owner_id: u64,
            date: NaiveDate,
        ) -> Result<Option<AttendanceRecord>, StoreError> {
            let found = self.inner.find_attendance_record(owner_id, date).await;
            if self.armed.load(std::sync::atomic::Ordering::SeqCst) {
                self.barrier.wait().await;
            }
            found
        }
        async fn create_attendance_record(
            &self,
            r: NewAttendanceRecord,
        ) -> Result<AttendanceRecord, StoreError> {
            // later reads (conflict resolution) must not block
            self.armed.store(false, std::sync::atomic::Ordering::SeqCst);
            self.inner.create_attendance_record(r).await
        }
        async fn update_attendance_record_check_out(
            &self,
            id: u64,
            at: DateTime<Utc>,
        ) -> Result<Option<AttendanceRecord>, StoreError> {
            self.inner.update_attendance_record_check_out(id, at).await
        }
        async fn list_attendance_entries(
            &self,
            f: &RecordFilter,
            p: Option<Page>,
        ) -> Result<Vec<AttendanceEntry>, StoreError> {
            self.inner.list_attendance_entries(f, p).await
        }
        async fn count_attendance_entries(&self, f: &RecordFilter) -> Result<u64, StoreError> {
            self.inner.count_attendance_entries(f).await
        }
        async fn create_meal_scan(&self, s: NewMealScan) -> Result<MealScan, StoreError> {
            self.inner.create_meal_scan(s).await
        }
        async fn list_meal_scans(&self, d: NaiveDate) -> Result<Vec<MealScan>, StoreError> {
            self.inner.list_meal_scans(d).await
        }
        async fn create_user(&self, u: NewUser) -> Result<u64, StoreError> {
            self.inner.create_user(u).await
        }
        async fn find_user_by_username(&self, u: &str) -> Result<Option<User>, StoreError> {
            self.inner.find_user_by_username(u).await
        }
        async fn set_user_active(&self, id: u64, a: bool) -> Result<bool, StoreError> {
            self.inner.set_user_active(id, a).await
        }
        async fn store_refresh_token(
            &self,
            u: u64,
            j: &str,
            e: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner.store_refresh_token(u, j, e).await
        }
        async fn revoke_refresh_token(&self, j: &str) -> Result<bool, StoreError> {
            self.inner.revoke_refresh_token(j).await
        }
    }

    #[actix_web::test]
    async fn concurrent_first_scans_create_one_record() -> TestResult {
        const SCANS: usize = 8;

        let store = Arc::new(RacingStore {
            inner: MemoryStore::new(),
            barrier: Barrier::new(SCANS),
            armed: std::sync::atomic::AtomicBool::new(true),
        });
        let clock = Arc::new(FixedClock::new(at(8, 30)));
        let service = service_over(store.clone(), clock);
        let owner = enroll(store.as_ref(), "APP-1").await?;

        let scans = (0..SCANS).map(|_| service.record_scan(owner.clone(), at(8, 30)));
        let outcomes = futures::future::join_all(scans).await;

        let outcomes: Vec<ScanOutcome> = outcomes.into_iter().collect::<Result<_, _>>()?;
        let check_ins = outcomes
            .iter()
            .filter(|o| o.transition == Transition::CheckIn)
            .count();
        assert_eq!(check_ins, 1);
        assert!(
            outcomes
                .iter()
                .filter(|o| o.transition != Transition::CheckIn)
                .all(|o| o.transition == Transition::AlreadyCheckedIn)
        );

        let ids: std::collections::HashSet<u64> = outcomes.iter().map(|o| o.record.id).collect();
        assert_eq!(ids.len(), 1, "all scans resolved to one record");

        let entries = store
            .list_attendance_entries(&RecordFilter::day(at(8, 30).date_naive()), None)
            .await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record.owner_id, owner.id);
        Ok(())
    }
}
