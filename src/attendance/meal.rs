use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use super::{AttendanceError, AttendanceService};
use crate::{
    model::{
        identity::{Identity, IdentityKind},
        meal::{MealKind, NewMealScan},
    },
    store::StoreError,
};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum MealOutcome {
    Served,
    AlreadyServed,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MealCount {
    pub meal: MealKind,
    #[schema(example = 42)]
    pub served: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MealSummary {
    #[schema(example = "2026-03-02", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub meals: Vec<MealCount>,
}

impl AttendanceService {
    /// One meal per learner per day and meal kind.
    pub async fn scan_meal(
        &self,
        raw: &str,
        meal: MealKind,
    ) -> Result<(MealOutcome, Identity), AttendanceError> {
        let now = self.clock.now();
        let identity = self.resolver.resolve(raw).await?;
        if identity.kind != IdentityKind::Learner {
            return Err(AttendanceError::NotEligible);
        }

        let scan = NewMealScan {
            identity_id: identity.id,
            date: self.policy.calendar_day(now),
            meal,
            scanned_at: now,
        };
        match self.store.create_meal_scan(scan).await {
            Ok(_) => {
                info!(identity_id = identity.id, %meal, "Meal served");
                Ok((MealOutcome::Served, identity))
            }
            Err(StoreError::Conflict) => Ok((MealOutcome::AlreadyServed, identity)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn meal_summary(&self, date: Option<NaiveDate>) -> Result<MealSummary, AttendanceError> {
        let date = date.unwrap_or_else(|| self.policy.calendar_day(self.clock.now()));
        let scans = self.store.list_meal_scans(date).await?;

        let meals = MealKind::ALL
            .iter()
            .map(|&meal| MealCount {
                meal,
                served: scans.iter().filter(|s| s.meal == meal).count() as u64,
            })
            .collect();

        Ok(MealSummary { date, meals })
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use chrono::{FixedOffset, NaiveTime, TimeZone, Utc};
    use testresult::TestResult;

    use super::*;
    use crate::{
        attendance::{IdentityResolver, payload, policy::LatenessPolicy},
        clock::FixedClock,
        model::identity::NewIdentity,
        store::{MemoryStore, Store},
    };

    async fn setup() -> Result<AttendanceService, StoreError> {
        let store = Arc::new(MemoryStore::new());
        for (kind, matricule) in [(IdentityKind::Learner, "APP-1"), (IdentityKind::Coach, "CCH-1")] {
            store
                .create_identity(NewIdentity {
                    kind,
                    matricule: matricule.to_string(),
                    first_name: "Fatou".to_string(),
                    last_name: "Ba".to_string(),
                    email: None,
                    cohort_id: None,
                    qr_payload: payload::encode(kind, matricule, "Fatou", "Ba"),
                    created_at: Utc::now(),
                })
                .await?;
        }

        let store: Arc<dyn Store> = store;
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 12, 30, 0).unwrap()));
        let policy = LatenessPolicy::new(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            FixedOffset::east_opt(0).unwrap(),
        );
        let resolver = IdentityResolver::new(store.clone(), 10, Duration::from_secs(60));
        Ok(AttendanceService::new(store, resolver, policy, clock))
    }

    #[actix_web::test]
    async fn second_lunch_is_already_served() -> TestResult {
        let service = setup().await?;

        let (first, _) = service.scan_meal("APP-1", MealKind::Lunch).await?;
        let (second, _) = service.scan_meal("APP-1", MealKind::Lunch).await?;
        let (dinner, _) = service.scan_meal("APP-1", MealKind::Dinner).await?;

        assert_eq!(first, MealOutcome::Served);
        assert_eq!(second, MealOutcome::AlreadyServed);
        assert_eq!(dinner, MealOutcome::Served);

        let summary = service.meal_summary(None).await?;
        let lunch = summary.meals.iter().find(|m| m.meal == MealKind::Lunch);
        assert_eq!(lunch.map(|m| m.served), Some(1));
        Ok(())
    }

    #[actix_web::test]
    async fn coaches_are_not_eligible() -> TestResult {
        let service = setup().await?;
        let result = service.scan_meal("CCH-1", MealKind::Lunch).await;
        assert!(matches!(result, Err(AttendanceError::NotEligible)));
        Ok(())
    }
}
