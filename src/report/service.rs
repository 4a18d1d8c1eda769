use std::{collections::BTreeMap, sync::Arc};

use chrono::NaiveDate;
use tracing::debug;

use super::{
    ReportError, csv,
    summary::{DailyCounts, DailyReport, summarize},
};
use crate::{
    attendance::policy::LatenessPolicy,
    clock::Clock,
    model::{
        attendance::{AttendanceEntry, Page, RecordFilter},
        identity::{IdentityFilter, IdentityKind},
    },
    store::Store,
};

/// Day or range plus the identity filters shared by every report.
#[derive(Debug, Clone, Default)]
pub struct ReportQuery {
    pub date: Option<NaiveDate>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub kind: Option<IdentityKind>,
    pub cohort_id: Option<u64>,
}

#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn Store>,
    policy: LatenessPolicy,
    clock: Arc<dyn Clock>,
    max_range_days: u32,
}

impl ReportService {
    pub fn new(
        store: Arc<dyn Store>,
        policy: LatenessPolicy,
        clock: Arc<dyn Clock>,
        max_range_days: u32,
    ) -> Self {
        Self {
            store,
            policy,
            clock,
            max_range_days,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.policy.calendar_day(self.clock.now())
    }

    /// Resolves `date` or `from`/`to` into a bounded record filter.
    /// With nothing given the filter covers today.
    pub fn filter(&self, query: &ReportQuery) -> Result<RecordFilter, ReportError> {
        let (from, to) = match (query.date, query.from, query.to) {
            (Some(date), _, _) => (date, date),
            (None, Some(from), Some(to)) => (from, to),
            (None, Some(from), None) => (from, self.today()),
            (None, None, Some(to)) => (to, to),
            (None, None, None) => {
                let today = self.today();
                (today, today)
            }
        };

        if from > to {
            return Err(ReportError::InvalidRange { from, to });
        }
        let days = (to - from).num_days() + 1;
        if days > i64::from(self.max_range_days) {
            return Err(ReportError::RangeTooLong {
                days,
                max: self.max_range_days,
            });
        }

        Ok(RecordFilter {
            from,
            to,
            kind: query.kind,
            cohort_id: query.cohort_id,
        })
    }

    pub async fn daily(&self, query: &ReportQuery) -> Result<DailyReport, ReportError> {
        let date = query.date.unwrap_or_else(|| self.today());
        let filter = RecordFilter {
            from: date,
            to: date,
            kind: query.kind,
            cohort_id: query.cohort_id,
        };

        let expected = self
            .store
            .list_identities(&IdentityFilter::expected(query.kind, query.cohort_id), None)
            .await?;
        let entries = self.store.list_attendance_entries(&filter, None).await?;
        debug!(%date, expected = expected.len(), records = entries.len(), "Daily report");

        Ok(summarize(date, &expected, entries))
    }

    /// One count row per day of the range, including days without records.
    pub async fn range(&self, query: &ReportQuery) -> Result<Vec<DailyCounts>, ReportError> {
        let filter = self.filter(query)?;

        let expected = self
            .store
            .list_identities(&IdentityFilter::expected(query.kind, query.cohort_id), None)
            .await?;
        let entries = self.store.list_attendance_entries(&filter, None).await?;

        let mut by_day: BTreeMap<NaiveDate, Vec<AttendanceEntry>> = filter
            .from
            .iter_days()
            .take_while(|d| *d <= filter.to)
            .map(|d| (d, Vec::new()))
            .collect();
        for entry in entries {
            by_day.entry(entry.record.date).or_default().push(entry);
        }

        Ok(by_day
            .into_iter()
            .map(|(date, entries)| summarize(date, &expected, entries).counts)
            .collect())
    }

    pub async fn entries(
        &self,
        query: &ReportQuery,
        page: Page,
    ) -> Result<(Vec<AttendanceEntry>, u64), ReportError> {
        let filter = self.filter(query)?;
        let total = self.store.count_attendance_entries(&filter).await?;
        let data = self.store.list_attendance_entries(&filter, Some(page)).await?;
        Ok((data, total))
    }

    pub async fn export_csv(&self, query: &ReportQuery) -> Result<String, ReportError> {
        let filter = self.filter(query)?;
        let entries = self.store.list_attendance_entries(&filter, None).await?;
        Ok(csv::write_csv(&entries))
    }
}
