use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};

/// Defines the calendar day a scan belongs to and when a check-in turns late.
///
/// Both decisions are made in the center's local offset: a check-in is late
/// when its local time-of-day is strictly after the cutoff that applies to the
/// owner's cohort (falling back to the default cutoff).
#[derive(Debug, Clone)]
pub struct LatenessPolicy {
    default_cutoff: NaiveTime,
    cohort_cutoffs: HashMap<u64, NaiveTime>,
    offset: FixedOffset,
}

impl LatenessPolicy {
    pub fn new(default_cutoff: NaiveTime, offset: FixedOffset) -> Self {
        Self {
            default_cutoff,
            cohort_cutoffs: HashMap::new(),
            offset,
        }
    }

    pub fn with_cohort_cutoffs(mut self, cutoffs: HashMap<u64, NaiveTime>) -> Self {
        self.cohort_cutoffs = cutoffs;
        self
    }

    pub fn default_cutoff(&self) -> NaiveTime {
        self.default_cutoff
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn cutoff_for(&self, cohort_id: Option<u64>) -> NaiveTime {
        cohort_id
            .and_then(|c| self.cohort_cutoffs.get(&c).copied())
            .unwrap_or(self.default_cutoff)
    }

    pub fn calendar_day(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    pub fn is_late(&self, cohort_id: Option<u64>, at: DateTime<Utc>) -> bool {
        at.with_timezone(&self.offset).time() > self.cutoff_for(cohort_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn late_is_strictly_after_cutoff() {
        let policy = LatenessPolicy::new(nine(), FixedOffset::east_opt(0).unwrap());

        assert!(!policy.is_late(None, utc(8, 55)));
        assert!(!policy.is_late(None, utc(9, 0)));
        assert!(policy.is_late(None, utc(9, 0) + chrono::Duration::seconds(1)));
        assert!(policy.is_late(None, utc(9, 10)));
    }

    #[test]
    fn cohort_override_wins() {
        let policy = LatenessPolicy::new(nine(), FixedOffset::east_opt(0).unwrap())
            .with_cohort_cutoffs(HashMap::from([(7, NaiveTime::from_hms_opt(8, 30, 0).unwrap())]));

        assert!(policy.is_late(Some(7), utc(8, 45)));
        assert!(!policy.is_late(Some(8), utc(8, 45)));
        assert!(!policy.is_late(None, utc(8, 45)));
    }

    #[test]
    fn day_and_lateness_use_local_offset() {
        // UTC+1: 08:30Z is 09:30 local.
        let policy = LatenessPolicy::new(nine(), FixedOffset::east_opt(3600).unwrap());
        assert!(policy.is_late(None, utc(8, 30)));

        // 23:30Z on the 2nd is already the 3rd locally.
        assert_eq!(
            policy.calendar_day(utc(23, 30)),
            NaiveDate::from_ymd_opt(2026, 3, 3).unwrap()
        );
    }
}
