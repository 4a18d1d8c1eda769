use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::{attendance::AttendanceEntry, identity::Identity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DailyCounts {
    #[schema(example = "2026-03-02", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = 10)]
    pub expected: u64,
    #[schema(example = 7)]
    pub present: u64,
    #[schema(example = 2)]
    pub late: u64,
    #[schema(example = 3)]
    pub absent: u64,
    #[schema(example = 5)]
    pub checked_out: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AbsentIdentity {
    pub id: u64,
    pub matricule: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DailyReport {
    #[serde(flatten)]
    pub counts: DailyCounts,
    pub records: Vec<AttendanceEntry>,
    pub absentees: Vec<AbsentIdentity>,
}

/// Summarises one day.
///
/// `entries` must already be restricted to `date` and to the same kind/cohort
/// filter that produced `expected`. Absent is the set difference between the
/// expected identities and the owners with a record. Counts only cover expected
/// owners, so `present + absent == expected`; records of owners deactivated
/// since their scan are still listed in `records`.
pub fn summarize(date: NaiveDate, expected: &[Identity], entries: Vec<AttendanceEntry>) -> DailyReport {
    let expected_ids: HashSet<u64> = expected.iter().map(|i| i.id).collect();
    let counted: Vec<&AttendanceEntry> = entries
        .iter()
        .filter(|e| expected_ids.contains(&e.record.owner_id))
        .collect();
    let present_ids: HashSet<u64> = counted.iter().map(|e| e.record.owner_id).collect();

    let absentees: Vec<AbsentIdentity> = expected
        .iter()
        .filter(|i| !present_ids.contains(&i.id))
        .map(|i| AbsentIdentity {
            id: i.id,
            matricule: i.matricule.clone(),
            first_name: i.first_name.clone(),
            last_name: i.last_name.clone(),
        })
        .collect();

    let counts = DailyCounts {
        date,
        expected: expected.len() as u64,
        present: present_ids.len() as u64,
        late: counted.iter().filter(|e| e.record.is_late).count() as u64,
        absent: absentees.len() as u64,
        checked_out: counted.iter().filter(|e| e.record.check_out.is_some()).count() as u64,
    };

    DailyReport {
        counts,
        records: entries,
        absentees,
    }
}
