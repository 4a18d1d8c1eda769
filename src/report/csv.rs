//! CSV export of attendance entries and the matching parser.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use thiserror::Error;

use crate::model::{attendance::AttendanceEntry, identity::IdentityKind};

pub const HEADER: &str = "owner_id,matricule,kind,date,check_in,check_out,is_late";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CsvError {
    #[error("missing or unexpected header")]
    Header,

    #[error("line {line}: expected 7 fields, found {found}")]
    FieldCount { line: usize, found: usize },

    #[error("line {line}: invalid {field} {value:?}")]
    Field {
        line: usize,
        field: &'static str,
        value: String,
    },
}

/// One exported row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    pub owner_id: u64,
    pub matricule: String,
    pub kind: IdentityKind,
    pub date: NaiveDate,
    pub check_in: DateTime<Utc>,
    pub check_out: Option<DateTime<Utc>>,
    pub is_late: bool,
}

impl From<&AttendanceEntry> for CsvRow {
    fn from(entry: &AttendanceEntry) -> Self {
        Self {
            owner_id: entry.record.owner_id,
            matricule: entry.matricule.clone(),
            kind: entry.kind,
            date: entry.record.date,
            check_in: entry.record.check_in,
            check_out: entry.record.check_out,
            is_late: entry.record.is_late,
        }
    }
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn write_csv(entries: &[AttendanceEntry]) -> String {
    let mut csv = String::from(HEADER);
    csv.push('\n');

    for entry in entries {
        let row = CsvRow::from(entry);
        csv.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            row.owner_id,
            csv_quote(&row.matricule),
            row.kind,
            row.date.format("%Y-%m-%d"),
            timestamp(row.check_in),
            row.check_out.map(timestamp).unwrap_or_default(),
            row.is_late,
        ));
    }

    csv
}

fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => out.push(std::mem::take(&mut buf)),
            _ => buf.push(ch),
        }
    }
    out.push(buf);
    out
}

pub fn parse_csv(input: &str) -> Result<Vec<CsvRow>, CsvError> {
    let mut lines = input.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    match lines.next() {
        Some((_, header)) if header.trim() == HEADER => {}
        _ => return Err(CsvError::Header),
    }

    lines
        .map(|(idx, line)| {
            let line_no = idx + 1;
            let fields = parse_csv_record(line);
            let [owner_id, matricule, kind, date, check_in, check_out, is_late] =
                <[String; 7]>::try_from(fields).map_err(|f| CsvError::FieldCount {
                    line: line_no,
                    found: f.len(),
                })?;

            let invalid = |field: &'static str, value: &str| CsvError::Field {
                line: line_no,
                field,
                value: value.to_string(),
            };
            let parse_ts = |field: &'static str, value: &str| {
                DateTime::parse_from_rfc3339(value)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| invalid(field, value))
            };

            Ok(CsvRow {
                owner_id: owner_id.parse().map_err(|_| invalid("owner_id", &owner_id))?,
                kind: kind.parse().map_err(|_| invalid("kind", &kind))?,
                date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .map_err(|_| invalid("date", &date))?,
                check_in: parse_ts("check_in", &check_in)?,
                check_out: if check_out.is_empty() {
                    None
                } else {
                    Some(parse_ts("check_out", &check_out)?)
                },
                is_late: is_late.parse().map_err(|_| invalid("is_late", &is_late))?,
                matricule,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use testresult::TestResult;

    use super::*;
    use crate::model::attendance::AttendanceRecord;

    fn entry(owner_id: u64, matricule: &str, check_out: bool) -> AttendanceEntry {
        let check_in = Utc.with_ymd_and_hms(2026, 3, 2, 8, 55, 0).unwrap()
            + Duration::milliseconds(250);
        AttendanceEntry {
            record: AttendanceRecord {
                id: owner_id * 10,
                owner_id,
                date: check_in.date_naive(),
                check_in,
                is_late: owner_id % 2 == 0,
                check_out: check_out.then(|| check_in + Duration::hours(8)),
            },
            kind: IdentityKind::Learner,
            matricule: matricule.to_string(),
            first_name: "Awa".to_string(),
            last_name: "Diop".to_string(),
            cohort_id: None,
        }
    }

    #[test]
    fn export_then_parse_keeps_the_tuples() -> TestResult {
        let entries = vec![
            entry(1, "APP-1", true),
            entry(2, "APP,\"2\"", false),
        ];

        let parsed = parse_csv(&write_csv(&entries))?;

        let expected: Vec<CsvRow> = entries.iter().map(CsvRow::from).collect();
        assert_eq!(parsed, expected);
        Ok(())
    }

    #[test]
    fn export_layout() {
        let csv = write_csv(&[entry(1, "APP-1", false)]);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(HEADER));
        assert_eq!(
            lines.next(),
            Some("1,APP-1,learner,2026-03-02,2026-03-02T08:55:00.250Z,,false")
        );
    }

    #[test]
    fn parse_reports_line_numbers() {
        let input = format!("{HEADER}\n1,APP-1,learner,2026-03-02,nope,,false\n");
        assert_eq!(
            parse_csv(&input),
            Err(CsvError::Field {
                line: 2,
                field: "check_in",
                value: "nope".to_string(),
            })
        );

        let short = format!("{HEADER}\n1,APP-1\n");
        assert_eq!(
            parse_csv(&short),
            Err(CsvError::FieldCount { line: 2, found: 2 })
        );

        assert_eq!(parse_csv("a,b\n"), Err(CsvError::Header));
    }
}
