//! Monthly time-entry history: filtering by owner and month, ordering and
//! the summary figures shown above the history table.

use std::{fmt, str::FromStr};

use chrono::{Datelike, NaiveDate, Utc};
use entity::time_entry;
use thiserror::Error;
use uuid::Uuid;

use crate::timesheet::round_hours;

/// A calendar month, written `YYYY-MM`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn current() -> Self {
        Self::of(Utc::now().date_naive())
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(self) -> NaiveDate {
        self.next().first_day().pred_opt().unwrap_or(NaiveDate::MAX)
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        Self::of(date) == self
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("month must be in YYYY-MM format, got {0:?}")]
pub struct InvalidMonth(pub String);

impl FromStr for Month {
    type Err = InvalidMonth;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidMonth(value.to_string());
        let (year, month) = value.trim().split_once('-').ok_or_else(invalid)?;
        let digits = |part: &str, len: usize| {
            part.len() == len && part.bytes().all(|b| b.is_ascii_digit())
        };
        if !digits(year, 4) || !digits(month, 2) {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Month::new(year, month).ok_or_else(invalid)
    }
}

/// Entries of one user in one month, newest first, with totals.
#[derive(Clone, Debug, PartialEq)]
pub struct MonthlyHistory {
    pub month: Month,
    pub user_id: Uuid,
    pub entries: Vec<time_entry::Model>,
    pub total_hours: f64,
    pub average_hours: f64,
}

impl MonthlyHistory {
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

/// Keeps only `user_id`'s entries dated inside `month`, sorted by date
/// descending (later start first on the same day).
pub fn monthly_history(
    entries: impl IntoIterator<Item = time_entry::Model>,
    user_id: Uuid,
    month: Month,
) -> MonthlyHistory {
    let mut selected: Vec<time_entry::Model> = entries
        .into_iter()
        .filter(|entry| entry.user_id == user_id && month.contains(entry.date))
        .collect();
    selected.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| b.start_time.cmp(&a.start_time))
    });
    let total: f64 = selected.iter().map(|entry| entry.hours_worked).sum();
    let average = if selected.is_empty() {
        0.0
    } else {
        total / selected.len() as f64
    };
    MonthlyHistory {
        month,
        user_id,
        entries: selected,
        total_hours: round_hours(total),
        average_hours: (average * 10.0).round() / 10.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn entry(user_id: Uuid, date: &str, start: &str, hours: f64) -> time_entry::Model {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let start_time = NaiveTime::parse_from_str(start, "%H:%M").unwrap();
        time_entry::Model {
            id: Uuid::new_v4(),
            user_id,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            start_time,
            end_time: start_time,
            hours_worked: hours,
            project_id: Uuid::new_v4(),
            description: None,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn month_parses_and_formats() {
        let month: Month = "2025-02".parse().unwrap();
        assert_eq!(month.to_string(), "2025-02");
        assert_eq!(month.first_day(), NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert_eq!(month.last_day(), NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
        assert_eq!(
            "2024-12".parse::<Month>().unwrap().next().to_string(),
            "2025-01"
        );
    }

    #[test]
    fn month_rejects_bad_input() {
        for raw in [
            "2025-13", "2025-1", "25-01", "2025/01", "", "abcd-ef", "2025-+3", "+999-03",
            "-999-03", "2025-00",
        ] {
            assert!(raw.parse::<Month>().is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn invalid_month_message_names_the_input() {
        let err = "2025-+3".parse::<Month>().unwrap_err();
        assert_eq!(err, InvalidMonth("2025-+3".into()));
        assert_eq!(
            err.to_string(),
            "month must be in YYYY-MM format, got \"2025-+3\""
        );
    }

    #[test]
    fn filters_by_user_and_month() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let history = monthly_history(
            vec![
                entry(me, "2025-03-01", "08:00", 8.0),
                entry(me, "2025-03-31", "08:00", 4.0),
                entry(me, "2025-02-28", "08:00", 6.0),
                entry(me, "2025-04-01", "08:00", 6.0),
                entry(other, "2025-03-15", "08:00", 7.0),
            ],
            me,
            "2025-03".parse().unwrap(),
        );
        assert_eq!(history.entry_count(), 2);
        assert!(history
            .entries
            .iter()
            .all(|e| e.user_id == me && e.date.format("%Y-%m").to_string() == "2025-03"));
        assert_eq!(history.total_hours, 12.0);
        assert_eq!(history.average_hours, 6.0);
    }

    #[test]
    fn sorts_newest_first() {
        let me = Uuid::new_v4();
        let history = monthly_history(
            vec![
                entry(me, "2025-03-02", "08:00", 1.0),
                entry(me, "2025-03-10", "08:00", 1.0),
                entry(me, "2025-03-10", "13:00", 1.0),
                entry(me, "2025-03-05", "08:00", 1.0),
            ],
            me,
            "2025-03".parse().unwrap(),
        );
        let order: Vec<String> = history
            .entries
            .iter()
            .map(|e| format!("{} {}", e.date, e.start_time.format("%H:%M")))
            .collect();
        assert_eq!(
            order,
            vec![
                "2025-03-10 13:00",
                "2025-03-10 08:00",
                "2025-03-05 08:00",
                "2025-03-02 08:00"
            ]
        );
    }

    #[test]
    fn empty_month_has_zero_average() {
        let history = monthly_history(Vec::new(), Uuid::new_v4(), "2025-03".parse().unwrap());
        assert_eq!(history.entry_count(), 0);
        assert_eq!(history.total_hours, 0.0);
        assert_eq!(history.average_hours, 0.0);
    }

    #[test]
    fn totals_are_rounded() {
        let me = Uuid::new_v4();
        let history = monthly_history(
            vec![
                entry(me, "2025-03-01", "08:00", 0.1),
                entry(me, "2025-03-02", "08:00", 0.2),
                entry(me, "2025-03-03", "08:00", 7.33),
            ],
            me,
            "2025-03".parse().unwrap(),
        );
        assert_eq!(history.total_hours, 7.63);
        assert_eq!(history.average_hours, 2.5);
    }
}
