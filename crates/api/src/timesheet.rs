//! Time-sheet rules: clock parsing, worked-hours derivation and validation
//! of the entry form shared by the "add entry" and inline-edit flows.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

/// Longest single work session accepted by the form.
pub const MAX_ENTRY_HOURS: f64 = 24.0;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DESCRIPTION_MAX: usize = 2_000;

/// Field name to message, in stable order so clients can render them
/// next to the matching inputs.
pub type FieldErrors = BTreeMap<String, String>;

/// Parses `HH:MM` (or `HH:MM:SS`) as produced by a time input.
pub fn parse_clock(value: &str) -> Option<NaiveTime> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .ok()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

pub fn format_clock(value: NaiveTime) -> String {
    value.format("%H:%M").to_string()
}

/// Signed span between two clock times in hours.
fn span_hours(start: NaiveTime, end: NaiveTime) -> f64 {
    let seconds = end.signed_duration_since(start).num_seconds();
    seconds as f64 / 3600.0
}

/// Hours worked between `start` and `end`; never negative.
pub fn hours_between(start: NaiveTime, end: NaiveTime) -> f64 {
    span_hours(start, end).max(0.0)
}

/// Rounds to two decimals, the precision stored on entries.
pub fn round_hours(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}

/// Hours derived from two `HH:MM` strings, or `None` when either does not
/// parse.
pub fn hours_from_clock(start: &str, end: &str) -> Option<f64> {
    Some(round_hours(hours_between(parse_clock(start)?, parse_clock(end)?)))
}

/// Raw entry form as submitted by a client.
#[derive(Clone, Debug, Default)]
pub struct EntryForm {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub project_id: String,
    pub description: Option<String>,
}

/// An entry form that passed validation, with hours derived.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidEntry {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub hours_worked: f64,
    pub project_id: Uuid,
    pub description: Option<String>,
}

impl EntryForm {
    /// Checks every field and reports all problems at once.
    pub fn validate(&self) -> Result<ValidEntry, FieldErrors> {
        let mut errors = FieldErrors::new();

        let date = required(&mut errors, "date", &self.date, "Date is required").and_then(|raw| {
            let parsed = parse_date(raw);
            if parsed.is_none() {
                errors.insert("date".into(), "Date must be in YYYY-MM-DD format".into());
            }
            parsed
        });

        let start = self.clock_field(&mut errors, "startTime", &self.start_time, "Start time");
        let end = self.clock_field(&mut errors, "endTime", &self.end_time, "End time");

        if let (Some(start), Some(end)) = (start, end) {
            let span = span_hours(start, end);
            if span <= 0.0 {
                errors.insert("endTime".into(), "End time must be after start time".into());
            } else if span > MAX_ENTRY_HOURS {
                errors.insert(
                    "endTime".into(),
                    "Working time cannot be longer than 24 hours".into(),
                );
            }
        }

        let project_id = required(
            &mut errors,
            "projectId",
            &self.project_id,
            "Project is required",
        )
        .and_then(|raw| {
            let parsed = Uuid::parse_str(raw.trim()).ok();
            if parsed.is_none() {
                errors.insert("projectId".into(), "Project is invalid".into());
            }
            parsed
        });

        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        if let Some(text) = &description {
            if text.chars().count() > DESCRIPTION_MAX {
                errors.insert(
                    "description".into(),
                    format!("Description must be at most {} characters", DESCRIPTION_MAX),
                );
            }
        }

        match (date, start, end, project_id) {
            (Some(date), Some(start_time), Some(end_time), Some(project_id))
                if errors.is_empty() =>
            {
                Ok(ValidEntry {
                    date,
                    start_time,
                    end_time,
                    hours_worked: round_hours(hours_between(start_time, end_time)),
                    project_id,
                    description,
                })
            }
            _ => Err(errors),
        }
    }

    fn clock_field(
        &self,
        errors: &mut FieldErrors,
        field: &str,
        value: &str,
        label: &str,
    ) -> Option<NaiveTime> {
        let raw = required(errors, field, value, &format!("{} is required", label))?;
        let parsed = parse_clock(raw);
        if parsed.is_none() {
            errors.insert(field.into(), format!("{} must be in HH:MM format", label));
        }
        parsed
    }
}

fn required<'a>(
    errors: &mut FieldErrors,
    field: &str,
    value: &'a str,
    message: &str,
) -> Option<&'a str> {
    if value.trim().is_empty() {
        errors.insert(field.into(), message.into());
        None
    } else {
        Some(value)
    }
}
