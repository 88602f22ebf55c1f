//! Monthly payroll overview for administrators.

use std::collections::HashMap;

use entity::{time_entry, user};
use uuid::Uuid;

use crate::history::Month;
use crate::timesheet::round_hours;

#[derive(Clone, Debug, PartialEq)]
pub struct EmployeeMonth {
    pub user_id: Uuid,
    pub full_name: String,
    pub is_active: bool,
    pub total_hours: f64,
    pub entry_count: usize,
    pub hourly_rate_cents: i64,
    pub gross_pay_cents: i64,
    pub deductions_cents: i64,
    /// Gross minus deductions; negative when deductions exceed earnings.
    pub net_pay_cents: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MonthlyReport {
    pub month: Month,
    pub rows: Vec<EmployeeMonth>,
    pub total_hours: f64,
    pub total_gross_cents: i64,
    pub total_net_cents: i64,
}

/// Gross pay for `hours` at `rate_cents` per hour, rounded to whole cents.
pub fn gross_pay_cents(hours: f64, rate_cents: i64) -> i64 {
    (hours * rate_cents as f64).round() as i64
}

/// One row per employee (plus anyone else with hours in `month`), in the
/// order `users` is given.
pub fn monthly_report(
    users: &[user::Model],
    entries: &[time_entry::Model],
    month: Month,
) -> MonthlyReport {
    let mut hours: HashMap<Uuid, (f64, usize)> = HashMap::new();
    for entry in entries.iter().filter(|e| month.contains(e.date)) {
        let slot = hours.entry(entry.user_id).or_insert((0.0, 0));
        slot.0 += entry.hours_worked;
        slot.1 += 1;
    }

    let rows: Vec<EmployeeMonth> = users
        .iter()
        .filter(|u| u.role == user::Role::Employee || hours.contains_key(&u.id))
        .map(|u| {
            let (sum, count) = hours.get(&u.id).copied().unwrap_or((0.0, 0));
            let total_hours = round_hours(sum);
            let gross = gross_pay_cents(total_hours, u.hourly_rate_cents);
            EmployeeMonth {
                user_id: u.id,
                full_name: u.full_name(),
                is_active: u.is_active,
                total_hours,
                entry_count: count,
                hourly_rate_cents: u.hourly_rate_cents,
                gross_pay_cents: gross,
                deductions_cents: u.monthly_deductions_cents,
                net_pay_cents: gross - u.monthly_deductions_cents,
            }
        })
        .collect();

    MonthlyReport {
        month,
        total_hours: round_hours(rows.iter().map(|r| r.total_hours).sum()),
        total_gross_cents: rows.iter().map(|r| r.gross_pay_cents).sum(),
        total_net_cents: rows.iter().map(|r| r.net_pay_cents).sum(),
        rows,
    }
}
