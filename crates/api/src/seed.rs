//! Demo accounts and projects. Safe to run repeatedly: existing rows are
//! looked up by email or name and left untouched.

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use entity::{project, time_entry, user};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tracing::info;

use crate::auth::hash_password;
use crate::store::{NewUser, Store};
use crate::timesheet::EntryForm;

struct SeedUser {
    first_name: &'static str,
    last_name: &'static str,
    email: &'static str,
    password: &'static str,
    role: user::Role,
    hourly_rate_cents: i64,
    monthly_deductions_cents: i64,
}

const SEED_USERS: [SeedUser; 3] = [
    SeedUser {
        first_name: "Admin",
        last_name: "Systému",
        email: "admin@firma.cz",
        password: "admin123",
        role: user::Role::Admin,
        hourly_rate_cents: 0,
        monthly_deductions_cents: 0,
    },
    SeedUser {
        first_name: "Jan",
        last_name: "Novák",
        email: "jan.novak@firma.cz",
        password: "heslo123",
        role: user::Role::Employee,
        hourly_rate_cents: 25_000,
        monthly_deductions_cents: 150_000,
    },
    SeedUser {
        first_name: "Marie",
        last_name: "Svobodová",
        email: "marie.svobodova@firma.cz",
        password: "heslo123",
        role: user::Role::Employee,
        hourly_rate_cents: 28_000,
        monthly_deductions_cents: 180_000,
    },
];

const SEED_PROJECTS: [&str; 3] = ["Interní vývoj", "Zákaznická podpora", "Web pro klienta"];

#[derive(Debug, Clone)]
pub struct SeededRecords {
    pub users: Vec<user::Model>,
    pub projects: Vec<project::Model>,
    pub entries: Vec<time_entry::Model>,
}

impl SeededRecords {
    pub fn user_email(&self, email: &str) -> Option<&user::Model> {
        self.users.iter().find(|u| u.email == email)
    }

    pub fn project_named(&self, name: &str) -> Option<&project::Model> {
        self.projects.iter().find(|p| p.name == name)
    }
}

pub async fn seed_demo(store: &Store) -> Result<SeededRecords> {
    let mut users = Vec::with_capacity(SEED_USERS.len());
    let mut fresh_employees = Vec::new();
    for seed in &SEED_USERS {
        let existing = store
            .user_by_email(seed.email)
            .await
            .with_context(|| format!("looking up {}", seed.email))?;
        if let Some(existing) = existing {
            users.push(existing);
            continue;
        }
        let password_hash = hash_password(seed.password)
            .map_err(|err| anyhow!("hashing password of {}: {}", seed.email, err))?;
        let created = store
            .create_user(NewUser {
                first_name: seed.first_name.into(),
                last_name: seed.last_name.into(),
                email: seed.email.into(),
                role: seed.role,
                hourly_rate_cents: seed.hourly_rate_cents,
                monthly_deductions_cents: seed.monthly_deductions_cents,
                password_hash,
            })
            .await
            .with_context(|| format!("creating {}", seed.email))?;
        info!(email = seed.email, "seeded user");
        if created.role == user::Role::Employee {
            fresh_employees.push(created.clone());
        }
        users.push(created);
    }

    let mut projects = Vec::with_capacity(SEED_PROJECTS.len());
    for name in SEED_PROJECTS {
        let existing = project::Entity::find()
            .filter(project::Column::Name.eq(name))
            .one(store.connection())
            .await?;
        let model = match existing {
            Some(model) => model,
            None => {
                info!(name, "seeded project");
                store.create_project(name.to_string()).await?
            }
        };
        projects.push(model);
    }

    // Only accounts created in this run get sample entries.
    let mut entries = Vec::new();
    for (idx, employee) in fresh_employees.iter().enumerate() {
        let project = &projects[idx % projects.len()];
        for date in recent_workdays(Utc::now().date_naive(), 3) {
            let form = EntryForm {
                date: date.format("%Y-%m-%d").to_string(),
                start_time: "08:00".into(),
                end_time: if idx % 2 == 0 { "16:30" } else { "15:00" }.into(),
                project_id: project.id.to_string(),
                description: Some("Ukázkový záznam".into()),
            };
            let valid = form
                .validate()
                .map_err(|errors| anyhow!("invalid sample entry: {:?}", errors))?;
            entries.push(store.create_time_entry(employee.id, valid).await?);
        }
    }

    Ok(SeededRecords {
        users,
        projects,
        entries,
    })
}

/// The last `count` weekdays up to and including `today`.
fn recent_workdays(today: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut cursor = today;
    while days.len() < count {
        if !matches!(cursor.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(cursor);
        }
        cursor -= Duration::days(1);
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::DatabaseConnection;
    use std::sync::Arc;

    #[tokio::test]
    async fn storage_failure_names_the_record() {
        let store = Store::new(Arc::new(DatabaseConnection::Disconnected));
        let err = seed_demo(&store).await.unwrap_err();
        assert_eq!(err.to_string(), "looking up admin@firma.cz");
    }

    #[test]
    fn workdays_skip_weekends() {
        let monday = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let days = recent_workdays(monday, 3);
        assert_eq!(
            days,
            vec![
                monday,
                NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
                NaiveDate::from_ymd_opt(2025, 2, 27).unwrap(),
            ]
        );
    }
}
