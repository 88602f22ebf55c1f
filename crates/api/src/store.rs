//! Data access for users, projects and time entries.
//!
//! Every method is a direct pass-through to sea-orm: no retries, caching or
//! conflict resolution. Callers validate input before writing.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use entity::{project, time_entry, user, user_secret, user_session};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use uuid::Uuid;

use crate::timesheet::ValidEntry;

#[derive(Clone, Debug)]
pub struct Store {
    db: Arc<DatabaseConnection>,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: user::Role,
    pub hourly_rate_cents: i64,
    pub monthly_deductions_cents: i64,
    pub password_hash: String,
}

#[derive(Clone, Debug, Default)]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<user::Role>,
    pub hourly_rate_cents: Option<i64>,
    pub monthly_deductions_cents: Option<i64>,
    pub is_active: Option<bool>,
    /// Replaces the stored secret in the same transaction.
    pub password_hash: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ProjectChanges {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

/// Narrows `time_entries`; unset fields do not filter.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntryFilter {
    pub user_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl Store {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    // users

    pub async fn users(&self) -> Result<Vec<user::Model>, DbErr> {
        user::Entity::find()
            .order_by_asc(user::Column::LastName)
            .order_by_asc(user::Column::FirstName)
            .order_by_asc(user::Column::Id)
            .all(self.connection())
            .await
    }

    pub async fn user(&self, id: Uuid) -> Result<Option<user::Model>, DbErr> {
        user::Entity::find_by_id(id).one(self.connection()).await
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<user::Model>, DbErr> {
        user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.connection())
            .await
    }

    pub async fn password_hash(&self, user_id: Uuid) -> Result<Option<String>, DbErr> {
        Ok(user_secret::Entity::find_by_id(user_id)
            .one(self.connection())
            .await?
            .map(|secret| secret.password_hash))
    }

    pub async fn create_user(&self, input: NewUser) -> Result<user::Model, DbErr> {
        let txn = self.db.begin().await?;
        let now: DateTimeWithTimeZone = Utc::now().into();
        let model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            first_name: Set(input.first_name),
            last_name: Set(input.last_name),
            email: Set(input.email),
            role: Set(input.role),
            hourly_rate_cents: Set(input.hourly_rate_cents),
            monthly_deductions_cents: Set(input.monthly_deductions_cents),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        user_secret::ActiveModel {
            user_id: Set(model.id),
            password_hash: Set(input.password_hash),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;
        Ok(model)
    }

    pub async fn update_user(
        &self,
        existing: user::Model,
        changes: UserChanges,
    ) -> Result<user::Model, DbErr> {
        let txn = self.db.begin().await?;
        if let Some(hash) = changes.password_hash {
            write_secret(&txn, existing.id, hash).await?;
        }
        let mut active: user::ActiveModel = existing.into();
        if let Some(first_name) = changes.first_name {
            active.first_name = Set(first_name);
        }
        if let Some(last_name) = changes.last_name {
            active.last_name = Set(last_name);
        }
        if let Some(email) = changes.email {
            active.email = Set(email);
        }
        if let Some(role) = changes.role {
            active.role = Set(role);
        }
        if let Some(rate) = changes.hourly_rate_cents {
            active.hourly_rate_cents = Set(rate);
        }
        if let Some(deductions) = changes.monthly_deductions_cents {
            active.monthly_deductions_cents = Set(deductions);
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }

    /// Removes the user with their entries, sessions and secret.
    pub async fn delete_user(&self, id: Uuid) -> Result<bool, DbErr> {
        let txn = self.db.begin().await?;
        time_entry::Entity::delete_many()
            .filter(time_entry::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        user_session::Entity::delete_many()
            .filter(user_session::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        user_secret::Entity::delete_by_id(id).exec(&txn).await?;
        let res = user::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;
        Ok(res.rows_affected > 0)
    }

    /// Drops the sessions of `user_id`, keeping `keep` when given.
    pub async fn end_sessions_of(&self, user_id: Uuid, keep: Option<Uuid>) -> Result<u64, DbErr> {
        let mut query =
            user_session::Entity::delete_many().filter(user_session::Column::UserId.eq(user_id));
        if let Some(session_id) = keep {
            query = query.filter(user_session::Column::Id.ne(session_id));
        }
        let res = query.exec(self.connection()).await?;
        Ok(res.rows_affected)
    }

    // projects

    pub async fn projects(&self, active_only: bool) -> Result<Vec<project::Model>, DbErr> {
        let mut query = project::Entity::find();
        if active_only {
            query = query.filter(project::Column::IsActive.eq(true));
        }
        query
            .order_by_asc(project::Column::Name)
            .order_by_asc(project::Column::Id)
            .all(self.connection())
            .await
    }

    pub async fn project(&self, id: Uuid) -> Result<Option<project::Model>, DbErr> {
        project::Entity::find_by_id(id).one(self.connection()).await
    }

    pub async fn create_project(&self, name: String) -> Result<project::Model, DbErr> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        project::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.connection())
        .await
    }

    pub async fn update_project(
        &self,
        existing: project::Model,
        changes: ProjectChanges,
    ) -> Result<project::Model, DbErr> {
        let mut active: project::ActiveModel = existing.into();
        if let Some(name) = changes.name {
            active.name = Set(name);
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now().into());
        active.update(self.connection()).await
    }

    pub async fn delete_project(&self, id: Uuid) -> Result<bool, DbErr> {
        let res = project::Entity::delete_by_id(id)
            .exec(self.connection())
            .await?;
        Ok(res.rows_affected > 0)
    }

    pub async fn project_entry_count(&self, project_id: Uuid) -> Result<u64, DbErr> {
        time_entry::Entity::find()
            .filter(time_entry::Column::ProjectId.eq(project_id))
            .count(self.connection())
            .await
    }

    // time entries

    /// Matching entries, newest date first.
    pub async fn time_entries(&self, filter: EntryFilter) -> Result<Vec<time_entry::Model>, DbErr> {
        let mut query = time_entry::Entity::find();
        if let Some(user_id) = filter.user_id {
            query = query.filter(time_entry::Column::UserId.eq(user_id));
        }
        if let Some(project_id) = filter.project_id {
            query = query.filter(time_entry::Column::ProjectId.eq(project_id));
        }
        if let Some(from) = filter.from {
            query = query.filter(time_entry::Column::Date.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(time_entry::Column::Date.lte(to));
        }
        query
            .order_by_desc(time_entry::Column::Date)
            .order_by_desc(time_entry::Column::StartTime)
            .order_by_asc(time_entry::Column::Id)
            .all(self.connection())
            .await
    }

    pub async fn time_entry(&self, id: Uuid) -> Result<Option<time_entry::Model>, DbErr> {
        time_entry::Entity::find_by_id(id).one(self.connection()).await
    }

    pub async fn create_time_entry(
        &self,
        user_id: Uuid,
        entry: ValidEntry,
    ) -> Result<time_entry::Model, DbErr> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        time_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            date: Set(entry.date),
            start_time: Set(entry.start_time),
            end_time: Set(entry.end_time),
            hours_worked: Set(entry.hours_worked),
            project_id: Set(entry.project_id),
            description: Set(entry.description),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.connection())
        .await
    }

    pub async fn update_time_entry(
        &self,
        existing: time_entry::Model,
        entry: ValidEntry,
    ) -> Result<time_entry::Model, DbErr> {
        let mut active: time_entry::ActiveModel = existing.into();
        active.date = Set(entry.date);
        active.start_time = Set(entry.start_time);
        active.end_time = Set(entry.end_time);
        active.hours_worked = Set(entry.hours_worked);
        active.project_id = Set(entry.project_id);
        active.description = Set(entry.description);
        active.updated_at = Set(Utc::now().into());
        active.update(self.connection()).await
    }

    pub async fn delete_time_entry(&self, id: Uuid) -> Result<bool, DbErr> {
        let res = time_entry::Entity::delete_by_id(id)
            .exec(self.connection())
            .await?;
        Ok(res.rows_affected > 0)
    }
}

/// Inserts or replaces the password hash of `user_id`.
async fn write_secret<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    password_hash: String,
) -> Result<(), DbErr> {
    let now: DateTimeWithTimeZone = Utc::now().into();
    match user_secret::Entity::find_by_id(user_id).one(db).await? {
        Some(secret) => {
            let mut active: user_secret::ActiveModel = secret.into();
            active.password_hash = Set(password_hash);
            active.updated_at = Set(now);
            active.update(db).await?;
        }
        None => {
            user_secret::ActiveModel {
                user_id: Set(user_id),
                password_hash: Set(password_hash),
                updated_at: Set(now),
            }
            .insert(db)
            .await?;
        }
    }
    Ok(())
}
