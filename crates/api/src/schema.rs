use std::{collections::HashMap, sync::Arc};

use async_graphql::{
    Context, Enum, Error, ErrorExtensions, InputObject, Object, Schema, SimpleObject,
    Subscription, ID,
};
use chrono::{DateTime, NaiveDate, Utc};
use entity::{project, time_entry, user};
use futures_util::{future, Stream, StreamExt};
use sea_orm::{DatabaseConnection, DbErr};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::auth::{
    hash_password, issue_token, verify_password_or_dummy, AuthConfig, AuthError, CurrentUser,
    UserRole, SESSION_COOKIE,
};
use crate::error::ApiError;
use crate::history::{monthly_history, Month, MonthlyHistory};
use crate::navigation::{entries_for, greeting, role_label, NavEntry};
use crate::report::{monthly_report, EmployeeMonth, MonthlyReport};
use crate::session::{end_session, start_session, SessionEvent, SessionHub};
use crate::store::{EntryFilter, NewUser, ProjectChanges, Store, UserChanges};
use crate::timesheet::{format_clock, EntryForm, FieldErrors};

/// Message for every failed sign-in, whatever the cause.
pub const LOGIN_FAILED: &str = "Invalid credentials or inactive account";

const PASSWORD_MIN: usize = 6;
const NAME_MAX: usize = 128;

pub type AttendanceSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

pub struct AppSchema(pub AttendanceSchema);

pub fn build_schema(db: Arc<DatabaseConnection>, auth: Arc<AuthConfig>) -> AppSchema {
    build_schema_with_hub(db, auth, SessionHub::new())
}

pub fn build_schema_with_hub(
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthConfig>,
    hub: SessionHub,
) -> AppSchema {
    let schema = Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(Store::new(db))
        .data(auth)
        .data(hub)
        .finish();
    AppSchema(schema)
}

pub struct QueryRoot;
pub struct MutationRoot;
pub struct SubscriptionRoot;

#[Object]
impl QueryRoot {
    async fn attendance(&self) -> AttendanceQuery {
        AttendanceQuery
    }
}

#[Object]
impl MutationRoot {
    async fn attendance(&self) -> AttendanceMutation {
        AttendanceMutation
    }
}

#[derive(Default)]
pub struct AttendanceQuery;

#[derive(Default)]
pub struct AttendanceMutation;

#[Object]
impl AttendanceQuery {
    /// The signed-in user with header labels and menu, or null.
    async fn me(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<MePayload>> {
        let Some(viewer) = ctx.data_opt::<CurrentUser>() else {
            return Ok(None);
        };
        let store = store(ctx)?;
        let Some(model) = store.user(viewer.user_id).await.map_err(db_error)? else {
            return Ok(None);
        };
        Ok(Some(MePayload::from_model(model)))
    }

    async fn navigation(&self, ctx: &Context<'_>) -> Vec<NavItem> {
        let role = ctx.data_opt::<CurrentUser>().map(|viewer| viewer.role);
        entries_for(role).into_iter().map(NavItem::from).collect()
    }

    async fn users(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<UserNode>> {
        require_role(ctx, UserRole::Admin)?;
        let store = store(ctx)?;
        let users = store
            .users()
            .instrument(info_span!("attendance.users.list"))
            .await
            .map_err(db_error)?;
        Ok(users.into_iter().map(UserNode::from).collect())
    }

    async fn user(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<Option<UserNode>> {
        let viewer = current_user(ctx)?;
        let user_id = parse_uuid(&id)?;
        if !viewer.can_access(user_id) {
            return Err(ApiError::Forbidden.extend());
        }
        let store = store(ctx)?;
        Ok(store
            .user(user_id)
            .await
            .map_err(db_error)?
            .map(UserNode::from))
    }

    async fn projects(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "activeOnly", default)] active_only: bool,
    ) -> async_graphql::Result<Vec<ProjectNode>> {
        current_user(ctx)?;
        let store = store(ctx)?;
        let rows = store
            .projects(active_only)
            .instrument(info_span!("attendance.projects.list", active_only))
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(ProjectNode::from).collect())
    }

    /// Entries newest first. Employees only ever see their own.
    #[graphql(name = "timeEntries")]
    async fn time_entries(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "userId")] user_id: Option<ID>,
        #[graphql(name = "projectId")] project_id: Option<ID>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> async_graphql::Result<Vec<TimeEntryNode>> {
        let viewer = current_user(ctx)?;
        let owner = match user_id {
            Some(raw) => Some(parse_uuid(&raw)?),
            None if viewer.is_admin() => None,
            None => Some(viewer.user_id),
        };
        if let Some(owner) = owner {
            if !viewer.can_access(owner) {
                return Err(ApiError::Forbidden.extend());
            }
        }
        let filter = EntryFilter {
            user_id: owner,
            project_id: project_id.as_ref().map(parse_uuid).transpose()?,
            from,
            to,
        };
        let store = store(ctx)?;
        let rows = store
            .time_entries(filter)
            .instrument(info_span!(
                "attendance.time_entries.list",
                user_id = ?filter.user_id,
                from = ?filter.from,
                to = ?filter.to
            ))
            .await
            .map_err(db_error)?;
        entry_nodes(&store, rows).await
    }

    #[graphql(name = "timeEntry")]
    async fn time_entry(
        &self,
        ctx: &Context<'_>,
        id: ID,
    ) -> async_graphql::Result<Option<TimeEntryNode>> {
        let viewer = current_user(ctx)?;
        let store = store(ctx)?;
        let Some(model) = store
            .time_entry(parse_uuid(&id)?)
            .await
            .map_err(db_error)?
        else {
            return Ok(None);
        };
        if !viewer.can_access(model.user_id) {
            return Err(ApiError::Forbidden.extend());
        }
        Ok(entry_nodes(&store, vec![model]).await?.pop())
    }

    /// History table and summary cards for one month (`YYYY-MM`, default
    /// the current month).
    #[graphql(name = "monthlyHistory")]
    async fn monthly_history(
        &self,
        ctx: &Context<'_>,
        month: Option<String>,
        #[graphql(name = "userId")] user_id: Option<ID>,
    ) -> async_graphql::Result<MonthlyHistoryNode> {
        let viewer = current_user(ctx)?;
        let month = parse_month(month)?;
        let owner = match user_id {
            Some(raw) => parse_uuid(&raw)?,
            None => viewer.user_id,
        };
        if !viewer.can_access(owner) {
            return Err(ApiError::Forbidden.extend());
        }
        let store = store(ctx)?;
        let rows = store
            .time_entries(EntryFilter {
                user_id: Some(owner),
                from: Some(month.first_day()),
                to: Some(month.last_day()),
                ..EntryFilter::default()
            })
            .instrument(info_span!("attendance.history.month", month = %month, user_id = %owner))
            .await
            .map_err(db_error)?;
        let history = monthly_history(rows, owner, month);
        MonthlyHistoryNode::build(&store, history).await
    }

    #[graphql(name = "monthlyReport")]
    async fn monthly_report(
        &self,
        ctx: &Context<'_>,
        month: Option<String>,
    ) -> async_graphql::Result<MonthlyReportNode> {
        require_role(ctx, UserRole::Admin)?;
        let month = parse_month(month)?;
        let store = store(ctx)?;
        let span = info_span!("attendance.report.month", month = %month);
        let (users, entries) = async {
            let users = store.users().await?;
            let entries = store
                .time_entries(EntryFilter {
                    from: Some(month.first_day()),
                    to: Some(month.last_day()),
                    ..EntryFilter::default()
                })
                .await?;
            Ok::<_, DbErr>((users, entries))
        }
        .instrument(span)
        .await
        .map_err(db_error)?;
        Ok(MonthlyReportNode::from(monthly_report(&users, &entries, month)))
    }
}

#[Object]
impl AttendanceMutation {
    /// Signs in with email and password. When `role` is given it must match
    /// the account's role. Failures come back as `ok: false`.
    async fn login(
        &self,
        ctx: &Context<'_>,
        email: String,
        password: String,
        role: Option<UserRole>,
    ) -> async_graphql::Result<AuthPayload> {
        let store = store(ctx)?;
        let auth = auth_config(ctx)?;
        let email = email.trim().to_lowercase();
        let user = store.user_by_email(&email).await.map_err(db_error)?;
        let hash = match &user {
            Some(user) => store.password_hash(user.id).await.map_err(db_error)?,
            None => None,
        };
        // The password is checked before anything else so every rejection
        // costs one argon2 verification.
        let password_ok = verify_password_or_dummy(&password, hash.as_deref());
        let Some(user) = user else {
            debug!("login rejected: unknown email");
            return Ok(AuthPayload::failed());
        };
        if !password_ok {
            debug!(user_id = %user.id, "login rejected: wrong password");
            return Ok(AuthPayload::failed());
        }
        if !user.is_active {
            debug!(user_id = %user.id, "login rejected: inactive account");
            return Ok(AuthPayload::failed());
        }
        let account_role = UserRole::from(user.role);
        if role.is_some_and(|selected| selected != account_role) {
            debug!(user_id = %user.id, "login rejected: role mismatch");
            return Ok(AuthPayload::failed());
        }

        let now = Utc::now();
        let expires_at = auth.session_expiry(now).map_err(auth_error)?;
        let session = start_session(store.connection(), user.id, now, expires_at)
            .await
            .map_err(db_error)?;
        let token = issue_token(user.id, session.id, account_role, expires_at, &auth)
            .map_err(auth_error)?;
        append_session_cookie(ctx, &token, (expires_at - now).num_seconds(), &auth);
        session_hub(ctx)?.publish(SessionEvent::SignedIn { user_id: user.id });
        info!(user_id = %user.id, role = account_role.as_str(), "user signed in");
        Ok(AuthPayload {
            ok: true,
            user: Some(UserNode::from(user)),
            token: Some(token),
            error: None,
        })
    }

    /// Ends the caller's session. Returns false when nobody was signed in.
    async fn logout(&self, ctx: &Context<'_>) -> async_graphql::Result<bool> {
        let auth = auth_config(ctx)?;
        clear_session_cookie(ctx, &auth);
        let Some(viewer) = ctx.data_opt::<CurrentUser>().cloned() else {
            return Ok(false);
        };
        let store = store(ctx)?;
        end_session(store.connection(), viewer.session_id)
            .await
            .map_err(db_error)?;
        session_hub(ctx)?.publish(SessionEvent::SignedOut {
            user_id: viewer.user_id,
        });
        info!(user_id = %viewer.user_id, "user signed out");
        Ok(true)
    }

    #[graphql(name = "createTimeEntry")]
    async fn create_time_entry(
        &self,
        ctx: &Context<'_>,
        input: NewTimeEntryInput,
    ) -> async_graphql::Result<TimeEntryNode> {
        let viewer = current_user(ctx)?;
        let store = store(ctx)?;
        let owner = match &input.user_id {
            Some(raw) => parse_uuid(raw)?,
            None => viewer.user_id,
        };
        if !viewer.can_access(owner) {
            return Err(ApiError::Forbidden.extend());
        }
        if owner != viewer.user_id && store.user(owner).await.map_err(db_error)?.is_none() {
            return Err(ApiError::NotFound("user").extend());
        }
        let entry = input.form().validate().map_err(invalid_fields)?;
        let project = ensure_project(&store, entry.project_id, true).await?;
        let created = store
            .create_time_entry(owner, entry)
            .instrument(info_span!("attendance.time_entries.create", user_id = %owner))
            .await
            .map_err(db_error)?;
        info!(entry_id = %created.id, user_id = %owner, hours = created.hours_worked, "time entry created");
        Ok(TimeEntryNode::from_model(created, Some(project.name)))
    }

    /// Inline edit: the whole form is resubmitted and hours re-derived.
    #[graphql(name = "updateTimeEntry")]
    async fn update_time_entry(
        &self,
        ctx: &Context<'_>,
        input: UpdateTimeEntryInput,
    ) -> async_graphql::Result<TimeEntryNode> {
        let viewer = current_user(ctx)?;
        let store = store(ctx)?;
        let existing = store
            .time_entry(parse_uuid(&input.id)?)
            .await
            .map_err(db_error)?
            .ok_or_else(|| ApiError::NotFound("time entry").extend())?;
        if !viewer.can_access(existing.user_id) {
            return Err(ApiError::Forbidden.extend());
        }
        let entry = input.form().validate().map_err(invalid_fields)?;
        let project = ensure_project(&store, entry.project_id, false).await?;
        let updated = store
            .update_time_entry(existing, entry)
            .instrument(info_span!("attendance.time_entries.update"))
            .await
            .map_err(db_error)?;
        info!(entry_id = %updated.id, hours = updated.hours_worked, "time entry updated");
        Ok(TimeEntryNode::from_model(updated, Some(project.name)))
    }

    #[graphql(name = "deleteTimeEntry")]
    async fn delete_time_entry(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        let viewer = current_user(ctx)?;
        let store = store(ctx)?;
        let entry_id = parse_uuid(&id)?;
        let Some(existing) = store.time_entry(entry_id).await.map_err(db_error)? else {
            return Ok(false);
        };
        if !viewer.can_access(existing.user_id) {
            return Err(ApiError::Forbidden.extend());
        }
        let deleted = store
            .delete_time_entry(entry_id)
            .await
            .map_err(db_error)?;
        info!(entry_id = %entry_id, deleted, "time entry deleted");
        Ok(deleted)
    }

    #[graphql(name = "createUser")]
    async fn create_user(
        &self,
        ctx: &Context<'_>,
        input: NewUserInput,
    ) -> async_graphql::Result<UserNode> {
        require_role(ctx, UserRole::Admin)?;
        let store = store(ctx)?;
        let mut errors = FieldErrors::new();
        let first_name = required_name(&mut errors, "firstName", &input.first_name);
        let last_name = required_name(&mut errors, "lastName", &input.last_name);
        let email = checked_email(&mut errors, &input.email);
        check_password(&mut errors, &input.password);
        check_money(&mut errors, "hourlyRateCents", input.hourly_rate_cents);
        check_money(
            &mut errors,
            "monthlyDeductionsCents",
            input.monthly_deductions_cents,
        );
        if let Some(email) = &email {
            if store.user_by_email(email).await.map_err(db_error)?.is_some() {
                errors.insert("email".into(), "Email is already in use".into());
            }
        }
        let (Some(first_name), Some(last_name), Some(email), true) =
            (first_name, last_name, email, errors.is_empty())
        else {
            return Err(invalid_fields(errors));
        };
        let password_hash = hash_password(&input.password).map_err(hash_error)?;
        let created = store
            .create_user(NewUser {
                first_name,
                last_name,
                email,
                role: input.role.into(),
                hourly_rate_cents: input.hourly_rate_cents,
                monthly_deductions_cents: input.monthly_deductions_cents,
                password_hash,
            })
            .await
            .map_err(db_error)?;
        info!(user_id = %created.id, "user created");
        Ok(UserNode::from(created))
    }

    #[graphql(name = "updateUser")]
    async fn update_user(
        &self,
        ctx: &Context<'_>,
        input: UpdateUserInput,
    ) -> async_graphql::Result<UserNode> {
        let admin = require_role(ctx, UserRole::Admin)?;
        let store = store(ctx)?;
        let user_id = parse_uuid(&input.id)?;
        let existing = store
            .user(user_id)
            .await
            .map_err(db_error)?
            .ok_or_else(|| ApiError::NotFound("user").extend())?;

        let mut errors = FieldErrors::new();
        let mut changes = UserChanges::default();
        if let Some(value) = &input.first_name {
            changes.first_name = required_name(&mut errors, "firstName", value);
        }
        if let Some(value) = &input.last_name {
            changes.last_name = required_name(&mut errors, "lastName", value);
        }
        if let Some(value) = &input.email {
            changes.email = checked_email(&mut errors, value);
            if let Some(email) = &changes.email {
                let taken = store.user_by_email(email).await.map_err(db_error)?;
                if taken.is_some_and(|other| other.id != user_id) {
                    errors.insert("email".into(), "Email is already in use".into());
                }
            }
        }
        if let Some(rate) = input.hourly_rate_cents {
            check_money(&mut errors, "hourlyRateCents", rate);
            changes.hourly_rate_cents = Some(rate);
        }
        if let Some(deductions) = input.monthly_deductions_cents {
            check_money(&mut errors, "monthlyDeductionsCents", deductions);
            changes.monthly_deductions_cents = Some(deductions);
        }
        if let Some(password) = &input.password {
            check_password(&mut errors, password);
        }
        if user_id == admin.user_id {
            if input.is_active == Some(false) {
                errors.insert("isActive".into(), "You cannot deactivate yourself".into());
            }
            if input.role.is_some_and(|role| role != UserRole::Admin) {
                errors.insert("role".into(), "You cannot change your own role".into());
            }
        }
        if !errors.is_empty() {
            return Err(invalid_fields(errors));
        }
        changes.role = input.role.map(user::Role::from);
        changes.is_active = input.is_active;
        if let Some(password) = &input.password {
            changes.password_hash = Some(hash_password(password).map_err(hash_error)?);
        }
        let password_changed = changes.password_hash.is_some();

        let was_active = existing.is_active;
        let updated = store
            .update_user(existing, changes)
            .await
            .map_err(db_error)?;
        if was_active && !updated.is_active {
            let ended = store.end_sessions_of(user_id, None).await.map_err(db_error)?;
            session_hub(ctx)?.publish(SessionEvent::SignedOut { user_id });
            info!(user_id = %user_id, ended, "user deactivated");
        } else if password_changed {
            // An admin changing their own password keeps the current session.
            let keep = (user_id == admin.user_id).then_some(admin.session_id);
            let ended = store.end_sessions_of(user_id, keep).await.map_err(db_error)?;
            if keep.is_none() {
                session_hub(ctx)?.publish(SessionEvent::SignedOut { user_id });
            }
            info!(user_id = %user_id, ended, "password changed");
        }
        Ok(UserNode::from(updated))
    }

    /// Removes an account together with its time entries.
    #[graphql(name = "deleteUser")]
    async fn delete_user(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        let admin = require_role(ctx, UserRole::Admin)?;
        let user_id = parse_uuid(&id)?;
        if user_id == admin.user_id {
            return Err(ApiError::validation("You cannot delete your own account").extend());
        }
        let store = store(ctx)?;
        let deleted = store.delete_user(user_id).await.map_err(db_error)?;
        if deleted {
            session_hub(ctx)?.publish(SessionEvent::SignedOut { user_id });
            info!(user_id = %user_id, "user deleted");
        }
        Ok(deleted)
    }

    #[graphql(name = "createProject")]
    async fn create_project(
        &self,
        ctx: &Context<'_>,
        name: String,
    ) -> async_graphql::Result<ProjectNode> {
        require_role(ctx, UserRole::Admin)?;
        let name = project_name(&name)?;
        let store = store(ctx)?;
        let created = store.create_project(name).await.map_err(db_error)?;
        info!(project_id = %created.id, "project created");
        Ok(ProjectNode::from(created))
    }

    #[graphql(name = "updateProject")]
    async fn update_project(
        &self,
        ctx: &Context<'_>,
        input: UpdateProjectInput,
    ) -> async_graphql::Result<ProjectNode> {
        require_role(ctx, UserRole::Admin)?;
        let store = store(ctx)?;
        let existing = store
            .project(parse_uuid(&input.id)?)
            .await
            .map_err(db_error)?
            .ok_or_else(|| ApiError::NotFound("project").extend())?;
        let changes = ProjectChanges {
            name: input.name.as_deref().map(project_name).transpose()?,
            is_active: input.is_active,
        };
        let updated = store
            .update_project(existing, changes)
            .await
            .map_err(db_error)?;
        Ok(ProjectNode::from(updated))
    }

    /// Only projects without time entries can be deleted; deactivate the
    /// others.
    #[graphql(name = "deleteProject")]
    async fn delete_project(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        require_role(ctx, UserRole::Admin)?;
        let store = store(ctx)?;
        let project_id = parse_uuid(&id)?;
        let used = store
            .project_entry_count(project_id)
            .await
            .map_err(db_error)?;
        if used > 0 {
            return Err(ApiError::validation(
                "Project has time entries; deactivate it instead",
            )
            .extend());
        }
        let deleted = store.delete_project(project_id).await.map_err(db_error)?;
        info!(project_id = %project_id, deleted, "project deleted");
        Ok(deleted)
    }
}

#[Subscription]
impl SubscriptionRoot {
    /// Sign-in and sign-out events of the subscriber's own account.
    #[graphql(name = "sessionChanges")]
    async fn session_changes(
        &self,
        ctx: &Context<'_>,
    ) -> async_graphql::Result<impl Stream<Item = SessionChange>> {
        let viewer = current_user(ctx)?;
        let store = store(ctx)?;
        let hub = session_hub(ctx)?;
        let user_id = viewer.user_id;
        Ok(hub
            .subscribe()
            .filter(move |event| future::ready(event.user_id() == user_id))
            .then(move |event| {
                let store = store.clone();
                async move {
                    match event {
                        SessionEvent::SignedIn { user_id } => SessionChange {
                            kind: SessionChangeKind::SignedIn,
                            user: store.user(user_id).await.ok().flatten().map(UserNode::from),
                        },
                        SessionEvent::SignedOut { .. } => SessionChange {
                            kind: SessionChangeKind::SignedOut,
                            user: None,
                        },
                    }
                }
            }))
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum SessionChangeKind {
    SignedIn,
    SignedOut,
}

#[derive(Clone, Debug, SimpleObject)]
pub struct SessionChange {
    pub kind: SessionChangeKind,
    pub user: Option<UserNode>,
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "User")]
pub struct UserNode {
    pub id: ID,
    #[graphql(name = "firstName")]
    pub first_name: String,
    #[graphql(name = "lastName")]
    pub last_name: String,
    #[graphql(name = "fullName")]
    pub full_name: String,
    pub email: String,
    pub role: UserRole,
    #[graphql(name = "hourlyRateCents")]
    pub hourly_rate_cents: i64,
    #[graphql(name = "monthlyDeductionsCents")]
    pub monthly_deductions_cents: i64,
    #[graphql(name = "isActive")]
    pub is_active: bool,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<user::Model> for UserNode {
    fn from(model: user::Model) -> Self {
        Self {
            id: ID::from(model.id.to_string()),
            full_name: model.full_name(),
            first_name: model.first_name,
            last_name: model.last_name,
            email: model.email,
            role: UserRole::from(model.role),
            hourly_rate_cents: model.hourly_rate_cents,
            monthly_deductions_cents: model.monthly_deductions_cents,
            is_active: model.is_active,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Project")]
pub struct ProjectNode {
    pub id: ID,
    pub name: String,
    #[graphql(name = "isActive")]
    pub is_active: bool,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<project::Model> for ProjectNode {
    fn from(model: project::Model) -> Self {
        Self {
            id: ID::from(model.id.to_string()),
            name: model.name,
            is_active: model.is_active,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "TimeEntry")]
pub struct TimeEntryNode {
    pub id: ID,
    #[graphql(name = "userId")]
    pub user_id: ID,
    pub date: NaiveDate,
    /// `HH:MM`
    #[graphql(name = "startTime")]
    pub start_time: String,
    /// `HH:MM`
    #[graphql(name = "endTime")]
    pub end_time: String,
    #[graphql(name = "hoursWorked")]
    pub hours_worked: f64,
    #[graphql(name = "projectId")]
    pub project_id: ID,
    #[graphql(name = "projectName")]
    pub project_name: Option<String>,
    pub description: Option<String>,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl TimeEntryNode {
    fn from_model(model: time_entry::Model, project_name: Option<String>) -> Self {
        Self {
            id: ID::from(model.id.to_string()),
            user_id: ID::from(model.user_id.to_string()),
            date: model.date,
            start_time: format_clock(model.start_time),
            end_time: format_clock(model.end_time),
            hours_worked: model.hours_worked,
            project_id: ID::from(model.project_id.to_string()),
            project_name,
            description: model.description,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct NavItem {
    pub key: String,
    pub label: String,
    pub href: String,
}

impl From<NavEntry> for NavItem {
    fn from(entry: NavEntry) -> Self {
        Self {
            key: entry.key.into(),
            label: entry.label.into(),
            href: entry.href.into(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct MePayload {
    pub user: UserNode,
    pub greeting: String,
    #[graphql(name = "roleLabel")]
    pub role_label: String,
    pub navigation: Vec<NavItem>,
}

impl MePayload {
    fn from_model(model: user::Model) -> Self {
        let role = UserRole::from(model.role);
        Self {
            greeting: greeting(&model.first_name, &model.last_name),
            role_label: role_label(role).into(),
            navigation: entries_for(Some(role))
                .into_iter()
                .map(NavItem::from)
                .collect(),
            user: UserNode::from(model),
        }
    }
}

#[derive(Clone, Debug, SimpleObject, Default)]
pub struct AuthPayload {
    pub ok: bool,
    pub user: Option<UserNode>,
    pub token: Option<String>,
    pub error: Option<String>,
}

impl AuthPayload {
    fn failed() -> Self {
        Self {
            error: Some(LOGIN_FAILED.into()),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "MonthlyHistory")]
pub struct MonthlyHistoryNode {
    pub month: String,
    #[graphql(name = "userId")]
    pub user_id: ID,
    pub entries: Vec<TimeEntryNode>,
    #[graphql(name = "totalHours")]
    pub total_hours: f64,
    #[graphql(name = "entryCount")]
    pub entry_count: i32,
    #[graphql(name = "averageHours")]
    pub average_hours: f64,
}

impl MonthlyHistoryNode {
    async fn build(store: &Store, history: MonthlyHistory) -> async_graphql::Result<Self> {
        let entry_count = history.entry_count() as i32;
        Ok(Self {
            month: history.month.to_string(),
            user_id: ID::from(history.user_id.to_string()),
            entries: entry_nodes(store, history.entries).await?,
            total_hours: history.total_hours,
            entry_count,
            average_hours: history.average_hours,
        })
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "EmployeeMonth")]
pub struct EmployeeMonthNode {
    #[graphql(name = "userId")]
    pub user_id: ID,
    #[graphql(name = "fullName")]
    pub full_name: String,
    #[graphql(name = "isActive")]
    pub is_active: bool,
    #[graphql(name = "totalHours")]
    pub total_hours: f64,
    #[graphql(name = "entryCount")]
    pub entry_count: i32,
    #[graphql(name = "hourlyRateCents")]
    pub hourly_rate_cents: i64,
    #[graphql(name = "grossPayCents")]
    pub gross_pay_cents: i64,
    #[graphql(name = "deductionsCents")]
    pub deductions_cents: i64,
    #[graphql(name = "netPayCents")]
    pub net_pay_cents: i64,
}

impl From<EmployeeMonth> for EmployeeMonthNode {
    fn from(row: EmployeeMonth) -> Self {
        Self {
            user_id: ID::from(row.user_id.to_string()),
            full_name: row.full_name,
            is_active: row.is_active,
            total_hours: row.total_hours,
            entry_count: row.entry_count as i32,
            hourly_rate_cents: row.hourly_rate_cents,
            gross_pay_cents: row.gross_pay_cents,
            deductions_cents: row.deductions_cents,
            net_pay_cents: row.net_pay_cents,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "MonthlyReport")]
pub struct MonthlyReportNode {
    pub month: String,
    pub rows: Vec<EmployeeMonthNode>,
    #[graphql(name = "totalHours")]
    pub total_hours: f64,
    #[graphql(name = "totalGrossCents")]
    pub total_gross_cents: i64,
    #[graphql(name = "totalNetCents")]
    pub total_net_cents: i64,
}

impl From<MonthlyReport> for MonthlyReportNode {
    fn from(report: MonthlyReport) -> Self {
        Self {
            month: report.month.to_string(),
            rows: report.rows.into_iter().map(EmployeeMonthNode::from).collect(),
            total_hours: report.total_hours,
            total_gross_cents: report.total_gross_cents,
            total_net_cents: report.total_net_cents,
        }
    }
}

#[derive(Clone, Debug, InputObject)]
pub struct NewTimeEntryInput {
    /// Owner of the entry; admins only, defaults to the caller.
    #[graphql(name = "userId")]
    pub user_id: Option<ID>,
    pub date: String,
    #[graphql(name = "startTime")]
    pub start_time: String,
    #[graphql(name = "endTime")]
    pub end_time: String,
    #[graphql(name = "projectId")]
    pub project_id: String,
    pub description: Option<String>,
}

impl NewTimeEntryInput {
    fn form(&self) -> EntryForm {
        EntryForm {
            date: self.date.clone(),
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
            project_id: self.project_id.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Clone, Debug, InputObject)]
pub struct UpdateTimeEntryInput {
    pub id: ID,
    pub date: String,
    #[graphql(name = "startTime")]
    pub start_time: String,
    #[graphql(name = "endTime")]
    pub end_time: String,
    #[graphql(name = "projectId")]
    pub project_id: String,
    pub description: Option<String>,
}

impl UpdateTimeEntryInput {
    fn form(&self) -> EntryForm {
        EntryForm {
            date: self.date.clone(),
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
            project_id: self.project_id.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Clone, Debug, InputObject)]
pub struct NewUserInput {
    #[graphql(name = "firstName")]
    pub first_name: String,
    #[graphql(name = "lastName")]
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[graphql(default_with = "UserRole::Employee")]
    pub role: UserRole,
    #[graphql(name = "hourlyRateCents", default)]
    pub hourly_rate_cents: i64,
    #[graphql(name = "monthlyDeductionsCents", default)]
    pub monthly_deductions_cents: i64,
}

#[derive(Clone, Debug, InputObject)]
pub struct UpdateUserInput {
    pub id: ID,
    #[graphql(name = "firstName")]
    pub first_name: Option<String>,
    #[graphql(name = "lastName")]
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<UserRole>,
    #[graphql(name = "hourlyRateCents")]
    pub hourly_rate_cents: Option<i64>,
    #[graphql(name = "monthlyDeductionsCents")]
    pub monthly_deductions_cents: Option<i64>,
    #[graphql(name = "isActive")]
    pub is_active: Option<bool>,
}

#[derive(Clone, Debug, InputObject)]
pub struct UpdateProjectInput {
    pub id: ID,
    pub name: Option<String>,
    #[graphql(name = "isActive")]
    pub is_active: Option<bool>,
}

async fn entry_nodes(
    store: &Store,
    rows: Vec<time_entry::Model>,
) -> async_graphql::Result<Vec<TimeEntryNode>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let names: HashMap<Uuid, String> = store
        .projects(false)
        .await
        .map_err(db_error)?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();
    Ok(rows
        .into_iter()
        .map(|row| {
            let name = names.get(&row.project_id).cloned();
            TimeEntryNode::from_model(row, name)
        })
        .collect())
}

/// New entries need an active project; edits only an existing one.
async fn ensure_project(
    store: &Store,
    project_id: Uuid,
    require_active: bool,
) -> async_graphql::Result<project::Model> {
    let mut errors = FieldErrors::new();
    match store.project(project_id).await.map_err(db_error)? {
        Some(project) if project.is_active || !require_active => return Ok(project),
        Some(_) => errors.insert("projectId".into(), "Project is not active".into()),
        None => errors.insert("projectId".into(), "Project does not exist".into()),
    };
    Err(invalid_fields(errors))
}

fn store(ctx: &Context<'_>) -> async_graphql::Result<Store> {
    ctx.data::<Store>()
        .cloned()
        .map_err(|_| missing_data("store"))
}

fn auth_config(ctx: &Context<'_>) -> async_graphql::Result<Arc<AuthConfig>> {
    ctx.data::<Arc<AuthConfig>>()
        .cloned()
        .map_err(|_| missing_data("auth configuration"))
}

fn session_hub(ctx: &Context<'_>) -> async_graphql::Result<SessionHub> {
    ctx.data::<SessionHub>()
        .cloned()
        .map_err(|_| missing_data("session hub"))
}

fn current_user(ctx: &Context<'_>) -> async_graphql::Result<CurrentUser> {
    ctx.data_opt::<CurrentUser>()
        .cloned()
        .ok_or_else(|| ApiError::Unauthenticated.extend())
}

fn require_role(ctx: &Context<'_>, role: UserRole) -> async_graphql::Result<CurrentUser> {
    let user = current_user(ctx)?;
    if user.has_role(role) {
        Ok(user)
    } else {
        Err(ApiError::Forbidden.extend())
    }
}

fn parse_uuid(id: &ID) -> async_graphql::Result<Uuid> {
    Uuid::parse_str(id.as_str()).map_err(|_| ApiError::validation("Invalid ID").extend())
}

fn parse_month(raw: Option<String>) -> async_graphql::Result<Month> {
    match raw {
        Some(value) => value
            .parse::<Month>()
            .map_err(|err| ApiError::validation(err.to_string()).extend()),
        None => Ok(Month::current()),
    }
}

fn db_error(err: DbErr) -> Error {
    ApiError::from(err).extend()
}

fn auth_error(err: AuthError) -> Error {
    ApiError::internal(anyhow::Error::new(err).context("session could not be issued")).extend()
}

fn hash_error(err: argon2::password_hash::Error) -> Error {
    ApiError::internal(anyhow::anyhow!("password hashing failed: {}", err)).extend()
}

fn missing_data(what: &str) -> Error {
    ApiError::internal(anyhow::anyhow!("{} missing from schema data", what)).extend()
}

fn invalid_fields(errors: FieldErrors) -> Error {
    ApiError::InvalidFields(errors).extend()
}

fn append_session_cookie(ctx: &Context<'_>, token: &str, max_age: i64, auth: &AuthConfig) {
    let cookie = format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax{}",
        SESSION_COOKIE,
        token,
        max_age,
        secure_flag(auth)
    );
    ctx.append_http_header("Set-Cookie", cookie);
}

fn clear_session_cookie(ctx: &Context<'_>, auth: &AuthConfig) {
    let cookie = format!(
        "{}=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax{}",
        SESSION_COOKIE,
        secure_flag(auth)
    );
    ctx.append_http_header("Set-Cookie", cookie);
}

fn secure_flag(auth: &AuthConfig) -> &'static str {
    if auth.cookie_secure {
        "; Secure"
    } else {
        ""
    }
}

fn required_name(errors: &mut FieldErrors, field: &str, value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.insert(field.into(), "This field is required".into());
        None
    } else if trimmed.chars().count() > NAME_MAX {
        errors.insert(
            field.into(),
            format!("Must be at most {} characters", NAME_MAX),
        );
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn checked_email(errors: &mut FieldErrors, value: &str) -> Option<String> {
    let normalized = value.trim().to_lowercase();
    match normalized.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Some(normalized),
        _ => {
            errors.insert("email".into(), "Invalid email address".into());
            None
        }
    }
}

fn check_password(errors: &mut FieldErrors, value: &str) {
    if value.chars().count() < PASSWORD_MIN {
        errors.insert(
            "password".into(),
            format!("Password must be at least {} characters", PASSWORD_MIN),
        );
    }
}

fn check_money(errors: &mut FieldErrors, field: &str, cents: i64) {
    if cents < 0 {
        errors.insert(field.into(), "Amount cannot be negative".into());
    }
}

fn project_name(value: &str) -> async_graphql::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Project name is required").extend());
    }
    if trimmed.chars().count() > 256 {
        return Err(ApiError::validation("Project name must be at most 256 characters").extend());
    }
    Ok(trimmed.to_string())
}
