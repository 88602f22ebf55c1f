//! Server-side sessions and the sign-in/sign-out event hub.

use chrono::{DateTime, Utc};
use entity::{user, user_session};
use futures_util::{stream, Stream};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, DbErr, EntityTrait};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{decode_token, AuthConfig, CurrentUser, UserRole};

const EVENT_BUFFER: usize = 64;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionEvent {
    SignedIn { user_id: Uuid },
    SignedOut { user_id: Uuid },
}

impl SessionEvent {
    pub fn user_id(&self) -> Uuid {
        match self {
            SessionEvent::SignedIn { user_id } | SessionEvent::SignedOut { user_id } => *user_id,
        }
    }
}

/// Fan-out of session changes to live subscribers.
#[derive(Clone, Debug)]
pub struct SessionHub {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }

    pub fn publish(&self, event: SessionEvent) {
        // No receivers is the common case outside of live subscriptions.
        let delivered = self.sender.send(event).unwrap_or(0);
        debug!(?event, delivered, "session event published");
    }

    /// Events from now on. Lagging subscribers skip what they missed.
    pub fn subscribe(&self) -> impl Stream<Item = SessionEvent> + Send + 'static {
        stream::unfold(self.sender.subscribe(), |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((event, receiver)),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "session subscriber lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
    }
}

pub async fn start_session(
    db: &DatabaseConnection,
    user_id: Uuid,
    started_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<user_session::Model, DbErr> {
    user_session::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        created_at: Set(started_at.into()),
        expires_at: Set(expires_at.into()),
    }
    .insert(db)
    .await
}

pub async fn end_session(db: &DatabaseConnection, session_id: Uuid) -> Result<bool, DbErr> {
    let res = user_session::Entity::delete_by_id(session_id).exec(db).await?;
    Ok(res.rows_affected > 0)
}

/// Resolves a bearer token to the caller. The token must verify, its
/// session row must exist and be unexpired, the account must be active and
/// still hold the role the token was issued for. Storage failures are
/// returned, not treated as anonymous.
pub async fn resolve_token(
    db: &DatabaseConnection,
    config: &AuthConfig,
    token: &str,
) -> Result<Option<CurrentUser>, DbErr> {
    let Ok(claims) = decode_token(token, config) else {
        return Ok(None);
    };
    let Some(session) = user_session::Entity::find_by_id(claims.sid).one(db).await? else {
        return Ok(None);
    };
    if session.user_id != claims.sub {
        return Ok(None);
    }
    if session.expires_at.with_timezone(&Utc) < Utc::now() {
        if let Err(err) = end_session(db, session.id).await {
            warn!(error = %err, session_id = %session.id, "failed to drop expired session");
        }
        return Ok(None);
    }
    let Some(user) = user::Entity::find_by_id(claims.sub).one(db).await? else {
        return Ok(None);
    };
    let role = UserRole::from(user.role);
    if !user.is_active || UserRole::parse(&claims.role) != Some(role) {
        return Ok(None);
    }
    Ok(Some(CurrentUser {
        user_id: user.id,
        session_id: session.id,
        role,
    }))
}
