use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use async_graphql::Enum;
use chrono::{DateTime, Duration, Utc};
use entity::user;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "attendance_session";

/// Upper bound for `session_ttl_minutes`: one year.
pub const MAX_SESSION_TTL_MINUTES: i64 = 60 * 24 * 365;

/// Verified in place of a real hash for unknown accounts so a failed
/// sign-in costs the same either way.
static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| hash_password("attendance-dummy").ok());

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("session ttl of {0} minutes is out of range")]
    InvalidTtl(i64),
    #[error("token encoding failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub session_ttl_minutes: i64,
    pub cookie_secure: bool,
}

impl AuthConfig {
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.jwt_secret.as_bytes())
    }

    pub fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.jwt_secret.as_bytes())
    }

    pub fn session_ttl(&self) -> Result<Duration, AuthError> {
        let minutes = self.session_ttl_minutes;
        if !(1..=MAX_SESSION_TTL_MINUTES).contains(&minutes) {
            return Err(AuthError::InvalidTtl(minutes));
        }
        Duration::try_minutes(minutes).ok_or(AuthError::InvalidTtl(minutes))
    }

    /// When a session started at `now` expires.
    pub fn session_expiry(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, AuthError> {
        now.checked_add_signed(self.session_ttl()?)
            .ok_or(AuthError::InvalidTtl(self.session_ttl_minutes))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub sid: Uuid,
    pub role: String,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Enum, Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum UserRole {
    Admin,
    Employee,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::Employee => "EMPLOYEE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(UserRole::Admin),
            "EMPLOYEE" => Some(UserRole::Employee),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            UserRole::Admin => 2,
            UserRole::Employee => 1,
        }
    }
}

impl From<user::Role> for UserRole {
    fn from(value: user::Role) -> Self {
        match value {
            user::Role::Admin => UserRole::Admin,
            user::Role::Employee => UserRole::Employee,
        }
    }
}

impl From<UserRole> for user::Role {
    fn from(value: UserRole) -> Self {
        match value {
            UserRole::Admin => user::Role::Admin,
            UserRole::Employee => user::Role::Employee,
        }
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub role: UserRole,
}

impl CurrentUser {
    pub fn has_role(&self, role: UserRole) -> bool {
        self.role.level() >= role.level()
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Whether the caller may read or change records owned by `owner`.
    pub fn can_access(&self, owner: Uuid) -> bool {
        self.is_admin() || self.user_id == owner
    }
}

/// Signs a token for `session_id` that expires together with the session.
pub fn issue_token(
    user_id: Uuid,
    session_id: Uuid,
    role: UserRole,
    expires_at: DateTime<Utc>,
    config: &AuthConfig,
) -> Result<String, AuthError> {
    let claims = SessionClaims {
        sub: user_id,
        sid: session_id,
        role: role.as_str().to_string(),
        exp: expires_at.timestamp().max(0) as usize,
        iat: Utc::now().timestamp().max(0) as usize,
    };
    Ok(jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &config.encoding_key(),
    )?)
}

pub fn decode_token(
    token: &str,
    config: &AuthConfig,
) -> jsonwebtoken::errors::Result<SessionClaims> {
    jsonwebtoken::decode::<SessionClaims>(token, &config.decoding_key(), &Validation::default())
        .map(|data| data.claims)
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

/// Runs argon2 even when there is no stored hash, then reports false.
pub fn verify_password_or_dummy(password: &str, stored_hash: Option<&str>) -> bool {
    match stored_hash {
        Some(hash) => verify_password(password, hash),
        None => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                verify_password(password, dummy);
            }
            false
        }
    }
}

/// False for a wrong password and for an unreadable stored hash alike.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".into(),
            session_ttl_minutes: 30,
            cookie_secure: false,
        }
    }

    fn in_minutes(minutes: i64) -> DateTime<Utc> {
        Utc::now() + Duration::minutes(minutes)
    }

    #[test]
    fn token_round_trip_keeps_session() {
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let token =
            issue_token(user_id, session_id, UserRole::Employee, in_minutes(30), &config()).unwrap();
        let claims = decode_token(&token, &config()).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.sid, session_id);
        assert_eq!(UserRole::parse(&claims.role), Some(UserRole::Employee));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = issue_token(
            Uuid::new_v4(),
            Uuid::new_v4(),
            UserRole::Admin,
            in_minutes(30),
            &config(),
        )
        .unwrap();
        let other = AuthConfig {
            jwt_secret: "another".into(),
            ..config()
        };
        assert!(decode_token(&token, &other).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token(
            Uuid::new_v4(),
            Uuid::new_v4(),
            UserRole::Admin,
            in_minutes(-10),
            &config(),
        )
        .unwrap();
        assert!(decode_token(&token, &config()).is_err());
    }

    #[test]
    fn session_ttl_must_be_positive_and_bounded() {
        let now = Utc::now();
        assert_eq!(config().session_expiry(now).unwrap(), now + Duration::minutes(30));
        for minutes in [0, -5, MAX_SESSION_TTL_MINUTES + 1, i64::MAX / 2, i64::MIN] {
            let bad = AuthConfig {
                session_ttl_minutes: minutes,
                ..config()
            };
            assert!(
                matches!(bad.session_expiry(now), Err(AuthError::InvalidTtl(m)) if m == minutes),
                "{minutes}"
            );
        }
        let longest = AuthConfig {
            session_ttl_minutes: MAX_SESSION_TTL_MINUTES,
            ..config()
        };
        assert!(longest.session_expiry(now).is_ok());
    }

    #[test]
    fn missing_hash_never_verifies() {
        assert!(!verify_password_or_dummy("attendance-dummy", None));
        let hash = hash_password("heslo123").unwrap();
        assert!(verify_password_or_dummy("heslo123", Some(&hash)));
    }

    #[test]
    fn password_hash_verifies_only_original() {
        let hash = hash_password("heslo123").unwrap();
        assert!(verify_password("heslo123", &hash));
        assert!(!verify_password("heslo124", &hash));
        assert!(!verify_password("heslo123", "plaintext"));
    }

    #[test]
    fn admin_outranks_employee() {
        let admin = CurrentUser {
            user_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            role: UserRole::Admin,
        };
        let employee = CurrentUser {
            role: UserRole::Employee,
            user_id: Uuid::new_v4(),
            ..admin.clone()
        };
        assert!(admin.has_role(UserRole::Employee));
        assert!(!employee.has_role(UserRole::Admin));
        assert!(admin.can_access(employee.user_id));
        assert!(employee.can_access(employee.user_id));
        assert!(!employee.can_access(admin.user_id));
    }
}
