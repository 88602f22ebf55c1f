#![allow(dead_code)]

use std::sync::Arc;

use api::auth::{AuthConfig, CurrentUser};
use api::schema::{build_schema, AppSchema, AttendanceSchema};
use api::seed::{seed_demo, SeededRecords};
use api::session::resolve_token;
use api::store::Store;
use async_graphql::{Request, Response, Variables};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::Value;

pub const ADMIN_EMAIL: &str = "admin@firma.cz";
pub const ADMIN_PASSWORD: &str = "admin123";
pub const JAN_EMAIL: &str = "jan.novak@firma.cz";
pub const MARIE_EMAIL: &str = "marie.svobodova@firma.cz";
pub const EMPLOYEE_PASSWORD: &str = "heslo123";

pub const LOGIN: &str = r#"
    mutation Login($email: String!, $password: String!, $role: UserRole) {
        attendance {
            login(email: $email, password: $password, role: $role) {
                ok
                token
                error
                user { id email role }
            }
        }
    }
"#;

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub auth: Arc<AuthConfig>,
    pub schema: AttendanceSchema,
    pub store: Store,
    pub seeded: SeededRecords,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_auth(AuthConfig {
            jwt_secret: "integration-secret".into(),
            session_ttl_minutes: 60,
            cookie_secure: false,
        })
        .await
    }

    pub async fn with_auth(auth: AuthConfig) -> Self {
        let conn = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&conn, None).await.unwrap();
        let db = Arc::new(conn);
        let store = Store::new(db.clone());
        let seeded = seed_demo(&store).await.unwrap();
        let auth = Arc::new(auth);
        let AppSchema(schema) = build_schema(db.clone(), auth.clone());
        Self {
            db,
            auth,
            schema,
            store,
            seeded,
        }
    }

    pub async fn execute(&self, query: &str, variables: Value, viewer: Option<&CurrentUser>) -> Response {
        let mut request = Request::new(query).variables(Variables::from_json(variables));
        if let Some(viewer) = viewer {
            request = request.data(viewer.clone());
        }
        self.schema.execute(request).await
    }

    /// Runs the login mutation and returns its payload.
    pub async fn login(&self, email: &str, password: &str, role: Option<&str>) -> Value {
        let response = self
            .execute(
                LOGIN,
                serde_json::json!({ "email": email, "password": password, "role": role }),
                None,
            )
            .await;
        data(&response)["attendance"]["login"].clone()
    }

    /// Signs in and resolves the issued token the way the server does.
    pub async fn sign_in(&self, email: &str, password: &str) -> (CurrentUser, String) {
        let payload = self.login(email, password, None).await;
        assert_eq!(payload["ok"], Value::Bool(true), "login failed: {payload}");
        let token = payload["token"].as_str().unwrap().to_string();
        let viewer = self.resolve(&token).await.expect("token resolves");
        (viewer, token)
    }

    pub async fn resolve(&self, token: &str) -> Option<CurrentUser> {
        resolve_token(self.db.as_ref(), &self.auth, token)
            .await
            .expect("session lookup")
    }

    pub async fn admin(&self) -> CurrentUser {
        self.sign_in(ADMIN_EMAIL, ADMIN_PASSWORD).await.0
    }

    pub async fn jan(&self) -> CurrentUser {
        self.sign_in(JAN_EMAIL, EMPLOYEE_PASSWORD).await.0
    }

    pub async fn marie(&self) -> CurrentUser {
        self.sign_in(MARIE_EMAIL, EMPLOYEE_PASSWORD).await.0
    }

    pub fn project_id(&self, name: &str) -> String {
        self.seeded.project_named(name).unwrap().id.to_string()
    }
}

pub fn data(response: &Response) -> Value {
    assert!(
        response.errors.is_empty(),
        "unexpected errors: {:?}",
        response.errors
    );
    response.data.clone().into_json().unwrap()
}

pub fn error_code(response: &Response) -> Option<String> {
    let err = response.errors.first()?;
    let value = err.extensions.as_ref()?.get("code")?.clone();
    match value.into_json().ok()? {
        Value::String(code) => Some(code),
        _ => None,
    }
}

pub fn field_errors(response: &Response) -> Value {
    response
        .errors
        .first()
        .and_then(|err| err.extensions.as_ref())
        .and_then(|ext| ext.get("fields"))
        .cloned()
        .map(|value| value.into_json().unwrap())
        .unwrap_or(Value::Null)
}
