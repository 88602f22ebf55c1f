use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use api::auth::{AuthConfig, CurrentUser, SESSION_COOKIE};
use api::error::ApiError;
use api::schema::AttendanceSchema;
use api::session::resolve_token;
use async_graphql::{
    http::{GraphiQLSource, ALL_WEBSOCKET_PROTOCOLS},
    Data, ErrorExtensions, Pos,
};
use async_graphql_axum::{GraphQLProtocol, GraphQLRequest, GraphQLResponse, GraphQLWebSocket};
use axum::{
    extract::{State, WebSocketUpgrade},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Statement};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub schema: AttendanceSchema,
    pub db: Arc<DatabaseConnection>,
    pub auth: Arc<AuthConfig>,
}

pub async fn serve(bind: &str, state: AppState, cors_origins: &[String]) -> anyhow::Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {}", bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "attendance server listening");
    axum::serve(listener, app_router(state, cors_origins))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

pub fn app_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/graphiql", get(graphiql))
        .route("/graphql", get(graphql_handler).post(graphql_handler))
        .route("/graphql/ws", get(graphql_ws_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// Credentials are only allowed with an explicit origin list.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let layer = CorsLayer::new()
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST]);
    if allowed.is_empty() {
        layer.allow_origin(AllowOrigin::any())
    } else {
        layer
            .allow_origin(AllowOrigin::list(allowed))
            .allow_credentials(true)
    }
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    db_ok: bool,
    version: &'static str,
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let backend = state.db.get_database_backend();
    let db_ok = state
        .db
        .execute(Statement::from_string(backend, "SELECT 1".to_string()))
        .await
        .is_ok();
    Json(HealthResponse {
        ok: db_ok,
        db_ok,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn graphiql() -> Html<String> {
    Html(
        GraphiQLSource::build()
            .endpoint("/graphql")
            .subscription_endpoint("/graphql/ws")
            .finish(),
    )
}

async fn graphql_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let mut request = req.into_inner();
    match authenticate(&state, extract_token(&headers)).await {
        Ok(Some(current_user)) => request = request.data(current_user),
        Ok(None) => {}
        Err(err) => {
            let error = ApiError::from(err).extend().into_server_error(Pos::default());
            return async_graphql::Response::from_errors(vec![error]).into();
        }
    }
    state.schema.execute(request).await.into()
}

/// Subscriptions authenticate with the session cookie or with
/// `{"token": "..."}` in the connection-init payload.
async fn graphql_ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    protocol: GraphQLProtocol,
    upgrade: WebSocketUpgrade,
) -> Response {
    let from_headers = match authenticate(&state, extract_token(&headers)).await {
        Ok(user) => user,
        Err(err) => {
            error!(error = %err, "websocket authentication failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let schema = state.schema.clone();
    upgrade
        .protocols(ALL_WEBSOCKET_PROTOCOLS)
        .on_upgrade(move |stream| {
            GraphQLWebSocket::new(stream, schema, protocol)
                .on_connection_init(move |payload| async move {
                    let token = payload
                        .get("token")
                        .and_then(|value| value.as_str())
                        .map(str::to_string);
                    let mut data = Data::default();
                    match token {
                        Some(token) => {
                            let user = authenticate(&state, Some(token))
                                .await
                                .map_err(|err| ApiError::from(err).extend())?;
                            if let Some(user) = user {
                                data.insert(user);
                            }
                        }
                        None => {
                            if let Some(user) = from_headers {
                                data.insert(user);
                            }
                        }
                    }
                    Ok(data)
                })
                .serve()
        })
}

async fn authenticate(
    state: &AppState,
    token: Option<String>,
) -> Result<Option<CurrentUser>, DbErr> {
    match token {
        Some(token) => resolve_token(state.db.as_ref(), &state.auth, &token).await,
        None => Ok(None),
    }
}

/// Bearer header first, then the session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(text) = value.to_str() {
            if let Some(rest) = text.strip_prefix("Bearer ") {
                return Some(rest.trim().to_string());
            }
        }
    }
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|part| {
        let (name, value) = part.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.trim().to_string())
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::schema::{build_schema, AppSchema};
    use api::seed::seed_demo;
    use api::store::Store;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let conn = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&conn, None).await.unwrap();
        let db = Arc::new(conn);
        seed_demo(&Store::new(db.clone())).await.unwrap();
        let auth = Arc::new(AuthConfig {
            jwt_secret: "http-test".into(),
            session_ttl_minutes: 30,
            cookie_secure: false,
        });
        let AppSchema(schema) = build_schema(db.clone(), auth.clone());
        AppState { schema, db, auth }
    }

    async fn post_graphql(router: Router, body: Value, token: Option<&str>) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/graphql")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let response = router
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn token_from_bearer_or_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "theme=dark; attendance_session=abc".parse().unwrap());
        assert_eq!(extract_token(&headers).as_deref(), Some("abc"));
        headers.insert(header::AUTHORIZATION, "Bearer xyz".parse().unwrap());
        assert_eq!(extract_token(&headers).as_deref(), Some("xyz"));

        let mut cleared = HeaderMap::new();
        cleared.insert(header::COOKIE, "attendance_session=".parse().unwrap());
        assert_eq!(extract_token(&cleared), None);
    }

    #[tokio::test]
    async fn health_reports_database() {
        let router = app_router(test_state().await, &[]);
        let response = router
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["db_ok"], json!(true));
    }

    #[tokio::test]
    async fn bearer_token_authenticates_graphql() {
        let state = test_state().await;
        let router = app_router(state, &[]);
        let login = json!({
            "query": r#"mutation {
                attendance { login(email: "jan.novak@firma.cz", password: "heslo123") { ok token } }
            }"#
        });
        let (status, headers, body) = post_graphql(router.clone(), login, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|cookie| cookie.starts_with("attendance_session=")));
        let token = body["data"]["attendance"]["login"]["token"]
            .as_str()
            .unwrap()
            .to_string();

        let me = json!({ "query": "{ attendance { me { greeting } } }" });
        let (_, _, anonymous) = post_graphql(router.clone(), me.clone(), None).await;
        assert_eq!(anonymous["data"]["attendance"]["me"], Value::Null);
        let (_, _, signed_in) = post_graphql(router, me, Some(&token)).await;
        assert_eq!(
            signed_in["data"]["attendance"]["me"]["greeting"],
            json!("Welcome back, Jan Novák")
        );
    }

    #[tokio::test]
    async fn storage_outage_is_not_treated_as_anonymous() {
        let db = Arc::new(DatabaseConnection::Disconnected);
        let auth = Arc::new(AuthConfig {
            jwt_secret: "http-test".into(),
            session_ttl_minutes: 30,
            cookie_secure: false,
        });
        let AppSchema(schema) = build_schema(db.clone(), auth.clone());
        let router = app_router(AppState { schema, db, auth: auth.clone() }, &[]);
        let expires_at = auth.session_expiry(chrono::Utc::now()).unwrap();
        let token = api::auth::issue_token(
            uuid::Uuid::new_v4(),
            uuid::Uuid::new_v4(),
            api::auth::UserRole::Employee,
            expires_at,
            &auth,
        )
        .unwrap();

        let query = json!({ "query": "{ attendance { navigation { key } } }" });
        let (status, _, body) = post_graphql(router.clone(), query.clone(), Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["errors"][0]["extensions"]["code"], json!("INTERNAL"));
        assert_eq!(body["data"], Value::Null);

        let (_, _, anonymous) = post_graphql(router, query, None).await;
        assert_eq!(anonymous["data"]["attendance"]["navigation"], json!([]));
    }
}
