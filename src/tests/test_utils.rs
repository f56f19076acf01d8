use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tower::ServiceExt;

use crate::{AppState, app, auth::AuthUser, config::Config, db, entities::user};

/// Fresh, migrated in-memory database.
pub async fn test_db() -> DatabaseConnection {
    db::connect_and_migrate("sqlite::memory:").await.expect("failed to create test database")
}

/// Inserts a user directly, bypassing password hashing.
pub async fn seed_user(db: &DatabaseConnection, name: &str) -> AuthUser {
    let now = db::now_ms();
    let user = user::ActiveModel {
        id: Default::default(),
        name: Set(name.to_string()),
        email: Set(format!("{}@example.com", name.to_lowercase())),
        password_hash: Set("not-a-real-hash".to_string()),
        is_admin: Set(false),
        watched: Set("[]".to_string()),
        watchlist: Set("[]".to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("failed to seed user");

    AuthUser { id: user.id, name: user.name }
}

pub fn test_config() -> Config {
    Config {
        addr: "127.0.0.1:0".parse().expect("valid addr"),
        database_url: "sqlite::memory:".to_string(),
        tmdb_access_token: String::new(),
        tmdb_api_key: String::new(),
        tmdb_base_url: "http://127.0.0.1:9".to_string(),
        tmdb_rps: 1000,
        max_concurrent: 4,
        http_timeout_secs: 1,
        jwt_secret: "test-secret".to_string(),
        jwt_ttl_hours: 1,
    }
}

/// Router over an in-memory database with TMDB in mock mode.
pub async fn setup_app() -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(Arc::new(test_config()), test_db().await, reqwest::Client::new()));
    (app(state.clone()), state)
}

/// Registers through the API and returns `(token, user id)`.
pub async fn register_user(app: &Router, name: &str) -> (String, i64) {
    let body = serde_json::json!({
        "name": name,
        "email": format!("{}@example.com", name.to_lowercase()),
        "password": "correct horse",
    });
    let response = app
        .clone()
        .oneshot(test_request_json("POST", "/api/auth/register", None, &body))
        .await
        .expect("register request failed");
    assert_eq!(response.status(), 201);

    let body: serde_json::Value = parse_json_response(response).await;
    let token = body["token"].as_str().expect("token in response").to_string();
    let id = body["user"]["id"].as_i64().expect("user id in response");
    (token, id)
}

pub fn test_request_json<T: serde::Serialize>(
    method: &str,
    uri: &str,
    auth_token: Option<&str>,
    body: &T,
) -> Request<Body> {
    let mut req = Request::builder().method(method).uri(uri).header("content-type", "application/json");
    if let Some(token) = auth_token {
        req = req.header("authorization", format!("Bearer {token}"));
    }
    req.body(Body::from(serde_json::to_vec(body).expect("serializable body")))
        .expect("valid request")
}

pub fn test_request(method: &str, uri: &str, auth_token: Option<&str>) -> Request<Body> {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = auth_token {
        req = req.header("authorization", format!("Bearer {token}"));
    }
    req.body(Body::empty()).expect("valid request")
}

pub async fn parse_json_response<T: serde::de::DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("failed to parse JSON response")
}
