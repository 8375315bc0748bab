#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`

use task_tracker::auth::{FederatedIdentity, TokenVerifier, VerifiedToken, VerifyError};
use task_tracker::{router, AppConfig, AppState};

pub const TEST_SECRET: &str = "test-secret";

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    _dir: TempDir,
}

pub fn test_config() -> AppConfig {
    AppConfig::new(TEST_SECRET)
}

pub async fn spawn_app() -> Result<TestApp> {
    spawn_app_with(test_config(), None).await
}

pub async fn spawn_app_with(config: AppConfig, federated: Option<Arc<dyn TokenVerifier>>) -> Result<TestApp> {
    // One connection so `total_changes()` observes every write the app makes.
    spawn_app_pooled(config, federated, 1).await
}

/// Like [`spawn_app_with`], but lets requests run on several connections at once.
pub async fn spawn_app_pooled(
    config: AppConfig,
    federated: Option<Arc<dyn TokenVerifier>>,
    max_connections: u32,
) -> Result<TestApp> {
    let dir = tempdir().context("failed to create tempdir")?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(10));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(opts)
        .await?;

    task_tracker::db::MIGRATOR.run(&pool).await?;

    let state = match federated {
        Some(verifier) => AppState::with_federated(pool.clone(), config, verifier),
        None => AppState::new(pool.clone(), config),
    };

    Ok(TestApp {
        router: router(state),
        pool,
        _dir: dir,
    })
}

impl TestApp {
    /// Rebuilds the router over the same database with a different config.
    pub fn reconfigure(&mut self, config: AppConfig, federated: Option<Arc<dyn TokenVerifier>>) {
        let state = match federated {
            Some(verifier) => AppState::with_federated(self.pool.clone(), config, verifier),
            None => AppState::new(self.pool.clone(), config),
        };
        self.router = router(state);
    }

    pub async fn request(&self, method: &str, uri: &str, token: Option<&str>, payload: Option<Value>) -> Result<(StatusCode, Value)> {
        send(self.router.clone(), method, uri, token, payload).await
    }

    /// Registers an account and returns `(token, user_id, role)`.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<(String, String, String)> {
        let (status, body) = self
            .request(
                "POST",
                "/auth/register",
                None,
                Some(serde_json::json!({ "username": username, "email": email, "password": password })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "register failed: {} - {}", status, body);

        Ok((
            str_field(&body, "token")?,
            str_field(&body["user"], "id")?,
            str_field(&body["user"], "role")?,
        ))
    }

    pub async fn total_changes(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT total_changes()").fetch_one(&self.pool).await?)
    }

    pub async fn user_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(1) FROM users").fetch_one(&self.pool).await?)
    }
}

/// Sends one request through `router` and decodes the JSON response.
pub async fn send(
    router: Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    payload: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }

    let req = match payload {
        Some(payload) => builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let resp = router.oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .with_context(|| format!("non-JSON body: {}", String::from_utf8_lossy(&bytes)))?
    };

    Ok((status, value))
}

pub fn str_field(value: &Value, key: &str) -> Result<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .with_context(|| format!("missing string field `{}` in {}", key, value))
}

pub fn message(value: &Value) -> &str {
    value.get("message").and_then(Value::as_str).unwrap_or_default()
}

/// Stands in for the external identity provider: each known token string
/// maps to a fixed profile.
#[derive(Default)]
pub struct StubFederatedVerifier {
    profiles: HashMap<String, FederatedIdentity>,
}

impl StubFederatedVerifier {
    pub fn with_profile(mut self, token: &str, external_id: &str, email: &str, display_name: Option<&str>) -> Self {
        self.profiles.insert(
            token.to_string(),
            FederatedIdentity {
                external_id: external_id.to_string(),
                email: email.to_string(),
                display_name: display_name.map(str::to_string),
            },
        );
        self
    }
}

#[async_trait]
impl TokenVerifier for StubFederatedVerifier {
    fn name(&self) -> &'static str {
        "stub-federated"
    }

    async fn verify(&self, token: &str) -> Result<VerifiedToken, VerifyError> {
        self.profiles
            .get(token)
            .cloned()
            .map(VerifiedToken::Federated)
            .ok_or_else(|| VerifyError::Invalid("unknown federated token".to_string()))
    }
}
