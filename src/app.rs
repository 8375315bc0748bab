use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, patch, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{AuthGate, FirebaseVerifier, TokenVerifier};
use crate::config::AppConfig;
use crate::docs;
use crate::jwt::JwtConfig;
use crate::routes::{auth, health, tasks, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub jwt: Arc<JwtConfig>,
    pub gate: Arc<AuthGate>,
}

impl AppState {
    /// Federated sign-in is enabled only when a Firebase project is configured.
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        let federated = config
            .firebase_project_id
            .clone()
            .map(|project| {
                let verifier =
                    FirebaseVerifier::new(project).require_verified_email(config.firebase_require_verified_email);
                Arc::new(verifier) as Arc<dyn TokenVerifier>
            });
        Self::build(pool, config, federated)
    }

    /// Uses `federated` as the first verification strategy, ahead of the
    /// local token issuer.
    pub fn with_federated(pool: SqlitePool, config: AppConfig, federated: Arc<dyn TokenVerifier>) -> Self {
        Self::build(pool, config, Some(federated))
    }

    fn build(pool: SqlitePool, config: AppConfig, federated: Option<Arc<dyn TokenVerifier>>) -> Self {
        let config = Arc::new(config);
        let jwt = Arc::new(JwtConfig::from_config(&config));

        let mut strategies: Vec<Arc<dyn TokenVerifier>> = Vec::with_capacity(2);
        strategies.extend(federated);
        strategies.push(jwt.clone());

        let gate = AuthGate::new(pool.clone(), config.clone(), strategies);
        tracing::info!(strategies = ?gate.strategy_names(), "authentication gate ready");

        Self {
            pool,
            config,
            jwt,
            gate: Arc::new(gate),
        }
    }
}

pub fn create_app(pool: SqlitePool, config: AppConfig) -> Router {
    router(AppState::new(pool, config))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/profile", get(auth::profile));

    // `/my` is a static segment and wins over `/:id`.
    let task_routes = Router::new()
        .route("/", post(tasks::create_task).get(tasks::list_all_tasks))
        .route("/my", get(tasks::list_my_tasks))
        .route(
            "/:id",
            get(tasks::get_task).put(tasks::update_task).delete(tasks::delete_task),
        );

    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/:id/block", patch(users::set_blocked));

    Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/tasks", task_routes)
        .nest("/users", user_routes)
        .with_state(state)
        .merge(docs::swagger_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
