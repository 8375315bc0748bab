use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::db::users::{self, NewLocalUser};
use crate::errors::{AppError, AppResult};
use crate::extract::ApiJson;
use crate::models::user::{AuthResponse, LoginRequest, ProfileResponse, RegisterRequest, User};
use crate::utils::{hash_password, non_blank, normalize_email, verify_password};

const INVALID_CREDENTIALS: &str = "Invalid password or email";

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Missing username, email or password"),
        (status = 409, description = "Username or email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let username = non_blank(payload.username.as_deref()).ok_or_else(|| AppError::bad_request("Username is required"))?;
    let email = non_blank(payload.email.as_deref())
        .map(|email| normalize_email(&email))
        .ok_or_else(|| AppError::bad_request("Email is required"))?;
    let password = payload
        .password
        .filter(|password| !password.is_empty())
        .ok_or_else(|| AppError::bad_request("Password is required"))?;

    let password_hash = hash_password(&password)?;

    let db_user = users::insert_local(
        &state.pool,
        NewLocalUser {
            username: &username,
            email: &email,
            password_hash: &password_hash,
            admin_email: state.config.is_admin_email(&email),
        },
    )
    .await?;

    let user: User = db_user.try_into()?;
    let token = state.jwt.encode(user.id, user.role)?;
    tracing::info!(user_id = %user.id, role = %user.role, "user registered");

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Invalid password or email"),
        (status = 403, description = "User is blocked"),
        (status = 404, description = "User not found")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = non_blank(payload.email.as_deref()).ok_or_else(|| AppError::bad_request("Email is required"))?;
    let password = payload.password.ok_or_else(|| AppError::bad_request("Password is required"))?;

    let db_user = users::find_by_email(&state.pool, &normalize_email(&email))
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    // Blocked accounts are refused before the password is even looked at.
    if db_user.blocked {
        return Err(AppError::forbidden("User is blocked"));
    }

    // Accounts created through federated sign-in have no password.
    let password_hash = db_user
        .password_hash
        .as_deref()
        .ok_or_else(|| AppError::bad_request(INVALID_CREDENTIALS))?;

    if !verify_password(&password, password_hash)? {
        return Err(AppError::bad_request(INVALID_CREDENTIALS));
    }

    let user: User = db_user.try_into()?;
    let token = state.jwt.encode(user.id, user.role)?;
    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Json(AuthResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/auth/profile",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = ProfileResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn profile(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<ProfileResponse>> {
    let db_user = users::find_by_id(&state.pool, auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(Json(ProfileResponse {
        user: db_user.try_into()?,
    }))
}
