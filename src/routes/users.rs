use axum::extract::{Path, State};
use axum::Json;

use crate::app::AppState;
use crate::authz::{ensure_can_block, AdminUser};
use crate::db::users;
use crate::errors::{AppError, AppResult};
use crate::extract::ApiJson;
use crate::models::user::{BlockRequest, User};
use crate::utils::parse_id;

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    responses(
        (status = 200, description = "All accounts, without passwords", body = [User]),
        (status = 403, description = "Caller is not an admin")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_users(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Json<Vec<User>>> {
    let users = users::list(&state.pool)
        .await?
        .into_iter()
        .map(User::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(users))
}

#[utoipa::path(
    patch,
    path = "/users/{id}/block",
    tag = "Users",
    params(("id" = String, Path, description = "User id")),
    request_body = BlockRequest,
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 400, description = "Missing field or attempt to block yourself"),
        (status = 403, description = "Target is an admin, or caller is not"),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn set_blocked(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<BlockRequest>,
) -> AppResult<Json<User>> {
    let blocked = payload
        .blocked
        .ok_or_else(|| AppError::bad_request("Field \"blocked\" is required"))?;

    let target_id = parse_id(&id, "User not found")?;
    let target = if target_id == admin.user_id {
        None
    } else {
        users::find_by_id(&state.pool, target_id).await?
    };
    ensure_can_block(&admin, target_id, target.as_ref())?;

    let updated = users::set_blocked(&state.pool, target_id, blocked).await?;
    tracing::info!(admin_id = %admin.user_id, user_id = %updated.id, blocked, "user block state changed");

    Ok(Json(updated.try_into()?))
}
