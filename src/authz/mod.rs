//! Authorization policy.
//!
//! - Role guard: [`require_role`] and the [`AdminUser`] extractor, which runs
//!   the authentication gate first and then checks the role.
//! - Ownership: enforced by the owner-scoped task queries in `db::tasks`; a
//!   task the caller does not own reads as "not found".
//! - Block rules: [`ensure_can_block`].

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::errors::{AppError, AppResult};
use crate::models::user::{DbUser, Role};

pub fn require_role(user: &AuthUser, role: Role) -> AppResult<()> {
    if user.role != role {
        tracing::debug!(user_id = %user.user_id, required = %role, actual = %user.role, "role guard denied request");
        return Err(AppError::forbidden("Access denied"));
    }
    Ok(())
}

/// An authenticated caller holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        require_role(&user, Role::Admin)?;
        Ok(AdminUser(user))
    }
}

/// Self-blocking is a bad request; touching another admin is forbidden.
/// `target` is `None` when the id did not resolve.
pub fn ensure_can_block(actor: &AuthUser, target_id: Uuid, target: Option<&DbUser>) -> AppResult<()> {
    if target_id == actor.user_id {
        return Err(AppError::bad_request("You cannot block yourself"));
    }

    let target = target.ok_or_else(|| AppError::not_found("User not found"))?;

    if target.role()? == Role::Admin {
        return Err(AppError::forbidden("Cannot block another admin"));
    }

    Ok(())
}
