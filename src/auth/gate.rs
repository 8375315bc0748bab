use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{FederatedIdentity, TokenVerifier, VerifiedToken, VerifyError};
use crate::app::AppState;
use crate::config::AppConfig;
use crate::db::users::{self, NewFederatedUser};
use crate::errors::{is_unique_violation, AppError, AppResult};
use crate::jwt::Claims;
use crate::models::user::{DbUser, Role};
use crate::utils::normalize_email;

/// Identity attached to every authenticated request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
    pub email: String,
    /// Set when the request was authenticated with a federated token.
    pub federated_id: Option<String>,
}

pub struct AuthGate {
    pool: SqlitePool,
    config: Arc<AppConfig>,
    strategies: Vec<Arc<dyn TokenVerifier>>,
}

impl AuthGate {
    pub fn new(pool: SqlitePool, config: Arc<AppConfig>, strategies: Vec<Arc<dyn TokenVerifier>>) -> Self {
        Self {
            pool,
            config,
            strategies,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn authenticate_header(&self, header: Option<&str>) -> AppResult<AuthUser> {
        let token = header
            .and_then(bearer_token)
            .ok_or_else(|| AppError::unauthorized("Authorization required"))?;

        self.authenticate(token).await
    }

    pub async fn authenticate(&self, token: &str) -> AppResult<AuthUser> {
        let mut expired = false;

        for strategy in &self.strategies {
            match strategy.verify(token).await {
                Ok(VerifiedToken::Federated(identity)) => return self.resolve_federated(identity).await,
                Ok(VerifiedToken::Local(claims)) => return self.resolve_local(claims).await,
                Err(VerifyError::Expired) => {
                    tracing::debug!(strategy = strategy.name(), "token expired");
                    expired = true;
                }
                Err(err) => {
                    tracing::debug!(strategy = strategy.name(), error = %err, "strategy declined token");
                }
            }
        }

        if expired {
            Err(AppError::token("Token expired"))
        } else {
            Err(AppError::token("Invalid or expired token"))
        }
    }

    async fn resolve_local(&self, claims: Claims) -> AppResult<AuthUser> {
        let user = users::find_by_id(&self.pool, claims.sub)
            .await?
            .ok_or_else(|| AppError::unauthorized("User not found"))?;

        ensure_not_blocked(&user)?;

        Ok(AuthUser {
            user_id: user.id,
            role: user.role()?,
            email: user.email,
            federated_id: None,
        })
    }

    async fn resolve_federated(&self, identity: FederatedIdentity) -> AppResult<AuthUser> {
        let email = normalize_email(&identity.email);
        let desired_role = if self.config.is_admin_email(&email) {
            Role::Admin
        } else {
            Role::User
        };

        let user = match self.lookup_federated(&identity.external_id, &email).await? {
            Some(user) => self.merge_federated(user, &identity.external_id, desired_role).await?,
            None => self.create_federated(&identity, &email, desired_role).await?,
        };

        ensure_not_blocked(&user)?;

        Ok(AuthUser {
            user_id: user.id,
            role: user.role()?,
            email: user.email,
            federated_id: Some(identity.external_id),
        })
    }

    async fn lookup_federated(&self, external_id: &str, email: &str) -> AppResult<Option<DbUser>> {
        if let Some(user) = users::find_by_federated_id(&self.pool, external_id).await? {
            return Ok(Some(user));
        }
        users::find_by_email(&self.pool, email).await
    }

    /// Backfills the external id and promotes to admin when needed. Writes
    /// only when something changed, so repeated sign-ins are free.
    async fn merge_federated(&self, user: DbUser, external_id: &str, desired_role: Role) -> AppResult<DbUser> {
        let current_role = user.role()?;
        let link_missing = user.federated_id.is_none();
        let promote = desired_role == Role::Admin && current_role != Role::Admin;

        if !link_missing && !promote {
            return Ok(user);
        }

        let federated_id = user.federated_id.clone().unwrap_or_else(|| external_id.to_string());
        let role = if promote { Role::Admin } else { current_role };

        let updated = users::update_federated_link(&self.pool, user.id, Some(&federated_id), role).await?;
        tracing::info!(
            user_id = %updated.id,
            linked = link_missing,
            promoted = promote,
            "federated account merged"
        );
        Ok(updated)
    }

    async fn create_federated(
        &self,
        identity: &FederatedIdentity,
        email: &str,
        role: Role,
    ) -> AppResult<DbUser> {
        for username in username_candidates(identity, email) {
            let new_user = NewFederatedUser {
                username: &username,
                email,
                federated_id: &identity.external_id,
                role,
            };

            match users::insert_federated(&self.pool, new_user).await {
                Ok(user) => {
                    tracing::info!(user_id = %user.id, username = %user.username, role = %role, "federated account created");
                    return Ok(user);
                }
                Err(err) if is_unique_violation(&err) => {
                    // Either a concurrent sign-in created the account first, or
                    // only the username collided.
                    if let Some(existing) = self.lookup_federated(&identity.external_id, email).await? {
                        tracing::debug!(user_id = %existing.id, "federated account created concurrently, merging");
                        return self.merge_federated(existing, &identity.external_id, role).await;
                    }
                    tracing::debug!(username = %username, "username taken, trying next candidate");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(AppError::conflict("Unable to allocate a username for this account"))
    }
}

fn ensure_not_blocked(user: &DbUser) -> AppResult<()> {
    if user.blocked {
        return Err(AppError::forbidden("User is blocked"));
    }
    Ok(())
}

/// Extracts the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Usernames to try, in order, for a first federated sign-in: the display
/// name, the local part of the email, then a stable placeholder derived from
/// the external id.
pub fn username_candidates(identity: &FederatedIdentity, email: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::with_capacity(3);

    if let Some(name) = identity.display_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        candidates.push(name.to_string());
    }

    if let Some(local) = email.split('@').next().map(str::trim).filter(|l| !l.is_empty()) {
        if !candidates.iter().any(|c| c == local) {
            candidates.push(local.to_string());
        }
    }

    let digest = hex::encode(Sha256::digest(identity.external_id.as_bytes()));
    candidates.push(format!("user-{}", &digest[..12]));

    candidates
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let user = state.gate.authenticate_header(header).await?;
        parts.extensions.insert(user.clone());

        Ok(user)
    }
}
