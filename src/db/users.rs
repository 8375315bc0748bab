use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{is_unique_violation, AppError, AppResult};
use crate::models::user::{DbUser, Role};
use crate::utils::utc_now;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, federated_id, role, blocked, created_at, updated_at";

pub struct NewLocalUser<'a> {
    pub username: &'a str,
    /// Already trimmed and lower-cased.
    pub email: &'a str,
    pub password_hash: &'a str,
    pub admin_email: bool,
}

pub struct NewFederatedUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub federated_id: &'a str,
    pub role: Role,
}

pub async fn find_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<DbUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    let user = sqlx::query_as::<_, DbUser>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Email comparison is case-insensitive (the column is `COLLATE NOCASE`).
pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
    let user = sqlx::query_as::<_, DbUser>(&sql)
        .bind(email.trim())
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn find_by_federated_id(pool: &SqlitePool, federated_id: &str) -> AppResult<Option<DbUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE federated_id = ?");
    let user = sqlx::query_as::<_, DbUser>(&sql)
        .bind(federated_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn list(pool: &SqlitePool) -> AppResult<Vec<DbUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC");
    let users = sqlx::query_as::<_, DbUser>(&sql).fetch_all(pool).await?;
    Ok(users)
}

/// Creates a password account. The role is decided inside the INSERT so two
/// concurrent first registrations cannot both observe an empty table.
pub async fn insert_local(pool: &SqlitePool, new_user: NewLocalUser<'_>) -> AppResult<DbUser> {
    let now = utc_now();
    let sql = format!(
        "INSERT INTO users (id, username, email, password_hash, federated_id, role, blocked, created_at, updated_at) \
         VALUES (?, ?, ?, ?, NULL, CASE WHEN ? OR NOT EXISTS (SELECT 1 FROM users) THEN 'admin' ELSE 'user' END, 0, ?, ?) \
         RETURNING {USER_COLUMNS}"
    );

    sqlx::query_as::<_, DbUser>(&sql)
        .bind(Uuid::new_v4())
        .bind(new_user.username)
        .bind(new_user.email)
        .bind(new_user.password_hash)
        .bind(new_user.admin_email)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::conflict("Username or email already in use")
            } else {
                AppError::from(err)
            }
        })
}

/// Creates an account on first federated sign-in. The raw database error is
/// returned so callers can treat unique violations as a lost race.
pub async fn insert_federated(pool: &SqlitePool, new_user: NewFederatedUser<'_>) -> Result<DbUser, sqlx::Error> {
    let now = utc_now();
    let sql = format!(
        "INSERT INTO users (id, username, email, password_hash, federated_id, role, blocked, created_at, updated_at) \
         VALUES (?, ?, ?, NULL, ?, ?, 0, ?, ?) \
         RETURNING {USER_COLUMNS}"
    );

    sqlx::query_as::<_, DbUser>(&sql)
        .bind(Uuid::new_v4())
        .bind(new_user.username)
        .bind(new_user.email)
        .bind(new_user.federated_id)
        .bind(new_user.role.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
}

/// Writes the federated link and role of an existing account.
pub async fn update_federated_link(
    pool: &SqlitePool,
    user_id: Uuid,
    federated_id: Option<&str>,
    role: Role,
) -> AppResult<DbUser> {
    let sql = format!(
        "UPDATE users SET federated_id = ?, role = ?, updated_at = ? WHERE id = ? RETURNING {USER_COLUMNS}"
    );

    let user = sqlx::query_as::<_, DbUser>(&sql)
        .bind(federated_id)
        .bind(role.as_str())
        .bind(utc_now())
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::conflict("Federated identity already linked to another account")
            } else {
                AppError::from(err)
            }
        })?;

    user.ok_or_else(|| AppError::not_found("User not found"))
}

pub async fn set_blocked(pool: &SqlitePool, user_id: Uuid, blocked: bool) -> AppResult<DbUser> {
    let sql = format!("UPDATE users SET blocked = ?, updated_at = ? WHERE id = ? RETURNING {USER_COLUMNS}");

    let user = sqlx::query_as::<_, DbUser>(&sql)
        .bind(blocked)
        .bind(utc_now())
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    user.ok_or_else(|| AppError::not_found("User not found"))
}
