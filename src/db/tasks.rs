use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::task::DbTask;
use crate::utils::utc_now;

const TASK_COLUMNS: &str = "id, title, description, due_date, completed, owner_id, created_at, updated_at";

pub struct NewTask {
    pub title: Option<String>,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
}

/// Field changes for an owned task. `Some(None)` clears `title` or `due_date`.
#[derive(Debug, Default)]
pub struct TaskChanges {
    pub title: Option<Option<String>>,
    pub description: Option<String>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub completed: Option<bool>,
}

pub async fn insert(pool: &SqlitePool, owner_id: Uuid, task: NewTask) -> AppResult<DbTask> {
    let now = utc_now();
    let sql = format!(
        "INSERT INTO tasks (id, title, description, due_date, completed, owner_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 0, ?, ?, ?) RETURNING {TASK_COLUMNS}"
    );

    let task = sqlx::query_as::<_, DbTask>(&sql)
        .bind(Uuid::new_v4())
        .bind(task.title)
        .bind(task.description)
        .bind(task.due_date)
        .bind(owner_id)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await?;

    Ok(task)
}

// Every owner-scoped query filters on (id, owner_id) together; a task owned by
// someone else is indistinguishable from a missing one.

pub async fn find_owned(pool: &SqlitePool, task_id: Uuid, owner_id: Uuid) -> AppResult<Option<DbTask>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND owner_id = ?");
    let task = sqlx::query_as::<_, DbTask>(&sql)
        .bind(task_id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;
    Ok(task)
}

pub async fn list_by_owner(pool: &SqlitePool, owner_id: Uuid) -> AppResult<Vec<DbTask>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = ? ORDER BY created_at ASC");
    let tasks = sqlx::query_as::<_, DbTask>(&sql)
        .bind(owner_id)
        .fetch_all(pool)
        .await?;
    Ok(tasks)
}

pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<DbTask>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at ASC");
    let tasks = sqlx::query_as::<_, DbTask>(&sql).fetch_all(pool).await?;
    Ok(tasks)
}

pub async fn update_owned(
    pool: &SqlitePool,
    task_id: Uuid,
    owner_id: Uuid,
    changes: TaskChanges,
) -> AppResult<Option<DbTask>> {
    let sql = format!(
        "UPDATE tasks SET \
           title = CASE WHEN ? THEN ? ELSE title END, \
           description = COALESCE(?, description), \
           due_date = CASE WHEN ? THEN ? ELSE due_date END, \
           completed = COALESCE(?, completed), \
           updated_at = ? \
         WHERE id = ? AND owner_id = ? \
         RETURNING {TASK_COLUMNS}"
    );

    let set_title = changes.title.is_some();
    let set_due_date = changes.due_date.is_some();
    let task = sqlx::query_as::<_, DbTask>(&sql)
        .bind(set_title)
        .bind(changes.title.flatten())
        .bind(changes.description)
        .bind(set_due_date)
        .bind(changes.due_date.flatten())
        .bind(changes.completed)
        .bind(utc_now())
        .bind(task_id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;

    Ok(task)
}

/// Returns whether a row owned by `owner_id` was removed.
pub async fn delete_owned(pool: &SqlitePool, task_id: Uuid, owner_id: Uuid) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = ? AND owner_id = ?")
        .bind(task_id)
        .bind(owner_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
