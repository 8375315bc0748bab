use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::authz::AdminUser;
use crate::db::tasks::{self, NewTask, TaskChanges};
use crate::errors::{AppError, AppResult};
use crate::extract::ApiJson;
use crate::models::task::{DbTask, MessageResponse, Task, TaskCreateRequest, TaskUpdateRequest};
use crate::utils::{non_blank, parse_due_date, parse_id};

const TASK_NOT_FOUND: &str = "Task not found";

fn to_tasks(rows: Vec<DbTask>) -> AppResult<Vec<Task>> {
    rows.into_iter().map(Task::try_from).collect()
}

#[utoipa::path(
    post,
    path = "/tasks",
    tag = "Tasks",
    request_body = TaskCreateRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Neither title nor description given")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(payload): ApiJson<TaskCreateRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    let title = non_blank(payload.title.as_deref());
    let description = non_blank(payload.description.as_deref())
        .or_else(|| title.clone())
        .ok_or_else(|| AppError::bad_request("Provide a title or description"))?;

    // An unparsable due date is dropped rather than rejected.
    let due_date = payload.due_date.as_deref().and_then(parse_due_date);

    let task = tasks::insert(
        &state.pool,
        auth.user_id,
        NewTask {
            title,
            description,
            due_date,
        },
    )
    .await?;

    tracing::info!(task_id = %task.id, owner = %auth.user_id, "task created");
    Ok((StatusCode::CREATED, Json(task.try_into()?)))
}

#[utoipa::path(
    get,
    path = "/tasks/my",
    tag = "Tasks",
    responses((status = 200, description = "Tasks owned by the caller", body = [Task])),
    security(("bearerAuth" = []))
)]
pub async fn list_my_tasks(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Task>>> {
    let rows = tasks::list_by_owner(&state.pool, auth.user_id).await?;
    Ok(Json(to_tasks(rows)?))
}

#[utoipa::path(
    get,
    path = "/tasks",
    tag = "Tasks",
    responses(
        (status = 200, description = "Every task of every user", body = [Task]),
        (status = 403, description = "Caller is not an admin")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_all_tasks(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Json<Vec<Task>>> {
    let rows = tasks::list_all(&state.pool).await?;
    Ok(Json(to_tasks(rows)?))
}

#[utoipa::path(
    get,
    path = "/tasks/{id}",
    tag = "Tasks",
    params(("id" = String, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task detail", body = Task),
        (status = 404, description = "Task not found or not owned by the caller")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Task>> {
    let task_id = parse_id(&id, TASK_NOT_FOUND)?;
    let task = tasks::find_owned(&state.pool, task_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found(TASK_NOT_FOUND))?;

    Ok(Json(task.try_into()?))
}

#[utoipa::path(
    put,
    path = "/tasks/{id}",
    tag = "Tasks",
    params(("id" = String, Path, description = "Task id")),
    request_body = TaskUpdateRequest,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 400, description = "Invalid field value"),
        (status = 404, description = "Task not found or not owned by the caller")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<TaskUpdateRequest>,
) -> AppResult<Json<Task>> {
    let task_id = parse_id(&id, TASK_NOT_FOUND)?;
    let changes = task_changes(payload)?;

    let task = tasks::update_owned(&state.pool, task_id, auth.user_id, changes)
        .await?
        .ok_or_else(|| AppError::not_found(TASK_NOT_FOUND))?;

    Ok(Json(task.try_into()?))
}

#[utoipa::path(
    delete,
    path = "/tasks/{id}",
    tag = "Tasks",
    params(("id" = String, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task deleted", body = MessageResponse),
        (status = 404, description = "Task not found or not owned by the caller")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let task_id = parse_id(&id, TASK_NOT_FOUND)?;

    if !tasks::delete_owned(&state.pool, task_id, auth.user_id).await? {
        return Err(AppError::not_found(TASK_NOT_FOUND));
    }

    tracing::info!(task_id = %task_id, owner = %auth.user_id, "task deleted");
    Ok(Json(MessageResponse::new("Task deleted successfully")))
}

fn task_changes(payload: TaskUpdateRequest) -> AppResult<TaskChanges> {
    let description = match payload.description {
        Some(raw) => Some(non_blank(Some(&raw)).ok_or_else(|| AppError::bad_request("Description cannot be empty"))?),
        None => None,
    };

    // `null` clears the due date; anything else must parse.
    let due_date = match payload.due_date {
        Some(Some(raw)) => Some(Some(parse_due_date(&raw).ok_or_else(|| AppError::bad_request("Invalid due date"))?)),
        Some(None) => Some(None),
        None => None,
    };

    Ok(TaskChanges {
        // A blank or null title clears it; the description still carries the task.
        title: payload.title.map(|raw| non_blank(raw.as_deref())),
        description,
        due_date,
        completed: payload.completed,
    })
}
