use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    #[schema(example = "Groceries")]
    pub title: Option<String>,
    #[schema(example = "buy milk")]
    pub description: String,
    #[schema(format = DateTime, example = "2025-10-10T10:00:00Z")]
    pub due_date: Option<DateTime<Utc>>,
    pub completed: bool,
    /// Id of the user that created the task.
    pub owner: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTask {
    pub id: Uuid,
    pub title: Option<String>,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub completed: bool,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbTask> for Task {
    type Error = AppError;

    fn try_from(value: DbTask) -> Result<Self, Self::Error> {
        Ok(Task {
            id: value.id,
            title: value.title,
            description: value.description,
            due_date: value.due_date,
            completed: value.completed,
            owner: value.owner_id,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreateRequest {
    #[schema(example = "Groceries")]
    pub title: Option<String>,
    #[schema(example = "buy milk")]
    pub description: Option<String>,
    #[schema(example = "2025-10-10")]
    pub due_date: Option<String>,
}

/// Partial update. Unknown fields (including `owner`) are ignored.
///
/// `title` and `dueDate` distinguish an absent key (`None`, keep the stored
/// value) from an explicit `null` (`Some(None)`, clear it).
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdateRequest {
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub title: Option<Option<String>>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>, example = "2025-11-01T10:00:00Z")]
    pub due_date: Option<Option<String>>,
    pub completed: Option<bool>,
}

/// Wraps whatever was sent, `null` included, so only a missing key is `None`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_tells_null_from_missing() {
        let req: TaskUpdateRequest = serde_json::from_str(r#"{"dueDate": null}"#).unwrap();
        assert_eq!(req.due_date, Some(None));
        assert_eq!(req.title, None);

        let req: TaskUpdateRequest = serde_json::from_str(r#"{"title": "x", "dueDate": "2025-01-01"}"#).unwrap();
        assert_eq!(req.title, Some(Some("x".to_string())));
        assert_eq!(req.due_date, Some(Some("2025-01-01".to_string())));
    }
}
