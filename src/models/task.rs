use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

/// Narrow view of a production task row, read only to resolve publish
/// requests: the task carries the project a publish belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: i64,
    pub project_id: Option<i64>,
    pub artist_id: Option<i64>,
    pub name: String,
}

impl Task {
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query_as::<_, Task>("SELECT id, project_id, artist_id, name FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
