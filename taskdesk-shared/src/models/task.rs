/// Task model and database operations
///
/// A task is a named unit of work that any number of users can be assigned to.
/// Task names are unique ignoring case; the application checks this before
/// inserting and the `tasks_name_lower_key` index backs it up.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(150) NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE UNIQUE INDEX tasks_name_lower_key ON tasks (lower(name));
/// ```
///
/// # Example
///
/// ```no_run
/// use taskdesk_shared::models::task::Task;
/// use taskdesk_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
/// let mut conn = pool.acquire().await?;
///
/// let names = vec!["Work".to_string(), "Eat".to_string()];
/// let created = Task::create_many(&mut conn, &names).await?;
/// println!("Created {} tasks", created.len());
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

/// Unique index enforcing case-insensitive task names
pub const TASK_NAME_CONSTRAINT: &str = "tasks_name_lower_key";

/// Task model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    /// Unique task ID
    pub id: Uuid,

    /// Human-readable task name
    pub name: String,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task was last updated
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Inserts tasks by name, skipping names that already exist
    ///
    /// Conflicts on `tasks_name_lower_key` are ignored (`ON CONFLICT DO NOTHING`),
    /// so a name inserted concurrently by another writer is silently dropped.
    ///
    /// # Returns
    ///
    /// Only the rows actually inserted
    pub async fn create_many(
        conn: &mut PgConnection,
        names: &[String],
    ) -> Result<Vec<Self>, sqlx::Error> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (name)
            SELECT UNNEST($1::text[])
            ON CONFLICT DO NOTHING
            RETURNING id, name, created_at, updated_at
            "#,
        )
        .bind(names)
        .fetch_all(conn)
        .await
    }

    /// Finds a task by ID
    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            SELECT id, name, created_at, updated_at
            FROM tasks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Finds every task whose ID is in `ids`
    pub async fn find_by_ids(
        conn: &mut PgConnection,
        ids: &[Uuid],
    ) -> Result<Vec<Self>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, Task>(
            r#"
            SELECT id, name, created_at, updated_at
            FROM tasks
            WHERE id = ANY($1)
            ORDER BY name, id
            "#,
        )
        .bind(ids)
        .fetch_all(conn)
        .await
    }

    /// Lists all tasks ordered by name
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            SELECT id, name, created_at, updated_at
            FROM tasks
            ORDER BY name, id
            "#,
        )
        .fetch_all(conn)
        .await
    }

    /// Returns every persisted task name
    pub async fn names(conn: &mut PgConnection) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT name FROM tasks")
            .fetch_all(conn)
            .await
    }

    /// Renames a task
    ///
    /// Returns None if the task doesn't exist
    pub async fn rename(
        conn: &mut PgConnection,
        id: Uuid,
        name: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
            SET name = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(name)
        .fetch_optional(conn)
        .await
    }

    /// Deletes a task
    ///
    /// ⚠️  This also deletes its assignment rows due to CASCADE.
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_round_trips_through_json() {
        let task = Task {
            id: Uuid::new_v4(),
            name: "Sleep".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&task).unwrap();
        let parsed: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, task);
    }
}
