/// User↔task assignment edges
///
/// This module implements the many-to-many relationship between users and tasks.
/// An edge's identity is the `(user_id, task_id)` pair itself; deleting either
/// endpoint removes its edges.
///
/// Edge sets are always replaced wholesale: the current edges of one side are
/// deleted and the new set inserted, never diffed.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE user_tasks (
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     task_id UUID NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (user_id, task_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

use super::role::Role;
use super::task::Task;
use super::user::User;

/// A task together with its assigned users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskWithUsers {
    pub task: Task,
    pub users: Vec<User>,
}

impl TaskWithUsers {
    /// IDs of the assigned users
    pub fn user_ids(&self) -> Vec<Uuid> {
        self.users.iter().map(|user| user.id).collect()
    }
}

/// A user together with their role and assigned tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserWithRelations {
    pub user: User,
    pub role: Role,
    pub tasks: Vec<Task>,
}

impl UserWithRelations {
    /// IDs of the assigned tasks
    pub fn task_ids(&self) -> Vec<Uuid> {
        self.tasks.iter().map(|task| task.id).collect()
    }
}

/// A single assignment edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserTask {
    pub user_id: Uuid,
    pub task_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl UserTask {
    /// Lists every edge
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, UserTask>(
            r#"
            SELECT user_id, task_id, created_at
            FROM user_tasks
            ORDER BY task_id, user_id
            "#,
        )
        .fetch_all(conn)
        .await
    }

    /// Users assigned to a task
    pub async fn users_for_task(
        conn: &mut PgConnection,
        task_id: Uuid,
    ) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.name, u.email, u.role_id, u.created_at, u.updated_at
            FROM users u
            JOIN user_tasks ut ON ut.user_id = u.id
            WHERE ut.task_id = $1
            ORDER BY u.name, u.id
            "#,
        )
        .bind(task_id)
        .fetch_all(conn)
        .await
    }

    /// Tasks assigned to a user
    pub async fn tasks_for_user(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<Vec<Task>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            SELECT t.id, t.name, t.created_at, t.updated_at
            FROM tasks t
            JOIN user_tasks ut ON ut.task_id = t.id
            WHERE ut.user_id = $1
            ORDER BY t.name, t.id
            "#,
        )
        .bind(user_id)
        .fetch_all(conn)
        .await
    }

    /// Replaces the set of users assigned to a task
    ///
    /// Clears every edge of the task, then inserts one edge per user.
    /// Duplicate IDs collapse into a single edge.
    ///
    /// # Errors
    ///
    /// Returns a foreign key violation if the task or any user doesn't exist
    pub async fn replace_for_task(
        conn: &mut PgConnection,
        task_id: Uuid,
        user_ids: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM user_tasks WHERE task_id = $1")
            .bind(task_id)
            .execute(&mut *conn)
            .await?;

        if user_ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO user_tasks (user_id, task_id)
            SELECT DISTINCT UNNEST($2::uuid[]), $1::uuid
            "#,
        )
        .bind(task_id)
        .bind(user_ids)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Replaces the set of tasks assigned to a user
    ///
    /// Mirror image of [`UserTask::replace_for_task`].
    pub async fn replace_for_user(
        conn: &mut PgConnection,
        user_id: Uuid,
        task_ids: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM user_tasks WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        if task_ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO user_tasks (user_id, task_id)
            SELECT DISTINCT $1::uuid, UNNEST($2::uuid[])
            "#,
        )
        .bind(user_id)
        .bind(task_ids)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
