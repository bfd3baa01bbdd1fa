/// User model and database operations
///
/// Users hold exactly one role and any number of assigned tasks (see
/// `models::assignment`). Email addresses are globally unique.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(100) NOT NULL,
///     email VARCHAR(200) NOT NULL UNIQUE,
///     role_id UUID NOT NULL REFERENCES roles(id) ON DELETE RESTRICT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

/// User model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID (UUID v4)
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Email address
    ///
    /// Must be unique across all users
    pub email: String,

    /// The user's single role
    pub role_id: Uuid,

    /// When the user was created
    pub created_at: DateTime<Utc>,

    /// When the user was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub role_id: Uuid,
}

/// Input for updating a user
///
/// Edits overwrite every scalar field; there is no partial update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUser {
    pub name: String,
    pub email: String,
    pub role_id: Uuid,
}

impl User {
    /// Creates a new user
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Email already exists (`users_email_key`)
    /// - Role doesn't exist (`users_role_id_fkey`)
    pub async fn create(conn: &mut PgConnection, data: CreateUser) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, role_id)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, role_id, created_at, updated_at
            "#,
        )
        .bind(data.name)
        .bind(data.email)
        .bind(data.role_id)
        .fetch_one(conn)
        .await
    }

    /// Finds a user by ID
    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, role_id, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Finds every user whose ID is in `ids`
    ///
    /// Unknown IDs are ignored; duplicates in `ids` yield one row.
    pub async fn find_by_ids(
        conn: &mut PgConnection,
        ids: &[Uuid],
    ) -> Result<Vec<Self>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, role_id, created_at, updated_at
            FROM users
            WHERE id = ANY($1)
            ORDER BY name, id
            "#,
        )
        .bind(ids)
        .fetch_all(conn)
        .await
    }

    /// Lists all users ordered by name
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, role_id, created_at, updated_at
            FROM users
            ORDER BY name, id
            "#,
        )
        .fetch_all(conn)
        .await
    }

    /// Overwrites name, email and role
    ///
    /// Returns None if the user doesn't exist
    pub async fn update(
        conn: &mut PgConnection,
        id: Uuid,
        data: UpdateUser,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = $2,
                email = $3,
                role_id = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, email, role_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(data.name)
        .bind(data.email)
        .bind(data.role_id)
        .fetch_optional(conn)
        .await
    }

    /// Renames a user, leaving email and role untouched
    pub async fn rename(
        conn: &mut PgConnection,
        id: Uuid,
        name: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, email, role_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(name)
        .fetch_optional(conn)
        .await
    }

    /// Deletes a user
    ///
    /// Assignment rows are removed by `ON DELETE CASCADE`.
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
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
    fn test_user_serialization() {
        let user = User {
            id: Uuid::nil(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role_id: Uuid::nil(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["name"], "Ada");
        assert_eq!(json["email"], "ada@example.com");
        assert_eq!(json["role_id"], Uuid::nil().to_string());
    }

    // Integration tests for database operations are in tests/postgres_store_tests.rs
}
