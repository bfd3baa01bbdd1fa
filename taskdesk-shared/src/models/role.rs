/// Role model and database operations
///
/// Every user holds exactly one role. A role carries a permission bitset whose
/// flags combine independently.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE roles (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(50) NOT NULL UNIQUE,
///     permissions INTEGER NOT NULL DEFAULT 0,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Permissions
///
/// - **Read** (1): view users and tasks
/// - **Write** (2): create and edit
/// - **Delete** (4): remove entities
///
/// # Example
///
/// ```
/// use taskdesk_shared::models::role::Permissions;
///
/// let admin = Permissions::READ | Permissions::WRITE | Permissions::DELETE;
/// assert_eq!(admin, Permissions::ALL);
/// assert!(admin.contains(Permissions::WRITE));
///
/// let parsed = Permissions::from_names(["read", "Delete"]).unwrap();
/// assert_eq!(parsed.bits(), 5);
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use uuid::Uuid;

/// Permission bitset attached to a role
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Permissions(i32);

/// Permission name that does not match any flag
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown permission: {0}")]
pub struct UnknownPermission(pub String);

impl Permissions {
    pub const NONE: Permissions = Permissions(0);
    pub const READ: Permissions = Permissions(1);
    pub const WRITE: Permissions = Permissions(2);
    pub const DELETE: Permissions = Permissions(4);
    pub const ALL: Permissions = Permissions(7);

    const NAMED: [(&'static str, Permissions); 3] = [
        ("Read", Permissions::READ),
        ("Write", Permissions::WRITE),
        ("Delete", Permissions::DELETE),
    ];

    /// Raw bit value as stored in the database
    pub fn bits(&self) -> i32 {
        self.0
    }

    /// Builds a set from raw bits, rejecting undefined flags
    pub fn from_bits(bits: i32) -> Option<Self> {
        if bits & !Self::ALL.0 == 0 {
            Some(Permissions(bits))
        } else {
            None
        }
    }

    /// True when every flag of `other` is set
    pub fn contains(&self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Parses a single flag name (case-insensitive)
    pub fn parse(name: &str) -> Result<Self, UnknownPermission> {
        let trimmed = name.trim();
        Self::NAMED
            .iter()
            .find(|(label, _)| label.eq_ignore_ascii_case(trimmed))
            .map(|(_, flag)| *flag)
            .ok_or_else(|| UnknownPermission(trimmed.to_string()))
    }

    /// Combines flag names with OR; an empty list yields `NONE`
    pub fn from_names<I, S>(names: I) -> Result<Self, UnknownPermission>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .try_fold(Permissions::NONE, |acc, name| {
                Ok(acc | Permissions::parse(name.as_ref())?)
            })
    }

    /// Names of the flags that are set, in bit order
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(label, _)| *label)
            .collect()
    }
}

impl BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Permissions) -> Permissions {
        Permissions(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Permissions) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "None");
        }
        write!(f, "{}", self.names().join(" | "))
    }
}

/// Role model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    /// Unique role ID
    pub id: Uuid,

    /// Unique role name
    pub name: String,

    /// Granted permissions
    pub permissions: Permissions,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRole {
    pub name: String,
    pub permissions: Permissions,
}

/// Input for updating a role; both fields are overwritten
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRole {
    pub name: String,
    pub permissions: Permissions,
}

/// Name of the role assigned by default
pub const DEFAULT_ROLE_NAME: &str = "Default User";

/// Name of the full-permission role
pub const ADMIN_ROLE_NAME: &str = "Admin";

impl Role {
    /// Inserts a new role
    ///
    /// # Errors
    ///
    /// Returns an error if the name is already taken (`roles_name_key`)
    pub async fn create(conn: &mut PgConnection, data: CreateRole) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (name, permissions)
            VALUES ($1, $2)
            RETURNING id, name, permissions, created_at, updated_at
            "#,
        )
        .bind(data.name)
        .bind(data.permissions)
        .fetch_one(conn)
        .await
    }

    /// Finds a role by ID
    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Role>(
            r#"
            SELECT id, name, permissions, created_at, updated_at
            FROM roles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Finds a role by exact name
    pub async fn find_by_name(
        conn: &mut PgConnection,
        name: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Role>(
            r#"
            SELECT id, name, permissions, created_at, updated_at
            FROM roles
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(conn)
        .await
    }

    /// Lists all roles ordered by name
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Role>(
            r#"
            SELECT id, name, permissions, created_at, updated_at
            FROM roles
            ORDER BY name, id
            "#,
        )
        .fetch_all(conn)
        .await
    }

    /// Overwrites name and permissions
    ///
    /// Returns None if the role doesn't exist
    pub async fn update(
        conn: &mut PgConnection,
        id: Uuid,
        data: UpdateRole,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Role>(
            r#"
            UPDATE roles
            SET name = $2,
                permissions = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, permissions, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(data.name)
        .bind(data.permissions)
        .fetch_optional(conn)
        .await
    }

    /// Deletes a role
    ///
    /// ⚠️  Fails with a foreign key violation while any user still holds the role.
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
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
    fn test_permission_bits() {
        assert_eq!(Permissions::NONE.bits(), 0);
        assert_eq!(Permissions::READ.bits(), 1);
        assert_eq!(Permissions::WRITE.bits(), 2);
        assert_eq!(Permissions::DELETE.bits(), 4);
        assert_eq!((Permissions::READ | Permissions::DELETE).bits(), 5);
    }

    #[test]
    fn test_permission_from_bits() {
        assert_eq!(Permissions::from_bits(7), Some(Permissions::ALL));
        assert_eq!(Permissions::from_bits(0), Some(Permissions::NONE));
        assert_eq!(Permissions::from_bits(8), None);
        assert_eq!(Permissions::from_bits(-1), None);
    }

    #[test]
    fn test_permission_contains() {
        let rw = Permissions::READ | Permissions::WRITE;
        assert!(rw.contains(Permissions::READ));
        assert!(rw.contains(Permissions::WRITE));
        assert!(!rw.contains(Permissions::DELETE));
        assert!(rw.contains(Permissions::NONE));
        assert!(!rw.contains(Permissions::ALL));
    }

    #[test]
    fn test_permission_parse_is_case_insensitive() {
        assert_eq!(Permissions::parse("read"), Ok(Permissions::READ));
        assert_eq!(Permissions::parse(" WRITE "), Ok(Permissions::WRITE));
        assert_eq!(
            Permissions::parse("Execute"),
            Err(UnknownPermission("Execute".to_string()))
        );
    }

    #[test]
    fn test_permission_from_names() {
        let perms = Permissions::from_names(["Read", "Write", "Delete"]).unwrap();
        assert_eq!(perms, Permissions::ALL);

        let empty: [&str; 0] = [];
        assert_eq!(Permissions::from_names(empty), Ok(Permissions::NONE));

        // Repeated flags collapse
        let perms = Permissions::from_names(["Read", "read"]).unwrap();
        assert_eq!(perms, Permissions::READ);

        assert!(Permissions::from_names(["Read", "Admin"]).is_err());
    }

    #[test]
    fn test_permission_display() {
        assert_eq!(Permissions::NONE.to_string(), "None");
        assert_eq!(Permissions::READ.to_string(), "Read");
        assert_eq!(Permissions::ALL.to_string(), "Read | Write | Delete");
    }

    #[test]
    fn test_permission_serializes_as_integer() {
        let json = serde_json::to_string(&(Permissions::READ | Permissions::WRITE)).unwrap();
        assert_eq!(json, "3");

        let parsed: Permissions = serde_json::from_str("4").unwrap();
        assert_eq!(parsed, Permissions::DELETE);
    }

    #[test]
    fn test_bitor_assign() {
        let mut perms = Permissions::NONE;
        perms |= Permissions::WRITE;
        perms |= Permissions::READ;
        assert_eq!(perms.names(), vec!["Read", "Write"]);
    }
}
