/// Role directory
///
/// Permissions are submitted as flag names (`"Read"`, `"Write"`, `"Delete"`,
/// any case) and combined with OR. A role that users still hold can't be
/// deleted.

use serde::{Deserialize, Serialize};
use taskdesk_shared::error::StoreError;
use taskdesk_shared::models::role::{CreateRole, Permissions, Role, UpdateRole};
use taskdesk_shared::store::{Gateway, Session};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::{field_errors, EditOutcome, FieldError, OperationError, OperationResult};

const NAME_CONSTRAINT: &str = "roles_name_key";
const NAME_TAKEN: &str = "Role with this name already exists.";
const ROLE_IN_USE: &str = "Role is assigned to users and cannot be deleted.";

/// Submitted role form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct RoleForm {
    #[validate(length(min = 1, max = 50, message = "Role name must be between 1 and 50 characters"))]
    pub name: String,

    /// Permission flag names
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl RoleForm {
    /// Validates the form and parses its permissions
    fn parse(&self) -> Result<Permissions, Vec<FieldError>> {
        let mut errors = match self.validate() {
            Ok(()) => Vec::new(),
            Err(e) => field_errors(&e),
        };

        match Permissions::from_names(&self.permissions) {
            Ok(permissions) if errors.is_empty() => Ok(permissions),
            Ok(_) => Err(errors),
            Err(unknown) => {
                errors.push(FieldError::new("permissions", &unknown.to_string()));
                Err(errors)
            }
        }
    }
}

pub type RoleOutcome = EditOutcome<Role, RoleForm>;

fn name_conflict(form: RoleForm, err: StoreError) -> OperationResult<RoleOutcome> {
    if err.is_unique_violation_of(NAME_CONSTRAINT) {
        Ok(EditOutcome::invalid(
            form,
            vec![FieldError::new("name", NAME_TAKEN)],
        ))
    } else {
        Err(err.into())
    }
}

/// Role flows
#[derive(Debug, Clone)]
pub struct RoleDirectory<G> {
    gateway: G,
}

impl<G: Gateway> RoleDirectory<G> {
    pub fn new(gateway: G) -> Self {
        RoleDirectory { gateway }
    }

    pub async fn list(&self) -> OperationResult<Vec<Role>> {
        let mut session = self.gateway.open().await?;
        let roles = session.list_roles().await?;
        session.rollback().await?;
        Ok(roles)
    }

    pub async fn get(&self, id: Uuid) -> OperationResult<Role> {
        let mut session = self.gateway.open().await?;
        let role = session
            .find_role(id)
            .await?
            .ok_or_else(|| OperationError::not_found("Role", id))?;
        session.rollback().await?;
        Ok(role)
    }

    pub async fn create(&self, mut form: RoleForm) -> OperationResult<RoleOutcome> {
        form.name = form.name.trim().to_string();
        let permissions = match form.parse() {
            Ok(permissions) => permissions,
            Err(errors) => return Ok(EditOutcome::invalid(form, errors)),
        };

        let mut session = self.gateway.open().await?;
        let inserted = session
            .insert_role(CreateRole {
                name: form.name.clone(),
                permissions,
            })
            .await;
        let role = match inserted {
            Ok(role) => role,
            Err(e) => return name_conflict(form, e),
        };
        if let Err(e) = session.commit().await {
            return name_conflict(form, e);
        }

        info!(role_id = %role.id, permissions = %role.permissions, "Role created");
        Ok(EditOutcome::Saved(role))
    }

    pub async fn edit(&self, id: Uuid, mut form: RoleForm) -> OperationResult<RoleOutcome> {
        let mut session = self.gateway.open().await?;
        if session.find_role(id).await?.is_none() {
            return Err(OperationError::not_found("Role", id));
        }

        form.name = form.name.trim().to_string();
        let permissions = match form.parse() {
            Ok(permissions) => permissions,
            Err(errors) => return Ok(EditOutcome::invalid(form, errors)),
        };

        let updated = session
            .update_role(
                id,
                UpdateRole {
                    name: form.name.clone(),
                    permissions,
                },
            )
            .await;
        let role = match updated {
            Ok(Some(role)) => role,
            Ok(None) => return Err(OperationError::not_found("Role", id)),
            Err(e) => return name_conflict(form, e),
        };
        if let Err(e) = session.commit().await {
            return name_conflict(form, e);
        }

        info!(role_id = %id, permissions = %role.permissions, "Role updated");
        Ok(EditOutcome::Saved(role))
    }

    /// Deletes a role no user holds
    ///
    /// # Errors
    ///
    /// - `NotFound` if the role doesn't exist
    /// - `Conflict` while any user holds the role
    pub async fn delete(&self, id: Uuid) -> OperationResult<()> {
        let mut session = self.gateway.open().await?;

        let deleted = match session.delete_role(id).await {
            Ok(deleted) => deleted,
            Err(StoreError::ForeignKeyViolation { .. }) => {
                warn!(role_id = %id, "Refusing to delete role in use");
                return Err(OperationError::Conflict(ROLE_IN_USE.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if !deleted {
            return Err(OperationError::not_found("Role", id));
        }

        match session.commit().await {
            Ok(()) => {}
            Err(StoreError::ForeignKeyViolation { .. }) => {
                return Err(OperationError::Conflict(ROLE_IN_USE.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        info!(role_id = %id, "Role deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, permissions: &[&str]) -> RoleForm {
        RoleForm {
            name: name.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_combines_permissions() {
        assert_eq!(
            form("Editor", &["read", "Write"]).parse(),
            Ok(Permissions::READ | Permissions::WRITE)
        );
        assert_eq!(form("Guest", &[]).parse(), Ok(Permissions::NONE));
    }

    #[test]
    fn test_parse_reports_unknown_permission() {
        let errors = form("Editor", &["Read", "Execute"]).parse().unwrap_err();
        assert_eq!(
            errors,
            vec![FieldError::new("permissions", "Unknown permission: Execute")]
        );
    }

    #[test]
    fn test_parse_collects_all_errors() {
        let errors = form("", &["Fly"]).parse().unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "permissions"]);
    }
}
