/// User directory: create, edit, list and delete users
///
/// A user always holds exactly one existing role. Edits overwrite name, email
/// and role, then replace the user's assigned tasks wholesale. Validation
/// failures hand the submitted form back with field errors and persist
/// nothing.

use serde::{Deserialize, Serialize};
use taskdesk_shared::error::StoreError;
use taskdesk_shared::models::assignment::UserWithRelations;
use taskdesk_shared::models::role::Role;
use taskdesk_shared::models::task::Task;
use taskdesk_shared::models::user::{CreateUser, UpdateUser, User};
use taskdesk_shared::store::{Gateway, Session};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::error::{field_errors, EditOutcome, FieldError, OperationError, OperationResult};

/// Longest user name accepted, in characters
pub const USER_NAME_MAX: usize = 100;

const EMAIL_CONSTRAINT: &str = "users_email_key";
const ROLE_REQUIRED: &str = "Role is required.";
const ROLE_MISSING: &str = "Selected role does not exist.";
const EMAIL_TAKEN: &str = "Email is already in use.";

/// Submitted user form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct UserForm {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,

    #[validate(
        email(message = "Invalid email format"),
        length(max = 200, message = "Email must be at most 200 characters")
    )]
    pub email: String,

    /// Role to hold; required
    pub role_id: Option<Uuid>,

    /// Tasks that should end up assigned to the user
    #[serde(default)]
    pub task_ids: Vec<Uuid>,
}

impl UserForm {
    fn trimmed(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.email = self.email.trim().to_string();
        self
    }
}

pub type UserOutcome = EditOutcome<UserWithRelations, UserForm>;

/// Single-user flows
#[derive(Debug, Clone)]
pub struct UserDirectory<G> {
    gateway: G,
}

impl<G: Gateway> UserDirectory<G> {
    pub fn new(gateway: G) -> Self {
        UserDirectory { gateway }
    }

    /// All users with their role and tasks
    pub async fn list(&self) -> OperationResult<Vec<UserWithRelations>> {
        let mut session = self.gateway.open().await?;
        let mut rows = Vec::new();
        for user in session.list_users().await? {
            rows.push(load_relations(&mut session, user).await?);
        }
        session.rollback().await?;
        Ok(rows)
    }

    /// One user with role and tasks
    pub async fn get(&self, id: Uuid) -> OperationResult<UserWithRelations> {
        let mut session = self.gateway.open().await?;
        let user = session
            .find_user(id)
            .await?
            .ok_or_else(|| OperationError::not_found("User", id))?;
        let row = load_relations(&mut session, user).await?;
        session.rollback().await?;
        Ok(row)
    }

    /// Creates a user
    pub async fn create(&self, form: UserForm) -> OperationResult<UserOutcome> {
        let form = form.trimmed();
        let mut session = self.gateway.open().await?;

        let role = match check_form(&mut session, &form).await? {
            Ok(role) => role,
            Err(errors) => return Ok(EditOutcome::invalid(form, errors)),
        };

        let created = session
            .insert_user(CreateUser {
                name: form.name.clone(),
                email: form.email.clone(),
                role_id: role.id,
            })
            .await;
        let user = match created {
            Ok(user) => user,
            Err(e) => return conflict_or_error(form, e),
        };

        let tasks = assign_tasks(&mut session, user.id, &form.task_ids).await?;
        if let Err(e) = session.commit().await {
            return conflict_or_error(form, e);
        }

        info!(user_id = %user.id, role = %role.name, "User created");
        Ok(EditOutcome::Saved(UserWithRelations { user, role, tasks }))
    }

    /// Overwrites a user's fields and replaces their tasks
    ///
    /// # Errors
    ///
    /// `NotFound` if the user doesn't exist
    pub async fn edit(&self, id: Uuid, form: UserForm) -> OperationResult<UserOutcome> {
        let form = form.trimmed();
        let mut session = self.gateway.open().await?;

        if session.find_user(id).await?.is_none() {
            return Err(OperationError::not_found("User", id));
        }

        let role = match check_form(&mut session, &form).await? {
            Ok(role) => role,
            Err(errors) => {
                debug!(user_id = %id, errors = errors.len(), "User edit rejected");
                return Ok(EditOutcome::invalid(form, errors));
            }
        };

        let updated = session
            .update_user(
                id,
                UpdateUser {
                    name: form.name.clone(),
                    email: form.email.clone(),
                    role_id: role.id,
                },
            )
            .await;
        let user = match updated {
            Ok(Some(user)) => user,
            Ok(None) => return Err(OperationError::not_found("User", id)),
            Err(e) => return conflict_or_error(form, e),
        };

        let tasks = assign_tasks(&mut session, id, &form.task_ids).await?;
        if let Err(e) = session.commit().await {
            return conflict_or_error(form, e);
        }

        info!(user_id = %id, tasks = tasks.len(), "User updated");
        Ok(EditOutcome::Saved(UserWithRelations { user, role, tasks }))
    }

    /// Deletes a user and their assignments
    pub async fn delete(&self, id: Uuid) -> OperationResult<()> {
        let mut session = self.gateway.open().await?;
        if !session.delete_user(id).await? {
            return Err(OperationError::not_found("User", id));
        }
        session.commit().await?;

        info!(user_id = %id, "User deleted");
        Ok(())
    }
}

/// Validates the form and resolves its role
///
/// The outer result carries store failures, the inner one field errors.
async fn check_form<S: Session>(
    session: &mut S,
    form: &UserForm,
) -> OperationResult<Result<Role, Vec<FieldError>>> {
    let mut errors = match form.validate() {
        Ok(()) => Vec::new(),
        Err(e) => field_errors(&e),
    };

    let role = match form.role_id {
        None => {
            errors.push(FieldError::new("role_id", ROLE_REQUIRED));
            None
        }
        Some(role_id) => {
            let role = session.find_role(role_id).await?;
            if role.is_none() {
                errors.push(FieldError::new("role_id", ROLE_MISSING));
            }
            role
        }
    };

    Ok(match role {
        Some(role) if errors.is_empty() => Ok(role),
        _ => Err(errors),
    })
}

fn conflict_or_error(form: UserForm, err: StoreError) -> OperationResult<UserOutcome> {
    match err.constraint() {
        Some(EMAIL_CONSTRAINT) => Ok(EditOutcome::invalid(
            form,
            vec![FieldError::new("email", EMAIL_TAKEN)],
        )),
        // The role was deleted between the lookup and the write
        Some("users_role_id_fkey") => Ok(EditOutcome::invalid(
            form,
            vec![FieldError::new("role_id", ROLE_MISSING)],
        )),
        _ => Err(err.into()),
    }
}

async fn load_relations<S: Session>(session: &mut S, user: User) -> OperationResult<UserWithRelations> {
    let role = session
        .find_role(user.role_id)
        .await?
        .ok_or_else(|| OperationError::not_found("Role", user.role_id))?;
    let tasks = session.tasks_for_user(user.id).await?;
    Ok(UserWithRelations { user, role, tasks })
}

/// Replaces the user's tasks with the ones in `task_ids` that exist
async fn assign_tasks<S: Session>(
    session: &mut S,
    user_id: Uuid,
    task_ids: &[Uuid],
) -> OperationResult<Vec<Task>> {
    let tasks = session.find_tasks_by_ids(task_ids).await?;
    let ids: Vec<Uuid> = tasks.iter().map(|task| task.id).collect();
    session.replace_user_tasks(user_id, &ids).await?;
    Ok(tasks)
}
