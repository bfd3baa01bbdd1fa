/// Task directory: create, edit, list and delete single tasks
///
/// Edits overwrite the name and replace the task's assigned users wholesale.
/// Task names are unique ignoring case; the flows check this up front and
/// map a constraint violation raised by a concurrent writer to the same
/// field error.

use serde::{Deserialize, Serialize};
use taskdesk_shared::error::StoreError;
use taskdesk_shared::models::assignment::TaskWithUsers;
use taskdesk_shared::models::task::TASK_NAME_CONSTRAINT;
use taskdesk_shared::models::user::User;
use taskdesk_shared::store::{Gateway, Session};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::error::{field_errors, EditOutcome, FieldError, OperationError, OperationResult};

/// Longest task name accepted, in characters
pub const TASK_NAME_MAX: usize = 150;

const NAME_REQUIRED: &str = "Task name is required.";
const NAME_TAKEN: &str = "Task with this name already exists.";

/// Submitted task form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct TaskForm {
    #[validate(length(min = 1, max = 150, message = "Task name must be between 1 and 150 characters"))]
    pub name: String,

    /// Users that should end up assigned to the task
    #[serde(default)]
    pub user_ids: Vec<Uuid>,
}

impl TaskForm {
    pub fn named(name: &str) -> Self {
        TaskForm {
            name: name.to_string(),
            user_ids: Vec::new(),
        }
    }

    fn check(&self) -> Vec<FieldError> {
        if self.name.trim().is_empty() {
            return vec![FieldError::new("name", NAME_REQUIRED)];
        }
        match self.validate() {
            Ok(()) => Vec::new(),
            Err(e) => field_errors(&e),
        }
    }
}

pub type TaskOutcome = EditOutcome<TaskWithUsers, TaskForm>;

fn name_taken(form: TaskForm) -> TaskOutcome {
    EditOutcome::invalid(form, vec![FieldError::new("name", NAME_TAKEN)])
}

/// Single-task flows
#[derive(Debug, Clone)]
pub struct TaskDirectory<G> {
    gateway: G,
}

impl<G: Gateway> TaskDirectory<G> {
    pub fn new(gateway: G) -> Self {
        TaskDirectory { gateway }
    }

    /// All tasks with their assigned users
    pub async fn list(&self) -> OperationResult<Vec<TaskWithUsers>> {
        let mut session = self.gateway.open().await?;
        let mut rows = Vec::new();
        for task in session.list_tasks().await? {
            let users = session.users_for_task(task.id).await?;
            rows.push(TaskWithUsers { task, users });
        }
        session.rollback().await?;
        Ok(rows)
    }

    /// One task with its assigned users
    pub async fn get(&self, id: Uuid) -> OperationResult<TaskWithUsers> {
        let mut session = self.gateway.open().await?;
        let task = session
            .find_task(id)
            .await?
            .ok_or_else(|| OperationError::not_found("Task", id))?;
        let users = session.users_for_task(id).await?;
        session.rollback().await?;
        Ok(TaskWithUsers { task, users })
    }

    /// Creates a task, optionally with assigned users
    pub async fn create(&self, mut form: TaskForm) -> OperationResult<TaskOutcome> {
        form.name = form.name.trim().to_string();
        let errors = form.check();
        if !errors.is_empty() {
            return Ok(EditOutcome::invalid(form, errors));
        }

        let mut session = self.gateway.open().await?;
        if name_in_use(&mut session, &form.name, None).await? {
            return Ok(name_taken(form));
        }

        let task = match session.insert_tasks(&[form.name.clone()]).await {
            Ok(mut created) if !created.is_empty() => created.remove(0),
            Ok(_) => return Ok(name_taken(form)),
            Err(e) if e.is_unique_violation_of(TASK_NAME_CONSTRAINT) => return Ok(name_taken(form)),
            Err(e) => return Err(e.into()),
        };

        let users = assign_users(&mut session, task.id, &form.user_ids).await?;
        if !commit(session).await? {
            return Ok(name_taken(form));
        }

        info!(task_id = %task.id, name = %task.name, "Task created");
        Ok(EditOutcome::Saved(TaskWithUsers { task, users }))
    }

    /// Renames a task and replaces its assigned users
    ///
    /// # Errors
    ///
    /// `NotFound` if the task doesn't exist
    pub async fn edit(&self, id: Uuid, mut form: TaskForm) -> OperationResult<TaskOutcome> {
        let mut session = self.gateway.open().await?;
        if session.find_task(id).await?.is_none() {
            return Err(OperationError::not_found("Task", id));
        }

        form.name = form.name.trim().to_string();
        let errors = form.check();
        if !errors.is_empty() {
            return Ok(EditOutcome::invalid(form, errors));
        }

        if name_in_use(&mut session, &form.name, Some(id)).await? {
            return Ok(name_taken(form));
        }

        let task = match session.rename_task(id, &form.name).await {
            Ok(Some(task)) => task,
            Ok(None) => return Err(OperationError::not_found("Task", id)),
            Err(e) if e.is_unique_violation_of(TASK_NAME_CONSTRAINT) => return Ok(name_taken(form)),
            Err(e) => return Err(e.into()),
        };

        let users = assign_users(&mut session, id, &form.user_ids).await?;
        if !commit(session).await? {
            return Ok(name_taken(form));
        }

        info!(task_id = %id, users = users.len(), "Task updated");
        Ok(EditOutcome::Saved(TaskWithUsers { task, users }))
    }

    /// Deletes a task and its assignments
    pub async fn delete(&self, id: Uuid) -> OperationResult<()> {
        let mut session = self.gateway.open().await?;
        if !session.delete_task(id).await? {
            return Err(OperationError::not_found("Task", id));
        }
        session.commit().await?;

        info!(task_id = %id, "Task deleted");
        Ok(())
    }
}

/// Case-insensitive name check, ignoring the task being edited
async fn name_in_use<S: Session>(
    session: &mut S,
    name: &str,
    except: Option<Uuid>,
) -> OperationResult<bool> {
    let lowered = name.to_lowercase();
    let tasks = session.list_tasks().await?;
    Ok(tasks
        .iter()
        .any(|task| Some(task.id) != except && task.name.to_lowercase() == lowered))
}

/// Replaces the task's users with the ones in `user_ids` that exist
async fn assign_users<S: Session>(
    session: &mut S,
    task_id: Uuid,
    user_ids: &[Uuid],
) -> OperationResult<Vec<User>> {
    let users = session.find_users_by_ids(user_ids).await?;
    let ids: Vec<Uuid> = users.iter().map(|user| user.id).collect();
    session.replace_task_users(task_id, &ids).await?;
    Ok(users)
}

/// Commits; Ok(false) when a concurrent writer took the name first
async fn commit<S: Session>(session: S) -> OperationResult<bool> {
    match session.commit().await {
        Ok(()) => Ok(true),
        Err(StoreError::UniqueViolation { constraint }) if constraint == TASK_NAME_CONSTRAINT => {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
