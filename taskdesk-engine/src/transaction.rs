/// Transactional multi-entity update
///
/// Renames one task and one user inside a single session. Both renames
/// commit together; if either entity is missing or any write fails, the
/// session is rolled back explicitly and the error is returned to the caller
/// unchanged.
///
/// # Example
///
/// ```no_run
/// use taskdesk_engine::transaction::{rename_task_and_user, RenameBoth};
/// use taskdesk_shared::store::MemoryGateway;
///
/// # async fn example(task_id: uuid::Uuid, user_id: uuid::Uuid)
/// #     -> Result<(), taskdesk_engine::error::OperationError> {
/// let gateway = MemoryGateway::new();
/// let (task, user) = rename_task_and_user(
///     &gateway,
///     RenameBoth {
///         task_id,
///         task_name: "Updated Task".to_string(),
///         user_id,
///         user_name: "Updated User".to_string(),
///     },
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use taskdesk_shared::models::task::Task;
use taskdesk_shared::models::user::User;
use taskdesk_shared::store::{Gateway, Session};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{FieldError, OperationError, OperationResult};
use crate::tasks::TASK_NAME_MAX;
use crate::users::USER_NAME_MAX;

/// The two renames applied together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameBoth {
    pub task_id: Uuid,
    pub task_name: String,
    pub user_id: Uuid,
    pub user_name: String,
}

impl RenameBoth {
    /// Trims both names and checks their bounds
    fn checked(mut self) -> OperationResult<Self> {
        self.task_name = self.task_name.trim().to_string();
        self.user_name = self.user_name.trim().to_string();

        let mut errors = Vec::new();
        if let Some(message) = name_error(&self.task_name, "Task name", TASK_NAME_MAX) {
            errors.push(FieldError::new("task_name", &message));
        }
        if let Some(message) = name_error(&self.user_name, "Name", USER_NAME_MAX) {
            errors.push(FieldError::new("user_name", &message));
        }

        if errors.is_empty() {
            Ok(self)
        } else {
            Err(OperationError::Validation(errors))
        }
    }
}

fn name_error(name: &str, label: &str, max: usize) -> Option<String> {
    if name.is_empty() {
        Some(format!("{} is required.", label))
    } else if name.chars().count() > max {
        Some(format!("{} must be between 1 and {} characters", label, max))
    } else {
        None
    }
}

/// Renames a task and a user atomically
///
/// # Errors
///
/// - `Validation` for a blank or over-long name; nothing is opened or written
/// - `NotFound` for a missing task or user
/// - `Store` for any persistence failure, including the commit
pub async fn rename_task_and_user<G: Gateway>(
    gateway: &G,
    request: RenameBoth,
) -> OperationResult<(Task, User)> {
    let request = request.checked()?;
    let mut session = gateway.open().await?;

    match apply(&mut session, &request).await {
        Ok(renamed) => {
            session.commit().await?;
            info!(
                task_id = %request.task_id,
                user_id = %request.user_id,
                "Task and user renamed"
            );
            Ok(renamed)
        }
        Err(e) => {
            warn!(error = %e, "Rolling back task and user rename");
            if let Err(rollback_err) = session.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(e)
        }
    }
}

async fn apply<S: Session>(session: &mut S, request: &RenameBoth) -> OperationResult<(Task, User)> {
    let task = session
        .rename_task(request.task_id, &request.task_name)
        .await?
        .ok_or_else(|| OperationError::not_found("Task", request.task_id))?;

    let user = session
        .rename_user(request.user_id, &request.user_name)
        .await?
        .ok_or_else(|| OperationError::not_found("User", request.user_id))?;

    Ok((task, user))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(task_name: &str, user_name: &str) -> RenameBoth {
        RenameBoth {
            task_id: Uuid::new_v4(),
            task_name: task_name.to_string(),
            user_id: Uuid::new_v4(),
            user_name: user_name.to_string(),
        }
    }

    #[test]
    fn test_checked_trims_names() {
        let checked = request("  Review ", " Ada ").checked().unwrap();
        assert_eq!(checked.task_name, "Review");
        assert_eq!(checked.user_name, "Ada");
    }

    #[test]
    fn test_checked_enforces_bounds() {
        assert!(request(&"x".repeat(TASK_NAME_MAX), &"y".repeat(USER_NAME_MAX))
            .checked()
            .is_ok());

        match request(&"x".repeat(TASK_NAME_MAX + 1), "   ").checked() {
            Err(OperationError::Validation(errors)) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["task_name", "user_name"]);
                assert_eq!(errors[1].message, "Name is required.");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
