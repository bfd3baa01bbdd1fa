/// Bulk assignment of users to tasks
///
/// A submission is a list of `(task, desired users)` pairs. Each task's user
/// set is replaced by the desired one. The whole submission shares one
/// session and one commit: either every pair is applied or none is.
///
/// # Rules
///
/// - Pairs are staged in input order
/// - A pair naming a task that doesn't exist is skipped
/// - Unknown user IDs are dropped; duplicates collapse
/// - Any failure rolls back the submission and is reported as a single
///   `AssignmentFailed` error; callers retry the whole submission
///
/// # Example
///
/// ```no_run
/// use taskdesk_engine::assign::{AssignmentEngine, TaskAssignment};
/// use taskdesk_shared::store::MemoryGateway;
///
/// # async fn example(task_id: uuid::Uuid, user_id: uuid::Uuid)
/// #     -> Result<(), taskdesk_engine::error::OperationError> {
/// let engine = AssignmentEngine::new(MemoryGateway::new());
///
/// let report = engine
///     .assign(&[TaskAssignment { task_id, user_ids: vec![user_id] }])
///     .await?;
/// println!("{} tasks updated", report.applied.len());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use taskdesk_shared::error::StoreResult;
use taskdesk_shared::models::assignment::TaskWithUsers;
use taskdesk_shared::models::user::User;
use taskdesk_shared::store::{Gateway, Session};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{OperationError, OperationResult};

/// Desired user set for one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task_id: Uuid,

    #[serde(default)]
    pub user_ids: Vec<Uuid>,
}

/// Outcome of a committed submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssignmentReport {
    /// Pairs that were applied, with the user set the task ended up with
    pub applied: Vec<TaskAssignment>,

    /// Task IDs that didn't exist
    pub skipped: Vec<Uuid>,
}

/// Everything needed to render the assignment form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentBoard {
    /// Tasks with their current users
    pub tasks: Vec<TaskWithUsers>,

    /// Every user that can be assigned
    pub users: Vec<User>,

    /// Current assignments, one per task, pre-filling the form
    pub assignments: Vec<TaskAssignment>,
}

/// Replaces task↔user assignments in bulk
#[derive(Debug, Clone)]
pub struct AssignmentEngine<G> {
    gateway: G,
}

impl<G: Gateway> AssignmentEngine<G> {
    pub fn new(gateway: G) -> Self {
        AssignmentEngine { gateway }
    }

    /// Loads tasks, users and the current assignments
    pub async fn board(&self) -> OperationResult<AssignmentBoard> {
        let mut session = self.gateway.open().await?;

        let mut tasks = Vec::new();
        for task in session.list_tasks().await? {
            let users = session.users_for_task(task.id).await?;
            tasks.push(TaskWithUsers { task, users });
        }
        let users = session.list_users().await?;
        session.rollback().await?;

        let assignments = tasks
            .iter()
            .map(|entry| TaskAssignment {
                task_id: entry.task.id,
                user_ids: entry.user_ids(),
            })
            .collect();

        Ok(AssignmentBoard {
            tasks,
            users,
            assignments,
        })
    }

    /// Applies a submission atomically
    ///
    /// # Errors
    ///
    /// - `Validation` if `assignments` is empty
    /// - `AssignmentFailed` if staging or commit fails; nothing is persisted
    pub async fn assign(&self, assignments: &[TaskAssignment]) -> OperationResult<AssignmentReport> {
        if assignments.is_empty() {
            return Err(OperationError::invalid(
                "assignments",
                "No assignments provided.",
            ));
        }

        info!(pairs = assignments.len(), "Assigning users to tasks");

        let mut session = self.gateway.open().await.map_err(failed)?;

        let report = match stage(&mut session, assignments).await {
            Ok(report) => report,
            Err(e) => {
                if let Err(rollback_err) = session.rollback().await {
                    error!(error = %rollback_err, "Rollback after failed assignment failed");
                }
                return Err(failed(e));
            }
        };

        session.commit().await.map_err(failed)?;

        info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "Assignments committed"
        );
        Ok(report)
    }
}

fn failed(err: impl std::fmt::Display) -> OperationError {
    error!(error = %err, "Assignment submission failed");
    OperationError::AssignmentFailed(err.to_string())
}

async fn stage<S: Session>(
    session: &mut S,
    assignments: &[TaskAssignment],
) -> StoreResult<AssignmentReport> {
    let mut report = AssignmentReport::default();

    for pair in assignments {
        if session.find_task(pair.task_id).await?.is_none() {
            debug!(task_id = %pair.task_id, "Skipping unknown task");
            report.skipped.push(pair.task_id);
            continue;
        }

        let user_ids: Vec<Uuid> = session
            .find_users_by_ids(&pair.user_ids)
            .await?
            .into_iter()
            .map(|user| user.id)
            .collect();

        session.replace_task_users(pair.task_id, &user_ids).await?;
        debug!(task_id = %pair.task_id, users = user_ids.len(), "Staged assignment");

        report.applied.push(TaskAssignment {
            task_id: pair.task_id,
            user_ids,
        });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_defaults_to_no_users() {
        let id = Uuid::new_v4();
        let pair: TaskAssignment =
            serde_json::from_str(&format!(r#"{{ "task_id": "{}" }}"#, id)).unwrap();
        assert_eq!(pair.task_id, id);
        assert!(pair.user_ids.is_empty());
    }

    #[tokio::test]
    async fn test_empty_submission_is_rejected() {
        let engine = AssignmentEngine::new(taskdesk_shared::store::MemoryGateway::new());
        let err = engine.assign(&[]).await.unwrap_err();
        assert_eq!(err.to_string(), "No assignments provided.");
    }
}
