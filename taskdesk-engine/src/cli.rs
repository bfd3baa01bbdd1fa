/// Command-line interface
///
/// Argument definitions plus [`execute`], which runs one command against any
/// gateway and renders the result as JSON. Commands that take a list or a
/// form read JSON (or, for `bulk-create`, plain lines) from stdin.

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use taskdesk_shared::store::Gateway;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::assign::{AssignmentEngine, TaskAssignment};
use crate::bulk_create::{BulkCreateOutcome, BulkTaskCreator, ALL_EXIST_MESSAGE};
use crate::config::EngineConfig;
use crate::error::{EditOutcome, OperationError};
use crate::roles::{RoleDirectory, RoleForm};
use crate::seed::seed;
use crate::tasks::{TaskDirectory, TaskForm};
use crate::transaction::{rename_task_and_user, RenameBoth};
use crate::users::{UserDirectory, UserForm};

#[derive(Parser, Debug)]
#[command(name = "taskdesk", about = "User, role and task assignment management", version)]
pub struct Cli {
    /// PostgreSQL connection URL
    #[arg(long, env = "TASKDESK_DATABASE__URL", global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Create the database if needed and apply pending migrations
    Migrate,

    /// Insert the default roles and tasks
    Seed,

    /// Create tasks from newline-separated names on stdin
    #[command(name = "bulk-create")]
    BulkCreate,

    /// Replace task assignments from a JSON list on stdin
    ///
    /// Format: [{"task_id": "...", "user_ids": ["..."]}]
    Assign,

    /// Show tasks, users and current assignments
    Board,

    /// List users with their role and tasks
    Users,

    /// List tasks with their users
    Tasks,

    /// List roles
    Roles,

    /// Create a task
    #[command(name = "add-task")]
    AddTask {
        /// Task name
        name: String,
        /// User to assign (repeatable)
        #[arg(long = "user")]
        user_ids: Vec<Uuid>,
    },

    /// Create a user
    #[command(name = "add-user")]
    AddUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Role ID
        #[arg(long = "role")]
        role_id: Option<Uuid>,
        /// Task to assign (repeatable)
        #[arg(long = "task")]
        task_ids: Vec<Uuid>,
    },

    /// Create a role
    #[command(name = "add-role")]
    AddRole {
        /// Role name
        name: String,
        /// Permission name: Read, Write or Delete (repeatable)
        #[arg(long = "permission")]
        permissions: Vec<String>,
    },

    /// Edit a task from a JSON form on stdin
    #[command(name = "edit-task")]
    EditTask { id: Uuid },

    /// Edit a user from a JSON form on stdin
    #[command(name = "edit-user")]
    EditUser { id: Uuid },

    /// Edit a role from a JSON form on stdin
    #[command(name = "edit-role")]
    EditRole { id: Uuid },

    /// Delete a task
    #[command(name = "delete-task")]
    DeleteTask { id: Uuid },

    /// Delete a user
    #[command(name = "delete-user")]
    DeleteUser { id: Uuid },

    /// Delete a role no user holds
    #[command(name = "delete-role")]
    DeleteRole { id: Uuid },

    /// Rename a task and a user in one transaction
    Rename {
        #[arg(long)]
        task: Uuid,
        #[arg(long)]
        task_name: String,
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        user_name: String,
    },
}

impl Command {
    /// Whether the command consumes stdin
    pub fn reads_stdin(&self) -> bool {
        matches!(
            self,
            Command::BulkCreate
                | Command::Assign
                | Command::EditTask { .. }
                | Command::EditUser { .. }
                | Command::EditRole { .. }
        )
    }
}

/// Rendered command result
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    /// JSON printed to stdout
    pub body: Value,

    /// False when the command was rejected (invalid input, not found, ...)
    pub success: bool,
}

impl CommandOutput {
    fn ok<T: Serialize>(value: &T) -> anyhow::Result<Self> {
        Ok(CommandOutput {
            body: serde_json::to_value(value)?,
            success: true,
        })
    }

    fn rejected(body: Value) -> Self {
        CommandOutput {
            body,
            success: false,
        }
    }
}

fn edit_output<T: Serialize, F: Serialize>(outcome: EditOutcome<T, F>) -> anyhow::Result<CommandOutput> {
    match outcome {
        EditOutcome::Saved(value) => CommandOutput::ok(&value),
        EditOutcome::Invalid { form, errors } => Ok(CommandOutput::rejected(json!({
            "error": "validation_error",
            "form": form,
            "errors": errors,
        }))),
    }
}

/// Maps caller-facing failures to a rejected output; store failures propagate
fn rejection(err: OperationError) -> anyhow::Result<CommandOutput> {
    let code = match &err {
        OperationError::NotFound { .. } => "not_found",
        OperationError::Validation(_) => "validation_error",
        OperationError::Conflict(_) => "conflict",
        OperationError::Cancelled { .. } => "cancelled",
        OperationError::AssignmentFailed(_) => "assignment_failed",
        OperationError::Store(_) => return Err(err.into()),
    };

    let mut body = json!({ "error": code, "message": err.to_string() });
    match &err {
        OperationError::Validation(errors) => body["errors"] = serde_json::to_value(errors)?,
        OperationError::Cancelled { committed } => body["committed"] = json!(committed),
        _ => {}
    }
    Ok(CommandOutput::rejected(body))
}

/// Runs a command that works through the gateway
///
/// `Migrate` needs the raw pool and is handled by the binary.
pub async fn execute<G: Gateway>(
    command: Command,
    gateway: G,
    config: &EngineConfig,
    input: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<CommandOutput> {
    let result = run(command, gateway, config, input, cancel).await;
    match result {
        Ok(output) => Ok(output),
        Err(Failure::Operation(err)) => rejection(err),
        Err(Failure::Other(err)) => Err(err),
    }
}

enum Failure {
    Operation(OperationError),
    Other(anyhow::Error),
}

impl From<OperationError> for Failure {
    fn from(err: OperationError) -> Self {
        Failure::Operation(err)
    }
}

impl From<anyhow::Error> for Failure {
    fn from(err: anyhow::Error) -> Self {
        Failure::Other(err)
    }
}

impl From<serde_json::Error> for Failure {
    fn from(err: serde_json::Error) -> Self {
        Failure::Other(err.into())
    }
}

async fn run<G: Gateway>(
    command: Command,
    gateway: G,
    config: &EngineConfig,
    input: &str,
    cancel: &CancellationToken,
) -> Result<CommandOutput, Failure> {
    let output = match command {
        Command::Migrate => {
            return Err(Failure::Other(anyhow::anyhow!(
                "migrate runs against the database pool directly"
            )));
        }
        Command::Seed => CommandOutput::ok(&seed(&gateway).await?)?,
        Command::BulkCreate => {
            let creator = BulkTaskCreator::new(gateway, config.bulk.parallelism());
            match creator.create(input, cancel).await? {
                BulkCreateOutcome::Created(report) => CommandOutput::ok(&report)?,
                BulkCreateOutcome::NothingToDo => CommandOutput::ok(&json!({
                    "created": [],
                    "message": ALL_EXIST_MESSAGE,
                }))?,
            }
        }
        Command::Assign => {
            let assignments: Vec<TaskAssignment> = serde_json::from_str(input)?;
            let report = AssignmentEngine::new(gateway).assign(&assignments).await?;
            CommandOutput::ok(&report)?
        }
        Command::Board => CommandOutput::ok(&AssignmentEngine::new(gateway).board().await?)?,
        Command::Users => CommandOutput::ok(&UserDirectory::new(gateway).list().await?)?,
        Command::Tasks => CommandOutput::ok(&TaskDirectory::new(gateway).list().await?)?,
        Command::Roles => CommandOutput::ok(&RoleDirectory::new(gateway).list().await?)?,
        Command::AddTask { name, user_ids } => {
            let form = TaskForm { name, user_ids };
            edit_output(TaskDirectory::new(gateway).create(form).await?)?
        }
        Command::AddUser {
            name,
            email,
            role_id,
            task_ids,
        } => {
            let form = UserForm {
                name,
                email,
                role_id,
                task_ids,
            };
            edit_output(UserDirectory::new(gateway).create(form).await?)?
        }
        Command::AddRole { name, permissions } => {
            let form = RoleForm { name, permissions };
            edit_output(RoleDirectory::new(gateway).create(form).await?)?
        }
        Command::EditTask { id } => {
            let form: TaskForm = serde_json::from_str(input)?;
            edit_output(TaskDirectory::new(gateway).edit(id, form).await?)?
        }
        Command::EditUser { id } => {
            let form: UserForm = serde_json::from_str(input)?;
            edit_output(UserDirectory::new(gateway).edit(id, form).await?)?
        }
        Command::EditRole { id } => {
            let form: RoleForm = serde_json::from_str(input)?;
            edit_output(RoleDirectory::new(gateway).edit(id, form).await?)?
        }
        Command::DeleteTask { id } => {
            TaskDirectory::new(gateway).delete(id).await?;
            CommandOutput::ok(&json!({ "deleted": id }))?
        }
        Command::DeleteUser { id } => {
            UserDirectory::new(gateway).delete(id).await?;
            CommandOutput::ok(&json!({ "deleted": id }))?
        }
        Command::DeleteRole { id } => {
            RoleDirectory::new(gateway).delete(id).await?;
            CommandOutput::ok(&json!({ "deleted": id }))?
        }
        Command::Rename {
            task,
            task_name,
            user,
            user_name,
        } => {
            let request = RenameBoth {
                task_id: task,
                task_name,
                user_id: user,
                user_name,
            };
            let (task, user) = rename_task_and_user(&gateway, request).await?;
            CommandOutput::ok(&json!({ "task": task, "user": user }))?
        }
    };

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_role() {
        let cli = Cli::parse_from([
            "taskdesk",
            "add-role",
            "Editor",
            "--permission",
            "Read",
            "--permission",
            "Write",
        ]);
        assert_eq!(
            cli.command,
            Command::AddRole {
                name: "Editor".to_string(),
                permissions: vec!["Read".to_string(), "Write".to_string()],
            }
        );
        assert!(!cli.command.reads_stdin());
    }

    #[test]
    fn test_stdin_commands() {
        let cli = Cli::parse_from(["taskdesk", "bulk-create"]);
        assert!(cli.command.reads_stdin());

        let id = Uuid::new_v4().to_string();
        let cli = Cli::parse_from(["taskdesk", "edit-user", id.as_str()]);
        assert!(cli.command.reads_stdin());
    }
}
