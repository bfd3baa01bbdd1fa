/// Error handling for engine operations
///
/// Every flow returns `OperationResult<T>`. Failures that a caller can act on
/// (missing rows, bad input, cancellation, a rejected assignment batch) are
/// distinct variants; anything else surfaces as `Store`.
///
/// Form-based flows (create/edit of users, tasks and roles) report input
/// problems through [`EditOutcome::Invalid`] instead of an error, so the
/// caller gets the submitted form back alongside the field errors.
///
/// # Example
///
/// ```
/// use taskdesk_engine::error::{FieldError, OperationError};
///
/// let err = OperationError::Validation(vec![FieldError::new(
///     "task_names",
///     "No valid task names provided.",
/// )]);
/// assert_eq!(err.to_string(), "No valid task names provided.");
/// ```

use serde::{Deserialize, Serialize};
use taskdesk_shared::error::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Engine result type alias
pub type OperationResult<T> = Result<T, OperationError>;

/// Unified engine error type
#[derive(Debug, Error)]
pub enum OperationError {
    /// The addressed entity doesn't exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Input rejected before anything was written
    #[error("{}", summarize(.0))]
    Validation(Vec<FieldError>),

    /// The write would break a relationship (e.g. deleting a role in use)
    #[error("{0}")]
    Conflict(String),

    /// Bulk task creation was cancelled; `committed` tasks were already persisted
    #[error("Task creation was cancelled.")]
    Cancelled { committed: usize },

    /// The assignment submission was rolled back as a whole
    #[error("An error occurred while assigning users: {0}")]
    AssignmentFailed(String),

    /// Unclassified persistence failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OperationError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        OperationError::NotFound { entity, id }
    }

    /// Shorthand for a single-field validation error
    pub fn invalid(field: &str, message: &str) -> Self {
        OperationError::Validation(vec![FieldError::new(field, message)])
    }
}

fn summarize(errors: &[FieldError]) -> String {
    match errors {
        [] => "Validation failed".to_string(),
        [only] => only.message.clone(),
        [first, rest @ ..] => format!("{} (and {} more)", first.message, rest.len()),
    }
}

/// Field-level input error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        FieldError {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Flattens `validator` errors into field errors
///
/// Errors are ordered by field name so results are stable.
pub fn field_errors(errors: &validator::ValidationErrors) -> Vec<FieldError> {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|(a, _), (b, _)| a.cmp(b));

    fields
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| FieldError {
                field: field.to_string(),
                message: error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "Validation failed".to_string()),
            })
        })
        .collect()
}

/// Result of a form-based create or edit
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome<T, F> {
    /// The entity was persisted
    Saved(T),

    /// Nothing was persisted; the submitted form is handed back with its errors
    Invalid { form: F, errors: Vec<FieldError> },
}

impl<T, F> EditOutcome<T, F> {
    pub fn invalid(form: F, errors: Vec<FieldError>) -> Self {
        EditOutcome::Invalid { form, errors }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, EditOutcome::Saved(_))
    }

    /// The saved entity, if any
    pub fn saved(self) -> Option<T> {
        match self {
            EditOutcome::Saved(value) => Some(value),
            EditOutcome::Invalid { .. } => None,
        }
    }

    /// Field errors of an invalid outcome; empty when saved
    pub fn errors(&self) -> &[FieldError] {
        match self {
            EditOutcome::Saved(_) => &[],
            EditOutcome::Invalid { errors, .. } => errors,
        }
    }
}
