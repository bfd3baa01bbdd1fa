/// Bulk task creation
///
/// Turns a newline-delimited block of names into new tasks:
///
/// ```text
/// input ──> normalize ──> dedup (ignore case) ──> drop existing names
///                                                        │
///                        ┌──────────── partition ────────┘
///                        ▼
///          batch 0 │ batch 1 │ ... │ batch P-1     (one session each, spawned)
///                        │
///                        ▼
///                 BulkCreateReport
/// ```
///
/// # Concurrency
///
/// Batches run concurrently on their own Tokio tasks and commit
/// independently, in no particular order. A failed batch doesn't affect the
/// others.
///
/// # Cancellation
///
/// The token is checked before any batch is submitted, between submissions,
/// inside each batch right before commit, and while waiting for batches to
/// finish. On cancellation unfinished batches are aborted and the caller
/// receives [`OperationError::Cancelled`] with the number of tasks already
/// committed. Committed batches stay committed.
///
/// `committed` is a lower bound: a batch aborted while its commit was in
/// flight may still have been applied by the store without being counted.
///
/// # Example
///
/// ```no_run
/// use taskdesk_engine::bulk_create::{BulkCreateOutcome, BulkTaskCreator};
/// use taskdesk_shared::store::MemoryGateway;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), taskdesk_engine::error::OperationError> {
/// let creator = BulkTaskCreator::new(MemoryGateway::new(), 4);
/// let outcome = creator
///     .create("Work\r\nwork\r\nEat", &CancellationToken::new())
///     .await?;
///
/// if let BulkCreateOutcome::Created(report) = outcome {
///     assert_eq!(report.created.len(), 2);
/// }
/// # Ok(())
/// # }
/// ```

use std::collections::HashSet;

use serde::Serialize;
use taskdesk_shared::error::StoreError;
use taskdesk_shared::models::task::Task;
use taskdesk_shared::store::{Gateway, Session};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{FieldError, OperationError, OperationResult};
use crate::tasks::TASK_NAME_MAX;

/// Message reported when every submitted name already exists
pub const ALL_EXIST_MESSAGE: &str = "All provided task names already exist.";

/// Result of a bulk creation that ran to completion
#[derive(Debug, Clone, PartialEq)]
pub enum BulkCreateOutcome {
    /// At least one batch was submitted
    Created(BulkCreateReport),

    /// Every name already existed; nothing was written
    NothingToDo,
}

impl BulkCreateOutcome {
    /// Tasks written by this run
    pub fn created(&self) -> &[Task] {
        match self {
            BulkCreateOutcome::Created(report) => &report.created,
            BulkCreateOutcome::NothingToDo => &[],
        }
    }
}

/// Per-run summary
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkCreateReport {
    /// Tasks committed, in batch completion order
    pub created: Vec<Task>,

    /// Batches that failed to commit
    pub failed: Vec<FailedBatch>,
}

/// A batch whose session failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedBatch {
    /// Position of the batch in the partition; None if its task panicked
    pub index: Option<usize>,

    /// Names the batch tried to create
    pub names: Vec<String>,

    /// Error message
    pub message: String,
}

/// Splits a block on line breaks, trims, and drops empty lines
pub fn normalize_names(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == '\r' || c == '\n')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// One field error per name longer than [`TASK_NAME_MAX`] characters
pub fn oversized_names(names: &[String]) -> Vec<FieldError> {
    names
        .iter()
        .filter(|name| name.chars().count() > TASK_NAME_MAX)
        .map(|name| {
            let preview: String = name.chars().take(20).collect();
            FieldError::new(
                "task_names",
                &format!(
                    "Task name must be at most {} characters: {}...",
                    TASK_NAME_MAX, preview
                ),
            )
        })
        .collect()
}

/// Drops names equal (ignoring case) to an earlier name or to an existing one
///
/// Input order is kept and the first spelling wins.
pub fn filter_new_names<I, S>(names: Vec<String>, existing: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: HashSet<String> = existing
        .into_iter()
        .map(|name| name.as_ref().to_lowercase())
        .collect();

    names
        .into_iter()
        .filter(|name| seen.insert(name.to_lowercase()))
        .collect()
}

/// Batch size for `count` names spread over `parallelism` batches
///
/// `count / parallelism + 1`, so there are never more than `parallelism` batches.
pub fn batch_size(count: usize, parallelism: usize) -> usize {
    count / parallelism.max(1) + 1
}

/// Splits names into consecutive batches of [`batch_size`]
pub fn partition(names: &[String], parallelism: usize) -> Vec<Vec<String>> {
    names
        .chunks(batch_size(names.len(), parallelism))
        .map(<[String]>::to_vec)
        .collect()
}

enum BatchError {
    Cancelled,
    Store(StoreError),
}

impl From<StoreError> for BatchError {
    fn from(err: StoreError) -> Self {
        BatchError::Store(err)
    }
}

/// Creates tasks from a block of names in parallel batches
#[derive(Debug, Clone)]
pub struct BulkTaskCreator<G> {
    gateway: G,
    parallelism: usize,
}

impl<G: Gateway> BulkTaskCreator<G> {
    /// Creates a creator splitting work into at most `parallelism` batches
    pub fn new(gateway: G, parallelism: usize) -> Self {
        BulkTaskCreator {
            gateway,
            parallelism: parallelism.max(1),
        }
    }

    /// Creates the tasks named in `input`
    ///
    /// # Errors
    ///
    /// - `Validation` if no non-empty line remains after normalization, or if
    ///   any line is longer than [`TASK_NAME_MAX`]; nothing is written
    /// - `Cancelled` if the token fires before every batch finished
    /// - `Store` if existing names can't be read
    pub async fn create(
        &self,
        input: &str,
        cancel: &CancellationToken,
    ) -> OperationResult<BulkCreateOutcome> {
        let names = normalize_names(input);
        if names.is_empty() {
            return Err(OperationError::invalid(
                "task_names",
                "No valid task names provided.",
            ));
        }

        let oversized = oversized_names(&names);
        if !oversized.is_empty() {
            warn!(count = oversized.len(), "Rejecting oversized task names");
            return Err(OperationError::Validation(oversized));
        }

        if cancel.is_cancelled() {
            return Err(OperationError::Cancelled { committed: 0 });
        }

        let existing = {
            let mut session = self.gateway.open().await?;
            let names = session.task_names().await?;
            session.rollback().await?;
            names
        };

        let submitted = names.len();
        let names = filter_new_names(names, existing);
        if names.is_empty() {
            info!(submitted, "{}", ALL_EXIST_MESSAGE);
            return Ok(BulkCreateOutcome::NothingToDo);
        }

        let batches = partition(&names, self.parallelism);
        info!(
            submitted,
            new = names.len(),
            batches = batches.len(),
            "Creating tasks"
        );

        self.run_batches(batches, cancel).await
    }

    async fn run_batches(
        &self,
        batches: Vec<Vec<String>>,
        cancel: &CancellationToken,
    ) -> OperationResult<BulkCreateOutcome> {
        let mut set = JoinSet::new();
        let mut report = BulkCreateReport::default();
        let mut cancelled = false;

        for (index, names) in batches.into_iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let gateway = self.gateway.clone();
            let token = cancel.clone();
            set.spawn(async move {
                let result = run_batch(&gateway, &names, &token).await;
                (index, names, result)
            });
        }

        while !cancelled {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                }
                joined = set.join_next() => match joined {
                    None => break,
                    Some(Ok((index, names, result))) => {
                        cancelled |= record(&mut report, index, names, result);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Batch task did not complete");
                        report.failed.push(FailedBatch {
                            index: None,
                            names: Vec::new(),
                            message: e.to_string(),
                        });
                    }
                },
            }
        }

        if cancelled {
            set.abort_all();
            // Batches that finished before the abort still report their commit
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((index, names, result)) => {
                        record(&mut report, index, names, result);
                    }
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => warn!(error = %e, "Batch task did not complete"),
                }
            }

            let committed = report.created.len();
            warn!(committed, "Bulk task creation cancelled");
            return Err(OperationError::Cancelled { committed });
        }

        info!(
            created = report.created.len(),
            failed_batches = report.failed.len(),
            "Bulk task creation finished"
        );
        Ok(BulkCreateOutcome::Created(report))
    }
}

/// Folds a batch result into the report; returns true if the batch saw cancellation
fn record(
    report: &mut BulkCreateReport,
    index: usize,
    names: Vec<String>,
    result: Result<Vec<Task>, BatchError>,
) -> bool {
    match result {
        Ok(created) => {
            debug!(batch = index, created = created.len(), "Batch committed");
            report.created.extend(created);
            false
        }
        Err(BatchError::Cancelled) => {
            debug!(batch = index, "Batch cancelled before commit");
            true
        }
        Err(BatchError::Store(e)) => {
            warn!(batch = index, error = %e, "Batch failed");
            report.failed.push(FailedBatch {
                index: Some(index),
                names,
                message: e.to_string(),
            });
            false
        }
    }
}

async fn run_batch<G: Gateway>(
    gateway: &G,
    names: &[String],
    cancel: &CancellationToken,
) -> Result<Vec<Task>, BatchError> {
    let mut session = gateway.open().await?;
    let created = session.insert_tasks(names).await?;

    if cancel.is_cancelled() {
        session.rollback().await?;
        return Err(BatchError::Cancelled);
    }

    session.commit().await?;
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_names() {
        assert_eq!(
            normalize_names("  Work \r\n\r\nEat\n \nSleep\r"),
            strings(&["Work", "Eat", "Sleep"])
        );
        assert!(normalize_names("").is_empty());
        assert!(normalize_names(" \r\n \t \n").is_empty());
    }

    #[test]
    fn test_filter_new_names_ignores_case() {
        let names = strings(&["Work", "work", "Eat", "SLEEP", "Run"]);
        let filtered = filter_new_names(names, ["sleep"]);
        assert_eq!(filtered, strings(&["Work", "Eat", "Run"]));
    }

    #[test]
    fn test_oversized_names() {
        let names = vec!["x".repeat(TASK_NAME_MAX), "y".repeat(TASK_NAME_MAX + 1)];
        let errors = oversized_names(&names);

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "task_names");
        assert!(errors[0].message.contains(&"y".repeat(20)));
    }

    #[test]
    fn test_batch_size() {
        assert_eq!(batch_size(0, 4), 1);
        assert_eq!(batch_size(3, 4), 1);
        assert_eq!(batch_size(8, 4), 3);
        assert_eq!(batch_size(10, 1), 11);
        assert_eq!(batch_size(5, 0), 6);
    }

    #[test]
    fn test_partition_keeps_order_and_bounds_batches() {
        let names: Vec<String> = (0..10).map(|i| format!("Task {}", i)).collect();
        let batches = partition(&names, 4);

        assert_eq!(batches.len(), 4);
        assert!(batches.iter().all(|b| b.len() <= 3));
        assert_eq!(batches.concat(), names);
    }

    #[test]
    fn test_partition_single_batch() {
        let names = strings(&["Work", "Eat"]);
        assert_eq!(partition(&names, 1), vec![names.clone()]);
    }
}
