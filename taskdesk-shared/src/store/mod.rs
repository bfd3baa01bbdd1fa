/// Persistence gateway
///
/// Every business flow talks to storage through these two traits:
///
/// - [`Gateway`]: a cheaply cloneable handle that opens sessions
/// - [`Session`]: one isolated unit of work; writes become visible to other
///   sessions only after [`Session::commit`]
///
/// A session that is dropped without being committed is rolled back. Concurrent
/// callers (the bulk task creator's batches) each open their own session.
///
/// # Implementations
///
/// - `postgres`: [`PgGateway`], one database transaction per session
/// - `memory`: [`MemoryGateway`], a staged in-process store with fault injection
///
/// # Example
///
/// ```no_run
/// use taskdesk_shared::store::{Gateway, Session, MemoryGateway};
///
/// # async fn example() -> Result<(), taskdesk_shared::error::StoreError> {
/// let gateway = MemoryGateway::new();
///
/// let mut session = gateway.open().await?;
/// let created = session.insert_tasks(&["Work".to_string()]).await?;
/// session.commit().await?;
///
/// assert_eq!(created.len(), 1);
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::assignment::UserTask;
use crate::models::role::{CreateRole, Role, UpdateRole};
use crate::models::task::Task;
use crate::models::user::{CreateUser, UpdateUser, User};

pub mod memory;
pub mod postgres;

pub use memory::{FaultPlan, MemoryGateway};
pub use postgres::PgGateway;

/// Opens isolated sessions against the store
#[async_trait]
pub trait Gateway: Clone + Send + Sync + 'static {
    type Session: Session + 'static;

    /// Begins a new session
    async fn open(&self) -> StoreResult<Self::Session>;
}

/// One transactional unit of work
///
/// Reads observe the session's own uncommitted writes. List operations return
/// rows ordered by name, then id.
#[async_trait]
pub trait Session: Send + Sized {
    // Roles

    async fn list_roles(&mut self) -> StoreResult<Vec<Role>>;

    async fn find_role(&mut self, id: Uuid) -> StoreResult<Option<Role>>;

    async fn find_role_by_name(&mut self, name: &str) -> StoreResult<Option<Role>>;

    async fn insert_role(&mut self, data: CreateRole) -> StoreResult<Role>;

    async fn update_role(&mut self, id: Uuid, data: UpdateRole) -> StoreResult<Option<Role>>;

    /// Fails with a foreign key violation while users still hold the role
    async fn delete_role(&mut self, id: Uuid) -> StoreResult<bool>;

    // Users

    async fn list_users(&mut self) -> StoreResult<Vec<User>>;

    async fn find_user(&mut self, id: Uuid) -> StoreResult<Option<User>>;

    /// Unknown IDs are ignored
    async fn find_users_by_ids(&mut self, ids: &[Uuid]) -> StoreResult<Vec<User>>;

    async fn insert_user(&mut self, data: CreateUser) -> StoreResult<User>;

    async fn update_user(&mut self, id: Uuid, data: UpdateUser) -> StoreResult<Option<User>>;

    async fn rename_user(&mut self, id: Uuid, name: &str) -> StoreResult<Option<User>>;

    async fn delete_user(&mut self, id: Uuid) -> StoreResult<bool>;

    // Tasks

    async fn list_tasks(&mut self) -> StoreResult<Vec<Task>>;

    /// Every persisted task name, unordered
    async fn task_names(&mut self) -> StoreResult<Vec<String>>;

    async fn find_task(&mut self, id: Uuid) -> StoreResult<Option<Task>>;

    /// Unknown IDs are ignored
    async fn find_tasks_by_ids(&mut self, ids: &[Uuid]) -> StoreResult<Vec<Task>>;

    /// Inserts tasks by name and returns the rows actually written
    ///
    /// A name that collides case-insensitively with an existing task is skipped.
    async fn insert_tasks(&mut self, names: &[String]) -> StoreResult<Vec<Task>>;

    async fn rename_task(&mut self, id: Uuid, name: &str) -> StoreResult<Option<Task>>;

    async fn delete_task(&mut self, id: Uuid) -> StoreResult<bool>;

    // Assignments

    async fn assignments(&mut self) -> StoreResult<Vec<UserTask>>;

    async fn users_for_task(&mut self, task_id: Uuid) -> StoreResult<Vec<User>>;

    async fn tasks_for_user(&mut self, user_id: Uuid) -> StoreResult<Vec<Task>>;

    /// Clears the task's edges and inserts one edge per user
    async fn replace_task_users(&mut self, task_id: Uuid, user_ids: &[Uuid]) -> StoreResult<()>;

    /// Clears the user's edges and inserts one edge per task
    async fn replace_user_tasks(&mut self, user_id: Uuid, task_ids: &[Uuid]) -> StoreResult<()>;

    // Transaction boundary

    /// Makes every write of the session durable, all or nothing
    async fn commit(self) -> StoreResult<()>;

    /// Discards every write of the session
    async fn rollback(self) -> StoreResult<()>;
}
