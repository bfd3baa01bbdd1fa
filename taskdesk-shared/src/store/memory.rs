/// In-memory gateway
///
/// A process-local store with the same constraint behaviour as the Postgres
/// schema, used by the test suites and for running flows without a database.
///
/// # Sessions
///
/// Opening a session snapshots the committed state. Writes are applied to the
/// snapshot (so the session reads its own writes) and recorded in a journal.
/// `commit` replays the journal onto the committed state under a write lock,
/// re-checking every constraint; if any check fails nothing is applied.
///
/// Differences from Postgres:
/// - there is no row locking, so a task name committed by a concurrent
///   session surfaces as a unique violation at commit instead of being skipped
/// - an update of a row deleted by a concurrent session is a no-op
///
/// # Fault injection
///
/// [`FaultPlan`] can reject the next N commits with [`StoreError::Injected`]
/// and delay every commit, so tests can exercise rollback and cancellation.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use async_trait::async_trait;

use super::{Gateway, Session};
use crate::error::{StoreError, StoreResult};
use crate::models::assignment::UserTask;
use crate::models::role::{CreateRole, Role, UpdateRole};
use crate::models::task::{Task, TASK_NAME_CONSTRAINT};
use crate::models::user::{CreateUser, UpdateUser, User};

const ROLE_NAME_CONSTRAINT: &str = "roles_name_key";
const USER_EMAIL_CONSTRAINT: &str = "users_email_key";
const USER_ROLE_FK: &str = "users_role_id_fkey";
const EDGE_USER_FK: &str = "user_tasks_user_id_fkey";
const EDGE_TASK_FK: &str = "user_tasks_task_id_fkey";

/// Faults applied to commits
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Number of upcoming commits to reject
    pub fail_next_commits: usize,

    /// Delay before each commit is applied, spent holding the write lock
    ///
    /// Commits therefore complete one at a time, `commit_delay` apart.
    pub commit_delay: Option<Duration>,
}

impl FaultPlan {
    /// Rejects the next `count` commits
    pub fn failing_commits(count: usize) -> Self {
        Self {
            fail_next_commits: count,
            ..Default::default()
        }
    }

    /// Delays every commit by `delay`
    pub fn delayed_commits(delay: Duration) -> Self {
        Self {
            commit_delay: Some(delay),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct FaultState {
    plan: FaultPlan,
    commits: usize,
    rejected: usize,
}

/// Committed rows
#[derive(Debug, Clone, Default)]
struct MemoryState {
    roles: HashMap<Uuid, Role>,
    users: HashMap<Uuid, User>,
    tasks: HashMap<Uuid, Task>,
    /// Keyed by (user_id, task_id)
    edges: BTreeMap<(Uuid, Uuid), UserTask>,
}

/// A fully determined write, replayable against any state
#[derive(Debug, Clone)]
enum Mutation {
    InsertRole(Role),
    UpdateRole(Role),
    DeleteRole(Uuid),
    InsertUser(User),
    UpdateUser(User),
    DeleteUser(Uuid),
    InsertTask(Task),
    UpdateTask(Task),
    DeleteTask(Uuid),
    SetTaskUsers { task_id: Uuid, edges: Vec<UserTask> },
    SetUserTasks { user_id: Uuid, edges: Vec<UserTask> },
}

fn unique(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

fn foreign_key(constraint: &str) -> StoreError {
    StoreError::ForeignKeyViolation {
        constraint: constraint.to_string(),
    }
}

/// Rows listed in `ORDER BY name, id` order
trait ByName {
    fn sort_key(&self) -> (&str, Uuid);
}

impl ByName for Role {
    fn sort_key(&self) -> (&str, Uuid) {
        (&self.name, self.id)
    }
}

impl ByName for User {
    fn sort_key(&self) -> (&str, Uuid) {
        (&self.name, self.id)
    }
}

impl ByName for Task {
    fn sort_key(&self) -> (&str, Uuid) {
        (&self.name, self.id)
    }
}

fn sorted_by_name<T: ByName>(mut rows: Vec<T>) -> Vec<T> {
    rows.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    rows
}

impl MemoryState {
    fn check_role(&self, role: &Role) -> StoreResult<()> {
        if self
            .roles
            .values()
            .any(|other| other.id != role.id && other.name == role.name)
        {
            return Err(unique(ROLE_NAME_CONSTRAINT));
        }
        Ok(())
    }

    fn check_user(&self, user: &User) -> StoreResult<()> {
        if self
            .users
            .values()
            .any(|other| other.id != user.id && other.email == user.email)
        {
            return Err(unique(USER_EMAIL_CONSTRAINT));
        }
        if !self.roles.contains_key(&user.role_id) {
            return Err(foreign_key(USER_ROLE_FK));
        }
        Ok(())
    }

    fn task_name_taken(&self, name: &str, except: Option<Uuid>) -> bool {
        let lowered = name.to_lowercase();
        self.tasks
            .values()
            .any(|other| Some(other.id) != except && other.name.to_lowercase() == lowered)
    }

    fn check_task(&self, task: &Task) -> StoreResult<()> {
        if self.task_name_taken(&task.name, Some(task.id)) {
            return Err(unique(TASK_NAME_CONSTRAINT));
        }
        Ok(())
    }

    fn check_edges(&self, edges: &[UserTask]) -> StoreResult<()> {
        for edge in edges {
            if !self.users.contains_key(&edge.user_id) {
                return Err(foreign_key(EDGE_USER_FK));
            }
            if !self.tasks.contains_key(&edge.task_id) {
                return Err(foreign_key(EDGE_TASK_FK));
            }
        }
        Ok(())
    }

    fn apply(&mut self, mutation: &Mutation) -> StoreResult<()> {
        match mutation {
            Mutation::InsertRole(role) => {
                self.check_role(role)?;
                self.roles.insert(role.id, role.clone());
            }
            Mutation::UpdateRole(role) => {
                if self.roles.contains_key(&role.id) {
                    self.check_role(role)?;
                    self.roles.insert(role.id, role.clone());
                }
            }
            Mutation::DeleteRole(id) => {
                if self.users.values().any(|user| user.role_id == *id) {
                    return Err(foreign_key(USER_ROLE_FK));
                }
                self.roles.remove(id);
            }
            Mutation::InsertUser(user) => {
                self.check_user(user)?;
                self.users.insert(user.id, user.clone());
            }
            Mutation::UpdateUser(user) => {
                if self.users.contains_key(&user.id) {
                    self.check_user(user)?;
                    self.users.insert(user.id, user.clone());
                }
            }
            Mutation::DeleteUser(id) => {
                self.users.remove(id);
                self.edges.retain(|(user_id, _), _| user_id != id);
            }
            Mutation::InsertTask(task) => {
                self.check_task(task)?;
                self.tasks.insert(task.id, task.clone());
            }
            Mutation::UpdateTask(task) => {
                if self.tasks.contains_key(&task.id) {
                    self.check_task(task)?;
                    self.tasks.insert(task.id, task.clone());
                }
            }
            Mutation::DeleteTask(id) => {
                self.tasks.remove(id);
                self.edges.retain(|(_, task_id), _| task_id != id);
            }
            Mutation::SetTaskUsers { task_id, edges } => {
                self.edges.retain(|(_, edge_task), _| edge_task != task_id);
                self.check_edges(edges)?;
                for edge in edges {
                    self.edges.insert((edge.user_id, edge.task_id), edge.clone());
                }
            }
            Mutation::SetUserTasks { user_id, edges } => {
                self.edges.retain(|(edge_user, _), _| edge_user != user_id);
                self.check_edges(edges)?;
                for edge in edges {
                    self.edges.insert((edge.user_id, edge.task_id), edge.clone());
                }
            }
        }
        Ok(())
    }
}

/// In-memory implementation of [`Gateway`]
///
/// Clones share the same committed state.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    state: Arc<RwLock<MemoryState>>,
    faults: Arc<Mutex<FaultState>>,
}

impl MemoryGateway {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the fault plan for subsequent commits
    pub async fn set_faults(&self, plan: FaultPlan) {
        self.faults.lock().await.plan = plan;
    }

    /// Number of commits that were applied
    pub async fn commit_count(&self) -> usize {
        self.faults.lock().await.commits
    }

    /// Number of commits rejected by the fault plan
    pub async fn rejected_commit_count(&self) -> usize {
        self.faults.lock().await.rejected
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    type Session = MemorySession;

    async fn open(&self) -> StoreResult<MemorySession> {
        let staged = self.state.read().await.clone();
        Ok(MemorySession {
            gateway: self.clone(),
            staged,
            journal: Vec::new(),
        })
    }
}

/// Session over a snapshot of the committed state
pub struct MemorySession {
    gateway: MemoryGateway,
    staged: MemoryState,
    journal: Vec<Mutation>,
}

impl MemorySession {
    fn record(&mut self, mutation: Mutation) -> StoreResult<()> {
        self.staged.apply(&mutation)?;
        self.journal.push(mutation);
        Ok(())
    }

    fn edges_for(&self, user_ids: &[Uuid], task_ids: &[Uuid]) -> Vec<UserTask> {
        let now = Utc::now();
        let mut seen = BTreeSet::new();
        user_ids
            .iter()
            .flat_map(|user_id| task_ids.iter().map(move |task_id| (*user_id, *task_id)))
            .filter(|pair| seen.insert(*pair))
            .map(|(user_id, task_id)| UserTask {
                user_id,
                task_id,
                created_at: now,
            })
            .collect()
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn list_roles(&mut self) -> StoreResult<Vec<Role>> {
        let rows = self.staged.roles.values().cloned().collect();
        Ok(sorted_by_name(rows))
    }

    async fn find_role(&mut self, id: Uuid) -> StoreResult<Option<Role>> {
        Ok(self.staged.roles.get(&id).cloned())
    }

    async fn find_role_by_name(&mut self, name: &str) -> StoreResult<Option<Role>> {
        Ok(self
            .staged
            .roles
            .values()
            .find(|role| role.name == name)
            .cloned())
    }

    async fn insert_role(&mut self, data: CreateRole) -> StoreResult<Role> {
        let now = Utc::now();
        let role = Role {
            id: Uuid::new_v4(),
            name: data.name,
            permissions: data.permissions,
            created_at: now,
            updated_at: now,
        };
        self.record(Mutation::InsertRole(role.clone()))?;
        Ok(role)
    }

    async fn update_role(&mut self, id: Uuid, data: UpdateRole) -> StoreResult<Option<Role>> {
        let Some(current) = self.staged.roles.get(&id).cloned() else {
            return Ok(None);
        };
        let role = Role {
            name: data.name,
            permissions: data.permissions,
            updated_at: Utc::now(),
            ..current
        };
        self.record(Mutation::UpdateRole(role.clone()))?;
        Ok(Some(role))
    }

    async fn delete_role(&mut self, id: Uuid) -> StoreResult<bool> {
        if !self.staged.roles.contains_key(&id) {
            return Ok(false);
        }
        self.record(Mutation::DeleteRole(id))?;
        Ok(true)
    }

    async fn list_users(&mut self) -> StoreResult<Vec<User>> {
        let rows = self.staged.users.values().cloned().collect();
        Ok(sorted_by_name(rows))
    }

    async fn find_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.staged.users.get(&id).cloned())
    }

    async fn find_users_by_ids(&mut self, ids: &[Uuid]) -> StoreResult<Vec<User>> {
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        let rows = self
            .staged
            .users
            .values()
            .filter(|user| wanted.contains(&user.id))
            .cloned()
            .collect();
        Ok(sorted_by_name(rows))
    }

    async fn insert_user(&mut self, data: CreateUser) -> StoreResult<User> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: data.name,
            email: data.email,
            role_id: data.role_id,
            created_at: now,
            updated_at: now,
        };
        self.record(Mutation::InsertUser(user.clone()))?;
        Ok(user)
    }

    async fn update_user(&mut self, id: Uuid, data: UpdateUser) -> StoreResult<Option<User>> {
        let Some(current) = self.staged.users.get(&id).cloned() else {
            return Ok(None);
        };
        let user = User {
            name: data.name,
            email: data.email,
            role_id: data.role_id,
            updated_at: Utc::now(),
            ..current
        };
        self.record(Mutation::UpdateUser(user.clone()))?;
        Ok(Some(user))
    }

    async fn rename_user(&mut self, id: Uuid, name: &str) -> StoreResult<Option<User>> {
        let Some(current) = self.staged.users.get(&id).cloned() else {
            return Ok(None);
        };
        let user = User {
            name: name.to_string(),
            updated_at: Utc::now(),
            ..current
        };
        self.record(Mutation::UpdateUser(user.clone()))?;
        Ok(Some(user))
    }

    async fn delete_user(&mut self, id: Uuid) -> StoreResult<bool> {
        if !self.staged.users.contains_key(&id) {
            return Ok(false);
        }
        self.record(Mutation::DeleteUser(id))?;
        Ok(true)
    }

    async fn list_tasks(&mut self) -> StoreResult<Vec<Task>> {
        let rows = self.staged.tasks.values().cloned().collect();
        Ok(sorted_by_name(rows))
    }

    async fn task_names(&mut self) -> StoreResult<Vec<String>> {
        Ok(self.staged.tasks.values().map(|t| t.name.clone()).collect())
    }

    async fn find_task(&mut self, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self.staged.tasks.get(&id).cloned())
    }

    async fn find_tasks_by_ids(&mut self, ids: &[Uuid]) -> StoreResult<Vec<Task>> {
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        let rows = self
            .staged
            .tasks
            .values()
            .filter(|task| wanted.contains(&task.id))
            .cloned()
            .collect();
        Ok(sorted_by_name(rows))
    }

    async fn insert_tasks(&mut self, names: &[String]) -> StoreResult<Vec<Task>> {
        let mut created = Vec::new();
        for name in names {
            if self.staged.task_name_taken(name, None) {
                continue;
            }
            let now = Utc::now();
            let task = Task {
                id: Uuid::new_v4(),
                name: name.clone(),
                created_at: now,
                updated_at: now,
            };
            self.record(Mutation::InsertTask(task.clone()))?;
            created.push(task);
        }
        Ok(created)
    }

    async fn rename_task(&mut self, id: Uuid, name: &str) -> StoreResult<Option<Task>> {
        let Some(current) = self.staged.tasks.get(&id).cloned() else {
            return Ok(None);
        };
        let task = Task {
            name: name.to_string(),
            updated_at: Utc::now(),
            ..current
        };
        self.record(Mutation::UpdateTask(task.clone()))?;
        Ok(Some(task))
    }

    async fn delete_task(&mut self, id: Uuid) -> StoreResult<bool> {
        if !self.staged.tasks.contains_key(&id) {
            return Ok(false);
        }
        self.record(Mutation::DeleteTask(id))?;
        Ok(true)
    }

    async fn assignments(&mut self) -> StoreResult<Vec<UserTask>> {
        let mut rows: Vec<UserTask> = self.staged.edges.values().cloned().collect();
        rows.sort_by_key(|edge| (edge.task_id, edge.user_id));
        Ok(rows)
    }

    async fn users_for_task(&mut self, task_id: Uuid) -> StoreResult<Vec<User>> {
        let rows = self
            .staged
            .edges
            .keys()
            .filter(|(_, edge_task)| *edge_task == task_id)
            .filter_map(|(user_id, _)| self.staged.users.get(user_id).cloned())
            .collect();
        Ok(sorted_by_name(rows))
    }

    async fn tasks_for_user(&mut self, user_id: Uuid) -> StoreResult<Vec<Task>> {
        let rows = self
            .staged
            .edges
            .keys()
            .filter(|(edge_user, _)| *edge_user == user_id)
            .filter_map(|(_, task_id)| self.staged.tasks.get(task_id).cloned())
            .collect();
        Ok(sorted_by_name(rows))
    }

    async fn replace_task_users(&mut self, task_id: Uuid, user_ids: &[Uuid]) -> StoreResult<()> {
        let edges = self.edges_for(user_ids, &[task_id]);
        self.record(Mutation::SetTaskUsers { task_id, edges })
    }

    async fn replace_user_tasks(&mut self, user_id: Uuid, task_ids: &[Uuid]) -> StoreResult<()> {
        let edges = self.edges_for(&[user_id], task_ids);
        self.record(Mutation::SetUserTasks { user_id, edges })
    }

    async fn commit(self) -> StoreResult<()> {
        let delay = {
            let mut faults = self.gateway.faults.lock().await;
            if faults.plan.fail_next_commits > 0 {
                faults.plan.fail_next_commits -= 1;
                faults.rejected += 1;
                debug!(mutations = self.journal.len(), "Rejecting commit");
                return Err(StoreError::Injected("commit rejected".to_string()));
            }
            faults.plan.commit_delay
        };

        let mut state = self.gateway.state.write().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut next = state.clone();
        for mutation in &self.journal {
            next.apply(mutation)?;
        }
        *state = next;
        drop(state);

        self.gateway.faults.lock().await.commits += 1;
        debug!(mutations = self.journal.len(), "Committed memory session");
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        debug!(mutations = self.journal.len(), "Rolled back memory session");
        Ok(())
    }
}
