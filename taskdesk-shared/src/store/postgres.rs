/// Postgres gateway
///
/// Each session is one database transaction begun on the pool. Operations
/// delegate to the model functions in `crate::models` against the
/// transaction's connection. Dropping a `PgSession` without committing rolls
/// the transaction back (sqlx's `Transaction` drop behaviour).

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{Gateway, Session};
use crate::error::StoreResult;
use crate::models::assignment::UserTask;
use crate::models::role::{CreateRole, Role, UpdateRole};
use crate::models::task::Task;
use crate::models::user::{CreateUser, UpdateUser, User};

/// Gateway backed by a Postgres connection pool
#[derive(Debug, Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Session holding an open Postgres transaction
pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Gateway for PgGateway {
    type Session = PgSession;

    async fn open(&self) -> StoreResult<PgSession> {
        let tx = self.pool.begin().await?;
        debug!("Opened Postgres session");
        Ok(PgSession { tx })
    }
}

#[async_trait]
impl Session for PgSession {
    async fn list_roles(&mut self) -> StoreResult<Vec<Role>> {
        Ok(Role::list(&mut self.tx).await?)
    }

    async fn find_role(&mut self, id: Uuid) -> StoreResult<Option<Role>> {
        Ok(Role::find_by_id(&mut self.tx, id).await?)
    }

    async fn find_role_by_name(&mut self, name: &str) -> StoreResult<Option<Role>> {
        Ok(Role::find_by_name(&mut self.tx, name).await?)
    }

    async fn insert_role(&mut self, data: CreateRole) -> StoreResult<Role> {
        Ok(Role::create(&mut self.tx, data).await?)
    }

    async fn update_role(&mut self, id: Uuid, data: UpdateRole) -> StoreResult<Option<Role>> {
        Ok(Role::update(&mut self.tx, id, data).await?)
    }

    async fn delete_role(&mut self, id: Uuid) -> StoreResult<bool> {
        Ok(Role::delete(&mut self.tx, id).await?)
    }

    async fn list_users(&mut self) -> StoreResult<Vec<User>> {
        Ok(User::list(&mut self.tx).await?)
    }

    async fn find_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(User::find_by_id(&mut self.tx, id).await?)
    }

    async fn find_users_by_ids(&mut self, ids: &[Uuid]) -> StoreResult<Vec<User>> {
        Ok(User::find_by_ids(&mut self.tx, ids).await?)
    }

    async fn insert_user(&mut self, data: CreateUser) -> StoreResult<User> {
        Ok(User::create(&mut self.tx, data).await?)
    }

    async fn update_user(&mut self, id: Uuid, data: UpdateUser) -> StoreResult<Option<User>> {
        Ok(User::update(&mut self.tx, id, data).await?)
    }

    async fn rename_user(&mut self, id: Uuid, name: &str) -> StoreResult<Option<User>> {
        Ok(User::rename(&mut self.tx, id, name).await?)
    }

    async fn delete_user(&mut self, id: Uuid) -> StoreResult<bool> {
        Ok(User::delete(&mut self.tx, id).await?)
    }

    async fn list_tasks(&mut self) -> StoreResult<Vec<Task>> {
        Ok(Task::list(&mut self.tx).await?)
    }

    async fn task_names(&mut self) -> StoreResult<Vec<String>> {
        Ok(Task::names(&mut self.tx).await?)
    }

    async fn find_task(&mut self, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(Task::find_by_id(&mut self.tx, id).await?)
    }

    async fn find_tasks_by_ids(&mut self, ids: &[Uuid]) -> StoreResult<Vec<Task>> {
        Ok(Task::find_by_ids(&mut self.tx, ids).await?)
    }

    async fn insert_tasks(&mut self, names: &[String]) -> StoreResult<Vec<Task>> {
        Ok(Task::create_many(&mut self.tx, names).await?)
    }

    async fn rename_task(&mut self, id: Uuid, name: &str) -> StoreResult<Option<Task>> {
        Ok(Task::rename(&mut self.tx, id, name).await?)
    }

    async fn delete_task(&mut self, id: Uuid) -> StoreResult<bool> {
        Ok(Task::delete(&mut self.tx, id).await?)
    }

    async fn assignments(&mut self) -> StoreResult<Vec<UserTask>> {
        Ok(UserTask::list(&mut self.tx).await?)
    }

    async fn users_for_task(&mut self, task_id: Uuid) -> StoreResult<Vec<User>> {
        Ok(UserTask::users_for_task(&mut self.tx, task_id).await?)
    }

    async fn tasks_for_user(&mut self, user_id: Uuid) -> StoreResult<Vec<Task>> {
        Ok(UserTask::tasks_for_user(&mut self.tx, user_id).await?)
    }

    async fn replace_task_users(&mut self, task_id: Uuid, user_ids: &[Uuid]) -> StoreResult<()> {
        Ok(UserTask::replace_for_task(&mut self.tx, task_id, user_ids).await?)
    }

    async fn replace_user_tasks(&mut self, user_id: Uuid, task_ids: &[Uuid]) -> StoreResult<()> {
        Ok(UserTask::replace_for_user(&mut self.tx, user_id, task_ids).await?)
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        debug!("Committed Postgres session");
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        debug!("Rolled back Postgres session");
        Ok(())
    }
}
