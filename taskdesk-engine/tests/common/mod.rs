//! Shared fixtures for engine integration tests
//!
//! Every test gets its own `MemoryGateway`, so tests are independent and run
//! without a database.

#![allow(dead_code)]

use std::collections::BTreeSet;

use taskdesk_engine::seed::seed;
use taskdesk_shared::models::role::{Role, ADMIN_ROLE_NAME, DEFAULT_ROLE_NAME};
use taskdesk_shared::models::task::Task;
use taskdesk_shared::models::user::{CreateUser, User};
use taskdesk_shared::store::{Gateway, MemoryGateway, Session};
use uuid::Uuid;

/// Seeded store plus the seed roles
pub struct Fixture {
    pub gateway: MemoryGateway,
    pub default_role: Role,
    pub admin_role: Role,
}

pub async fn seeded() -> Fixture {
    let gateway = MemoryGateway::new();
    seed(&gateway).await.expect("seed failed");

    let mut session = gateway.open().await.unwrap();
    let default_role = session
        .find_role_by_name(DEFAULT_ROLE_NAME)
        .await
        .unwrap()
        .expect("default role seeded");
    let admin_role = session
        .find_role_by_name(ADMIN_ROLE_NAME)
        .await
        .unwrap()
        .expect("admin role seeded");

    Fixture {
        gateway,
        default_role,
        admin_role,
    }
}

pub async fn add_user(gateway: &MemoryGateway, name: &str, role: &Role) -> User {
    let mut session = gateway.open().await.unwrap();
    let user = session
        .insert_user(CreateUser {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            role_id: role.id,
        })
        .await
        .unwrap();
    session.commit().await.unwrap();
    user
}

pub async fn add_tasks(gateway: &MemoryGateway, names: &[&str]) -> Vec<Task> {
    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    let mut session = gateway.open().await.unwrap();
    let tasks = session.insert_tasks(&names).await.unwrap();
    session.commit().await.unwrap();
    tasks
}

pub async fn set_task_users(gateway: &MemoryGateway, task_id: Uuid, user_ids: &[Uuid]) {
    let mut session = gateway.open().await.unwrap();
    session.replace_task_users(task_id, user_ids).await.unwrap();
    session.commit().await.unwrap();
}

/// Committed task names, sorted
pub async fn task_names(gateway: &MemoryGateway) -> Vec<String> {
    let mut session = gateway.open().await.unwrap();
    let mut names = session.task_names().await.unwrap();
    names.sort();
    names
}

/// Committed users of a task
pub async fn task_user_ids(gateway: &MemoryGateway, task_id: Uuid) -> BTreeSet<Uuid> {
    let mut session = gateway.open().await.unwrap();
    session
        .users_for_task(task_id)
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.id)
        .collect()
}

pub async fn find_user(gateway: &MemoryGateway, id: Uuid) -> Option<User> {
    let mut session = gateway.open().await.unwrap();
    session.find_user(id).await.unwrap()
}

pub fn ids<const N: usize>(ids: [Uuid; N]) -> BTreeSet<Uuid> {
    ids.into_iter().collect()
}
