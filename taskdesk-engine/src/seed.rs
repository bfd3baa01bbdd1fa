/// Seed data
///
/// Inserts the default roles and tasks. Rows that already exist (roles by
/// exact name, tasks by name ignoring case) are left alone, so seeding can
/// run any number of times.

use serde::Serialize;
use taskdesk_shared::models::role::{CreateRole, Permissions, ADMIN_ROLE_NAME, DEFAULT_ROLE_NAME};
use taskdesk_shared::store::{Gateway, Session};
use tracing::info;

use crate::error::OperationResult;

/// Roles created by [`seed`]
pub fn seed_roles() -> [(&'static str, Permissions); 2] {
    [
        (DEFAULT_ROLE_NAME, Permissions::READ),
        (ADMIN_ROLE_NAME, Permissions::ALL),
    ]
}

/// Tasks created by [`seed`]
pub const SEED_TASKS: [&str; 3] = ["Work", "Eat", "Sleep"];

/// Rows inserted by one seeding run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub roles_created: usize,
    pub tasks_created: usize,
}

/// Inserts missing seed rows in one session
pub async fn seed<G: Gateway>(gateway: &G) -> OperationResult<SeedReport> {
    let mut session = gateway.open().await?;
    let mut report = SeedReport::default();

    for (name, permissions) in seed_roles() {
        if session.find_role_by_name(name).await?.is_none() {
            session
                .insert_role(CreateRole {
                    name: name.to_string(),
                    permissions,
                })
                .await?;
            report.roles_created += 1;
        }
    }

    let names: Vec<String> = SEED_TASKS.iter().map(|name| name.to_string()).collect();
    report.tasks_created = session.insert_tasks(&names).await?.len();

    session.commit().await?;

    info!(
        roles_created = report.roles_created,
        tasks_created = report.tasks_created,
        "Seed data applied"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskdesk_shared::store::MemoryGateway;

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let gateway = MemoryGateway::new();

        let first = seed(&gateway).await.unwrap();
        assert_eq!(
            first,
            SeedReport {
                roles_created: 2,
                tasks_created: 3,
            }
        );

        let second = seed(&gateway).await.unwrap();
        assert_eq!(second, SeedReport::default());

        let mut session = gateway.open().await.unwrap();
        assert_eq!(session.list_roles().await.unwrap().len(), 2);
        assert_eq!(session.list_tasks().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_seed_keeps_existing_tasks_of_other_case() {
        let gateway = MemoryGateway::new();
        let mut session = gateway.open().await.unwrap();
        session.insert_tasks(&["work".to_string()]).await.unwrap();
        session.commit().await.unwrap();

        let report = seed(&gateway).await.unwrap();
        assert_eq!(report.tasks_created, 2);
    }
}
