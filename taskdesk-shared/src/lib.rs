//! # TaskDesk Shared Library
//!
//! Entity models, the persistence gateway and the database layer used by the
//! TaskDesk engine.
//!
//! ## Module Organization
//!
//! - `models`: Roles, users, tasks and their assignment edges
//! - `store`: The `Gateway`/`Session` contract with Postgres and in-memory implementations
//! - `db`: Connection pool and migrations
//! - `error`: Persistence error type

pub mod db;
pub mod error;
pub mod models;
pub mod store;

/// Current version of the TaskDesk shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
