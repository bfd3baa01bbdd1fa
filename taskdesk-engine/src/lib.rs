//! # TaskDesk Engine
//!
//! The assignment and bulk-mutation workflows of TaskDesk, written against
//! the persistence gateway in `taskdesk_shared::store`.
//!
//! ## Module Organization
//!
//! - `bulk_create`: Parallel, cancellable bulk task creation
//! - `assign`: Atomic bulk replacement of task↔user assignments
//! - `users`, `tasks`, `roles`: Single-entity create/edit/list/delete flows
//! - `transaction`: Renaming a task and a user in one transaction
//! - `seed`: Default roles and tasks
//! - `config`: Layered configuration
//! - `cli`: Command-line interface
//! - `error`: Engine error types

pub mod assign;
pub mod bulk_create;
pub mod cli;
pub mod config;
pub mod error;
pub mod roles;
pub mod seed;
pub mod tasks;
pub mod transaction;
pub mod users;

/// Current version of the TaskDesk engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
