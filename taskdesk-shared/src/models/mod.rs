/// Database models for TaskDesk
///
/// This module contains the entity models and their SQL operations.
/// The operations take a `&mut PgConnection` so they run inside whatever
/// transaction the caller holds; the Postgres gateway in `store::postgres`
/// is their only caller.
///
/// # Models
///
/// - `role`: Roles and the permission bitset
/// - `user`: User accounts, each with exactly one role
/// - `task`: Tasks, unique by case-insensitive name
/// - `assignment`: User↔task edges and the joined views

pub mod assignment;
pub mod role;
pub mod task;
pub mod user;
