//! Database layer for habitlens
//!
//! SQLite storage with:
//! - Schema migrations
//! - Repository methods for users and activities
//! - Implementations of every [`crate::store`] trait

pub mod repo;
pub mod schema;

pub use repo::Database;
