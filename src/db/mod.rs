//! Entry store: row models and SQL repository.
//!
//! This module is split into two submodules:
//! - `model`: typed rows and view models returned by the repository.
//! - `repo`: SQL-only functions over the `entries` table.
//!
//! Callers import from `news_relay::db`; the repository API and its models
//! are re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{NewEntry, PendingEntry, StoredEntry};
