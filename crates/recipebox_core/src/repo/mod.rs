//! Persistence contracts and their SQLite implementation.
//!
//! # Responsibility
//! - Define what the observable sources need from remote storage.
//! - Keep SQL and credential handling out of the sources and the store.
//!
//! # Invariants
//! - Repository calls are synchronous; each returns the persisted state.
//! - Unknown ids surface as `RepoError::NotFound`, never as a DB error.

pub mod record_repo;
pub mod session_repo;
pub mod sqlite_backend;
