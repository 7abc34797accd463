//! Client-side recipe store.
//!
//! Aggregates a session, recipe and user collections, and lazily created
//! per-recipe comment collections behind one facade with a single
//! `changed` signal.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod source;
pub mod store;

pub use config::{ConfigError, StoreConfig};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::record::{Attributes, ObjectId, Record};
pub use model::session::{Credentials, SessionData};
pub use repo::record_repo::{CollectionScope, RecordRepository, RepoError, RepoResult};
pub use repo::session_repo::SessionRepository;
pub use repo::sqlite_backend::SqliteBackend;
pub use source::collection::SaveOptions;
pub use source::event::{ChangeEvent, ChangeKind, SourceKind, SubscriptionToken};
pub use store::error::{StoreError, StoreResult};
pub use store::lookup::Lookup;
pub use store::tasks::{BackgroundReport, BackgroundTask};
pub use store::Store;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
