//! Record repository contract consumed by observable collections.
//!
//! # Responsibility
//! - Define the remote-facing CRUD contract for every collection scope.
//! - Carry semantic failures (`NotFound`, `Unauthorized`, `Rejected`)
//!   alongside transport errors.
//!
//! # Invariants
//! - `save` returns the record as persisted, with a backend-assigned
//!   `objectId` when the input had none.
//! - `fetch_all` returns records in a stable order.

use crate::db::DbError;
use crate::model::record::{ObjectId, Record};
use crate::source::event::SourceKind;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Plaintext credential accepted on user saves.
pub const PASSWORD_FIELD: &str = "password";
/// Token returned once when a user is created.
pub const SESSION_TOKEN_FIELD: &str = "sessionToken";

/// Failure reported by a repository collaborator.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound { scope: String, object_id: ObjectId },
    Unauthorized(String),
    Rejected(String),
    Unavailable(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { scope, object_id } => {
                write!(f, "{scope} record not found: {object_id}")
            }
            Self::Unauthorized(message) => write!(f, "unauthorized: {message}"),
            Self::Rejected(message) => write!(f, "rejected: {message}"),
            Self::Unavailable(message) => write!(f, "backend unavailable: {message}"),
            Self::InvalidData(message) => write!(f, "invalid stored data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Which remote collection a repository call addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectionScope {
    Recipes,
    Users,
    /// Comments of one recipe.
    Comments { recipe_id: String },
}

impl CollectionScope {
    pub fn comments(recipe_id: impl Into<String>) -> Self {
        Self::Comments {
            recipe_id: recipe_id.into(),
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        match self {
            Self::Recipes => SourceKind::Recipes,
            Self::Users => SourceKind::Users,
            Self::Comments { .. } => SourceKind::Comments,
        }
    }

    /// Stored scope name.
    pub fn name(&self) -> &'static str {
        self.source_kind().as_str()
    }

    /// Attributes that travel to the repository but never stay in a local
    /// collection.
    pub fn private_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Users => &[PASSWORD_FIELD, SESSION_TOKEN_FIELD],
            _ => &[],
        }
    }

    /// Cache key of keyed scopes.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Comments { recipe_id } => Some(recipe_id.as_str()),
            _ => None,
        }
    }
}

impl Display for CollectionScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Comments { recipe_id } => write!(f, "comments[{recipe_id}]"),
            other => f.write_str(other.name()),
        }
    }
}

/// Remote CRUD contract for one family of collections.
pub trait RecordRepository {
    /// Returns every record of `scope`.
    fn fetch_all(&self, scope: &CollectionScope) -> RepoResult<Vec<Record>>;

    /// Inserts or replaces one record and returns it as persisted.
    fn save(&self, scope: &CollectionScope, record: &Record) -> RepoResult<Record>;

    /// Deletes one record; `NotFound` when it does not exist.
    fn destroy(&self, scope: &CollectionScope, object_id: &str) -> RepoResult<()>;
}
