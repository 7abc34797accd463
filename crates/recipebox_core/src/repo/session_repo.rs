//! Session repository contract consumed by the observable session.

use crate::model::session::{Credentials, SessionData};
use crate::repo::record_repo::RepoResult;

/// Remote authentication contract.
pub trait SessionRepository {
    /// Signs in and persists the resulting session as current.
    ///
    /// Fails with `RepoError::Unauthorized` on bad credentials.
    fn authenticate(&self, credentials: &Credentials) -> RepoResult<SessionData>;

    /// Revokes `session_token` and forgets it as current.
    fn invalidate(&self, session_token: &str) -> RepoResult<()>;

    /// Returns the persisted current session, if one is still valid.
    fn restore(&self) -> RepoResult<Option<SessionData>>;
}
