//! Store-level error taxonomy.

use crate::repo::record_repo::RepoError;
use crate::source::event::SourceKind;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure surfaced by a store operation.
#[derive(Debug)]
pub enum StoreError {
    /// A write or destroy referenced a key absent from the relevant cache.
    NotFound { kind: SourceKind, key: String },
    /// A keyed accessor was called with a blank key.
    MissingKey(SourceKind),
    /// The underlying repository rejected the call; passed through verbatim.
    Source(RepoError),
    /// The user was saved but signing in with the issued token failed.
    SignInAfterSignUp { user_id: String, source: RepoError },
    /// A source holds more than one forwarding link for the store.
    InvariantViolation(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { kind, key } => write!(f, "{kind} entry not found: {key}"),
            Self::MissingKey(kind) => write!(f, "{kind} key must not be blank"),
            Self::Source(err) => write!(f, "{err}"),
            Self::SignInAfterSignUp { user_id, source } => {
                write!(f, "user {user_id} was created but sign-in failed: {source}")
            }
            Self::InvariantViolation(details) => write!(f, "store invariant violated: {details}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Source(err) => Some(err),
            Self::SignInAfterSignUp { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        Self::Source(value)
    }
}

#[cfg(test)]
mod tests {
    use super::StoreError;
    use crate::repo::record_repo::RepoError;
    use crate::source::event::SourceKind;
    use std::error::Error;

    #[test]
    fn sign_in_failure_keeps_cause() {
        let err = StoreError::SignInAfterSignUp {
            user_id: "u1".to_string(),
            source: RepoError::Unauthorized("invalid session token".to_string()),
        };
        assert!(err.to_string().contains("u1"));
        assert!(err.source().is_some());
    }

    #[test]
    fn not_found_names_kind_and_key() {
        let err = StoreError::NotFound {
            kind: SourceKind::Recipes,
            key: "r9".to_string(),
        };
        assert_eq!(err.to_string(), "recipes entry not found: r9");
    }
}
