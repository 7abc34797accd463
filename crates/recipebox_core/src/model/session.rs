//! Authentication session model.
//!
//! # Invariants
//! - `current_user` is `Some` exactly when `session_token` is `Some`.
//! - Credentials never appear in `Debug` output.

use crate::model::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};

/// Singleton session state as plain data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user: Option<Record>,
}

impl SessionData {
    pub fn new(session_token: impl Into<String>, current_user: Record) -> Self {
        Self {
            session_token: Some(session_token.into()),
            current_user: Some(current_user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session_token.is_some()
    }

    /// Returns the current user's object id, if signed in.
    pub fn current_user_id(&self) -> Option<&str> {
        self.current_user.as_ref().and_then(Record::id)
    }
}

/// Input accepted by session authentication.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Password { username: String, password: String },
    SessionToken(String),
}

impl Credentials {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn session_token(token: impl Into<String>) -> Self {
        Self::SessionToken(token.into())
    }

    /// Stable label for logs.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Password { .. } => "password",
            Self::SessionToken(_) => "session_token",
        }
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::SessionToken(_) => f.write_str("SessionToken(<redacted>)"),
        }
    }
}
