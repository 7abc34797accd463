//! Two-phase read result for cache lookups that may miss.

use crate::model::record::Record;

/// Result of a read that can be served later.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// The value was cached.
    Ready(T),
    /// Not cached yet; a background refresh is queued. Re-read after the
    /// next `changed`.
    Pending,
}

impl<T> Lookup<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Pending => None,
        }
    }
}

impl Lookup<Record> {
    /// Collapses to plain data; `Pending` becomes the empty placeholder `{}`.
    pub fn into_plain(self) -> Record {
        self.ready().unwrap_or_default()
    }
}
