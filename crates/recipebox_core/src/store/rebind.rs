//! Forwarding-link table with detach-then-attach rebinding.
//!
//! # Responsibility
//! - Own the one subscription token the store holds per source.
//! - Replace that link atomically on every rebind.
//!
//! # Invariants
//! - After `rebind(source, ..)` returns `Ok`, `source` carries exactly one
//!   link owned by this rebinder.
//! - Tokens never leave the table except to be handed back to their
//!   emitter.

use crate::source::event::{ChangeEvent, Emitter, EmitterId, OwnerId, SubscriptionToken};
use crate::store::error::{StoreError, StoreResult};
use log::{error, trace};
use std::cell::RefCell;
use std::collections::HashMap;

pub struct SubscriptionRebinder {
    owner: OwnerId,
    links: RefCell<HashMap<EmitterId, SubscriptionToken>>,
}

impl SubscriptionRebinder {
    pub fn new() -> Self {
        Self {
            owner: OwnerId::next(),
            links: RefCell::new(HashMap::new()),
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Detaches any link previously attached to `source`, then attaches
    /// `forward` as the only one.
    ///
    /// # Errors
    /// - `StoreError::InvariantViolation` when the link count for this
    ///   owner is not exactly one afterwards.
    pub fn rebind(
        &self,
        source: &Emitter<ChangeEvent>,
        forward: impl Fn(&ChangeEvent) + 'static,
    ) -> StoreResult<()> {
        let mut links = self.links.borrow_mut();
        if let Some(previous) = links.remove(&source.id()) {
            if source.unsubscribe(previous).is_err() {
                return Err(self.violation(source, "stored token rejected by its source"));
            }
        }
        links.insert(source.id(), source.subscribe_owned(self.owner, forward));

        let active = source.links_owned_by(self.owner);
        if active != 1 {
            return Err(self.violation(source, &format!("{active} active forwarding links")));
        }
        trace!(
            "event=rebind module=store status=ok emitter={:?} tracked={}",
            source.id(),
            links.len()
        );
        Ok(())
    }

    /// Detaches the link to `source`, if any. Returns whether one existed.
    pub fn detach(&self, source: &Emitter<ChangeEvent>) -> bool {
        let token = self.links.borrow_mut().remove(&source.id());
        match token {
            Some(token) => source.unsubscribe(token).is_ok(),
            None => false,
        }
    }

    /// Active links from `source` to this rebinder's owner.
    pub fn active_links(&self, source: &Emitter<ChangeEvent>) -> usize {
        source.links_owned_by(self.owner)
    }

    /// Number of sources with a stored token.
    pub fn tracked_sources(&self) -> usize {
        self.links.borrow().len()
    }

    fn violation(&self, source: &Emitter<ChangeEvent>, details: &str) -> StoreError {
        error!(
            "event=rebind module=store status=error emitter={:?} error_code=invariant_violation details={}",
            source.id(),
            details
        );
        StoreError::InvariantViolation(format!("emitter {:?}: {details}", source.id()))
    }
}

impl Default for SubscriptionRebinder {
    fn default() -> Self {
        Self::new()
    }
}
