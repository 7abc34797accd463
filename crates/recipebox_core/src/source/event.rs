//! Lifecycle events and token-based subscriptions.
//!
//! # Responsibility
//! - Deliver lifecycle events from one source to its listeners, in order.
//! - Represent each subscription as an owned token that must be handed back
//!   to unsubscribe.
//!
//! # Invariants
//! - `SubscriptionToken` is not `Clone`; one token unsubscribes one link.
//! - No internal borrow is held while listeners run, so a listener may
//!   subscribe, unsubscribe or call back into the store.
//! - A listener removed during an emit still sees the event being emitted.

use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_EMITTER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

/// Kind of source an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Session,
    Recipes,
    Users,
    Comments,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Recipes => "recipes",
            Self::Users => "users",
            Self::Comments => "comments",
        }
    }
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle transition reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Mutated,
    Removed,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Mutated => "mutated",
            Self::Removed => "removed",
        }
    }
}

/// One lifecycle event.
///
/// The store forwards these unchanged as its `changed` signal; consumers
/// that only need "something changed" can ignore every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub source: SourceKind,
    /// Cache key of a keyed source (the recipe id for comments).
    pub scope_key: Option<String>,
    pub change: ChangeKind,
    /// Affected record, when the source is a collection.
    pub object_id: Option<String>,
}

impl ChangeEvent {
    pub fn new(
        source: SourceKind,
        scope_key: Option<String>,
        change: ChangeKind,
        object_id: Option<String>,
    ) -> Self {
        Self {
            source,
            scope_key,
            change,
            object_id,
        }
    }
}

/// Identity of one emitter, used to key link tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmitterId(u64);

/// Identity of a subscriber that may own several links across emitters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Allocates a process-unique owner id.
    pub fn next() -> Self {
        Self(NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Proof of one active subscription.
///
/// Must be passed back to [`Emitter::unsubscribe`] to detach the link.
/// Dropping a token leaves the link attached.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a subscription token makes the link impossible to detach"]
pub struct SubscriptionToken {
    emitter: EmitterId,
    slot: u64,
}

impl SubscriptionToken {
    pub fn emitter_id(&self) -> EmitterId {
        self.emitter
    }
}

type Listener<E> = Rc<dyn Fn(&E)>;

struct Slot<E> {
    id: u64,
    owner: Option<OwnerId>,
    listener: Listener<E>,
}

/// Single-threaded event emitter.
pub struct Emitter<E> {
    id: EmitterId,
    next_slot: Cell<u64>,
    slots: RefCell<Vec<Slot<E>>>,
}

impl<E> Emitter<E> {
    pub fn new() -> Self {
        Self {
            id: EmitterId(NEXT_EMITTER_ID.fetch_add(1, Ordering::Relaxed)),
            next_slot: Cell::new(1),
            slots: RefCell::new(Vec::new()),
        }
    }

    pub fn id(&self) -> EmitterId {
        self.id
    }

    /// Attaches an anonymous listener.
    pub fn subscribe(&self, listener: impl Fn(&E) + 'static) -> SubscriptionToken {
        self.attach(None, Rc::new(listener))
    }

    /// Attaches a listener on behalf of `owner`, so links can be counted per owner.
    pub fn subscribe_owned(
        &self,
        owner: OwnerId,
        listener: impl Fn(&E) + 'static,
    ) -> SubscriptionToken {
        self.attach(Some(owner), Rc::new(listener))
    }

    /// Detaches the link `token` stands for.
    ///
    /// A token minted by another emitter is handed back unchanged.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), SubscriptionToken> {
        if token.emitter != self.id {
            return Err(token);
        }
        self.slots.borrow_mut().retain(|slot| slot.id != token.slot);
        Ok(())
    }

    pub fn listener_count(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Counts active links attached on behalf of `owner`.
    pub fn links_owned_by(&self, owner: OwnerId) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|slot| slot.owner == Some(owner))
            .count()
    }

    /// Delivers `event` to every listener attached at call time, in
    /// subscription order.
    pub fn emit(&self, event: &E) {
        let listeners: Vec<Listener<E>> = self
            .slots
            .borrow()
            .iter()
            .map(|slot| Rc::clone(&slot.listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    fn attach(&self, owner: Option<OwnerId>, listener: Listener<E>) -> SubscriptionToken {
        let slot = self.next_slot.get();
        self.next_slot.set(slot + 1);
        self.slots.borrow_mut().push(Slot {
            id: slot,
            owner,
            listener,
        });
        SubscriptionToken {
            emitter: self.id,
            slot,
        }
    }
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}
