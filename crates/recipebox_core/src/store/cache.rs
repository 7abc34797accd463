//! Lazily populated keyed cache of sources.
//!
//! # Responsibility
//! - Map a cache key to exactly one shared source instance.
//! - Keep the storage policy behind [`KeyedCache`] so eviction can be added
//!   without touching the store.
//!
//! # Invariants
//! - For a given key, `get_or_create` returns the same `Rc` until the entry
//!   leaves the cache. [`UnboundedCache`] never evicts.
//! - Blank keys are rejected, never cached under a sentinel.
//! - No fetch or subscription happens here.

use crate::source::event::SourceKind;
use crate::store::error::{StoreError, StoreResult};
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Storage policy for keyed entries.
pub trait KeyedCache<V> {
    fn get(&self, key: &str) -> Option<Rc<V>>;
    fn insert(&self, key: String, value: Rc<V>);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache that keeps every entry for its own lifetime.
pub struct UnboundedCache<V> {
    entries: RefCell<HashMap<String, Rc<V>>>,
}

impl<V> UnboundedCache<V> {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
        }
    }
}

impl<V> Default for UnboundedCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> KeyedCache<V> for UnboundedCache<V> {
    fn get(&self, key: &str) -> Option<Rc<V>> {
        self.entries.borrow().get(key).cloned()
    }

    fn insert(&self, key: String, value: Rc<V>) {
        self.entries.borrow_mut().insert(key, value);
    }

    fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// Get-or-create front end over a [`KeyedCache`].
pub struct KeyedCacheManager<V> {
    kind: SourceKind,
    cache: Box<dyn KeyedCache<V>>,
}

impl<V: 'static> KeyedCacheManager<V> {
    /// Creates a manager over an [`UnboundedCache`].
    pub fn new(kind: SourceKind) -> Self {
        Self::with_cache(kind, Box::new(UnboundedCache::new()))
    }

    pub fn with_cache(kind: SourceKind, cache: Box<dyn KeyedCache<V>>) -> Self {
        Self { kind, cache }
    }

    /// Returns the entry for `key`, building it with `create` on first use.
    ///
    /// `create` receives the normalized (trimmed) key.
    ///
    /// # Errors
    /// - `StoreError::MissingKey` when `key` is blank.
    pub fn get_or_create(
        &self,
        key: &str,
        create: impl FnOnce(&str) -> V,
    ) -> StoreResult<Rc<V>> {
        let key = key.trim();
        if key.is_empty() {
            return Err(StoreError::MissingKey(self.kind));
        }
        if let Some(existing) = self.cache.get(key) {
            return Ok(existing);
        }

        let created = Rc::new(create(key));
        self.cache.insert(key.to_string(), Rc::clone(&created));
        debug!(
            "event=cache_create module=store status=ok kind={} key={} size={}",
            self.kind,
            key,
            self.cache.len()
        );
        Ok(created)
    }

    /// Returns the entry for `key` without creating one.
    pub fn get(&self, key: &str) -> Option<Rc<V>> {
        self.cache.get(key.trim())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
