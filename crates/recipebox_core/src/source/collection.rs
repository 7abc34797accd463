//! Observable collection over one repository scope.
//!
//! # Responsibility
//! - Hold the last-known ordered records of one scope.
//! - Reconcile local state with the repository on fetch/create/destroy.
//! - Emit one lifecycle event per record-level change.
//!
//! # Invariants
//! - Records with identity are unique by `objectId`.
//! - Every local entry carries a client id (`cid`) that is stable while the
//!   entry lives, so optimistic inserts can be located after persistence.
//! - The records borrow is released before any event is emitted.
//! - Scope-private fields (user passwords and session tokens) are sent to
//!   the repository but never held, emitted or returned.

use crate::model::record::Record;
use crate::repo::record_repo::{CollectionScope, RecordRepository, RepoError, RepoResult};
use crate::source::event::{ChangeEvent, ChangeKind, Emitter};
use log::{debug, error, info, warn};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

/// Options for [`ObservableCollection::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveOptions {
    /// Shallow-merge into an existing record with the same id instead of
    /// replacing it.
    pub merge: bool,
    /// Persist before touching local state. When `false` the change is
    /// applied optimistically and reverted if persistence fails.
    pub wait: bool,
}

impl SaveOptions {
    pub fn merge() -> Self {
        Self {
            merge: true,
            wait: false,
        }
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }
}

#[derive(Debug, Clone)]
struct Entry {
    cid: u64,
    record: Record,
}

/// Ordered, keyed, observable record set.
pub struct ObservableCollection {
    scope: CollectionScope,
    repo: Rc<dyn RecordRepository>,
    entries: RefCell<Vec<Entry>>,
    next_cid: Cell<u64>,
    fetch_count: Cell<u64>,
    events: Emitter<ChangeEvent>,
}

impl ObservableCollection {
    pub fn new(scope: CollectionScope, repo: Rc<dyn RecordRepository>) -> Self {
        Self {
            scope,
            repo,
            entries: RefCell::new(Vec::new()),
            next_cid: Cell::new(1),
            fetch_count: Cell::new(0),
            events: Emitter::new(),
        }
    }

    pub fn scope(&self) -> &CollectionScope {
        &self.scope
    }

    /// Lifecycle event stream of this collection.
    pub fn events(&self) -> &Emitter<ChangeEvent> {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Number of completed fetches.
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.get()
    }

    /// Returns a detached copy of one record.
    pub fn get(&self, object_id: &str) -> Option<Record> {
        self.entries
            .borrow()
            .iter()
            .find(|entry| entry.record.id() == Some(object_id))
            .map(|entry| entry.record.clone())
    }

    /// Returns detached copies of all records, in collection order.
    pub fn to_plain_data(&self) -> Vec<Record> {
        self.entries
            .borrow()
            .iter()
            .map(|entry| entry.record.clone())
            .collect()
    }

    /// Replaces local state with the repository's, merging into existing
    /// records.
    ///
    /// Emits `removed` for records gone remotely, then `mutated` for records
    /// whose attributes changed, then `added` for new records.
    pub fn fetch(&self) -> RepoResult<()> {
        let incoming = self.repo.fetch_all(&self.scope).map_err(|err| {
            error!(
                "event=collection_fetch module=collection status=error scope={} error={}",
                self.scope, err
            );
            err
        })?;

        let incoming = incoming.into_iter().map(|record| self.scrub(record)).collect();
        let events = self.reconcile(incoming);
        self.fetch_count.set(self.fetch_count.get() + 1);
        info!(
            "event=collection_fetch module=collection status=ok scope={} changes={}",
            self.scope,
            events.len()
        );
        self.emit_all(events);
        Ok(())
    }

    /// Saves one record through the repository and reflects it locally.
    ///
    /// Returns the record as persisted.
    pub fn create(&self, record: Record, options: SaveOptions) -> RepoResult<Record> {
        let prepared = self.prepare(record, options.merge);

        if options.wait {
            let saved = self.scrub(self.persist(&prepared)?);
            let event = self.upsert(None, saved.clone());
            self.emit_all(event);
            return Ok(saved);
        }

        let previous = prepared.id().and_then(|id| self.get(id));
        let cid = self.allocate_cid();
        let optimistic = self.upsert(Some(cid), self.scrub(prepared.clone()));
        let cid = self.cid_of(prepared.id()).unwrap_or(cid);
        self.emit_all(optimistic);

        match self.persist(&prepared) {
            Ok(saved) => {
                let saved = self.scrub(saved);
                let event = self.replace_entry(cid, saved.clone());
                self.emit_all(event);
                Ok(saved)
            }
            Err(err) => {
                let event = match previous {
                    Some(previous) => self.replace_entry(cid, previous),
                    None => self.remove_entry(cid),
                };
                debug!(
                    "event=collection_create module=collection status=reverted scope={}",
                    self.scope
                );
                self.emit_all(event);
                Err(err)
            }
        }
    }

    /// Destroys one record remotely, then removes it locally.
    ///
    /// Fails with `RepoError::NotFound` when the record is not in this
    /// collection; the repository is not called in that case.
    pub fn destroy(&self, object_id: &str) -> RepoResult<()> {
        let Some(cid) = self.cid_of(Some(object_id)) else {
            warn!(
                "event=collection_destroy module=collection status=error scope={} object_id={} error_code=not_found",
                self.scope, object_id
            );
            return Err(RepoError::NotFound {
                scope: self.scope.to_string(),
                object_id: object_id.to_string(),
            });
        };

        self.repo.destroy(&self.scope, object_id)?;
        let event = self.remove_entry(cid);
        info!(
            "event=collection_destroy module=collection status=ok scope={} object_id={}",
            self.scope, object_id
        );
        self.emit_all(event);
        Ok(())
    }

    fn prepare(&self, record: Record, merge: bool) -> Record {
        if !merge {
            return record;
        }
        match record.id().and_then(|id| self.get(id)) {
            Some(mut existing) => {
                existing.merge_from(&record);
                existing
            }
            None => record,
        }
    }

    /// Drops the scope's private fields from a record headed for local state.
    fn scrub(&self, mut record: Record) -> Record {
        for field in self.scope.private_fields() {
            record.attributes.remove(*field);
        }
        record
    }

    fn persist(&self, record: &Record) -> RepoResult<Record> {
        self.repo.save(&self.scope, record).map_err(|err| {
            error!(
                "event=collection_create module=collection status=error scope={} error={}",
                self.scope, err
            );
            err
        })
    }

    fn reconcile(&self, incoming: Vec<Record>) -> Vec<ChangeEvent> {
        let mut entries = self.entries.borrow_mut();
        let incoming_ids: HashSet<String> = incoming
            .iter()
            .filter_map(|record| record.object_id.clone())
            .collect();

        let mut removed = Vec::new();
        entries.retain(|entry| match entry.record.id() {
            Some(id) if incoming_ids.contains(id) => true,
            Some(id) => {
                removed.push(self.event(ChangeKind::Removed, Some(id)));
                false
            }
            // Unsaved optimistic entries are not the repository's to remove.
            None => true,
        });

        let mut mutated = Vec::new();
        let mut added = Vec::new();
        for record in incoming {
            let Some(id) = record.object_id.clone() else {
                warn!(
                    "event=collection_fetch module=collection status=skip scope={} reason=missing_object_id",
                    self.scope
                );
                continue;
            };
            match entries
                .iter_mut()
                .find(|entry| entry.record.id() == Some(id.as_str()))
            {
                Some(entry) => {
                    let mut merged = entry.record.clone();
                    merged.merge_from(&record);
                    if merged != entry.record {
                        entry.record = merged;
                        mutated.push(self.event(ChangeKind::Mutated, Some(id.as_str())));
                    }
                }
                None => {
                    let cid = self.allocate_cid();
                    entries.push(Entry { cid, record });
                    added.push(self.event(ChangeKind::Added, Some(id.as_str())));
                }
            }
        }

        removed.into_iter().chain(mutated).chain(added).collect()
    }

    /// Inserts or replaces by `objectId`. A new entry takes `cid` when given.
    fn upsert(&self, cid: Option<u64>, record: Record) -> Option<ChangeEvent> {
        let mut entries = self.entries.borrow_mut();
        if let Some(id) = record.id() {
            if let Some(entry) = entries
                .iter_mut()
                .find(|entry| entry.record.id() == Some(id))
            {
                if entry.record == record {
                    return None;
                }
                let event = self.event(ChangeKind::Mutated, Some(id));
                entry.record = record;
                return Some(event);
            }
        }

        let event = self.event(ChangeKind::Added, record.id());
        let cid = cid.unwrap_or_else(|| self.allocate_cid());
        entries.push(Entry { cid, record });
        Some(event)
    }

    fn replace_entry(&self, cid: u64, record: Record) -> Option<ChangeEvent> {
        let mut entries = self.entries.borrow_mut();
        let entry = entries.iter_mut().find(|entry| entry.cid == cid)?;
        if entry.record == record {
            return None;
        }
        let event = self.event(ChangeKind::Mutated, record.id());
        entry.record = record;
        Some(event)
    }

    fn remove_entry(&self, cid: u64) -> Option<ChangeEvent> {
        let mut entries = self.entries.borrow_mut();
        let index = entries.iter().position(|entry| entry.cid == cid)?;
        let entry = entries.remove(index);
        Some(self.event(ChangeKind::Removed, entry.record.id()))
    }

    fn cid_of(&self, object_id: Option<&str>) -> Option<u64> {
        let object_id = object_id?;
        self.entries
            .borrow()
            .iter()
            .find(|entry| entry.record.id() == Some(object_id))
            .map(|entry| entry.cid)
    }

    fn allocate_cid(&self) -> u64 {
        let cid = self.next_cid.get();
        self.next_cid.set(cid + 1);
        cid
    }

    fn event(&self, change: ChangeKind, object_id: Option<&str>) -> ChangeEvent {
        ChangeEvent::new(
            self.scope.source_kind(),
            self.scope.key().map(str::to_string),
            change,
            object_id.map(str::to_string),
        )
    }

    fn emit_all(&self, events: impl IntoIterator<Item = ChangeEvent>) {
        for event in events {
            self.events.emit(&event);
        }
    }
}
