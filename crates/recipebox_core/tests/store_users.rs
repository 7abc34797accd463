use recipebox_core::{
    ChangeKind, CollectionScope, Record, RecordRepository, RepoError, RepoResult, SaveOptions,
    SqliteBackend, Store, StoreError,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Record repository that can be switched to fail every save.
struct FlakyRecords {
    inner: SqliteBackend,
    failing: Cell<bool>,
}

impl RecordRepository for FlakyRecords {
    fn fetch_all(&self, scope: &CollectionScope) -> RepoResult<Vec<Record>> {
        self.inner.fetch_all(scope)
    }

    fn save(&self, scope: &CollectionScope, record: &Record) -> RepoResult<Record> {
        if self.failing.get() {
            return Err(RepoError::Unavailable("network down".to_string()));
        }
        self.inner.save(scope, record)
    }

    fn destroy(&self, scope: &CollectionScope, object_id: &str) -> RepoResult<()> {
        self.inner.destroy(scope, object_id)
    }
}

fn flaky_store() -> (Store, Rc<FlakyRecords>) {
    let records = Rc::new(FlakyRecords {
        inner: SqliteBackend::open_in_memory().unwrap(),
        failing: Cell::new(false),
    });
    let sessions = Rc::new(SqliteBackend::open_in_memory().unwrap());
    let store = Store::new(Rc::clone(&records) as Rc<dyn RecordRepository>, sessions).unwrap();
    (store, records)
}

fn new_user(username: &str) -> Record {
    Record::new()
        .set("username", username)
        .set("password", "hunter22")
        .set("displayName", "Chef")
}

fn assert_no_credentials(record: &Record) {
    assert!(record.get("password").is_none(), "password leaked: {record:?}");
    assert!(
        record.get("sessionToken").is_none(),
        "session token leaked: {record:?}"
    );
}

#[test]
fn optimistic_user_save_never_exposes_credentials() {
    let backend = Rc::new(SqliteBackend::open_in_memory().unwrap());
    let store = Rc::new(Store::with_backend(backend).unwrap());
    let snapshots = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&snapshots);
    let observed = Rc::downgrade(&store);
    let _token = store.subscribe(move |_| {
        if let Some(store) = observed.upgrade() {
            let users = serde_json::to_value(store.users()).unwrap();
            sink.borrow_mut().push(users);
        }
    });

    let saved = store
        .save_user(
            Record::new().set("username", "chef").set("password", "hunter22"),
            SaveOptions::default(),
        )
        .unwrap();

    assert_eq!(snapshots.borrow().len(), 2);
    for snapshot in snapshots.borrow().iter() {
        let text = snapshot.to_string();
        assert!(text.contains("chef"));
        assert!(!text.contains("hunter22"));
        assert!(!text.contains("sessionToken"));
    }
    assert_no_credentials(&saved);
    let users = store.users();
    assert_eq!(users.len(), 1);
    assert_no_credentials(&users[0]);
    assert_eq!(users[0].id(), saved.id());
}

#[test]
fn saving_onto_a_cached_user_merges_fields() {
    let (store, records) = flaky_store();
    let seeded = records
        .inner
        .save(&CollectionScope::Users, &new_user("chef"))
        .unwrap();
    let user_id = seeded.id().unwrap();
    store.refresh_users().unwrap();

    let saved = store
        .save_user(
            Record::with_id(user_id).set("displayName", "Head chef"),
            SaveOptions {
                merge: false,
                wait: true,
            },
        )
        .unwrap();

    assert_eq!(saved.get_str("username"), Some("chef"));
    assert_eq!(saved.get_str("displayName"), Some("Head chef"));
    assert_eq!(store.get_user(user_id).ready(), Some(saved));

    let persisted = records.inner.fetch_all(&CollectionScope::Users).unwrap();
    assert_eq!(persisted[0].get_str("username"), Some("chef"));
}

#[test]
fn failed_optimistic_user_save_is_reverted() {
    let (store, records) = flaky_store();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let _token = store.subscribe(move |event| sink.borrow_mut().push(event.change));
    records.failing.set(true);

    let err = store
        .save_user(new_user("chef"), SaveOptions::default())
        .unwrap_err();

    assert!(matches!(err, StoreError::Source(RepoError::Unavailable(_))));
    assert!(store.users().is_empty());
    assert_eq!(*seen.borrow(), vec![ChangeKind::Added, ChangeKind::Removed]);
}

#[test]
fn failed_optimistic_user_update_restores_the_previous_record() {
    let (store, records) = flaky_store();
    let seeded = records
        .inner
        .save(&CollectionScope::Users, &new_user("chef"))
        .unwrap();
    let user_id = seeded.id().unwrap();
    store.refresh_users().unwrap();
    let before = store.get_user(user_id).ready().unwrap();
    records.failing.set(true);

    store
        .save_user(
            Record::with_id(user_id).set("displayName", "Line cook"),
            SaveOptions::default(),
        )
        .unwrap_err();

    assert_eq!(store.get_user(user_id).ready(), Some(before));
}

#[test]
fn rejected_user_save_surfaces_the_repository_error() {
    let (store, _records) = flaky_store();

    let err = store
        .save_user(
            Record::new().set("username", "chef"),
            SaveOptions::default().with_wait(true),
        )
        .unwrap_err();

    assert!(matches!(err, StoreError::Source(RepoError::Rejected(_))));
    assert!(store.users().is_empty());
}
