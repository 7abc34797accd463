use recipebox_core::{
    Attributes, ChangeKind, CollectionScope, Credentials, RecordRepository, RepoError, RepoResult,
    SessionData, SessionRepository, SourceKind, SqliteBackend, Store, StoreConfig, StoreError,
};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

fn setup() -> (Store, Rc<SqliteBackend>) {
    let backend = Rc::new(SqliteBackend::open_in_memory().unwrap());
    let store = Store::with_backend(Rc::clone(&backend)).unwrap();
    (store, backend)
}

fn sign_up(username: &str, password: &str) -> Attributes {
    json!({ "username": username, "password": password, "displayName": "Chef" })
        .as_object()
        .unwrap()
        .clone()
}

/// Session repository that refuses every sign-in.
struct LockedSessions;

impl SessionRepository for LockedSessions {
    fn authenticate(&self, _credentials: &Credentials) -> RepoResult<SessionData> {
        Err(RepoError::Unavailable("auth service down".to_string()))
    }

    fn invalidate(&self, _session_token: &str) -> RepoResult<()> {
        Ok(())
    }

    fn restore(&self) -> RepoResult<Option<SessionData>> {
        Ok(None)
    }
}

#[test]
fn sign_up_then_sign_in_exposes_the_new_user_in_one_change() {
    let (store, _backend) = setup();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let _token = store.subscribe(move |event| sink.borrow_mut().push(event.clone()));

    let session = store.create_user(sign_up("chef", "hunter22")).unwrap();

    assert!(session.is_authenticated());
    let user = session.current_user.as_ref().unwrap();
    assert_eq!(user.get_str("username"), Some("chef"));
    assert!(user.get("password").is_none());
    assert_eq!(store.session(), session);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].source, SourceKind::Session);
    assert_eq!(seen[0].change, ChangeKind::Mutated);
    assert!(store.users().is_empty(), "sign-up bypasses the user collection");
}

#[test]
fn rejected_sign_up_leaves_the_session_untouched() {
    let (store, _backend) = setup();
    store.create_user(sign_up("chef", "hunter22")).unwrap();
    let before = store.session();

    let err = store.create_user(sign_up("chef", "other-pass")).unwrap_err();
    assert!(matches!(err, StoreError::Source(RepoError::Rejected(_))));

    let err = store.create_user(sign_up("x", "hunter22")).unwrap_err();
    assert!(matches!(err, StoreError::Source(RepoError::Rejected(_))));
    assert_eq!(store.session(), before);
}

#[test]
fn failed_sign_in_after_sign_up_names_the_saved_user() {
    let records = Rc::new(SqliteBackend::open_in_memory().unwrap());
    let store = Store::new(
        Rc::clone(&records) as Rc<dyn RecordRepository>,
        Rc::new(LockedSessions),
    )
    .unwrap();

    let err = store.create_user(sign_up("chef", "hunter22")).unwrap_err();
    let user_id = match err {
        StoreError::SignInAfterSignUp { user_id, source } => {
            assert!(matches!(source, RepoError::Unavailable(_)));
            user_id
        }
        other => panic!("unexpected error: {other}"),
    };

    let users = records.fetch_all(&CollectionScope::Users).unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id(), Some(user_id.as_str()));
    assert!(!store.session().is_authenticated());
}

#[test]
fn wrong_password_is_unauthorized() {
    let (store, _backend) = setup();
    store.create_user(sign_up("chef", "hunter22")).unwrap();
    store.invalidate_session().unwrap();

    let err = store
        .authenticate_session(&Credentials::password("chef", "wrong"))
        .unwrap_err();
    assert!(matches!(err, StoreError::Source(RepoError::Unauthorized(_))));
    assert!(!store.session().is_authenticated());

    let session = store
        .authenticate_session(&Credentials::password("chef", "hunter22"))
        .unwrap();
    assert_eq!(session.current_user_id(), store.session().current_user_id());
}

#[test]
fn invalidated_tokens_cannot_sign_in_again() {
    let (store, _backend) = setup();
    let session = store.create_user(sign_up("chef", "hunter22")).unwrap();
    let token = session.session_token.clone().unwrap();

    store.invalidate_session().unwrap();
    assert_eq!(store.session(), SessionData::default());
    store.invalidate_session().unwrap();

    let err = store
        .authenticate_session(&Credentials::session_token(token))
        .unwrap_err();
    assert!(matches!(err, StoreError::Source(RepoError::Unauthorized(_))));
}

#[test]
fn signing_out_after_revocation_elsewhere_clears_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        db_path: dir.path().join("recipebox.db"),
        ..StoreConfig::default()
    };
    let here = Store::open(&config).unwrap();
    here.create_user(sign_up("chef", "hunter22")).unwrap();

    let elsewhere = Store::open(&config).unwrap();
    assert!(elsewhere.restore_session().unwrap().is_authenticated());
    elsewhere.invalidate_session().unwrap();

    here.invalidate_session().unwrap();
    assert_eq!(here.session(), SessionData::default());
}

#[test]
fn session_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        db_path: dir.path().join("recipebox.db"),
        ..StoreConfig::default()
    };

    let first = Store::open(&config).unwrap();
    let created = first.create_user(sign_up("chef", "hunter22")).unwrap();
    drop(first);

    let second = Store::open(&config).unwrap();
    assert!(!second.session().is_authenticated());
    let restored = second.restore_session().unwrap();
    assert_eq!(restored.session_token, created.session_token);
    assert_eq!(restored.current_user_id(), created.current_user_id());

    second.invalidate_session().unwrap();
    drop(second);

    let third = Store::open(&config).unwrap();
    assert_eq!(third.restore_session().unwrap(), SessionData::default());
}
