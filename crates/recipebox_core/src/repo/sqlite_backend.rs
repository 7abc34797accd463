//! SQLite implementation of the record and session repositories.
//!
//! # Responsibility
//! - Persist records of every scope as JSON attribute blobs.
//! - Own user credentials and session tokens for authentication.
//!
//! # Invariants
//! - Saving a new user requires a valid `username` and a non-empty
//!   `password`; the password never lands in `records`.
//! - `createdAt` is stamped once; `updatedAt` is stamped on every save.
//! - Destroying a recipe also destroys its comments; destroying a user
//!   revokes all of the user's sessions.

use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::model::record::{Attributes, Record};
use crate::model::session::{Credentials, SessionData};
use crate::repo::record_repo::{
    CollectionScope, RecordRepository, RepoError, RepoResult, PASSWORD_FIELD,
};
use crate::repo::session_repo::SessionRepository;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]{3,32}$").expect("valid username regex"));

pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";
pub use crate::repo::record_repo::SESSION_TOKEN_FIELD;
const USERNAME_FIELD: &str = "username";
const CURRENT_SESSION_SLOT: i64 = 1;

/// Record and session backend over one SQLite connection.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Wraps an already-migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl RecordRepository for SqliteBackend {
    fn fetch_all(&self, scope: &CollectionScope) -> RepoResult<Vec<Record>> {
        let mut stmt = self.conn.prepare(
            "SELECT object_id, attributes
             FROM records
             WHERE scope = ?1 AND parent_key = ?2
             ORDER BY created_at ASC, rowid ASC;",
        )?;
        let rows = stmt.query_map(params![scope.name(), parent_key(scope)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (object_id, raw) = row?;
            records.push(decode_record(object_id, raw.as_str())?);
        }
        Ok(records)
    }

    fn save(&self, scope: &CollectionScope, record: &Record) -> RepoResult<Record> {
        let tx = self.conn.unchecked_transaction()?;
        let now = now_epoch_ms();
        let object_id = match record.id() {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => Uuid::new_v4().simple().to_string(),
        };

        let existing_created_at: Option<i64> = tx
            .query_row(
                "SELECT created_at FROM records WHERE scope = ?1 AND object_id = ?2;",
                params![scope.name(), object_id],
                |row| row.get(0),
            )
            .optional()?;
        let is_new = existing_created_at.is_none();

        let mut attributes = record.attributes.clone();
        attributes.remove(SESSION_TOKEN_FIELD);
        let session_token = if *scope == CollectionScope::Users {
            let password = take_password(&mut attributes)?;
            save_credentials(&tx, object_id.as_str(), &attributes, password, is_new, now)?
        } else {
            None
        };

        let created_at = existing_created_at.unwrap_or(now);
        attributes.insert(CREATED_AT_FIELD.to_string(), Value::from(created_at));
        attributes.insert(UPDATED_AT_FIELD.to_string(), Value::from(now));
        let encoded = serde_json::to_string(&attributes)
            .map_err(|err| RepoError::InvalidData(format!("record {object_id}: {err}")))?;

        tx.execute(
            "INSERT INTO records (scope, parent_key, object_id, attributes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (scope, object_id) DO UPDATE SET
                parent_key = excluded.parent_key,
                attributes = excluded.attributes,
                updated_at = excluded.updated_at;",
            params![
                scope.name(),
                parent_key(scope),
                object_id,
                encoded,
                created_at,
                now
            ],
        )?;
        tx.commit()?;

        info!(
            "event=record_save module=repo status=ok scope={} object_id={} created={}",
            scope.name(),
            object_id,
            is_new
        );

        let mut saved = Record {
            object_id: Some(object_id),
            attributes,
        };
        if let Some(token) = session_token {
            saved.insert(SESSION_TOKEN_FIELD, token);
        }
        Ok(saved)
    }

    fn destroy(&self, scope: &CollectionScope, object_id: &str) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute(
            "DELETE FROM records WHERE scope = ?1 AND parent_key = ?2 AND object_id = ?3;",
            params![scope.name(), parent_key(scope), object_id],
        )?;
        if removed == 0 {
            return Err(RepoError::NotFound {
                scope: scope.to_string(),
                object_id: object_id.to_string(),
            });
        }

        match scope {
            CollectionScope::Recipes => {
                tx.execute(
                    "DELETE FROM records WHERE scope = 'comments' AND parent_key = ?1;",
                    [object_id],
                )?;
            }
            CollectionScope::Users => {
                tx.execute(
                    "DELETE FROM user_credentials WHERE user_id = ?1;",
                    [object_id],
                )?;
            }
            CollectionScope::Comments { .. } => {}
        }
        tx.commit()?;

        info!(
            "event=record_destroy module=repo status=ok scope={} object_id={}",
            scope.name(),
            object_id
        );
        Ok(())
    }
}

impl SessionRepository for SqliteBackend {
    fn authenticate(&self, credentials: &Credentials) -> RepoResult<SessionData> {
        let tx = self.conn.unchecked_transaction()?;
        let (user_id, token) = match credentials {
            Credentials::Password { username, password } => {
                let stored: Option<(String, String, String)> = tx
                    .query_row(
                        "SELECT user_id, password_salt, password_hash
                         FROM user_credentials
                         WHERE username = ?1;",
                        [username.trim()],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?;
                let Some((user_id, salt, hash)) = stored else {
                    return Err(invalid_login(credentials));
                };
                if hash_password(salt.as_str(), password.as_str()) != hash {
                    return Err(invalid_login(credentials));
                }
                let token = issue_session(&tx, user_id.as_str(), now_epoch_ms())?;
                (user_id, token)
            }
            Credentials::SessionToken(token) => {
                let user_id: Option<String> = tx
                    .query_row(
                        "SELECT user_id FROM sessions WHERE token = ?1;",
                        [token.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(user_id) = user_id else {
                    return Err(invalid_login(credentials));
                };
                (user_id, token.clone())
            }
        };

        let user = load_user(&tx, user_id.as_str())?;
        tx.execute(
            "INSERT INTO current_session (slot, token) VALUES (?1, ?2)
             ON CONFLICT (slot) DO UPDATE SET token = excluded.token;",
            params![CURRENT_SESSION_SLOT, token],
        )?;
        tx.commit()?;

        info!(
            "event=session_authenticate module=repo status=ok method={} user_id={}",
            credentials.method(),
            user_id
        );
        Ok(SessionData::new(token, user))
    }

    fn invalidate(&self, session_token: &str) -> RepoResult<()> {
        let removed = self
            .conn
            .execute("DELETE FROM sessions WHERE token = ?1;", [session_token])?;
        if removed == 0 {
            return Err(RepoError::Unauthorized("invalid session token".to_string()));
        }
        info!("event=session_invalidate module=repo status=ok");
        Ok(())
    }

    fn restore(&self) -> RepoResult<Option<SessionData>> {
        let current: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT current_session.token, sessions.user_id
                 FROM current_session
                 JOIN sessions ON sessions.token = current_session.token
                 WHERE current_session.slot = ?1;",
                [CURRENT_SESSION_SLOT],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((token, user_id)) = current else {
            return Ok(None);
        };

        let user = load_user(&self.conn, user_id.as_str())?;
        Ok(Some(SessionData::new(token, user)))
    }
}

fn parent_key(scope: &CollectionScope) -> &str {
    scope.key().unwrap_or("")
}

fn decode_record(object_id: String, raw: &str) -> RepoResult<Record> {
    let attributes: Attributes = serde_json::from_str(raw)
        .map_err(|err| RepoError::InvalidData(format!("record {object_id}: {err}")))?;
    Ok(Record {
        object_id: Some(object_id),
        attributes,
    })
}

fn load_user(conn: &Connection, user_id: &str) -> RepoResult<Record> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT attributes FROM records WHERE scope = 'users' AND object_id = ?1;",
            [user_id],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(raw) => decode_record(user_id.to_string(), raw.as_str()),
        None => Err(RepoError::NotFound {
            scope: CollectionScope::Users.to_string(),
            object_id: user_id.to_string(),
        }),
    }
}

fn take_password(attributes: &mut Attributes) -> RepoResult<Option<String>> {
    match attributes.remove(PASSWORD_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(password)) if !password.is_empty() => Ok(Some(password)),
        Some(_) => Err(RepoError::Rejected(
            "password must be a non-empty string".to_string(),
        )),
    }
}

fn save_credentials(
    conn: &Connection,
    user_id: &str,
    attributes: &Attributes,
    password: Option<String>,
    is_new: bool,
    now: i64,
) -> RepoResult<Option<String>> {
    let username = attributes
        .get(USERNAME_FIELD)
        .and_then(Value::as_str)
        .map(str::trim);

    if is_new {
        let (Some(username), Some(password)) = (username, password) else {
            return Err(RepoError::Rejected(
                "new users require a username and password".to_string(),
            ));
        };
        ensure_username_available(conn, user_id, username)?;
        let salt = Uuid::new_v4().simple().to_string();
        conn.execute(
            "INSERT INTO user_credentials (user_id, username, password_salt, password_hash)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                user_id,
                username,
                salt,
                hash_password(salt.as_str(), password.as_str())
            ],
        )?;
        return issue_session(conn, user_id, now).map(Some);
    }

    if let Some(username) = username {
        ensure_username_available(conn, user_id, username)?;
        conn.execute(
            "UPDATE user_credentials SET username = ?1 WHERE user_id = ?2;",
            params![username, user_id],
        )?;
    }
    if let Some(password) = password {
        let salt = Uuid::new_v4().simple().to_string();
        conn.execute(
            "UPDATE user_credentials SET password_salt = ?1, password_hash = ?2 WHERE user_id = ?3;",
            params![
                salt,
                hash_password(salt.as_str(), password.as_str()),
                user_id
            ],
        )?;
    }
    Ok(None)
}

fn ensure_username_available(conn: &Connection, user_id: &str, username: &str) -> RepoResult<()> {
    if !USERNAME_RE.is_match(username) {
        return Err(RepoError::Rejected(format!("invalid username `{username}`")));
    }
    let taken: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM user_credentials WHERE username = ?1 AND user_id != ?2
        );",
        params![username, user_id],
        |row| row.get(0),
    )?;
    if taken {
        return Err(RepoError::Rejected(format!(
            "username `{username}` is already taken"
        )));
    }
    Ok(())
}

fn issue_session(conn: &Connection, user_id: &str, now: i64) -> RepoResult<String> {
    let token = format!("r:{}", Uuid::new_v4().simple());
    conn.execute(
        "INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3);",
        params![token, user_id, now],
    )?;
    Ok(token)
}

fn invalid_login(credentials: &Credentials) -> RepoError {
    warn!(
        "event=session_authenticate module=repo status=error method={} error_code=unauthorized",
        credentials.method()
    );
    let message = match credentials {
        Credentials::Password { .. } => "invalid username or password",
        Credentials::SessionToken(_) => "invalid session token",
    };
    RepoError::Unauthorized(message.to_string())
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::{hash_password, SqliteBackend, CREATED_AT_FIELD, SESSION_TOKEN_FIELD};
    use crate::model::record::Record;
    use crate::model::session::Credentials;
    use crate::repo::record_repo::{CollectionScope, RecordRepository, RepoError};
    use crate::repo::session_repo::SessionRepository;

    fn backend() -> SqliteBackend {
        SqliteBackend::open_in_memory().expect("in-memory backend")
    }

    fn new_user(username: &str) -> Record {
        Record::new()
            .set("username", username)
            .set("password", "correct horse")
    }

    #[test]
    fn save_assigns_identity_and_timestamps() {
        let backend = backend();
        let saved = backend
            .save(&CollectionScope::Recipes, &Record::new().set("title", "Soup"))
            .unwrap();

        assert!(saved.id().is_some());
        assert!(saved.get(CREATED_AT_FIELD).is_some());

        let fetched = backend.fetch_all(&CollectionScope::Recipes).unwrap();
        assert_eq!(fetched, vec![saved]);
    }

    #[test]
    fn resave_keeps_created_at() {
        let backend = backend();
        let first = backend
            .save(&CollectionScope::Recipes, &Record::with_id("r1").set("title", "Soup"))
            .unwrap();
        let second = backend
            .save(&CollectionScope::Recipes, &Record::with_id("r1").set("title", "Stew"))
            .unwrap();

        assert_eq!(first.get(CREATED_AT_FIELD), second.get(CREATED_AT_FIELD));
        assert_eq!(backend.fetch_all(&CollectionScope::Recipes).unwrap().len(), 1);
    }

    #[test]
    fn comments_are_partitioned_by_recipe() {
        let backend = backend();
        backend
            .save(&CollectionScope::comments("a"), &Record::comment("a", "one"))
            .unwrap();
        backend
            .save(&CollectionScope::comments("b"), &Record::comment("b", "two"))
            .unwrap();

        let for_a = backend.fetch_all(&CollectionScope::comments("a")).unwrap();
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].get_str("text"), Some("one"));
    }

    #[test]
    fn resaving_a_comment_under_another_recipe_moves_it() {
        let backend = backend();
        backend
            .save(&CollectionScope::comments("42"), &Record::with_id("c1").set("text", "salty"))
            .unwrap();
        backend
            .save(&CollectionScope::comments("7"), &Record::with_id("c1").set("text", "salty"))
            .unwrap();

        assert!(backend
            .fetch_all(&CollectionScope::comments("42"))
            .unwrap()
            .is_empty());
        let moved = backend.fetch_all(&CollectionScope::comments("7")).unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].id(), Some("c1"));
    }

    #[test]
    fn destroying_recipe_removes_its_comments() {
        let backend = backend();
        backend
            .save(&CollectionScope::Recipes, &Record::with_id("r1"))
            .unwrap();
        backend
            .save(&CollectionScope::comments("r1"), &Record::comment("r1", "nice"))
            .unwrap();

        backend.destroy(&CollectionScope::Recipes, "r1").unwrap();
        assert!(backend
            .fetch_all(&CollectionScope::comments("r1"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn destroy_missing_record_is_not_found() {
        let backend = backend();
        let err = backend
            .destroy(&CollectionScope::Recipes, "missing")
            .unwrap_err();
        assert!(matches!(err, RepoError::NotFound { object_id, .. } if object_id == "missing"));
    }

    #[test]
    fn new_user_gets_session_token_and_no_stored_password() {
        let backend = backend();
        let saved = backend
            .save(&CollectionScope::Users, &new_user("ana"))
            .unwrap();

        assert!(saved.get_str(SESSION_TOKEN_FIELD).unwrap().starts_with("r:"));
        assert!(saved.get("password").is_none());

        let stored = backend.fetch_all(&CollectionScope::Users).unwrap();
        assert!(stored[0].get("password").is_none());
        assert!(stored[0].get(SESSION_TOKEN_FIELD).is_none());
    }

    #[test]
    fn new_user_without_password_is_rejected() {
        let backend = backend();
        let err = backend
            .save(&CollectionScope::Users, &Record::new().set("username", "ana"))
            .unwrap_err();
        assert!(matches!(err, RepoError::Rejected(_)));
        assert!(backend.fetch_all(&CollectionScope::Users).unwrap().is_empty());
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let backend = backend();
        backend
            .save(&CollectionScope::Users, &new_user("ana"))
            .unwrap();
        let err = backend
            .save(&CollectionScope::Users, &new_user("ana"))
            .unwrap_err();
        assert!(err.to_string().contains("already taken"));
    }

    #[test]
    fn password_login_then_restore_then_invalidate() {
        let backend = backend();
        let user = backend
            .save(&CollectionScope::Users, &new_user("ana"))
            .unwrap();

        let session = backend
            .authenticate(&Credentials::password("ana", "correct horse"))
            .unwrap();
        assert_eq!(session.current_user_id(), user.id());

        let restored = backend.restore().unwrap().expect("persisted session");
        assert_eq!(restored, session);

        backend
            .invalidate(session.session_token.as_deref().unwrap())
            .unwrap();
        assert!(backend.restore().unwrap().is_none());
    }

    #[test]
    fn wrong_password_is_unauthorized() {
        let backend = backend();
        backend
            .save(&CollectionScope::Users, &new_user("ana"))
            .unwrap();
        let err = backend
            .authenticate(&Credentials::password("ana", "wrong"))
            .unwrap_err();
        assert!(matches!(err, RepoError::Unauthorized(_)));
    }

    #[test]
    fn unknown_session_token_is_unauthorized() {
        let backend = backend();
        let err = backend
            .authenticate(&Credentials::session_token("r:nope"))
            .unwrap_err();
        assert!(matches!(err, RepoError::Unauthorized(_)));
        assert!(backend.invalidate("r:nope").is_err());
    }

    #[test]
    fn password_hash_is_salted() {
        assert_ne!(hash_password("a", "pw"), hash_password("b", "pw"));
        assert_eq!(hash_password("a", "pw"), hash_password("a", "pw"));
    }
}
