//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose the recipe store to Dart via FRB as sync calls.
//! - Carry records and sessions across the boundary as JSON strings.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - One store per UI thread; it opens lazily from the environment unless
//!   `store_open` picked a database first.
//! - The UI polls `store_change_sequence` instead of holding a listener.

use log::warn;
use recipebox_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    Attributes, Credentials, Record, SaveOptions, Store, StoreConfig,
};
use serde::Serialize;
use std::cell::RefCell;
use std::path::PathBuf;

thread_local! {
    static STORE: RefCell<Option<Store>> = const { RefCell::new(None) };
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir`.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Result of a store command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreActionResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Id of the record the command produced or touched.
    pub object_id: Option<String>,
    /// Human-readable message for diagnostics/UI.
    pub message: String,
}

impl StoreActionResponse {
    fn success(message: impl Into<String>, object_id: Option<String>) -> Self {
        Self {
            ok: true,
            object_id,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            object_id: None,
            message: message.into(),
        }
    }
}

/// Result of a store read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReadResponse {
    pub ok: bool,
    /// `false` when the value is a `{}` placeholder; re-read after the
    /// change sequence moves.
    pub ready: bool,
    /// JSON payload; `{}` or `[]` when nothing could be read.
    pub json: String,
    pub message: String,
}

impl StoreReadResponse {
    fn ready(value: &impl Serialize) -> Self {
        match serde_json::to_string(value) {
            Ok(json) => Self {
                ok: true,
                ready: true,
                json,
                message: String::new(),
            },
            Err(err) => Self::failure(format!("encode failed: {err}")),
        }
    }

    fn pending() -> Self {
        Self {
            ok: true,
            ready: false,
            json: "{}".to_string(),
            message: "Loading.".to_string(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            ready: false,
            json: "{}".to_string(),
            message: message.into(),
        }
    }
}

/// Opens the store of this thread on `db_path` (`:memory:` for scratch use),
/// replacing any store opened before.
#[flutter_rust_bridge::frb(sync)]
pub fn store_open(db_path: String) -> StoreActionResponse {
    let db_path = db_path.trim();
    if db_path.is_empty() {
        return StoreActionResponse::failure("store_open failed: db_path cannot be empty");
    }
    let config = StoreConfig {
        db_path: PathBuf::from(db_path),
        ..StoreConfig::default()
    };
    match Store::open(&config) {
        Ok(store) => {
            STORE.with(|cell| *cell.borrow_mut() = Some(store));
            StoreActionResponse::success("Store opened.", None)
        }
        Err(err) => action_failure("store_open", err),
    }
}

/// Number of `changed` events so far; a new value means re-read.
#[flutter_rust_bridge::frb(sync)]
pub fn store_change_sequence() -> u64 {
    with_store(Store::change_sequence).unwrap_or(0)
}

/// Runs refreshes queued by placeholder reads.
#[flutter_rust_bridge::frb(sync)]
pub fn store_run_pending() -> StoreActionResponse {
    match with_store(Store::run_pending_tasks) {
        Ok(report) if report.is_clean() => {
            StoreActionResponse::success(format!("Ran {} task(s).", report.ran()), None)
        }
        Ok(report) => {
            let errors = report
                .failed
                .iter()
                .map(|(task, err)| format!("{}: {err}", task.as_str()))
                .collect::<Vec<_>>()
                .join("; ");
            StoreActionResponse::failure(format!("store_run_pending failed: {errors}"))
        }
        Err(err) => StoreActionResponse::failure(err),
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn recipes_list() -> StoreReadResponse {
    read("recipes_list", |store| Ok(StoreReadResponse::ready(&store.recipes())))
}

#[flutter_rust_bridge::frb(sync)]
pub fn recipes_refresh() -> StoreActionResponse {
    act("recipes_refresh", |store| {
        store.refresh_recipes()?;
        Ok(StoreActionResponse::success("Recipes refreshed.", None))
    })
}

/// Reads one recipe; a miss answers `ready=false` and queues a refresh.
#[flutter_rust_bridge::frb(sync)]
pub fn recipe_get(object_id: String) -> StoreReadResponse {
    read("recipe_get", |store| {
        Ok(match store.get_recipe(object_id.as_str()).ready() {
            Some(recipe) => StoreReadResponse::ready(&recipe),
            None => StoreReadResponse::pending(),
        })
    })
}

/// Saves a recipe from its JSON object form.
///
/// `wait=false` shows the change before it is persisted.
#[flutter_rust_bridge::frb(sync)]
pub fn recipe_save(json: String, wait: bool) -> StoreActionResponse {
    let record = match parse_record(json.as_str()) {
        Ok(record) => record,
        Err(err) => return StoreActionResponse::failure(format!("recipe_save failed: {err}")),
    };
    act("recipe_save", |store| {
        let saved = store.save_recipe(record, SaveOptions::merge().with_wait(wait))?;
        Ok(StoreActionResponse::success(
            "Recipe saved.",
            saved.object_id,
        ))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn recipe_destroy(object_id: String) -> StoreActionResponse {
    act("recipe_destroy", |store| {
        store.destroy_recipe(&Record::with_id(object_id.trim()))?;
        Ok(StoreActionResponse::success(
            "Recipe deleted.",
            Some(object_id.trim().to_string()),
        ))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn users_list() -> StoreReadResponse {
    read("users_list", |store| Ok(StoreReadResponse::ready(&store.users())))
}

#[flutter_rust_bridge::frb(sync)]
pub fn users_refresh() -> StoreActionResponse {
    act("users_refresh", |store| {
        store.refresh_users()?;
        Ok(StoreActionResponse::success("Users refreshed.", None))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn user_get(object_id: String) -> StoreReadResponse {
    read("user_get", |store| {
        Ok(match store.get_user(object_id.as_str()).ready() {
            Some(user) => StoreReadResponse::ready(&user),
            None => StoreReadResponse::pending(),
        })
    })
}

/// Saves a user from its JSON object form, merging into the cached user.
///
/// A `password` field is forwarded once and never listed back.
#[flutter_rust_bridge::frb(sync)]
pub fn user_save(json: String, wait: bool) -> StoreActionResponse {
    let record = match parse_record(json.as_str()) {
        Ok(record) => record,
        Err(err) => return StoreActionResponse::failure(format!("user_save failed: {err}")),
    };
    act("user_save", |store| {
        let saved = store.save_user(record, SaveOptions::merge().with_wait(wait))?;
        Ok(StoreActionResponse::success("User saved.", saved.object_id))
    })
}

/// Signs a user up from a JSON object with `username` and `password`, then
/// signs in. Returns the new user id.
#[flutter_rust_bridge::frb(sync)]
pub fn user_sign_up(json: String) -> StoreActionResponse {
    let attributes = match serde_json::from_str::<Attributes>(json.as_str()) {
        Ok(attributes) => attributes,
        Err(err) => return StoreActionResponse::failure(format!("user_sign_up failed: {err}")),
    };
    act("user_sign_up", |store| {
        let session = store.create_user(attributes)?;
        Ok(StoreActionResponse::success(
            "Signed up.",
            session.current_user_id().map(str::to_string),
        ))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn session_get() -> StoreReadResponse {
    read("session_get", |store| Ok(StoreReadResponse::ready(&store.session())))
}

#[flutter_rust_bridge::frb(sync)]
pub fn session_sign_in(username: String, password: String) -> StoreActionResponse {
    let credentials = Credentials::password(username.trim(), password);
    sign_in("session_sign_in", &credentials)
}

#[flutter_rust_bridge::frb(sync)]
pub fn session_sign_in_with_token(session_token: String) -> StoreActionResponse {
    let credentials = Credentials::session_token(session_token.trim());
    sign_in("session_sign_in_with_token", &credentials)
}

#[flutter_rust_bridge::frb(sync)]
pub fn session_sign_out() -> StoreActionResponse {
    act("session_sign_out", |store| {
        store.invalidate_session()?;
        Ok(StoreActionResponse::success("Signed out.", None))
    })
}

/// Restores the session persisted by an earlier run, if any.
#[flutter_rust_bridge::frb(sync)]
pub fn session_restore() -> StoreActionResponse {
    act("session_restore", |store| {
        let session = store.restore_session()?;
        let message = if session.is_authenticated() {
            "Session restored."
        } else {
            "No saved session."
        };
        Ok(StoreActionResponse::success(
            message,
            session.current_user_id().map(str::to_string),
        ))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn comments_list(recipe_id: String) -> StoreReadResponse {
    read("comments_list", |store| {
        Ok(StoreReadResponse::ready(
            &store.comments_for_recipe(recipe_id.as_str())?,
        ))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn comments_fetch(recipe_id: String) -> StoreActionResponse {
    act("comments_fetch", |store| {
        store.fetch_comments_for_recipe(recipe_id.as_str())?;
        Ok(StoreActionResponse::success("Comments refreshed.", None))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn comment_create(recipe_id: String, text: String) -> StoreActionResponse {
    act("comment_create", |store| {
        let saved = store.comment_on_recipe(recipe_id.as_str(), text.trim())?;
        Ok(StoreActionResponse::success("Comment posted.", saved.object_id))
    })
}

fn sign_in(call: &str, credentials: &Credentials) -> StoreActionResponse {
    act(call, |store| {
        let session = store.authenticate_session(credentials)?;
        Ok(StoreActionResponse::success(
            "Signed in.",
            session.current_user_id().map(str::to_string),
        ))
    })
}

fn parse_record(json: &str) -> Result<Record, String> {
    serde_json::from_str::<Attributes>(json)
        .map(Record::from_attributes)
        .map_err(|err| format!("invalid record JSON: {err}"))
}

fn with_store<T>(f: impl FnOnce(&Store) -> T) -> Result<T, String> {
    STORE.with(|cell| {
        if cell.borrow().is_none() {
            let config = StoreConfig::from_env().map_err(|err| err.to_string())?;
            let store = Store::open(&config).map_err(|err| format!("store open failed: {err}"))?;
            *cell.borrow_mut() = Some(store);
        }
        let slot = cell.borrow();
        slot.as_ref()
            .map(f)
            .ok_or_else(|| "store unavailable".to_string())
    })
}

fn act(
    call: &str,
    f: impl FnOnce(&Store) -> recipebox_core::StoreResult<StoreActionResponse>,
) -> StoreActionResponse {
    match with_store(f) {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => action_failure(call, err),
        Err(err) => action_failure(call, err),
    }
}

fn read(
    call: &str,
    f: impl FnOnce(&Store) -> recipebox_core::StoreResult<StoreReadResponse>,
) -> StoreReadResponse {
    match with_store(f) {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => StoreReadResponse::failure(logged_failure(call, err)),
        Err(err) => StoreReadResponse::failure(logged_failure(call, err)),
    }
}

fn action_failure(call: &str, err: impl std::fmt::Display) -> StoreActionResponse {
    StoreActionResponse::failure(logged_failure(call, err))
}

fn logged_failure(call: &str, err: impl std::fmt::Display) -> String {
    warn!("event=ffi_call module=ffi status=error call={call} error={err}");
    format!("{call} failed: {err}")
}
