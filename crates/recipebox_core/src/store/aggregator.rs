//! The store facade: one read/write surface and one change signal over
//! every source.
//!
//! # Responsibility
//! - Route UI operations to the session, recipe, user and comment sources.
//! - Forward every lifecycle event of every source as one `changed` event.
//! - Lazily create one comment collection per recipe id.
//!
//! # Invariants
//! - Each source has exactly one forwarding link to the store; comment
//!   collections are rebound on every access without ever holding two.
//! - `changed` fires once per source event, in source emission order.
//! - Writes and destroys on unknown ids fail with `NotFound`; reads on
//!   unknown ids return `Lookup::Pending` and queue one refresh.

use crate::config::StoreConfig;
use crate::model::record::{Attributes, Record};
use crate::model::session::{Credentials, SessionData};
use crate::repo::record_repo::{CollectionScope, RecordRepository, RepoError};
use crate::repo::session_repo::SessionRepository;
use crate::repo::sqlite_backend::{SqliteBackend, SESSION_TOKEN_FIELD};
use crate::source::collection::{ObservableCollection, SaveOptions};
use crate::source::event::{ChangeEvent, Emitter, SourceKind, SubscriptionToken};
use crate::source::session::ObservableSession;
use crate::store::cache::KeyedCacheManager;
use crate::store::error::{StoreError, StoreResult};
use crate::store::lookup::Lookup;
use crate::store::rebind::SubscriptionRebinder;
use crate::store::tasks::{BackgroundReport, BackgroundTask, TaskQueue};
use log::{debug, error, info, trace, warn};
use std::cell::Cell;
use std::rc::Rc;

/// Client-side state aggregator.
///
/// Construct one per process (or per UI thread) and pass it by reference.
pub struct Store {
    session: ObservableSession,
    recipes: ObservableCollection,
    users: ObservableCollection,
    comments: KeyedCacheManager<ObservableCollection>,
    records: Rc<dyn RecordRepository>,
    links: SubscriptionRebinder,
    changed: Rc<Emitter<ChangeEvent>>,
    change_sequence: Rc<Cell<u64>>,
    tasks: TaskQueue,
}

impl Store {
    /// Builds a store over the given repositories and links the static
    /// sources.
    pub fn new(
        records: Rc<dyn RecordRepository>,
        sessions: Rc<dyn SessionRepository>,
    ) -> StoreResult<Self> {
        let store = Self {
            session: ObservableSession::new(sessions),
            recipes: ObservableCollection::new(CollectionScope::Recipes, Rc::clone(&records)),
            users: ObservableCollection::new(CollectionScope::Users, Rc::clone(&records)),
            comments: KeyedCacheManager::new(SourceKind::Comments),
            records,
            links: SubscriptionRebinder::new(),
            changed: Rc::new(Emitter::new()),
            change_sequence: Rc::new(Cell::new(0)),
            tasks: TaskQueue::default(),
        };

        store.links.rebind(store.session.events(), store.forwarder())?;
        store.links.rebind(store.recipes.events(), store.forwarder())?;
        store.links.rebind(store.users.events(), store.forwarder())?;
        info!("event=store_init module=store status=ok");
        Ok(store)
    }

    /// Builds a store whose records and sessions both live in `backend`.
    pub fn with_backend(backend: Rc<SqliteBackend>) -> StoreResult<Self> {
        let records: Rc<dyn RecordRepository> = backend.clone();
        Self::new(records, backend)
    }

    /// Opens the SQLite backend at `config.db_path` and builds a store on it.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let backend = SqliteBackend::open(&config.db_path).map_err(|err| {
            error!(
                "event=store_open module=store status=error db_path={} error={}",
                config.db_path.display(),
                err
            );
            StoreError::Source(RepoError::Db(err))
        })?;
        Self::with_backend(Rc::new(backend))
    }

    // ---- change signal ----------------------------------------------------

    /// Attaches a `changed` listener.
    pub fn subscribe(&self, listener: impl Fn(&ChangeEvent) + 'static) -> SubscriptionToken {
        self.changed.subscribe(listener)
    }

    /// Detaches a `changed` listener; foreign tokens are handed back.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), SubscriptionToken> {
        self.changed.unsubscribe(token)
    }

    /// Number of `changed` events emitted so far.
    pub fn change_sequence(&self) -> u64 {
        self.change_sequence.get()
    }

    // ---- recipes ----------------------------------------------------------

    /// Last-known recipes. Never fetches.
    pub fn recipes(&self) -> Vec<Record> {
        self.recipes.to_plain_data()
    }

    pub fn refresh_recipes(&self) -> StoreResult<()> {
        self.recipes.fetch()?;
        Ok(())
    }

    /// Returns a cached recipe, or queues a refresh and returns `Pending`.
    pub fn get_recipe(&self, id: &str) -> Lookup<Record> {
        self.lookup(&self.recipes, id, BackgroundTask::RefreshRecipes)
    }

    /// Saves a recipe. Merging into a cached record with the same id is
    /// always on, whatever `options.merge` says.
    pub fn save_recipe(&self, recipe: Record, options: SaveOptions) -> StoreResult<Record> {
        let saved = self.recipes.create(
            recipe,
            SaveOptions {
                merge: true,
                ..options
            },
        )?;
        info!(
            "event=recipe_save module=store status=ok object_id={}",
            saved.id().unwrap_or_default()
        );
        Ok(saved)
    }

    /// Destroys a cached recipe.
    ///
    /// # Errors
    /// - `StoreError::MissingKey` when `recipe` has no `objectId`.
    /// - `StoreError::NotFound` when the id is not in the recipe cache.
    pub fn destroy_recipe(&self, recipe: &Record) -> StoreResult<()> {
        let id = self.require_cached(&self.recipes, recipe.id())?;
        self.recipes.destroy(id.as_str())?;
        info!("event=recipe_destroy module=store status=ok object_id={id}");
        Ok(())
    }

    // ---- session ----------------------------------------------------------

    pub fn session(&self) -> SessionData {
        self.session.to_plain_data()
    }

    pub fn authenticate_session(&self, credentials: &Credentials) -> StoreResult<SessionData> {
        Ok(self.session.authenticate(credentials)?)
    }

    pub fn invalidate_session(&self) -> StoreResult<()> {
        Ok(self.session.invalidate()?)
    }

    pub fn restore_session(&self) -> StoreResult<SessionData> {
        Ok(self.session.restore()?)
    }

    // ---- users ------------------------------------------------------------

    /// Signs a new user up, then signs in with the issued session token.
    ///
    /// The user is not added to the user collection; refresh it to see the
    /// new record there. The only observable change is the session's.
    ///
    /// # Errors
    /// - `StoreError::Source` when saving fails; no sign-in is attempted.
    /// - `StoreError::SignInAfterSignUp` when the user was saved but the
    ///   sign-in failed.
    pub fn create_user(&self, attributes: Attributes) -> StoreResult<SessionData> {
        let user = Record::from_attributes(attributes);
        let saved = self
            .records
            .save(&CollectionScope::Users, &user)
            .map_err(|err| {
                error!("event=user_create module=store status=error stage=save error={err}");
                StoreError::Source(err)
            })?;
        let user_id = saved.id().unwrap_or_default().to_string();

        let Some(token) = saved.get_str(SESSION_TOKEN_FIELD) else {
            return Err(StoreError::SignInAfterSignUp {
                user_id,
                source: RepoError::InvalidData("saved user carries no session token".to_string()),
            });
        };

        match self.session.authenticate(&Credentials::session_token(token)) {
            Ok(session) => {
                info!("event=user_create module=store status=ok user_id={user_id}");
                Ok(session)
            }
            Err(source) => {
                error!(
                    "event=user_create module=store status=error stage=sign_in user_id={user_id} error={source}"
                );
                Err(StoreError::SignInAfterSignUp { user_id, source })
            }
        }
    }

    /// Saves a user with merge forced on.
    ///
    /// A `password` is passed to the repository, but neither it nor an issued
    /// session token is cached, emitted or returned.
    pub fn save_user(&self, user: Record, options: SaveOptions) -> StoreResult<Record> {
        Ok(self.users.create(
            user,
            SaveOptions {
                merge: true,
                ..options
            },
        )?)
    }

    /// Last-known users. Never fetches.
    pub fn users(&self) -> Vec<Record> {
        self.users.to_plain_data()
    }

    pub fn refresh_users(&self) -> StoreResult<()> {
        self.users.fetch()?;
        Ok(())
    }

    /// Returns a cached user, or queues a refresh and returns `Pending`.
    pub fn get_user(&self, id: &str) -> Lookup<Record> {
        self.lookup(&self.users, id, BackgroundTask::RefreshUsers)
    }

    // ---- comments ---------------------------------------------------------

    /// Returns the comment collection of `recipe_id`, creating it on first
    /// use, and (re)binds its single forwarding link.
    pub fn comment_collection(&self, recipe_id: &str) -> StoreResult<Rc<ObservableCollection>> {
        let records = Rc::clone(&self.records);
        let comments = self.comments.get_or_create(recipe_id, |key| {
            ObservableCollection::new(CollectionScope::comments(key), records)
        })?;
        self.links.rebind(comments.events(), self.forwarder())?;
        Ok(comments)
    }

    /// Last-known comments of one recipe. Never fetches.
    pub fn comments_for_recipe(&self, recipe_id: &str) -> StoreResult<Vec<Record>> {
        Ok(self.comment_collection(recipe_id)?.to_plain_data())
    }

    pub fn fetch_comments_for_recipe(&self, recipe_id: &str) -> StoreResult<()> {
        self.comment_collection(recipe_id)?.fetch()?;
        Ok(())
    }

    /// Posts a comment on a recipe. The comment appears once persisted.
    pub fn comment_on_recipe(&self, recipe_id: &str, text: &str) -> StoreResult<Record> {
        let comments = self.comment_collection(recipe_id)?;
        let recipe_id = comments.scope().key().unwrap_or(recipe_id).to_string();
        let saved = comments.create(
            Record::comment(recipe_id.as_str(), text),
            SaveOptions::default().with_wait(true),
        )?;
        info!(
            "event=comment_create module=store status=ok recipe_id={recipe_id} object_id={}",
            saved.id().unwrap_or_default()
        );
        Ok(saved)
    }

    /// Forwarding links between the comment collection of `recipe_id` and
    /// this store; `0` when the collection was never accessed.
    pub fn comment_links(&self, recipe_id: &str) -> usize {
        self.comments
            .get(recipe_id)
            .map_or(0, |comments| self.links.active_links(comments.events()))
    }

    /// Number of comment collections materialized so far.
    pub fn cached_comment_sets(&self) -> usize {
        self.comments.len()
    }

    /// Number of sources linked to this store.
    pub fn linked_sources(&self) -> usize {
        self.links.tracked_sources()
    }

    // ---- background work --------------------------------------------------

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Runs the tasks queued before this call. Tasks queued while running
    /// wait for the next call.
    pub fn run_pending_tasks(&self) -> BackgroundReport {
        let mut report = BackgroundReport::default();
        for _ in 0..self.tasks.len() {
            let Some(task) = self.tasks.pop() else {
                break;
            };
            let outcome = match task {
                BackgroundTask::RefreshRecipes => self.recipes.fetch(),
                BackgroundTask::RefreshUsers => self.users.fetch(),
            };
            match outcome {
                Ok(()) => report.completed.push(task),
                Err(err) => {
                    warn!(
                        "event=background_task module=store status=error task={} error={}",
                        task.as_str(),
                        err
                    );
                    report.failed.push((task, StoreError::Source(err)));
                }
            }
        }
        report
    }

    fn lookup(
        &self,
        collection: &ObservableCollection,
        id: &str,
        refresh: BackgroundTask,
    ) -> Lookup<Record> {
        let id = id.trim();
        if let Some(record) = collection.get(id) {
            return Lookup::Ready(record);
        }
        if id.is_empty() {
            warn!(
                "event=lookup module=store status=skip scope={} reason=blank_id",
                collection.scope()
            );
            return Lookup::Pending;
        }

        let scheduled = self.tasks.schedule(refresh);
        debug!(
            "event=lookup module=store status=miss scope={} object_id={} scheduled={}",
            collection.scope(),
            id,
            scheduled
        );
        Lookup::Pending
    }

    fn require_cached(
        &self,
        collection: &ObservableCollection,
        id: Option<&str>,
    ) -> StoreResult<String> {
        let kind = collection.scope().source_kind();
        let id = id.map(str::trim).unwrap_or_default();
        if id.is_empty() {
            return Err(StoreError::MissingKey(kind));
        }
        if collection.get(id).is_none() {
            warn!("event=require_cached module=store status=error kind={kind} object_id={id} error_code=not_found");
            return Err(StoreError::NotFound {
                kind,
                key: id.to_string(),
            });
        }
        Ok(id.to_string())
    }

    fn forwarder(&self) -> impl Fn(&ChangeEvent) + 'static {
        let changed = Rc::clone(&self.changed);
        let sequence = Rc::clone(&self.change_sequence);
        move |event| {
            sequence.set(sequence.get() + 1);
            trace!(
                "event=changed module=store source={} change={} sequence={}",
                event.source,
                event.change.as_str(),
                sequence.get()
            );
            changed.emit(event);
        }
    }
}
