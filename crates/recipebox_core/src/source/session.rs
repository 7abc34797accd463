//! Observable authentication session.
//!
//! # Invariants
//! - One `mutated` event per actual state change; replacing the session
//!   with an equal value is silent.
//! - Local state changes only after the repository call succeeded, except
//!   that a revoked token still signs the session out locally.

use crate::model::session::{Credentials, SessionData};
use crate::repo::record_repo::{RepoError, RepoResult};
use crate::repo::session_repo::SessionRepository;
use crate::source::event::{ChangeEvent, ChangeKind, Emitter, SourceKind};
use log::{error, info, warn};
use std::cell::RefCell;
use std::rc::Rc;

/// Singleton session source.
pub struct ObservableSession {
    repo: Rc<dyn SessionRepository>,
    data: RefCell<SessionData>,
    events: Emitter<ChangeEvent>,
}

impl ObservableSession {
    pub fn new(repo: Rc<dyn SessionRepository>) -> Self {
        Self {
            repo,
            data: RefCell::new(SessionData::default()),
            events: Emitter::new(),
        }
    }

    pub fn events(&self) -> &Emitter<ChangeEvent> {
        &self.events
    }

    pub fn to_plain_data(&self) -> SessionData {
        self.data.borrow().clone()
    }

    pub fn authenticate(&self, credentials: &Credentials) -> RepoResult<SessionData> {
        let session = self.repo.authenticate(credentials).map_err(|err| {
            error!(
                "event=session_authenticate module=session status=error method={} error={}",
                credentials.method(),
                err
            );
            err
        })?;
        self.replace(session.clone());
        Ok(session)
    }

    /// Revokes the current session. Signed-out sessions are left as is.
    ///
    /// A token the repository no longer accepts counts as already revoked:
    /// local state is cleared and the call succeeds.
    pub fn invalidate(&self) -> RepoResult<()> {
        let token = self.data.borrow().session_token.clone();
        if let Some(token) = token {
            match self.repo.invalidate(token.as_str()) {
                Ok(()) => {}
                Err(RepoError::Unauthorized(reason)) => {
                    warn!(
                        "event=session_invalidate module=session status=skip reason=already_revoked detail={reason}"
                    );
                }
                Err(err) => {
                    error!("event=session_invalidate module=session status=error error={err}");
                    return Err(err);
                }
            }
        }
        self.replace(SessionData::default());
        Ok(())
    }

    /// Loads the persisted session, or signs out when none is stored.
    pub fn restore(&self) -> RepoResult<SessionData> {
        let restored = self
            .repo
            .restore()
            .map_err(|err| {
                error!("event=session_restore module=session status=error error={err}");
                err
            })?
            .unwrap_or_default();
        info!(
            "event=session_restore module=session status=ok authenticated={}",
            restored.is_authenticated()
        );
        self.replace(restored.clone());
        Ok(restored)
    }

    fn replace(&self, next: SessionData) {
        let changed = {
            let mut data = self.data.borrow_mut();
            if *data == next {
                false
            } else {
                *data = next;
                true
            }
        };
        if changed {
            self.events.emit(&ChangeEvent::new(
                SourceKind::Session,
                None,
                ChangeKind::Mutated,
                None,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ObservableSession;
    use crate::model::record::Record;
    use crate::model::session::{Credentials, SessionData};
    use crate::repo::record_repo::{RepoError, RepoResult};
    use crate::repo::session_repo::SessionRepository;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Default)]
    struct FakeSessions {
        stored: RefCell<Option<SessionData>>,
        invalidations: Cell<u32>,
        revoked: Cell<bool>,
        offline: Cell<bool>,
    }

    impl SessionRepository for FakeSessions {
        fn authenticate(&self, credentials: &Credentials) -> RepoResult<SessionData> {
            match credentials {
                Credentials::Password { password, .. } if password == "ok" => {
                    let session = SessionData::new("r:1", Record::with_id("u1"));
                    *self.stored.borrow_mut() = Some(session.clone());
                    Ok(session)
                }
                _ => Err(RepoError::Unauthorized("nope".to_string())),
            }
        }

        fn invalidate(&self, _session_token: &str) -> RepoResult<()> {
            self.invalidations.set(self.invalidations.get() + 1);
            if self.offline.get() {
                return Err(RepoError::Unavailable("offline".to_string()));
            }
            if self.revoked.get() {
                return Err(RepoError::Unauthorized("invalid session token".to_string()));
            }
            *self.stored.borrow_mut() = None;
            Ok(())
        }

        fn restore(&self) -> RepoResult<Option<SessionData>> {
            Ok(self.stored.borrow().clone())
        }
    }

    fn counted(session: &ObservableSession) -> Rc<Cell<u32>> {
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let _token = session
            .events()
            .subscribe(move |_| counter.set(counter.get() + 1));
        hits
    }

    #[test]
    fn authenticate_emits_once_and_repeat_is_silent() {
        let session = ObservableSession::new(Rc::new(FakeSessions::default()));
        let hits = counted(&session);

        session.authenticate(&Credentials::password("ana", "ok")).unwrap();
        session.authenticate(&Credentials::password("ana", "ok")).unwrap();

        assert_eq!(hits.get(), 1);
        assert_eq!(session.to_plain_data().current_user_id(), Some("u1"));
    }

    #[test]
    fn failed_authenticate_leaves_state_untouched() {
        let session = ObservableSession::new(Rc::new(FakeSessions::default()));
        let hits = counted(&session);

        let err = session
            .authenticate(&Credentials::password("ana", "bad"))
            .unwrap_err();

        assert!(matches!(err, RepoError::Unauthorized(_)));
        assert_eq!(hits.get(), 0);
        assert!(!session.to_plain_data().is_authenticated());
    }

    #[test]
    fn invalidate_while_signed_out_skips_repository() {
        let repo = Rc::new(FakeSessions::default());
        let session = ObservableSession::new(repo.clone());
        session.invalidate().unwrap();
        assert_eq!(repo.invalidations.get(), 0);
    }

    #[test]
    fn invalidate_with_revoked_token_signs_out_locally() {
        let repo = Rc::new(FakeSessions::default());
        let session = ObservableSession::new(repo.clone());
        session.authenticate(&Credentials::password("ana", "ok")).unwrap();
        let hits = counted(&session);
        repo.revoked.set(true);

        session.invalidate().unwrap();

        assert_eq!(repo.invalidations.get(), 1);
        assert_eq!(hits.get(), 1);
        assert_eq!(session.to_plain_data(), SessionData::default());
    }

    #[test]
    fn invalidate_keeps_session_when_repository_is_unreachable() {
        let repo = Rc::new(FakeSessions::default());
        let session = ObservableSession::new(repo.clone());
        session.authenticate(&Credentials::password("ana", "ok")).unwrap();
        repo.offline.set(true);

        let err = session.invalidate().unwrap_err();

        assert!(matches!(err, RepoError::Unavailable(_)));
        assert!(session.to_plain_data().is_authenticated());
    }

    #[test]
    fn restore_picks_up_persisted_session() {
        let repo = Rc::new(FakeSessions::default());
        repo.authenticate(&Credentials::password("ana", "ok")).unwrap();
        let session = ObservableSession::new(repo);
        let hits = counted(&session);

        let restored = session.restore().unwrap();

        assert!(restored.is_authenticated());
        assert_eq!(hits.get(), 1);
    }
}
