//! Session store: the single record of who is logged in.
//!
//! The current session lives in a `watch` channel so readers always get a
//! whole snapshot. Login commits and logouts are serialized under one lock
//! together with a logout generation; a login whose request was issued before
//! the latest logout is discarded instead of committed. Observers are notified
//! in commit order, each round with the snapshot current at that time, so the
//! last callback always reflects the final state.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::auth::AuthClient;
use crate::error::{AuthError, RegistrationError};
use crate::messages::{LoginResponse, RegistrationResult};
use crate::storage::SessionStorage;

/// Role granted by the auth service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    /// `"admin"` is the only privileged role; anything else, or nothing, is a member.
    pub fn from_wire(role: Option<&str>) -> Role {
        match role {
            Some(r) if r.eq_ignore_ascii_case("admin") => Role::Admin,
            _ => Role::Member,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated identity plus its bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

impl Session {
    /// Build a session from a 2xx login answer. `username` is the name that
    /// was submitted; the answer only carries the id and role.
    pub fn from_login(username: &str, response: LoginResponse) -> Result<Session, AuthError> {
        let user = response
            .user
            .ok_or_else(|| AuthError::InvalidResponse("missing user data".into()))?;
        let user_id = user
            .id
            .ok_or_else(|| AuthError::InvalidResponse("missing user data".into()))?;
        let token = response
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::InvalidResponse("no token received".into()))?;

        Ok(Session {
            token,
            user_id,
            username: username.to_string(),
            role: Role::from_wire(user.role.as_deref()),
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("role", &self.role)
            .finish()
    }
}

type Observer = Arc<dyn Fn(Option<&Session>) + Send + Sync>;

struct Inner {
    auth: AuthClient,
    storage: Box<dyn SessionStorage>,
    current: watch::Sender<Option<Session>>,
    /// Bumped by every logout; guards commits.
    generation: Mutex<u64>,
    /// Held for a whole notification round; taken before the commit lock is
    /// released.
    notifying: Mutex<()>,
    observers: Mutex<Vec<Observer>>,
}

/// Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("auth", &self.inner.auth.base_url())
            .field("current", &*self.inner.current.borrow())
            .finish()
    }
}

impl SessionStore {
    /// Create a store and restore whatever session `storage` holds.
    pub fn new(auth: AuthClient, storage: impl SessionStorage + 'static) -> Self {
        let restored = match storage.load() {
            Ok(session) => session,
            Err(e) => {
                warn!("failed to restore session: {e}");
                None
            }
        };
        if let Some(session) = &restored {
            info!(username = %session.username, "restored session");
        }

        let (current, _) = watch::channel(restored);
        Self {
            inner: Arc::new(Inner {
                auth,
                storage: Box::new(storage),
                current,
                generation: Mutex::new(0),
                notifying: Mutex::new(()),
                observers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Log in and commit the resulting session. On any error nothing changes.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let issued_at = *self.generation();
        let response = self.inner.auth.login(username, password).await?;
        let session = Session::from_login(username, response)?;

        let turn = {
            let generation = self.generation();
            if *generation != issued_at {
                warn!(%username, "discarding login that finished after a logout");
                return Err(AuthError::Superseded);
            }
            self.inner.storage.save(&session)?;
            self.inner.current.send_replace(Some(session.clone()));
            self.notify_turn()
        };

        info!(%username, user_id = session.user_id, role = %session.role, "logged in");
        self.notify(turn);
        Ok(session)
    }

    /// Create an account. Never touches the current session.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<RegistrationResult, RegistrationError> {
        let result = self.inner.auth.register(email, username, password).await?;
        info!(%username, "registered");
        Ok(result)
    }

    /// Forget the session. Always succeeds; storage failures are only logged.
    pub fn logout(&self) {
        self.clear("logout");
    }

    /// Forget the session because a service rejected its credential.
    pub fn invalidate(&self) {
        self.clear("credential rejected");
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.current.borrow().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.current.borrow().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.inner
            .current
            .borrow()
            .as_ref()
            .is_some_and(Session::is_admin)
    }

    /// Add `Authorization: Bearer <token>` when logged in; otherwise return
    /// `headers` unchanged.
    pub fn decorate_request(&self, mut headers: HeaderMap) -> HeaderMap {
        let current = self.inner.current.borrow();
        let Some(session) = current.as_ref() else {
            return headers;
        };
        match HeaderValue::from_str(&format!("Bearer {}", session.token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => warn!("session token is not a valid header value; request left unauthenticated"),
        }
        headers
    }

    /// [`decorate_request`](Self::decorate_request) for a request under construction.
    pub fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.inner.current.borrow().as_ref() {
            Some(session) => request.bearer_auth(&session.token),
            None => request,
        }
    }

    /// Receiver that sees every login and logout.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.inner.current.subscribe()
    }

    /// Run `observer` after every login and logout, with the session as it is
    /// at notification time. Observers run one round at a time and must not
    /// log in or out themselves.
    pub fn on_change<F>(&self, observer: F)
    where
        F: Fn(Option<&Session>) + Send + Sync + 'static,
    {
        self.observers().push(Arc::new(observer));
    }

    fn clear(&self, reason: &str) {
        let turn = {
            let mut generation = self.generation();
            *generation += 1;
            if let Err(e) = self.inner.storage.clear() {
                warn!("failed to clear persisted session: {e}");
            }
            self.inner.current.send_replace(None);
            self.notify_turn()
        };
        info!(reason, "session cleared");
        self.notify(turn);
    }

    /// Runs the observers; `_turn` is released when the round is done.
    fn notify(&self, _turn: MutexGuard<'_, ()>) {
        let observers = self.observers().clone();
        let snapshot = self.current();
        for observer in &observers {
            observer(snapshot.as_ref());
        }
    }

    fn notify_turn(&self) -> MutexGuard<'_, ()> {
        self.inner
            .notifying
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn generation(&self) -> MutexGuard<'_, u64> {
        self.inner
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn observers(&self) -> MutexGuard<'_, Vec<Observer>> {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
