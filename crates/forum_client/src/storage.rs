//! Persisted session backends.
//!
//! The session store only talks to [`SessionStorage`]; the file backend keeps
//! the four session fields under fixed keys so a session survives restarts,
//! the memory backend is for tests and throwaway sessions.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::session::{Role, Session};

/// Read/write interface for the persisted session.
pub trait SessionStorage: Send + Sync {
    /// The stored session, or `None` if nothing (or nothing usable) is stored.
    fn load(&self) -> Result<Option<Session>, StorageError>;
    fn save(&self, session: &Session) -> Result<(), StorageError>;
    /// Remove the stored session. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), StorageError>;
}

impl<S: SessionStorage + ?Sized> SessionStorage for Arc<S> {
    fn load(&self) -> Result<Option<Session>, StorageError> {
        (**self).load()
    }

    fn save(&self, session: &Session) -> Result<(), StorageError> {
        (**self).save(session)
    }

    fn clear(&self) -> Result<(), StorageError> {
        (**self).clear()
    }
}

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<Session>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that already holds `session`, as if persisted by an earlier run.
    pub fn with_session(session: Session) -> Self {
        Self {
            slot: Mutex::new(Some(session)),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Session>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<Session>, StorageError> {
        Ok(self.slot().clone())
    }

    fn save(&self, session: &Session) -> Result<(), StorageError> {
        *self.slot() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.slot() = None;
        Ok(())
    }
}

/// On-disk layout: one JSON object with the fixed keys below.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedSession {
    token: String,
    username: String,
    user_id: i64,
    user_role: String,
}

/// JSON file storage, `~/.forum-chat/session.json` by default.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Result<Option<Session>, StorageError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let persisted: PersistedSession = match serde_json::from_str(&data) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "ignoring unreadable session file: {e}");
                return Ok(None);
            }
        };
        if persisted.token.is_empty() || persisted.username.is_empty() {
            tracing::warn!(path = %self.path.display(), "ignoring incomplete session file");
            return Ok(None);
        }

        Ok(Some(Session {
            token: persisted.token,
            user_id: persisted.user_id,
            username: persisted.username,
            role: Role::from_wire(Some(&persisted.user_role)),
        }))
    }

    fn save(&self, session: &Session) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let persisted = PersistedSession {
            token: session.token.clone(),
            username: session.username.clone(),
            user_id: session.user_id,
            user_role: session.role.as_str().to_string(),
        };
        let json = serde_json::to_string_pretty(&persisted)?;
        std::fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&self.path, perms);
        }

        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
