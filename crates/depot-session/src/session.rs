//! Sessions: one unit of work owning a [`SessionLockManager`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::SessionResult;
use crate::manager::SessionLockManager;
use crate::registry::PathLockRegistry;
use crate::repository::ItemRepository;

/// Time-ordered session identifier (UUID v7).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work against the item repository.
///
/// Locks taken through [`locks_mut`](Self::locks_mut) are released when the
/// session ends or is dropped. Changes reach the repository only on
/// [`save`](Self::save).
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    user: String,
    started: DateTime<Utc>,
    locks: SessionLockManager,
}

impl Session {
    pub fn new(
        registry: Arc<PathLockRegistry>,
        repository: Arc<dyn ItemRepository>,
        user: impl Into<String>,
    ) -> Self {
        let user = user.into();
        let id = SessionId::new();
        debug!(session = %id, user = %user, "session started");
        Self {
            id,
            locks: SessionLockManager::new(registry, repository).with_user(user.clone()),
            user,
            started: Utc::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn locks(&self) -> &SessionLockManager {
        &self.locks
    }

    pub fn locks_mut(&mut self) -> &mut SessionLockManager {
        &mut self.locks
    }

    /// Commit all pending changes. Locks stay held.
    pub fn save(&mut self) -> SessionResult<usize> {
        self.locks.save()
    }

    /// Run `body` inside the session, saving if it succeeds.
    ///
    /// Every lock is released afterwards whatever the outcome; an error from
    /// `body` or from the save discards uncommitted changes.
    pub fn run<T, E>(mut self, body: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<crate::error::SessionError>,
    {
        let outcome = body(&mut self).and_then(|value| {
            self.save()?;
            Ok(value)
        });
        self.end();
        outcome
    }

    /// Release every lock, discarding unsaved changes.
    pub fn end(&mut self) {
        self.locks.release_all();
        debug!(session = %self.id, "session ended");
    }
}
