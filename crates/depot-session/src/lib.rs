//! Session-scoped path locking for Depot.
//!
//! Every repository path has one reader/writer lock shared by all sessions
//! through a [`PathLockRegistry`]. Each session owns a [`SessionLockManager`]
//! that records which paths it holds, in which mode, and the item views the
//! hold protects:
//!
//! - a read hold sees the committed [`ItemSnapshot`];
//! - a write hold owns a private [`MutableItem`] working copy, which reaches
//!   the [`ItemRepository`] only when the session saves.
//!
//! # Modules
//!
//! - [`error`] -- [`SessionError`] and its result alias
//! - [`item`] -- item metadata, snapshots and working copies
//! - [`repository`] -- the [`ItemRepository`] trait and an in-memory backend
//! - [`registry`] -- the shared [`PathLockRegistry`]
//! - [`entry`] -- [`SessionLockEntry`], one session's hold on one path
//! - [`manager`] -- the [`SessionLockManager`]
//! - [`session`] -- [`Session`], a unit of work owning a lock manager

pub mod entry;
pub mod error;
pub mod item;
pub mod manager;
pub mod registry;
pub mod repository;
pub mod session;

pub use entry::{EntryItems, SessionLockEntry};
pub use error::{SessionError, SessionResult};
pub use item::{FileInfo, ItemInfo, ItemKind, ItemSnapshot, MutableItem};
pub use manager::{SessionLockManager, ANONYMOUS};
pub use registry::{LockHold, PathLock, PathLockRegistry};
pub use repository::{InMemoryItemRepository, ItemRepository};
pub use session::{Session, SessionId};
