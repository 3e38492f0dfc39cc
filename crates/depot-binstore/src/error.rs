use std::io;
use std::path::PathBuf;

use depot_types::Sha1;

use crate::traits::ProviderKind;

/// Errors from binary provider operations.
///
/// A checksum with no stored content is not an error: lookups report it as
/// `Ok(None)` / `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage medium.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failure reported by the database backing a blob provider.
    #[error("database error: {message}")]
    Database {
        message: String,
        transient: bool,
        refused: bool,
    },

    /// Uploaded content does not hash to the declared checksum.
    #[error("checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: Sha1, actual: Sha1 },

    /// Stored content no longer matches its checksum.
    #[error("corrupt binary {sha1}: {reason}")]
    Corrupt { sha1: Sha1, reason: String },

    /// The request ran off the end of the chain without any provider
    /// persisting the binary.
    #[error("no provider in the chain stored binary {0}")]
    NotStored(Sha1),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    ///
    /// Media hiccups (interrupted or timed-out I/O, a busy database) are
    /// transient. Corruption, checksum mismatches and refusals are not.
    pub fn is_transient(&self) -> bool {
        if self.is_refusal() {
            return false;
        }
        match self {
            Self::Io(e) => !matches!(
                e.kind(),
                io::ErrorKind::NotFound
                    | io::ErrorKind::PermissionDenied
                    | io::ErrorKind::InvalidInput
                    | io::ErrorKind::InvalidData
                    | io::ErrorKind::AlreadyExists
            ),
            Self::Database { transient, .. } => *transient,
            Self::ChecksumMismatch { .. } | Self::Corrupt { .. } | Self::NotStored(_) => false,
        }
    }

    /// Whether the provider can never accept the write on this medium: the
    /// disk or database is full, read-only, over quota or the operation is
    /// unsupported. The request belongs to the next provider instead.
    pub fn is_refusal(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::StorageFull
                    | io::ErrorKind::ReadOnlyFilesystem
                    | io::ErrorKind::FileTooLarge
                    | io::ErrorKind::QuotaExceeded
                    | io::ErrorKind::Unsupported
            ),
            Self::Database { refused, .. } => *refused,
            Self::ChecksumMismatch { .. } | Self::Corrupt { .. } | Self::NotStored(_) => false,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        let code = e.sqlite_error_code();
        Self::Database {
            message: e.to_string(),
            transient: matches!(code, Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)),
            refused: matches!(code, Some(ErrorCode::DiskFull | ErrorCode::ReadOnly)),
        }
    }
}

/// Result alias for provider operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised while loading configuration or assembling a provider chain.
///
/// All of these are fatal at build time; a chain is never built partially.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid binary store configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot read configuration {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("provider '{provider}' is missing required parameter '{param}'")]
    MissingParameter { provider: String, param: &'static str },

    #[error("provider '{provider}' has invalid parameter '{param}': {reason}")]
    InvalidParameter {
        provider: String,
        param: &'static str,
        reason: String,
    },

    #[error("unknown chain template '{0}'")]
    UnknownTemplate(String),

    #[error("chain references unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("provider id '{0}' is declared more than once")]
    DuplicateProvider(String),

    #[error("provider '{id}' does not match any node of template '{template}'")]
    UnusedOverride { id: String, template: String },

    #[error("provider chain contains a cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("provider '{id}' uses reserved type '{kind}', which the builder adds itself")]
    ReservedKind { id: String, kind: ProviderKind },

    #[error("provider chain has no persistent provider (file-system or blob)")]
    NoPersistentProvider,

    #[error("failed to initialize provider '{provider}': {reason}")]
    Init { provider: String, reason: String },
}

/// Result alias for configuration and chain building.
pub type ConfigResult<T> = Result<T, ConfigError>;
