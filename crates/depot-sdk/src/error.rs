use depot_binstore::{ConfigError, StoreError};
use depot_session::SessionError;
use depot_types::{RepoPath, Sha1, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("{0} is not a file")]
    NotAFile(RepoPath),

    #[error("{0} is not a folder")]
    NotAFolder(RepoPath),

    #[error("{path} has no content attached")]
    NoContent { path: RepoPath },

    #[error("content {sha1} of {path} is missing from the binary store")]
    ContentMissing { path: RepoPath, sha1: Sha1 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

pub type SdkResult<T> = Result<T, SdkError>;
