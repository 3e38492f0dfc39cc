//! Foundation types for the Depot storage core.
//!
//! Every other Depot crate depends on `depot-types`.
//!
//! # Key Types
//!
//! - [`Sha1`], [`Md5`], [`Sha256`] -- fixed-length digests; SHA-1 is the
//!   primary key of stored binary content
//! - [`Checksum`] / [`ChecksumType`] -- a digest of any supported algorithm
//! - [`RepoPath`] -- `(repository key, relative path)` addressing metadata
//! - [`BinaryRecord`] -- the immutable description of one stored binary

pub mod checksum;
pub mod error;
pub mod path;
pub mod record;

pub use checksum::{Checksum, ChecksumType, Md5, Sha1, Sha256};
pub use error::TypeError;
pub use path::{RepoPath, REPO_PATH_SEP};
pub use record::BinaryRecord;
