//! Checksum calculation for the Depot storage core.
//!
//! Binaries are addressed by SHA-1 and verified with MD5 and SHA-256 as
//! well. [`ChecksumCalculator`] computes all three in one pass;
//! [`ChecksumReader`] does the same while content streams through it.
//!
//! All digest operations wrap established libraries.

pub mod hasher;

pub use hasher::{ChecksumCalculator, ChecksumReader};
