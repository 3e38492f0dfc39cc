use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The digest algorithms a binary is addressed or verified by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    Sha1,
    Md5,
    Sha256,
}

impl ChecksumType {
    /// All supported algorithms, primary key first.
    pub const ALL: [ChecksumType; 3] = [ChecksumType::Sha1, ChecksumType::Md5, ChecksumType::Sha256];

    /// Digest length in bytes.
    pub const fn byte_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Md5 => 16,
            Self::Sha256 => 32,
        }
    }

    /// Digest length as a hex string.
    pub const fn hex_len(&self) -> usize {
        self.byte_len() * 2
    }

    /// File extension used for checksum side files (`.sha1`, `.md5`, ...).
    pub fn ext(&self) -> &'static str {
        match self {
            Self::Sha1 => ".sha1",
            Self::Md5 => ".md5",
            Self::Sha256 => ".sha256",
        }
    }
}

impl fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha1 => write!(f, "sha1"),
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], TypeError> {
    let bytes = hex::decode(s.trim()).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
    if bytes.len() != N {
        return Err(TypeError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

macro_rules! digest_type {
    ($(#[$meta:meta])* $name:ident, $len:expr, $kind:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name([u8; $len]);

        impl $name {
            /// Digest length in bytes.
            pub const LEN: usize = $len;

            /// Wrap a pre-computed digest.
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Parse from a hex string (either case).
            pub fn from_hex(s: &str) -> Result<Self, TypeError> {
                decode_fixed::<$len>(s).map(Self)
            }

            /// The raw digest bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Lower-case hex representation.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Short hex representation (first 8 characters).
            pub fn short_hex(&self) -> String {
                hex::encode(&self.0[..4])
            }

            /// The algorithm this digest was produced by.
            pub const fn checksum_type(&self) -> ChecksumType {
                $kind
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = TypeError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::from_hex(&s)
            }
        }

        impl From<$name> for String {
            fn from(d: $name) -> Self {
                d.to_hex()
            }
        }
    };
}

digest_type!(
    /// SHA-1 digest: the primary key of stored binary content.
    ///
    /// Two repository paths whose content has the same SHA-1 share a single
    /// stored binary.
    Sha1,
    20,
    ChecksumType::Sha1
);

digest_type!(
    /// MD5 digest, kept alongside the SHA-1 for client verification.
    Md5,
    16,
    ChecksumType::Md5
);

digest_type!(
    /// SHA-256 digest, kept alongside the SHA-1 for client verification.
    Sha256,
    32,
    ChecksumType::Sha256
);

/// A digest of any supported algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Checksum {
    Sha1(Sha1),
    Md5(Md5),
    Sha256(Sha256),
}

impl Checksum {
    /// Parse a hex digest of the given algorithm.
    pub fn parse(kind: ChecksumType, hex: &str) -> Result<Self, TypeError> {
        Ok(match kind {
            ChecksumType::Sha1 => Self::Sha1(Sha1::from_hex(hex)?),
            ChecksumType::Md5 => Self::Md5(Md5::from_hex(hex)?),
            ChecksumType::Sha256 => Self::Sha256(Sha256::from_hex(hex)?),
        })
    }

    /// Parse a hex digest, inferring the algorithm from its length.
    pub fn detect(hex: &str) -> Result<Self, TypeError> {
        let len = hex.trim().len();
        let kind = ChecksumType::ALL
            .into_iter()
            .find(|t| t.hex_len() == len)
            .ok_or(TypeError::InvalidLength {
                expected: ChecksumType::Sha1.hex_len(),
                actual: len,
            })?;
        Self::parse(kind, hex)
    }

    pub fn checksum_type(&self) -> ChecksumType {
        match self {
            Self::Sha1(_) => ChecksumType::Sha1,
            Self::Md5(_) => ChecksumType::Md5,
            Self::Sha256(_) => ChecksumType::Sha256,
        }
    }

    pub fn to_hex(&self) -> String {
        match self {
            Self::Sha1(d) => d.to_hex(),
            Self::Md5(d) => d.to_hex(),
            Self::Sha256(d) => d.to_hex(),
        }
    }

    /// The SHA-1 digest, if this is one.
    pub fn as_sha1(&self) -> Option<&Sha1> {
        match self {
            Self::Sha1(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.checksum_type(), self.to_hex())
    }
}

impl From<Sha1> for Checksum {
    fn from(d: Sha1) -> Self {
        Self::Sha1(d)
    }
}

impl From<Md5> for Checksum {
    fn from(d: Md5) -> Self {
        Self::Md5(d)
    }
}

impl From<Sha256> for Checksum {
    fn from(d: Sha256) -> Self {
        Self::Sha256(d)
    }
}
