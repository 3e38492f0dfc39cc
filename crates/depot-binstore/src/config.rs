//! Declarative binary store configuration.
//!
//! ```toml
//! base-dir = "/var/opt/depot/data"
//! storage-mode = "filesystem-cache"
//!
//! [chain]
//! template = "filesystem-cache"
//!
//! [[provider]]
//! id = "cache-fs"
//! max-cache-size = "512MB"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::traits::ProviderKind;

/// Cache size used when a cache node does not set `max-cache-size`.
pub const DEFAULT_CACHE_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Top-level binary store configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BinaryStoreConfig {
    /// Root for every default provider location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
    /// Fallback selector used when `chain` names neither a head nor a
    /// template.
    pub storage_mode: StorageMode,
    pub chain: ChainSpec,
    /// Provider nodes: overrides of template nodes, or the links of a custom
    /// chain.
    #[serde(rename = "provider", skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<ProviderNode>,
}

impl BinaryStoreConfig {
    /// The default (`filesystem`) configuration rooted at `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
            ..Default::default()
        }
    }

    /// A database-only chain on a private in-memory database. Nothing touches
    /// disk.
    pub fn in_memory() -> Self {
        Self {
            chain: ChainSpec {
                template: Some("full-db-direct".into()),
                head: None,
            },
            providers: vec![ProviderNode {
                id: "blob".into(),
                kind: None,
                next: None,
                params: ProviderParams {
                    db_path: Some(PathBuf::from(crate::providers::IN_MEMORY_DB)),
                    ..Default::default()
                },
            }],
            ..Default::default()
        }
    }

    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// The provider node declared with `id`, if any.
    pub fn provider(&self, id: &str) -> Option<&ProviderNode> {
        self.providers.iter().find(|p| p.id == id)
    }
}

/// Built-in chain shapes selectable with a single flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageMode {
    /// File store only.
    #[default]
    Filesystem,
    /// File cache in front of the file store.
    FilesystemCache,
    /// Everything in the database, behind a file cache.
    FullDb,
}

impl StorageMode {
    /// Name of the built-in template this mode selects.
    pub fn template(&self) -> &'static str {
        match self {
            Self::Filesystem => "filesystem",
            Self::FilesystemCache => "filesystem-cache",
            Self::FullDb => "full-db",
        }
    }
}

/// Which chain to build.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ChainSpec {
    /// Named built-in template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Id of the first node of a fully custom chain. Takes precedence over
    /// `template`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
}

/// One provider node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProviderNode {
    pub id: String,
    /// Required in a custom chain. In a template override it replaces the
    /// template node's type; omitted, the template type is kept.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ProviderKind>,
    /// Id of the next node (custom chains only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(flatten)]
    pub params: ProviderParams,
}

impl ProviderNode {
    pub fn new(id: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            id: id.into(),
            kind: Some(kind),
            next: None,
            params: ProviderParams::default(),
        }
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn with_params(mut self, params: ProviderParams) -> Self {
        self.params = params;
        self
    }
}

/// Optional per-node parameters. Each provider kind reads the ones it
/// understands.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProviderParams {
    /// Storage root (`file-system`, `cache-fs`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Cache bound (`cache-fs`); `0` removes the cache from the chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cache_size: Option<SizeValue>,
    /// Attempts per operation (`retry`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tries: Option<u32>,
    /// Milliseconds between attempts (`retry`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    /// Database file or `:memory:` (`blob`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

/// A byte count written either as an integer or as text with a unit
/// (`"512MB"`, `"5 GB"`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeValue {
    Bytes(u64),
    Text(String),
}

impl SizeValue {
    pub fn bytes(&self) -> Result<u64, String> {
        match self {
            Self::Bytes(n) => Ok(*n),
            Self::Text(s) => parse_size(s),
        }
    }
}

impl From<u64> for SizeValue {
    fn from(n: u64) -> Self {
        Self::Bytes(n)
    }
}

impl fmt::Display for SizeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Parse a size such as `1024`, `64KB`, `512 mb`, `5GB` or `2TB`.
///
/// Units are binary multiples; a bare `B` suffix and single-letter units
/// (`K`, `M`, `G`, `T`) are accepted.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() {
        return Err(format!("'{s}' does not start with a number"));
    }
    let n: u64 = digits
        .parse()
        .map_err(|e| format!("'{s}' is not a valid size: {e}"))?;
    let shift = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 0,
        "K" | "KB" => 10,
        "M" | "MB" => 20,
        "G" | "GB" => 30,
        "T" | "TB" => 40,
        other => return Err(format!("unknown size unit '{other}'")),
    };
    n.checked_mul(1u64 << shift)
        .ok_or_else(|| format!("'{s}' overflows"))
}
