//! Assembles provider chains from [`BinaryStoreConfig`].
//!
//! Building is split in two: [`ChainBuilder::resolve`] turns configuration
//! into a fully checked [`ChainPlan`] without touching storage, and
//! [`ChainBuilder::build`] instantiates the plan tail first. The same
//! configuration always resolves to the same plan.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{BinaryStoreConfig, ProviderParams, DEFAULT_CACHE_SIZE};
use crate::error::{ConfigError, ConfigResult};
use crate::providers::{
    BlobProvider, EmptyProvider, FileCacheProvider, FileProvider, RetryProvider,
    UsageTrackingProvider, DEFAULT_INTERVAL, DEFAULT_MAX_TRIES,
};
use crate::traits::{BinaryProvider, ProviderKind};

/// Built-in templates, head first. Node ids are the kind tags.
const TEMPLATES: &[(&str, &[ProviderKind])] = &[
    ("filesystem", &[ProviderKind::FileSystem]),
    (
        "filesystem-cache",
        &[ProviderKind::CacheFs, ProviderKind::FileSystem],
    ),
    (
        "full-db",
        &[ProviderKind::CacheFs, ProviderKind::Retry, ProviderKind::Blob],
    ),
    ("full-db-direct", &[ProviderKind::Retry, ProviderKind::Blob]),
];

/// The provider kinds of a built-in template, head first.
pub fn template(name: &str) -> Option<&'static [ProviderKind]> {
    TEMPLATES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, kinds)| *kinds)
}

/// Names of all built-in templates.
pub fn template_names() -> impl Iterator<Item = &'static str> {
    TEMPLATES.iter().map(|(name, _)| *name)
}

/// Fully resolved settings for one provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderSettings {
    FileSystem { dir: PathBuf },
    CacheFs { dir: PathBuf, max_size: u64 },
    Blob { db_path: PathBuf },
    Retry { max_tries: u32, interval: Duration },
}

impl ProviderSettings {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::FileSystem { .. } => ProviderKind::FileSystem,
            Self::CacheFs { .. } => ProviderKind::CacheFs,
            Self::Blob { .. } => ProviderKind::Blob,
            Self::Retry { .. } => ProviderKind::Retry,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub id: String,
    pub settings: ProviderSettings,
}

impl ResolvedProvider {
    pub fn kind(&self) -> ProviderKind {
        self.settings.kind()
    }
}

/// A checked chain ready to be instantiated.
///
/// `providers` lists the configured links head first; the usage tracking
/// head and the empty tail are implied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainPlan {
    /// Template the plan came from; `None` for a custom chain.
    pub template: Option<String>,
    pub providers: Vec<ResolvedProvider>,
}

impl ChainPlan {
    /// Shape of the chain that `build` produces, head first.
    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds = Vec::with_capacity(self.providers.len() + 2);
        kinds.push(ProviderKind::UsageTracking);
        kinds.extend(self.providers.iter().map(ResolvedProvider::kind));
        kinds.push(ProviderKind::Empty);
        kinds
    }
}

impl fmt::Display for ChainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<_> = self.kinds().iter().map(ProviderKind::as_str).collect();
        f.write_str(&kinds.join(" -> "))
    }
}

/// Builds provider chains from configuration.
pub struct ChainBuilder<'a> {
    config: &'a BinaryStoreConfig,
}

impl<'a> ChainBuilder<'a> {
    pub fn new(config: &'a BinaryStoreConfig) -> Self {
        Self { config }
    }

    /// Resolve configuration into a plan, checking everything that can be
    /// checked without opening storage.
    pub fn resolve(&self) -> ConfigResult<ChainPlan> {
        let mut seen = HashSet::new();
        for node in &self.config.providers {
            if !seen.insert(node.id.as_str()) {
                return Err(ConfigError::DuplicateProvider(node.id.clone()));
            }
            if let Some(kind) = node.kind.filter(ProviderKind::is_reserved) {
                return Err(ConfigError::ReservedKind {
                    id: node.id.clone(),
                    kind,
                });
            }
        }

        let (template, nodes) = match (&self.config.chain.head, &self.config.chain.template) {
            (Some(head), _) => (None, self.custom_nodes(head)?),
            (None, Some(name)) => (Some(name.clone()), self.template_nodes(name)?),
            (None, None) => {
                let name = self.config.storage_mode.template();
                (Some(name.to_owned()), self.template_nodes(name)?)
            }
        };

        let mut providers = Vec::with_capacity(nodes.len());
        for (id, kind, params) in nodes {
            let settings = self.settings(&id, kind, &params)?;
            if let ProviderSettings::CacheFs { max_size: 0, .. } = settings {
                debug!(provider = %id, "cache size is 0, dropping cache from chain");
                continue;
            }
            providers.push(ResolvedProvider { id, settings });
        }

        if !providers.iter().any(|p| p.kind().is_persistent()) {
            return Err(ConfigError::NoPersistentProvider);
        }
        Ok(ChainPlan {
            template,
            providers,
        })
    }

    /// Resolve and instantiate the chain, returning its usage tracking head.
    pub fn build(&self) -> ConfigResult<UsageTrackingProvider> {
        let plan = self.resolve()?;
        let head = instantiate(&plan)?;
        info!(
            template = plan.template.as_deref().unwrap_or("custom"),
            chain = %plan,
            "binary provider chain built"
        );
        Ok(head)
    }

    /// Walk a custom chain from `head` along `next` links.
    fn custom_nodes(&self, head: &str) -> ConfigResult<Vec<(String, ProviderKind, ProviderParams)>> {
        let mut visited: Vec<String> = Vec::new();
        let mut nodes = Vec::new();
        let mut cursor = Some(head.to_owned());
        while let Some(id) = cursor {
            if visited.contains(&id) {
                visited.push(id);
                return Err(ConfigError::Cycle(visited));
            }
            let node = self
                .config
                .provider(&id)
                .ok_or_else(|| ConfigError::UnknownProvider(id.clone()))?;
            let kind = node.kind.ok_or_else(|| ConfigError::MissingParameter {
                provider: id.clone(),
                param: "type",
            })?;
            nodes.push((id.clone(), kind, node.params.clone()));
            visited.push(id);
            cursor = node.next.clone();
        }

        for node in &self.config.providers {
            if !visited.contains(&node.id) {
                warn!(provider = %node.id, "provider is not reachable from the chain head");
            }
        }
        Ok(nodes)
    }

    /// Expand a template, splicing in overrides by node id.
    fn template_nodes(&self, name: &str) -> ConfigResult<Vec<(String, ProviderKind, ProviderParams)>> {
        let kinds = template(name).ok_or_else(|| ConfigError::UnknownTemplate(name.to_owned()))?;

        if let Some(stray) = self
            .config
            .providers
            .iter()
            .find(|node| !kinds.iter().any(|k| k.as_str() == node.id))
        {
            return Err(ConfigError::UnusedOverride {
                id: stray.id.clone(),
                template: name.to_owned(),
            });
        }
        if let Some(linked) = self.config.providers.iter().find(|node| node.next.is_some()) {
            return Err(ConfigError::InvalidParameter {
                provider: linked.id.clone(),
                param: "next",
                reason: format!("template '{name}' fixes the order of its nodes"),
            });
        }

        Ok(kinds
            .iter()
            .map(|kind| {
                let id = kind.as_str().to_owned();
                match self.config.provider(&id) {
                    Some(node) => (id, node.kind.unwrap_or(*kind), node.params.clone()),
                    None => (id, *kind, ProviderParams::default()),
                }
            })
            .collect())
    }

    fn settings(&self, id: &str, kind: ProviderKind, params: &ProviderParams) -> ConfigResult<ProviderSettings> {
        let base = self.config.base_dir.as_deref();
        match kind {
            ProviderKind::FileSystem => Ok(ProviderSettings::FileSystem {
                dir: located(id, "dir", base, params.dir.as_deref(), "filestore")?,
            }),
            ProviderKind::CacheFs => {
                let max_size = match &params.max_cache_size {
                    Some(size) => size.bytes().map_err(|reason| ConfigError::InvalidParameter {
                        provider: id.to_owned(),
                        param: "max-cache-size",
                        reason,
                    })?,
                    None => DEFAULT_CACHE_SIZE,
                };
                // A disabled cache needs no directory.
                let dir = if max_size == 0 {
                    params.dir.clone().unwrap_or_default()
                } else {
                    located(id, "dir", base, params.dir.as_deref(), "cache")?
                };
                Ok(ProviderSettings::CacheFs { dir, max_size })
            }
            ProviderKind::Blob => {
                let db_path = match params.db_path.as_deref() {
                    Some(p) if p == Path::new(crate::providers::IN_MEMORY_DB) => p.to_path_buf(),
                    explicit => located(id, "db-path", base, explicit, "binaries.db")?,
                };
                Ok(ProviderSettings::Blob { db_path })
            }
            ProviderKind::Retry => Ok(ProviderSettings::Retry {
                max_tries: params.max_tries.unwrap_or(DEFAULT_MAX_TRIES),
                interval: params
                    .interval
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_INTERVAL),
            }),
            ProviderKind::Empty | ProviderKind::UsageTracking => Err(ConfigError::ReservedKind {
                id: id.to_owned(),
                kind,
            }),
        }
    }
}

/// Resolve a provider location: an explicit path (relative paths are taken
/// from `base`), or `{base}/{default}`.
fn located(
    provider: &str,
    param: &'static str,
    base: Option<&Path>,
    explicit: Option<&Path>,
    default: &str,
) -> ConfigResult<PathBuf> {
    match (explicit, base) {
        (Some(path), Some(base)) => Ok(base.join(path)),
        (Some(path), None) => Ok(path.to_path_buf()),
        (None, Some(base)) => Ok(base.join(default)),
        (None, None) => Err(ConfigError::MissingParameter {
            provider: provider.to_owned(),
            param,
        }),
    }
}

/// Instantiate a plan tail first behind a usage tracking head.
fn instantiate(plan: &ChainPlan) -> ConfigResult<UsageTrackingProvider> {
    let mut next: Box<dyn BinaryProvider> = Box::new(EmptyProvider);
    for resolved in plan.providers.iter().rev() {
        next = provider(resolved, next).map_err(|reason| ConfigError::Init {
            provider: resolved.id.clone(),
            reason,
        })?;
        debug!(provider = %resolved.id, kind = %resolved.kind(), "provider initialized");
    }
    Ok(UsageTrackingProvider::new(next))
}

fn provider(resolved: &ResolvedProvider, next: Box<dyn BinaryProvider>) -> Result<Box<dyn BinaryProvider>, String> {
    let id = resolved.id.clone();
    Ok(match &resolved.settings {
        ProviderSettings::FileSystem { dir } => {
            Box::new(FileProvider::new(id, dir, next).map_err(|e| format!("{}: {e}", dir.display()))?)
        }
        ProviderSettings::CacheFs { dir, max_size } => Box::new(
            FileCacheProvider::new(id, dir, *max_size, next)
                .map_err(|e| format!("{}: {e}", dir.display()))?,
        ),
        ProviderSettings::Blob { db_path } => Box::new(
            BlobProvider::open(id, db_path, next)
                .map_err(|e| format!("{}: {e}", db_path.display()))?,
        ),
        ProviderSettings::Retry {
            max_tries,
            interval,
        } => Box::new(RetryProvider::new(id, *max_tries, *interval, next)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChainSpec, ProviderNode, SizeValue, StorageMode};

    use ProviderKind::*;

    fn config(base: &Path) -> BinaryStoreConfig {
        BinaryStoreConfig::with_base_dir(base)
    }

    fn node(id: &str, kind: Option<ProviderKind>) -> ProviderNode {
        ProviderNode {
            id: id.into(),
            kind,
            next: None,
            params: ProviderParams::default(),
        }
    }

    #[test]
    fn storage_modes_select_templates() {
        let base = Path::new("/data");
        let cases = [
            (StorageMode::Filesystem, vec![UsageTracking, FileSystem, Empty]),
            (
                StorageMode::FilesystemCache,
                vec![UsageTracking, CacheFs, FileSystem, Empty],
            ),
            (
                StorageMode::FullDb,
                vec![UsageTracking, CacheFs, Retry, Blob, Empty],
            ),
        ];
        for (mode, expected) in cases {
            let mut cfg = config(base);
            cfg.storage_mode = mode;
            let plan = ChainBuilder::new(&cfg).resolve().unwrap();
            assert_eq!(plan.kinds(), expected, "{mode:?}");
            assert_eq!(plan.template.as_deref(), Some(mode.template()));
        }
    }

    #[test]
    fn default_locations_under_base_dir() {
        let mut cfg = config(Path::new("/data"));
        cfg.storage_mode = StorageMode::FullDb;
        let plan = ChainBuilder::new(&cfg).resolve().unwrap();
        assert_eq!(
            plan.providers[0].settings,
            ProviderSettings::CacheFs {
                dir: "/data/cache".into(),
                max_size: DEFAULT_CACHE_SIZE
            }
        );
        assert_eq!(
            plan.providers[1].settings,
            ProviderSettings::Retry {
                max_tries: 5,
                interval: Duration::from_millis(1000)
            }
        );
        assert_eq!(
            plan.providers[2].settings,
            ProviderSettings::Blob {
                db_path: "/data/binaries.db".into()
            }
        );
    }

    #[test]
    fn template_override_cannot_relink() {
        let mut cfg = config(Path::new("/data"));
        cfg.chain.template = Some("filesystem-cache".into());
        let mut cache = node("cache-fs", None);
        cache.next = Some("cache-fs".into());
        cfg.providers.push(cache);

        let err = ChainBuilder::new(&cfg).resolve().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter { ref provider, param: "next", .. } if provider == "cache-fs"
        ));
    }

    #[test]
    fn zero_cache_size_drops_cache() {
        let mut cfg = config(Path::new("/data"));
        cfg.chain.template = Some("filesystem-cache".into());
        let mut cache = node("cache-fs", None);
        cache.params.max_cache_size = Some(SizeValue::Text("0".into()));
        cfg.providers.push(cache);

        let plan = ChainBuilder::new(&cfg).resolve().unwrap();
        assert_eq!(plan.kinds(), vec![UsageTracking, FileSystem, Empty]);
    }

    #[test]
    fn override_replaces_type_and_params() {
        let mut cfg = config(Path::new("/data"));
        cfg.chain.template = Some("filesystem-cache".into());
        let mut fs = node("file-system", Some(Blob));
        fs.params.db_path = Some(":memory:".into());
        cfg.providers.push(fs);
        let mut cache = node("cache-fs", None);
        cache.params.dir = Some("fast".into());
        cache.params.max_cache_size = Some(SizeValue::Text("1MB".into()));
        cfg.providers.push(cache);

        let plan = ChainBuilder::new(&cfg).resolve().unwrap();
        assert_eq!(plan.kinds(), vec![UsageTracking, CacheFs, Blob, Empty]);
        assert_eq!(
            plan.providers[0].settings,
            ProviderSettings::CacheFs {
                dir: "/data/fast".into(),
                max_size: 1 << 20
            }
        );
        assert_eq!(
            plan.providers[1].settings,
            ProviderSettings::Blob {
                db_path: ":memory:".into()
            }
        );
    }

    #[test]
    fn override_for_absent_node_is_rejected() {
        let mut cfg = config(Path::new("/data"));
        cfg.providers.push(node("blob", None));
        let err = ChainBuilder::new(&cfg).resolve().unwrap_err();
        assert!(matches!(err, ConfigError::UnusedOverride { ref id, ref template }
            if id == "blob" && template == "filesystem"));
    }

    #[test]
    fn unknown_template_is_rejected() {
        let mut cfg = config(Path::new("/data"));
        cfg.chain.template = Some("tape".into());
        let err = ChainBuilder::new(&cfg).resolve().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTemplate(ref t) if t == "tape"));
    }

    #[test]
    fn missing_base_dir_is_a_missing_parameter() {
        let cfg = BinaryStoreConfig::default();
        let err = ChainBuilder::new(&cfg).resolve().unwrap_err();
        assert!(matches!(err, ConfigError::MissingParameter { param: "dir", .. }));
    }

    #[test]
    fn invalid_cache_size_is_rejected() {
        let mut cfg = config(Path::new("/data"));
        cfg.storage_mode = StorageMode::FilesystemCache;
        let mut cache = node("cache-fs", None);
        cache.params.max_cache_size = Some(SizeValue::Text("lots".into()));
        cfg.providers.push(cache);
        let err = ChainBuilder::new(&cfg).resolve().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { param: "max-cache-size", .. }));
    }

    #[test]
    fn custom_chain_follows_next_links() {
        let cfg = BinaryStoreConfig {
            chain: ChainSpec {
                template: Some("ignored-when-head-is-set".into()),
                head: Some("r".into()),
            },
            providers: vec![
                ProviderNode::new("db", Blob).with_params(ProviderParams {
                    db_path: Some(":memory:".into()),
                    ..Default::default()
                }),
                ProviderNode::new("r", Retry).with_next("db"),
            ],
            ..Default::default()
        };
        let plan = ChainBuilder::new(&cfg).resolve().unwrap();
        assert_eq!(plan.template, None);
        assert_eq!(plan.kinds(), vec![UsageTracking, Retry, Blob, Empty]);
    }

    #[test]
    fn custom_chain_cycle_is_rejected() {
        let cfg = BinaryStoreConfig {
            chain: ChainSpec {
                template: None,
                head: Some("a".into()),
            },
            providers: vec![
                ProviderNode::new("a", Retry).with_next("b"),
                ProviderNode::new("b", Retry).with_next("a"),
            ],
            ..Default::default()
        };
        let err = ChainBuilder::new(&cfg).resolve().unwrap_err();
        assert!(matches!(err, ConfigError::Cycle(ref p) if p == &["a", "b", "a"]));
    }

    #[test]
    fn custom_chain_errors() {
        let dangling = BinaryStoreConfig {
            chain: ChainSpec {
                template: None,
                head: Some("a".into()),
            },
            providers: vec![ProviderNode::new("a", Retry).with_next("nowhere")],
            ..Default::default()
        };
        assert!(matches!(
            ChainBuilder::new(&dangling).resolve().unwrap_err(),
            ConfigError::UnknownProvider(ref id) if id == "nowhere"
        ));

        let untyped = BinaryStoreConfig {
            chain: ChainSpec {
                template: None,
                head: Some("a".into()),
            },
            providers: vec![node("a", None)],
            ..Default::default()
        };
        assert!(matches!(
            ChainBuilder::new(&untyped).resolve().unwrap_err(),
            ConfigError::MissingParameter { param: "type", .. }
        ));

        let mut duplicate = dangling.clone();
        duplicate.providers.push(ProviderNode::new("a", Blob));
        assert!(matches!(
            ChainBuilder::new(&duplicate).resolve().unwrap_err(),
            ConfigError::DuplicateProvider(ref id) if id == "a"
        ));
    }

    #[test]
    fn reserved_kinds_are_rejected() {
        let mut cfg = config(Path::new("/data"));
        cfg.chain.head = Some("t".into());
        cfg.providers.push(ProviderNode::new("t", UsageTracking));
        let err = ChainBuilder::new(&cfg).resolve().unwrap_err();
        assert!(matches!(err, ConfigError::ReservedKind { kind: UsageTracking, .. }));
    }

    #[test]
    fn chain_needs_a_persistent_provider() {
        let cfg = BinaryStoreConfig {
            chain: ChainSpec {
                template: None,
                head: Some("r".into()),
            },
            providers: vec![ProviderNode::new("r", Retry)],
            ..Default::default()
        };
        let err = ChainBuilder::new(&cfg).resolve().unwrap_err();
        assert!(matches!(err, ConfigError::NoPersistentProvider));
    }

    #[test]
    fn resolve_is_deterministic() {
        let mut cfg = config(Path::new("/data"));
        cfg.storage_mode = StorageMode::FullDb;
        let a = ChainBuilder::new(&cfg).resolve().unwrap();
        let b = ChainBuilder::new(&cfg).resolve().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "usage-tracking -> cache-fs -> retry -> blob -> empty");
    }

    #[test]
    fn build_instantiates_plan() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.storage_mode = StorageMode::FilesystemCache;
        let head = ChainBuilder::new(&cfg).build().unwrap();
        assert_eq!(head.chain(), vec![UsageTracking, CacheFs, FileSystem, Empty]);
        assert!(dir.path().join("filestore").is_dir());
        assert!(dir.path().join("cache").is_dir());
    }

    #[test]
    fn build_reports_init_failures() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let mut cfg = config(dir.path());
        let mut fs = node("file-system", None);
        fs.params.dir = Some(blocker.join("nested"));
        cfg.providers.push(fs);

        let err = ChainBuilder::new(&cfg).build().unwrap_err();
        assert!(matches!(err, ConfigError::Init { ref provider, .. } if provider == "file-system"));
    }

    #[test]
    fn template_lookup() {
        assert_eq!(template("filesystem"), Some(&[FileSystem][..]));
        assert!(template("nope").is_none());
        assert_eq!(template_names().count(), 4);
    }
}
