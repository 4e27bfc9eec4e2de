use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::file::OpenFlags;
use crate::storage::index_cache::IndexCache;

/// sidecar 缓存设置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// 不设置时 sidecar 放在源文件旁边
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

/// `config.toml`：
///
/// ```toml
/// log_filter = "ecl_index=debug"
///
/// [open]
/// writable = false
/// close_stream = true
///
/// [cache]
/// enabled = true
/// dir = "/var/cache/ecl-index"
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub open: OpenFlags,
    pub cache: CacheConfig,
    pub log_filter: String,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            open: OpenFlags::default(),
            cache: CacheConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl IndexerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&s).with_context(|| format!("parsing config {}", path.display()))
    }

    /// `<config_dir>/ecl-index/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ecl-index").join("config.toml"))
    }

    /// 默认位置有配置文件就读，没有就用默认值
    pub fn load_default() -> anyhow::Result<Self> {
        match Self::default_path() {
            Some(p) if p.exists() => Self::load(&p),
            _ => Ok(Self::default()),
        }
    }

    pub fn sidecar_for(&self, source: &Path) -> PathBuf {
        IndexCache::sidecar_path(source, self.cache.dir.as_deref())
    }
}
