use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::{available_parallelism, Dispatch, ParallelAggregator};
use crate::error::{Error, Result};
use crate::index::SizeCache;

pub const DEFAULT_PORT: u16 = 6061;

/// 配置文件（TOML），所有字段可选
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// worker 数；缺省为本机并行度
    pub workers: Option<usize>,
    pub dispatch: Dispatch,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: None,
            dispatch: Dispatch::Scoped,
            cache_capacity: 10_000,
            cache_ttl_secs: 300,
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// `~/.config/wheres-my-ssd/config.toml`（按平台约定）
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("wheres-my-ssd").join("config.toml"))
    }

    pub fn from_toml(text: &str, origin: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| Error::Config {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text, path)
    }

    /// 显式路径必须存在；否则尝试默认位置，找不到时用默认值
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit {
            return Self::load(p);
        }
        match Self::default_path() {
            Some(p) if p.is_file() => {
                tracing::info!("loading config from {}", p.display());
                Self::load(&p)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.filter(|&n| n > 0).unwrap_or_else(available_parallelism)
    }

    pub fn aggregator(&self) -> ParallelAggregator {
        ParallelAggregator::with_workers(self.worker_count()).dispatch(self.dispatch)
    }

    pub fn size_cache(&self) -> SizeCache {
        SizeCache::new(self.cache_capacity, Duration::from_secs(self.cache_ttl_secs))
    }
}
