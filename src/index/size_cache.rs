use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::core::path;

#[derive(Clone, Copy, Debug)]
struct CachedSize {
    bytes: u64,
    measured_at: Instant,
}

/// 导航层的内存尺寸缓存（DashMap 实现，进程退出即失效）。
///
/// 失效策略：TTL 过期，或导航刷新时显式失效该目录的子树与祖先。
pub struct SizeCache {
    inner: DashMap<String, CachedSize>,
    access_count: DashMap<String, u64>, // LRU辅助
    capacity: usize,
    ttl: Duration,
}

impl SizeCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: DashMap::with_capacity(capacity.min(4096)),
            access_count: DashMap::new(),
            capacity,
            ttl,
        }
    }

    /// 容量为 0 等同于关闭缓存
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        let hit = self.inner.get(key).map(|e| *e.value())?;
        if hit.measured_at.elapsed() > self.ttl {
            self.inner.remove(key);
            self.access_count.remove(key);
            return None;
        }
        *self.access_count.entry(key.to_string()).or_insert(0) += 1;
        Some(hit.bytes)
    }

    pub fn insert(&self, key: &str, bytes: u64) {
        if self.capacity == 0 {
            return;
        }
        if self.inner.len() >= self.capacity && !self.inner.contains_key(key) {
            // LRU淘汰
            let lru_key = self
                .access_count
                .iter()
                .min_by_key(|e| *e.value())
                .map(|e| e.key().clone())
                .or_else(|| self.inner.iter().next().map(|e| e.key().clone()));

            if let Some(k) = lru_key {
                self.inner.remove(&k);
                self.access_count.remove(&k);
            }
        }

        self.inner.insert(
            key.to_string(),
            CachedSize {
                bytes,
                measured_at: Instant::now(),
            },
        );
        self.access_count.entry(key.to_string()).or_insert(0);
    }

    /// 失效 `key` 自身、其全部后代以及全部祖先（祖先的总量包含了它）
    pub fn invalidate(&self, key: &str) {
        let subtree = path::directory_form(key, true);
        let is_related = |k: &str| {
            k == key
                || k.starts_with(&subtree)
                || key.starts_with(&path::directory_form(k, true))
        };
        self.inner.retain(|k, _| !is_related(k.as_str()));
        self.access_count.retain(|k, _| !is_related(k.as_str()));
    }

    pub fn clear(&self) {
        self.inner.clear();
        self.access_count.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
