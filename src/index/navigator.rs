use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::core::{File, ParallelAggregator};
use crate::error::{Error, Result};
use crate::index::ratio::RatioBreakdown;
use crate::index::size_cache::SizeCache;

/// 列表中的一行；`size == None` 表示“大小未知”，不能当作 0 展示
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListingRow {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: Option<u64>,
}

/// 当前目录 + 尺寸缓存。可在多个请求间共享（当前目录原子切换）。
pub struct Navigator {
    current: ArcSwap<File>,
    aggregator: ParallelAggregator,
    cache: SizeCache,
}

impl Navigator {
    pub fn new(start: File, aggregator: ParallelAggregator, cache: SizeCache) -> Self {
        Self {
            current: ArcSwap::from_pointee(start),
            aggregator,
            cache,
        }
    }

    pub fn current(&self) -> File {
        File::clone(&self.current.load())
    }

    pub fn aggregator(&self) -> &ParallelAggregator {
        &self.aggregator
    }

    pub fn cache(&self) -> &SizeCache {
        &self.cache
    }

    /// 进入当前目录下的子目录
    pub fn open(&self, name: &str) -> Result<File> {
        let target = self.current().child(name);
        if !target.is_directory() {
            return Err(Error::NotADirectory(target.path().to_string()));
        }
        self.switch(target.clone());
        Ok(target)
    }

    pub fn show_parent(&self) -> File {
        let parent = self.current().parent();
        self.switch(parent.clone());
        parent
    }

    /// 跳转到任意目录（相对路径按进程工作目录解析）
    pub fn browse(&self, raw: &str) -> Result<File> {
        let fs = self.current().fs().clone();
        let target = File::with_fs(fs, raw)?;
        if !target.exists() {
            return Err(Error::NotFound(target.path().to_string()));
        }
        if !target.is_directory() {
            return Err(Error::NotADirectory(target.path().to_string()));
        }
        self.switch(target.clone());
        Ok(target)
    }

    /// 丢弃当前目录相关的缓存，下次 listing 重新计算
    pub fn refresh(&self) {
        self.cache.invalidate(self.current().path());
    }

    fn switch(&self, target: File) {
        tracing::info!("navigate -> {}", target.path());
        self.current.store(Arc::new(target));
    }

    /// 当前目录的子项及其整棵子树大小，按名称排序
    pub fn listing(&self) -> Vec<ListingRow> {
        self.listing_of(&self.current())
    }

    pub fn listing_of(&self, dir: &File) -> Vec<ListingRow> {
        let mut rows: Vec<ListingRow> = dir
            .children()
            .into_iter()
            .map(|child| {
                let is_dir = child.is_directory();
                ListingRow {
                    name: child.name().to_string(),
                    path: child.absolute_path(),
                    is_dir,
                    size: self.size_of(&child),
                }
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    /// 列表连同合计一起返回；合计由各行相加，不再重新遍历整棵树。
    /// 任一行大小未知时合计也未知。
    pub fn listing_with_total(&self, dir: &File) -> (Vec<ListingRow>, Option<u64>) {
        let rows = self.listing_of(dir);
        let total = rows.iter().map(|r| r.size).sum();
        (rows, total)
    }

    pub fn ratio(&self) -> Result<RatioBreakdown> {
        RatioBreakdown::compute(&self.current())
    }

    /// 缓存优先；计算失败不入缓存
    pub fn size_of(&self, target: &File) -> Option<u64> {
        if let Some(bytes) = self.cache.get(target.path()) {
            return Some(bytes);
        }
        match self.aggregator.concurrent_descendant_size(target) {
            Ok(bytes) => {
                self.cache.insert(target.path(), bytes);
                Some(bytes)
            }
            Err(e) => {
                tracing::debug!("size unknown for {}: {}", target.path(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FileSystem, MemoryFileSystem};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn nav() -> (Arc<MemoryFileSystem>, Navigator) {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_file("/root/a", 10);
        fs.add_file("/root/b", 20);
        fs.add_file("/root/c/d", 5);
        fs.add_unreadable_file("/root/locked");
        let start = File::with_fs(fs.clone(), "/root").unwrap();
        let n = Navigator::new(
            start,
            ParallelAggregator::with_workers(2),
            SizeCache::new(64, Duration::from_secs(60)),
        );
        (fs, n)
    }

    #[test]
    fn listing_marks_failures_as_unknown() {
        let (_fs, n) = nav();
        let rows = n.listing();
        let sizes: Vec<(&str, Option<u64>)> =
            rows.iter().map(|r| (r.name.as_str(), r.size)).collect();
        assert_eq!(
            sizes,
            vec![("a", Some(10)), ("b", Some(20)), ("c", Some(5)), ("locked", None)]
        );
        assert!(rows[2].is_dir);
        assert_eq!(rows[2].path, "/root/c/");
    }

    #[test]
    fn open_parent_and_browse() {
        let (_fs, n) = nav();
        assert!(matches!(n.open("a"), Err(Error::NotADirectory(_))));
        assert_eq!(n.open("c").unwrap().path(), "/root/c");
        assert_eq!(n.listing().len(), 1);
        assert_eq!(n.show_parent().path(), "/root");
        assert!(matches!(n.browse("/nowhere"), Err(Error::NotFound(_))));
        assert_eq!(n.browse("/root/c").unwrap().path(), "/root/c");
        assert_eq!(n.current().path(), "/root/c");
    }

    #[test]
    fn refresh_drops_stale_sizes() {
        let (fs, n) = nav();
        assert_eq!(n.listing()[2].size, Some(5));

        fs.add_file("/root/c/e", 7);
        assert_eq!(n.listing()[2].size, Some(5));

        n.refresh();
        assert_eq!(n.listing()[2].size, Some(12));
    }

    /// 统计 `file_len` 调用次数
    struct CountingFs {
        inner: MemoryFileSystem,
        probes: AtomicUsize,
    }

    impl FileSystem for CountingFs {
        fn is_directory(&self, path: &str) -> bool {
            self.inner.is_directory(path)
        }
        fn list_children(&self, path: &str) -> std::io::Result<Vec<String>> {
            self.inner.list_children(path)
        }
        fn file_len(&self, path: &str) -> std::io::Result<u64> {
            self.probes.fetch_add(1, Ordering::Relaxed);
            self.inner.file_len(path)
        }
        fn resolve_absolute(&self, path: &str) -> std::io::Result<String> {
            self.inner.resolve_absolute(path)
        }
        fn exists(&self, path: &str) -> bool {
            self.inner.exists(path)
        }
    }

    #[test]
    fn total_comes_from_rows_without_second_walk() {
        let inner = MemoryFileSystem::new();
        inner.add_file("/root/a", 10);
        inner.add_file("/root/b", 20);
        inner.add_file("/root/c/d", 5);
        let fs = Arc::new(CountingFs { inner, probes: AtomicUsize::new(0) });
        let start = File::with_fs(fs.clone(), "/root").unwrap();
        let n = Navigator::new(
            start.clone(),
            ParallelAggregator::with_workers(2),
            SizeCache::disabled(),
        );

        let (rows, total) = n.listing_with_total(&start);
        assert_eq!(rows.len(), 3);
        assert_eq!(total, Some(35));
        assert_eq!(fs.probes.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn total_is_unknown_when_any_row_is() {
        let (_fs, n) = nav();
        let (rows, total) = n.listing_with_total(&n.current());
        assert_eq!(rows.len(), 4);
        assert_eq!(total, None);
    }

    #[test]
    fn ratio_uses_current_directory() {
        let (_fs, n) = nav();
        n.open("c").unwrap();
        let r = n.ratio().unwrap();
        assert_eq!(r.total, 5);
        assert_eq!(r.slices.len(), 1);
    }
}
