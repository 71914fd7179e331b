use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::core::adaptive::{available_parallelism, select_strategy, Dispatch, Strategy};
use crate::core::file::{Directory, Entry, File};
use crate::core::partition::{partition, Partition};
use crate::error::{Error, Result};
use crate::stats::ScanReport;

/// SequentialAggregator：递归求直接子项大小之和。
///
/// 失败归零：本目录任一文件取大小失败，则本目录计为 0；
/// 子目录的失败只让该子目录归零（递归调用自身已做了吞错）。
pub fn children_size(dir: &Directory) -> u64 {
    match try_children_size(dir) {
        Ok(total) => total,
        Err(e) => {
            tracing::debug!("children size of {:?} reported as 0: {}", dir.file().path(), e);
            0
        }
    }
}

fn try_children_size(dir: &Directory) -> Result<u64> {
    let mut total = 0u64;
    for child in dir.children() {
        total += match child.classify() {
            Entry::Directory(sub) => sub.children_size(),
            Entry::Regular(f) => f.size()?,
        };
    }
    Ok(total)
}

/// 协作式取消标记；被取消的调用返回 `Error::Cancelled`，不会返回截断的和
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// 字节数与失败条目数分开统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SizeTally {
    pub bytes: u64,
    pub skipped: u64,
}

impl SizeTally {
    pub fn is_complete(&self) -> bool {
        self.skipped == 0
    }

    fn merge(self, other: SizeTally) -> SizeTally {
        SizeTally {
            bytes: self.bytes + other.bytes,
            skipped: self.skipped + other.skipped,
        }
    }
}

/// ParallelAggregator：展开后代列表、按 worker 数分片、并行求和后归约
#[derive(Clone, Debug)]
pub struct ParallelAggregator {
    workers: usize,
    dispatch: Dispatch,
    cancel: CancelToken,
}

impl Default for ParallelAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ParallelAggregator {
    pub fn new() -> Self {
        Self::with_workers(available_parallelism())
    }

    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            dispatch: Dispatch::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn dispatch_mode(&self) -> Dispatch {
        self.dispatch
    }

    /// 目标子树总字节数。分片内任何取大小失败都会中止整个调用。
    pub fn concurrent_descendant_size(&self, target: &File) -> Result<u64> {
        self.measure(target).map(|(bytes, _, _)| bytes)
    }

    /// 与 `concurrent_descendant_size` 相同，附带策略与耗时
    pub fn scan(&self, target: &File) -> Result<ScanReport> {
        let started = Instant::now();
        let (bytes, strategy, descendants) = self.measure(target)?;
        let report = ScanReport {
            target: target.absolute_path(),
            bytes,
            descendants,
            workers: self.workers,
            dispatch: self.dispatch,
            strategy,
            elapsed: started.elapsed(),
        };
        tracing::debug!(
            "scanned {} via {}: {} bytes in {:?}",
            report.target,
            report.strategy,
            report.bytes,
            report.elapsed
        );
        Ok(report)
    }

    fn measure(&self, target: &File) -> Result<(u64, Strategy, usize)> {
        self.cancel.check()?;
        let dir = match target.classify() {
            Entry::Regular(f) => return Ok((f.size()?, Strategy::Direct, 0)),
            Entry::Directory(d) => d,
        };

        let descendants = dir.all_descendants();
        self.cancel.check()?;

        let strategy = select_strategy(true, descendants.len(), self.workers);
        let bytes = match strategy {
            Strategy::Partitioned { chunks } => {
                let parts = partition(descendants.len(), chunks);
                self.run_chunks(&descendants, &parts, |chunk| self.sum_chunk(chunk))?
                    .into_iter()
                    .sum::<Result<u64>>()?
            }
            _ => {
                let bytes = dir.children_size();
                // 串行路径中途被取消时不能把部分结果当真
                self.cancel.check()?;
                bytes
            }
        };
        Ok((bytes, strategy, descendants.len()))
    }

    /// 只统计普通文件；目录的子项已作为独立条目出现在列表中
    fn sum_chunk(&self, chunk: &[File]) -> Result<u64> {
        let mut total = 0u64;
        for entry in chunk {
            self.cancel.check()?;
            if let Entry::Regular(f) = entry.classify() {
                total += f.size()?;
            }
        }
        Ok(total)
    }

    /// 统一的部分失败报告：失败条目计入 `skipped` 而不是归零或中止。
    ///
    /// 只有取消与 worker panic 会返回错误。
    pub fn tally(&self, target: &File) -> Result<SizeTally> {
        self.cancel.check()?;
        let dir = match target.classify() {
            Entry::Regular(f) => return self.tally_chunk(std::slice::from_ref(f.file())),
            Entry::Directory(d) => d,
        };

        let descendants = dir.all_descendants();
        match select_strategy(true, descendants.len(), self.workers) {
            Strategy::Partitioned { chunks } => {
                let parts = partition(descendants.len(), chunks);
                self.run_chunks(&descendants, &parts, |chunk| self.tally_chunk(chunk))?
                    .into_iter()
                    .try_fold(SizeTally::default(), |acc, t| Ok(acc.merge(t?)))
            }
            _ => self.tally_chunk(&descendants),
        }
    }

    fn tally_chunk(&self, chunk: &[File]) -> Result<SizeTally> {
        let mut tally = SizeTally::default();
        for entry in chunk {
            self.cancel.check()?;
            if let Entry::Regular(f) = entry.classify() {
                match f.size() {
                    Ok(n) => tally.bytes += n,
                    Err(e) => {
                        tracing::debug!("tally skip: {}", e);
                        tally.skipped += 1;
                    }
                }
            }
        }
        Ok(tally)
    }

    /// 每段交给一个 worker，阻塞直到全部完成；结果顺序与分片顺序一致
    fn run_chunks<T, F>(&self, items: &[File], parts: &[Partition], work: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&[File]) -> T + Sync,
    {
        match self.dispatch {
            Dispatch::Scoped => run_scoped(items, parts, &work),
            Dispatch::Pool => {
                use rayon::prelude::*;
                panic::catch_unwind(AssertUnwindSafe(|| {
                    parts
                        .par_iter()
                        .map(|p| work(&items[p.range.clone()]))
                        .collect::<Vec<T>>()
                }))
                .map_err(|_| Error::WorkerPanicked)
            }
        }
    }
}

/// 除最后一段外每段一个临时线程；最后一段在调用线程上执行
fn run_scoped<T, F>(items: &[File], parts: &[Partition], work: &F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(&[File]) -> T + Sync,
{
    let Some((last, head)) = parts.split_last() else {
        return Ok(Vec::new());
    };

    crossbeam::thread::scope(|s| {
        let handles: Vec<_> = head
            .iter()
            .map(|p| {
                let slice = &items[p.range.clone()];
                s.spawn(move |_| work(slice))
            })
            .collect();

        // 最后一段不在 scope 派生的线程里，panic 需要自己接住
        let inline = panic::catch_unwind(AssertUnwindSafe(|| work(&items[last.range.clone()])));

        let mut out = Vec::with_capacity(parts.len());
        for h in handles {
            out.push(h.join().map_err(|_| Error::WorkerPanicked)?);
        }
        out.push(inline.map_err(|_| Error::WorkerPanicked)?);
        Ok::<_, Error>(out)
    })
    .map_err(|_| Error::WorkerPanicked)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fs::MemoryFileSystem;

    fn mem_root(fs: &Arc<MemoryFileSystem>, p: &str) -> File {
        File::with_fs(fs.clone(), p).unwrap()
    }

    fn scenario() -> (Arc<MemoryFileSystem>, File) {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_file("/root/a", 10);
        fs.add_file("/root/b", 20);
        fs.add_file("/root/c/d", 5);
        let root = mem_root(&fs, "/root");
        (fs, root)
    }

    #[test]
    fn empty_directory_is_zero() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_dir("/empty");
        let dir = mem_root(&fs, "/empty");
        assert_eq!(dir.children_size().unwrap(), 0);
        assert_eq!(ParallelAggregator::with_workers(4).concurrent_descendant_size(&dir).unwrap(), 0);
    }

    #[test]
    fn small_tree_falls_back_to_sequential() {
        let (_fs, root) = scenario();
        assert_eq!(root.children_size().unwrap(), 35);

        let agg = ParallelAggregator::with_workers(8);
        let report = agg.scan(&root).unwrap();
        assert_eq!(report.bytes, 35);
        assert_eq!(report.descendants, 4);
        assert_eq!(report.strategy, Strategy::Sequential);
    }

    #[test]
    fn file_target_is_its_own_size() {
        let (_fs, root) = scenario();
        let a = root.child("a");
        let agg = ParallelAggregator::with_workers(8);
        assert_eq!(agg.concurrent_descendant_size(&a).unwrap(), a.size_of().unwrap());
        assert_eq!(agg.scan(&a).unwrap().strategy, Strategy::Direct);
    }

    #[test]
    fn flat_thousand_files_partitioned() {
        let fs = Arc::new(MemoryFileSystem::new());
        for i in 0..1000 {
            fs.add_file(&format!("/flat/f{:04}", i), 1);
        }
        let dir = mem_root(&fs, "/flat");

        for dispatch in [Dispatch::Scoped, Dispatch::Pool] {
            let agg = ParallelAggregator::with_workers(8).dispatch(dispatch);
            let report = agg.scan(&dir).unwrap();
            assert_eq!(report.bytes, 1000);
            assert_eq!(report.strategy, Strategy::Partitioned { chunks: 8 });
        }
    }

    #[test]
    fn parallel_and_sequential_agree_on_nested_tree() {
        let fs = Arc::new(MemoryFileSystem::new());
        let mut expected = 0u64;
        for i in 0..7u64 {
            for j in 0..(i + 3) {
                let len = i * 100 + j;
                fs.add_file(&format!("/n/d{}/s{}/f{}", i, j % 3, j), len);
                expected += len;
            }
            fs.add_file(&format!("/n/top{}", i), i);
            expected += i;
        }
        let dir = mem_root(&fs, "/n");

        assert_eq!(dir.children_size().unwrap(), expected);
        for workers in [1, 2, 3, 5, 8, 16] {
            for dispatch in [Dispatch::Scoped, Dispatch::Pool] {
                let agg = ParallelAggregator::with_workers(workers).dispatch(dispatch);
                assert_eq!(agg.concurrent_descendant_size(&dir).unwrap(), expected);
            }
        }
    }

    #[test]
    fn fail_to_zero_in_sequential_path() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_file("/mix/ok", 100);
        fs.add_unreadable_file("/mix/locked");
        let dir = mem_root(&fs, "/mix");
        assert_eq!(dir.children_size().unwrap(), 0);

        // 低于阈值时并行入口走同一条串行路径
        let agg = ParallelAggregator::with_workers(8);
        assert_eq!(agg.concurrent_descendant_size(&dir).unwrap(), 0);
    }

    #[test]
    fn failing_subdirectory_only_zeroes_itself() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_file("/p/a", 10);
        fs.add_file("/p/sub/ok", 7);
        fs.add_unreadable_file("/p/sub/locked");
        let dir = mem_root(&fs, "/p");
        assert_eq!(dir.children_size().unwrap(), 10);
    }

    #[test]
    fn partitioned_path_propagates_probe_failure() {
        let fs = Arc::new(MemoryFileSystem::new());
        for i in 0..50 {
            fs.add_file(&format!("/big/f{:02}", i), 2);
        }
        fs.add_unreadable_file("/big/locked");
        let dir = mem_root(&fs, "/big");

        for dispatch in [Dispatch::Scoped, Dispatch::Pool] {
            let agg = ParallelAggregator::with_workers(4).dispatch(dispatch);
            assert!(matches!(
                agg.concurrent_descendant_size(&dir),
                Err(Error::SizeQuery { .. })
            ));
        }
    }

    #[test]
    fn tally_counts_failures_separately() {
        let fs = Arc::new(MemoryFileSystem::new());
        for i in 0..20 {
            fs.add_file(&format!("/t/f{:02}", i), 3);
        }
        fs.add_unreadable_file("/t/locked");
        fs.add_unreadable_file("/t/sub/locked");
        let dir = mem_root(&fs, "/t");

        for workers in [2, 64] {
            let tally = ParallelAggregator::with_workers(workers).tally(&dir).unwrap();
            assert_eq!(tally, SizeTally { bytes: 60, skipped: 2 });
            assert!(!tally.is_complete());
        }

        let single = ParallelAggregator::with_workers(2).tally(&dir.child("f00")).unwrap();
        assert_eq!(single, SizeTally { bytes: 3, skipped: 0 });
    }

    #[test]
    fn cancelled_call_returns_no_sum() {
        let (_fs, root) = scenario();
        let token = CancelToken::new();
        token.cancel();
        let agg = ParallelAggregator::with_workers(2).cancel_token(token);
        assert!(matches!(agg.concurrent_descendant_size(&root), Err(Error::Cancelled)));
        assert!(matches!(agg.tally(&root), Err(Error::Cancelled)));
    }

    #[test]
    fn worker_panic_is_reported() {
        let fs = Arc::new(MemoryFileSystem::new());
        for i in 0..10 {
            fs.add_file(&format!("/w/f{}", i), 1);
        }
        let items = mem_root(&fs, "/w").all_descendants();
        let parts = partition(items.len(), 4);
        let last = items[parts[3].range.clone()][0].name().to_string();
        // 分别让派生的 worker 与调用线程上的最后一段 panic
        for victim in [items[0].name().to_string(), last] {
            for dispatch in [Dispatch::Scoped, Dispatch::Pool] {
                let agg = ParallelAggregator::with_workers(4).dispatch(dispatch);
                let r = agg.run_chunks(&items, &parts, |chunk| {
                    if chunk.iter().any(|f| f.name() == victim) {
                        panic!("boom");
                    }
                    chunk.len()
                });
                assert!(matches!(r, Err(Error::WorkerPanicked)));
            }
        }
    }

    #[test]
    fn real_directory_matches_known_sizes() {
        let root = std::env::temp_dir().join(format!(
            "wms-agg-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(root.join("c")).unwrap();
        std::fs::write(root.join("a"), vec![0u8; 10]).unwrap();
        std::fs::write(root.join("b"), vec![0u8; 20]).unwrap();
        std::fs::write(root.join("c").join("d"), vec![0u8; 5]).unwrap();

        let dir = File::open(root.to_str().unwrap()).unwrap();
        assert_eq!(dir.children_size().unwrap(), 35);
        assert_eq!(dir.all_descendants().len(), 4);
        assert_eq!(ParallelAggregator::with_workers(2).concurrent_descendant_size(&dir).unwrap(), 35);
        assert_eq!(dir.concurrent_descendant_size().unwrap(), 35);
    }
}
