use std::cmp::Reverse;
use std::fmt;

use serde::Serialize;

use crate::core::{Entry, File};
use crate::error::{Error, Result};
use crate::stats::human_bytes;

/// 小于 1° 的扇区不绘制
const MIN_VISIBLE_DEGREES: f64 = 1.0;

#[derive(Clone, Debug, Serialize)]
pub struct RatioSlice {
    pub name: String,
    pub is_dir: bool,
    /// `None` 表示大小未知（取大小失败）
    pub size: Option<u64>,
    pub share: f64,
    pub degrees: f64,
}

/// 目录直接子项的占比拆分（饼图数据，不含绘制）
#[derive(Clone, Debug, Serialize)]
pub struct RatioBreakdown {
    pub directory: String,
    /// 已知且大于 0 的子项大小之和
    pub total: u64,
    /// 按大小降序，未知大小排在最后
    pub slices: Vec<RatioSlice>,
}

impl RatioBreakdown {
    /// 目录子项用 `children_size`（失败归零），文件用 `size_of`（失败记为未知）
    pub fn compute(dir: &File) -> Result<Self> {
        let dir = match dir.classify() {
            Entry::Directory(d) => d,
            Entry::Regular(f) => return Err(Error::NotADirectory(f.file().path().to_string())),
        };

        let mut sized: Vec<(File, bool, Option<u64>)> = dir
            .children()
            .into_iter()
            .map(|child| match child.classify() {
                Entry::Directory(d) => {
                    let size = d.children_size();
                    (d.into_file(), true, Some(size))
                }
                Entry::Regular(f) => {
                    let size = f.size().map_err(|e| tracing::debug!("ratio: {}", e)).ok();
                    (f.file().clone(), false, size)
                }
            })
            .collect();

        let total: u64 = sized.iter().filter_map(|(_, _, s)| *s).sum();
        sized.sort_by_key(|(f, _, s)| (Reverse(*s), f.name().to_string()));

        let slices = sized
            .into_iter()
            .map(|(f, is_dir, size)| {
                let share = match size {
                    Some(s) if total > 0 => s as f64 / total as f64,
                    _ => 0.0,
                };
                RatioSlice {
                    name: f.name().to_string(),
                    is_dir,
                    size,
                    share,
                    degrees: share * 360.0,
                }
            })
            .collect();

        Ok(Self {
            directory: dir.file().absolute_path(),
            total,
            slices,
        })
    }

    /// 值得画出来的扇区：大小已知、非零、且不小于 1°
    pub fn visible_slices(&self) -> impl Iterator<Item = &RatioSlice> {
        self.slices
            .iter()
            .filter(|s| s.size.unwrap_or(0) > 0 && s.degrees >= MIN_VISIBLE_DEGREES)
    }
}

impl fmt::Display for RatioBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}  ({})", self.directory, human_bytes(self.total))?;
        for s in &self.slices {
            let size = s.size.map(human_bytes).unwrap_or_else(|| "?".to_string());
            let bar = "█".repeat((s.share * 40.0).round() as usize);
            let suffix = if s.is_dir { "/" } else { "" };
            writeln!(
                f,
                "  {:>10}  {:>6.2}%  {:<40}  {}{}",
                size,
                s.share * 100.0,
                bar,
                s.name,
                suffix
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MemoryFileSystem;
    use std::sync::Arc;

    #[test]
    fn shares_sorted_and_unknown_last() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_file("/r/small", 1);
        fs.add_file("/r/big", 300);
        fs.add_file("/r/sub/x", 59);
        fs.add_unreadable_file("/r/locked");
        let dir = File::with_fs(fs, "/r").unwrap();

        let b = RatioBreakdown::compute(&dir).unwrap();
        assert_eq!(b.total, 360);
        let names: Vec<&str> = b.slices.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["big", "sub", "small", "locked"]);
        assert!((b.slices[0].degrees - 300.0).abs() < 1e-9);
        assert!(b.slices[1].is_dir);
        assert_eq!(b.slices[3].size, None);

        let visible: Vec<&str> = b.visible_slices().map(|s| s.name.as_str()).collect();
        assert_eq!(visible, vec!["big", "sub", "small"]);
    }

    #[test]
    fn tiny_slices_are_hidden() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_file("/r/huge", 100_000);
        fs.add_file("/r/speck", 1);
        let dir = File::with_fs(fs, "/r").unwrap();

        let b = RatioBreakdown::compute(&dir).unwrap();
        assert_eq!(b.visible_slices().count(), 1);
        assert!(b.to_string().contains("speck"));
    }

    #[test]
    fn file_target_is_rejected() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_file("/r/f", 1);
        let f = File::with_fs(fs, "/r/f").unwrap();
        assert!(matches!(RatioBreakdown::compute(&f), Err(Error::NotADirectory(_))));
    }
}
