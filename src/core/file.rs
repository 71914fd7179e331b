use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::core::aggregate::{self, ParallelAggregator};
use crate::core::flatten;
use crate::core::fs::{FileSystem, OsFileSystem};
use crate::core::path;
use crate::error::{Error, Result};

/// 文件系统路径的值类型。
///
/// 只保存规范化后的绝对路径；“是否目录”每次都向 OS 重新查询，
/// 父子关系完全由路径字符串推导。
#[derive(Clone)]
pub struct File {
    path: String,
    fs: Arc<dyn FileSystem>,
}

/// 按当前 OS 状态划分的两种能力视图
#[derive(Clone, Debug)]
pub enum Entry {
    Directory(Directory),
    Regular(RegularFile),
}

/// 可列举的目录
#[derive(Clone, Debug)]
pub struct Directory(File);

/// 可取大小的普通文件
#[derive(Clone, Debug)]
pub struct RegularFile(File);

impl File {
    /// 基于本机文件系统构造
    pub fn open(raw: &str) -> Result<Self> {
        Self::with_fs(Arc::new(OsFileSystem), raw)
    }

    pub fn with_fs(fs: Arc<dyn FileSystem>, raw: &str) -> Result<Self> {
        let path = path::normalize(fs.as_ref(), raw)?;
        Ok(Self { path, fs })
    }

    fn from_normalized(fs: Arc<dyn FileSystem>, path: String) -> Self {
        Self { path, fs }
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// 内部存储形式（无尾分隔符）
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_directory(&self) -> bool {
        self.fs.is_directory(&self.path)
    }

    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }

    pub fn exists(&self) -> bool {
        self.fs.exists(&self.path)
    }

    pub fn name(&self) -> &str {
        path::file_name(&self.path)
    }

    /// 目录带尾分隔符，文件不带
    pub fn absolute_path(&self) -> String {
        path::directory_form(&self.path, self.is_directory())
    }

    pub fn parent(&self) -> File {
        let parent = path::parent_path(&self.path).to_string();
        Self::from_normalized(self.fs.clone(), parent)
    }

    pub fn child(&self, name: &str) -> File {
        let joined = path::clean(&path::join(&self.path, name));
        Self::from_normalized(self.fs.clone(), joined)
    }

    pub fn classify(&self) -> Entry {
        if self.is_directory() {
            Entry::Directory(Directory(self.clone()))
        } else {
            Entry::Regular(RegularFile(self.clone()))
        }
    }

    /// 直接子项；非目录或无法枚举时返回空
    pub fn children(&self) -> Vec<File> {
        match self.classify() {
            Entry::Directory(dir) => dir.children(),
            Entry::Regular(_) => Vec::new(),
        }
    }

    /// 全部后代（广度优先）；非目录返回空
    pub fn all_descendants(&self) -> Vec<File> {
        match self.classify() {
            Entry::Directory(dir) => dir.all_descendants(),
            Entry::Regular(_) => Vec::new(),
        }
    }

    pub fn size_of(&self) -> Result<u64> {
        match self.classify() {
            Entry::Regular(f) => f.size(),
            Entry::Directory(_) => Err(Error::InvalidOperation {
                op: "cannot get the file size of a directory",
                path: self.path.clone(),
            }),
        }
    }

    pub fn children_size(&self) -> Result<u64> {
        match self.classify() {
            Entry::Directory(dir) => Ok(dir.children_size()),
            Entry::Regular(_) => Err(Error::InvalidOperation {
                op: "cannot get the size of a file's children",
                path: self.path.clone(),
            }),
        }
    }

    /// 按本机并行度计算整棵子树大小
    pub fn concurrent_descendant_size(&self) -> Result<u64> {
        ParallelAggregator::new().concurrent_descendant_size(self)
    }
}

impl Directory {
    pub fn file(&self) -> &File {
        &self.0
    }

    pub fn into_file(self) -> File {
        self.0
    }

    /// DirectoryEntryProvider：枚举失败与“没有子项”等价
    pub fn children(&self) -> Vec<File> {
        let dir = &self.0;
        match dir.fs.list_children(&dir.path) {
            Ok(names) => names
                .into_iter()
                .filter(|n| n != "." && n != "..")
                .map(|n| File::from_normalized(dir.fs.clone(), path::join(&dir.path, &n)))
                .collect(),
            Err(source) => {
                let err = Error::Enumeration {
                    path: dir.path.clone(),
                    source,
                };
                tracing::debug!("treating as empty: {}", err);
                Vec::new()
            }
        }
    }

    pub fn all_descendants(&self) -> Vec<File> {
        flatten::all_descendants(self)
    }

    /// 子项大小之和；任何失败都让该目录计为 0
    pub fn children_size(&self) -> u64 {
        aggregate::children_size(self)
    }
}

impl RegularFile {
    pub fn file(&self) -> &File {
        &self.0
    }

    /// SizeProbe：单次查询，不重试、不吞错
    pub fn size(&self) -> Result<u64> {
        let f = &self.0;
        let len = f.fs.file_len(&f.path).map_err(|source| Error::SizeQuery {
            path: f.path.clone(),
            source,
        })?;
        if len == u64::MAX {
            return Err(Error::SizeQuery {
                path: f.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid file size"),
            });
        }
        Ok(len)
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("File").field(&self.path).finish()
    }
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.absolute_path())
    }
}

impl PartialEq for File {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for File {}

impl Hash for File {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fs::MemoryFileSystem;

    fn sample() -> (Arc<MemoryFileSystem>, File) {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_file("/root/a", 10);
        fs.add_file("/root/b", 20);
        fs.add_file("/root/c/d", 5);
        let root = File::with_fs(fs.clone(), "/root").unwrap();
        (fs, root)
    }

    #[test]
    fn children_skip_pseudo_entries() {
        let (_fs, root) = sample();
        let mut names: Vec<String> = root.children().iter().map(|f| f.name().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(root.child("a").children().is_empty());
    }

    #[test]
    fn unlistable_directory_has_no_children() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_unlistable_dir("/sealed");
        let dir = File::with_fs(fs, "/sealed").unwrap();
        assert!(dir.is_directory());
        assert!(dir.children().is_empty());
    }

    #[test]
    fn kind_mismatch_is_invalid_operation() {
        let (_fs, root) = sample();
        assert!(matches!(root.size_of(), Err(Error::InvalidOperation { .. })));
        assert!(matches!(
            root.child("a").children_size(),
            Err(Error::InvalidOperation { .. })
        ));
        assert_eq!(root.child("a").size_of().unwrap(), 10);
    }

    #[test]
    fn kind_is_requeried_on_every_call() {
        let (fs, root) = sample();
        let c = root.child("c");
        assert!(c.is_directory());
        fs.remove("/root/c");
        fs.add_file("/root/c", 3);
        assert!(c.is_file());
        assert_eq!(c.size_of().unwrap(), 3);
    }

    #[test]
    fn absolute_path_marks_directories() {
        let (_fs, root) = sample();
        assert_eq!(root.absolute_path(), "/root/");
        assert_eq!(root.child("a").absolute_path(), "/root/a");
        assert_eq!(root.child("c").child("d").parent(), root.child("c"));
        assert_eq!(root.child("c/../b"), root.child("b"));
        assert_eq!(root.to_string(), "/root/");
    }

    #[test]
    fn unreadable_file_reports_size_query_error() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_unreadable_file("/x/locked");
        let f = File::with_fs(fs, "/x/locked").unwrap();
        assert!(matches!(f.size_of(), Err(Error::SizeQuery { .. })));
    }
}
