use std::collections::BTreeMap;
use std::io;

use parking_lot::RwLock;

/// 平台文件系统层：引擎只通过该接口读取 OS 状态（无状态、可替换）。
///
/// ## 契约
/// - `is_directory` 每次都重新查询，不做缓存。
/// - `list_children` 只返回名字；是否把失败当作“无子项”由调用方决定。
/// - `file_len` 对不可读/不存在的文件返回错误。
pub trait FileSystem: Send + Sync {
    fn is_directory(&self, path: &str) -> bool;
    fn list_children(&self, path: &str) -> io::Result<Vec<String>>;
    fn file_len(&self, path: &str) -> io::Result<u64>;
    fn resolve_absolute(&self, path: &str) -> io::Result<String>;
    fn exists(&self, path: &str) -> bool;
}

/// 基于 std::fs 的实现（跟随符号链接，不做环检测）
#[derive(Clone, Copy, Debug, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn is_directory(&self, path: &str) -> bool {
        std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
    }

    fn list_children(&self, path: &str) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for ent in std::fs::read_dir(path)? {
            let ent = match ent {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!("skip unreadable entry in {:?}: {}", path, e);
                    continue;
                }
            };
            match ent.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => {
                    tracing::warn!("skip non UTF-8 entry {:?} in {:?}", raw, path);
                }
            }
        }
        Ok(names)
    }

    fn file_len(&self, path: &str) -> io::Result<u64> {
        // 与“打开后读取长度”一致：打不开的文件算失败，而不仅是 stat 失败。
        // 非阻塞打开：FIFO 没有写端时普通 open 会永远挂起。
        let mut opts = std::fs::OpenOptions::new();
        opts.read(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.custom_flags(libc::O_NONBLOCK);
        }
        let f = opts.open(path)?;
        Ok(f.metadata()?.len())
    }

    fn resolve_absolute(&self, path: &str) -> io::Result<String> {
        std::path::absolute(path)?
            .into_os_string()
            .into_string()
            .map_err(|raw| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("path is not valid UTF-8: {:?}", raw),
                )
            })
    }

    fn exists(&self, path: &str) -> bool {
        std::path::Path::new(path).exists()
    }
}

#[derive(Clone, Copy, Debug)]
enum MemNode {
    Dir { listable: bool },
    File { len: Option<u64> },
}

/// 内存文件系统：路径以 `/` 分隔，列目录时和原生接口一样带 `.`/`..` 伪条目。
///
/// 主要用于模拟不可读文件、不可列目录等 OS 失败场景。
pub struct MemoryFileSystem {
    nodes: RwLock<BTreeMap<String, MemNode>>,
    cwd: String,
}

fn mem_key(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn mem_parent(key: &str) -> Option<String> {
    if key == "/" {
        return None;
    }
    match key.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(i) => Some(key[..i].to_string()),
        None => None,
    }
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::with_cwd("/")
    }

    /// 相对路径将以 `cwd` 为基准解析
    pub fn with_cwd(cwd: &str) -> Self {
        let fs = Self {
            nodes: RwLock::new(BTreeMap::new()),
            cwd: mem_key(cwd),
        };
        fs.add_dir("/");
        let cwd = fs.cwd.clone();
        fs.add_dir(&cwd);
        fs
    }

    pub fn add_dir(&self, path: &str) {
        self.insert(mem_key(path), MemNode::Dir { listable: true });
    }

    /// 目录存在但无法开始枚举
    pub fn add_unlistable_dir(&self, path: &str) {
        self.insert(mem_key(path), MemNode::Dir { listable: false });
    }

    pub fn add_file(&self, path: &str, len: u64) {
        self.insert(mem_key(path), MemNode::File { len: Some(len) });
    }

    /// 文件存在但无法打开
    pub fn add_unreadable_file(&self, path: &str) {
        self.insert(mem_key(path), MemNode::File { len: None });
    }

    /// 删除路径及其全部后代
    pub fn remove(&self, path: &str) {
        let key = mem_key(path);
        let prefix = if key == "/" { key.clone() } else { format!("{}/", key) };
        let mut nodes = self.nodes.write();
        nodes.retain(|k, _| k != &key && !k.starts_with(&prefix));
    }

    fn insert(&self, key: String, node: MemNode) {
        let mut nodes = self.nodes.write();
        let mut parent = mem_parent(&key);
        while let Some(p) = parent {
            let next = mem_parent(&p);
            nodes.entry(p).or_insert(MemNode::Dir { listable: true });
            parent = next;
        }
        nodes.insert(key, node);
    }

    fn node(&self, path: &str) -> Option<MemNode> {
        self.nodes.read().get(&mem_key(path)).copied()
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MemoryFileSystem {
    fn is_directory(&self, path: &str) -> bool {
        matches!(self.node(path), Some(MemNode::Dir { .. }))
    }

    fn list_children(&self, path: &str) -> io::Result<Vec<String>> {
        let key = mem_key(path);
        match self.node(&key) {
            Some(MemNode::Dir { listable: true }) => {}
            Some(MemNode::Dir { listable: false }) => {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "listing denied"));
            }
            Some(MemNode::File { .. }) => {
                return Err(io::Error::new(io::ErrorKind::Other, "not a directory"));
            }
            None => return Err(io::Error::new(io::ErrorKind::NotFound, "no such directory")),
        }

        let prefix = if key == "/" { key.clone() } else { format!("{}/", key) };
        let nodes = self.nodes.read();
        let mut names = vec![".".to_string(), "..".to_string()];
        names.extend(
            nodes
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(k, _)| &k[prefix.len()..])
                .filter(|rest| !rest.is_empty() && !rest.contains('/'))
                .map(str::to_string),
        );
        Ok(names)
    }

    fn file_len(&self, path: &str) -> io::Result<u64> {
        match self.node(path) {
            Some(MemNode::File { len: Some(len) }) => Ok(len),
            Some(MemNode::File { len: None }) => {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "open denied"))
            }
            Some(MemNode::Dir { .. }) => {
                Err(io::Error::new(io::ErrorKind::Other, "is a directory"))
            }
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
        }
    }

    fn resolve_absolute(&self, path: &str) -> io::Result<String> {
        if path.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty path"));
        }
        if path.starts_with('/') {
            Ok(path.to_string())
        } else if self.cwd == "/" {
            Ok(format!("/{}", path))
        } else {
            Ok(format!("{}/{}", self.cwd, path))
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.node(path).is_some()
    }
}
