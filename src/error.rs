use std::path::PathBuf;

use thiserror::Error;

/// 引擎统一错误类型
#[derive(Debug, Error)]
pub enum Error {
    /// 原始输入无法规范化为绝对路径
    #[error("cannot resolve path '{raw}': {reason}")]
    PathResolution { raw: String, reason: String },

    /// 对目录取文件大小，或对文件取子项大小
    #[error("invalid operation on '{path}': {op}")]
    InvalidOperation { op: &'static str, path: String },

    /// 打开/stat 文件失败
    #[error("unable to get size of '{path}': {source}")]
    SizeQuery {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 目录无法开始枚举（DirectoryEntryProvider 会将其吞掉为空列表）
    #[error("unable to list '{path}': {source}")]
    Enumeration {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{0}' is not a directory")]
    NotADirectory(String),

    #[error("'{0}' does not exist")]
    NotFound(String),

    #[error("size computation cancelled")]
    Cancelled,

    #[error("size worker panicked")]
    WorkerPanicked,

    #[error("invalid config '{}': {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
