//! PathResolver：把用户输入规范化为绝对路径，并处理目录尾分隔符约定。
//!
//! 内部存储的路径一律不带尾分隔符（根除外）；目录的尾分隔符只在展示时追加。

use crate::core::fs::FileSystem;
use crate::error::{Error, Result};

pub const SEPARATOR: char = std::path::MAIN_SEPARATOR;

pub fn is_separator(c: char) -> bool {
    c == '/' || c == SEPARATOR
}

/// `"C:"` 这类裸盘符：应视为卷根目录，而不是两个字符的相对路径
fn is_bare_volume(raw: &str) -> bool {
    let b = raw.as_bytes();
    b.len() == 2 && b[1] == b':' && b[0].is_ascii_alphabetic()
}

/// 根前缀长度：`/` 为 1，`C:\` 为 3，`\\server\share\` 为整个共享前缀，相对路径为 0
fn root_len(path: &str) -> usize {
    let b = path.as_bytes();
    if cfg!(windows) {
        if let Some(n) = unc_root_len(b) {
            return n;
        }
    }
    if b.first().map(|&c| is_separator(c as char)).unwrap_or(false) {
        1
    } else if b.len() >= 3 && b[0].is_ascii_alphabetic() && b[1] == b':' && is_separator(b[2] as char) {
        3
    } else {
        0
    }
}

fn is_sep_byte(c: u8) -> bool {
    c == b'\\' || c == b'/'
}

/// `\\server\share\`、`\\?\C:\`、`\\?\UNC\server\share\` 的前缀长度
fn unc_root_len(b: &[u8]) -> Option<usize> {
    if b.len() < 2 || !is_sep_byte(b[0]) || !is_sep_byte(b[1]) {
        return None;
    }
    if b.len() >= 4 && (b[2] == b'?' || b[2] == b'.') && is_sep_byte(b[3]) {
        let rest = &b[4..];
        if rest.len() >= 3 && rest[0].is_ascii_alphabetic() && rest[1] == b':' && is_sep_byte(rest[2]) {
            return Some(7);
        }
        if rest.len() >= 4 && rest[..3].eq_ignore_ascii_case(b"UNC") && is_sep_byte(rest[3]) {
            return Some(8 + server_share_len(&rest[4..]));
        }
        return Some(4);
    }
    Some(2 + server_share_len(&b[2..]))
}

/// `server\share\` 两个分量（含尾分隔符）的长度
fn server_share_len(b: &[u8]) -> usize {
    let mut seps = 0;
    let mut i = 0;
    while i < b.len() {
        let c = b[i];
        i += 1;
        if is_sep_byte(c) {
            seps += 1;
            if seps == 2 {
                break;
            }
        }
    }
    i
}

/// 将原始输入转为规范绝对路径
pub fn normalize(fs: &dyn FileSystem, raw: &str) -> Result<String> {
    let mut input = raw.trim().to_string();
    if input.is_empty() {
        return Err(Error::PathResolution {
            raw: raw.to_string(),
            reason: "empty path".to_string(),
        });
    }
    if is_bare_volume(&input) {
        input.push(SEPARATOR);
    }

    let absolute = fs
        .resolve_absolute(&input)
        .map_err(|e| Error::PathResolution {
            raw: raw.to_string(),
            reason: e.to_string(),
        })?;

    if root_len(&absolute) == 0 {
        return Err(Error::PathResolution {
            raw: raw.to_string(),
            reason: format!("resolved path '{}' is not absolute", absolute),
        });
    }
    Ok(clean(&absolute))
}

/// 纯字符串层面的 `.`/`..` 消解，不访问文件系统
pub fn clean(path: &str) -> String {
    let rl = root_len(path);
    let mut root: String = path[..rl].chars().map(|c| if is_separator(c) { SEPARATOR } else { c }).collect();
    let mut parts: Vec<&str> = Vec::new();
    for comp in path[rl..].split(is_separator) {
        match comp {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return root;
    }
    root.push_str(&parts.join(&SEPARATOR.to_string()));
    root
}

/// 目录追加尾分隔符，文件原样返回
pub fn directory_form(path: &str, is_dir: bool) -> String {
    let mut out = path.to_string();
    if is_dir && !out.ends_with(is_separator) {
        out.push(SEPARATOR);
    }
    out
}

fn trim_trailing(path: &str) -> &str {
    let rl = root_len(path);
    let trimmed = path.trim_end_matches(is_separator);
    if trimmed.len() < rl {
        &path[..rl]
    } else {
        trimmed
    }
}

/// 最后一个路径分量；根目录返回其自身
pub fn file_name(path: &str) -> &str {
    let trimmed = trim_trailing(path);
    let rl = root_len(trimmed);
    if trimmed.len() <= rl {
        return trimmed;
    }
    match trimmed.rfind(is_separator) {
        Some(i) => &trimmed[i + 1..],
        None => trimmed,
    }
}

/// 上级目录；根的上级是它自己
pub fn parent_path(path: &str) -> &str {
    let trimmed = trim_trailing(path);
    let rl = root_len(trimmed);
    if trimmed.len() <= rl {
        return trimmed;
    }
    match trimmed.rfind(is_separator) {
        Some(i) if i < rl => &trimmed[..rl],
        Some(i) => &trimmed[..i],
        None => trimmed,
    }
}

pub fn join(dir: &str, name: &str) -> String {
    let mut out = directory_form(dir, true);
    out.push_str(name);
    out
}
