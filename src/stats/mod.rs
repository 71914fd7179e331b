use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::core::{Dispatch, Strategy};

/// 单次子树求和的结果摘要
#[derive(Clone, Debug, Serialize)]
pub struct ScanReport {
    /// 目标绝对路径（目录带尾分隔符）
    pub target: String,
    pub bytes: u64,
    /// 展开得到的后代数量（文件目标为 0）
    pub descendants: usize,
    pub workers: usize,
    pub dispatch: Dispatch,
    pub strategy: Strategy,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

pub fn human_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    const TB: u64 = 1024 * GB;
    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║           wheres-my-ssd Scan Report              ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        writeln!(f, "║ {:<48} ║", truncate_left(&self.target, 48))?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║   total:        {:>20}             ║", human_bytes(self.bytes))?;
        writeln!(f, "║   bytes:        {:>20}             ║", self.bytes)?;
        writeln!(f, "║   descendants:  {:>20}             ║", self.descendants)?;
        writeln!(
            f,
            "║   workers:      {:>20}             ║",
            format!("{} ({})", self.workers, self.dispatch)
        )?;
        writeln!(f, "║   strategy:     {:>20}             ║", self.strategy.to_string())?;
        writeln!(
            f,
            "║   elapsed:      {:>20}             ║",
            format!("{:.1?}", self.elapsed)
        )?;
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}

/// 过长路径保留尾部
fn truncate_left(s: &str, width: usize) -> String {
    let count = s.chars().count();
    if count <= width {
        return s.to_string();
    }
    let tail: String = s.chars().skip(count - (width - 1)).collect();
    format!("…{}", tail)
}
