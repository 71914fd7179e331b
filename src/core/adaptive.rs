use std::fmt;

use serde::{Deserialize, Serialize};

/// 本机可用并行度（至少为 1）
pub fn available_parallelism() -> usize {
    num_cpus::get().max(1)
}

/// worker 的派发方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Dispatch {
    /// 每次调用临时派生 scoped 线程，最后一段在调用线程上执行
    #[default]
    Scoped,
    /// 复用 rayon 全局线程池
    Pool,
}

/// 单次求和选用的执行策略
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// 目标是普通文件：直接取大小
    Direct,
    /// 后代数不超过 worker 数：串行递归，分片不划算
    Sequential,
    Partitioned { chunks: usize },
}

/// 根据后代数量与并行度选择策略
pub fn select_strategy(is_dir: bool, descendants: usize, workers: usize) -> Strategy {
    let workers = workers.max(1);
    if !is_dir {
        Strategy::Direct
    } else if descendants <= workers {
        Strategy::Sequential
    } else {
        Strategy::Partitioned { chunks: workers }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Direct => f.write_str("direct"),
            Strategy::Sequential => f.write_str("sequential"),
            Strategy::Partitioned { chunks } => write!(f, "partitioned({})", chunks),
        }
    }
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Scoped => f.write_str("scoped"),
            Dispatch::Pool => f.write_str("pool"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(select_strategy(true, 8, 8), Strategy::Sequential);
        assert_eq!(select_strategy(true, 9, 8), Strategy::Partitioned { chunks: 8 });
        assert_eq!(select_strategy(false, 0, 8), Strategy::Direct);
        assert_eq!(select_strategy(true, 0, 0), Strategy::Sequential);
    }

    #[test]
    fn dispatch_parses_from_config_text() {
        #[derive(Deserialize)]
        struct Probe {
            dispatch: Dispatch,
        }
        let p: Probe = toml::from_str("dispatch = \"pool\"").unwrap();
        assert_eq!(p.dispatch, Dispatch::Pool);
        assert_eq!(Dispatch::default().to_string(), "scoped");
    }
}
