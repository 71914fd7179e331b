use std::ops::Range;

use serde::Serialize;

/// 分配给单个 worker 的连续区间 `[start, end)`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub id: usize,
    pub range: Range<usize>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// 按整除切成 `workers` 段；最后一段吸收余数（终点固定为 `len`）。
///
/// 各段互不重叠，拼接后恰好覆盖 `[0, len)`。
pub fn partition(len: usize, workers: usize) -> Vec<Partition> {
    let workers = workers.max(1);
    let chunk = len / workers;
    (0..workers)
        .map(|id| {
            let start = id * chunk;
            let end = if id + 1 == workers { len } else { start + chunk };
            Partition {
                id,
                range: start..end,
            }
        })
        .collect()
}
