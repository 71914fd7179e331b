use std::collections::VecDeque;

use crate::core::file::{Directory, File};

/// TreeFlattener：广度优先展开全部后代（队列驱动，不随深度增长调用栈）。
///
/// 每个后代恰好出现一次；目录本身也在输出中，其子项排在队尾。
pub fn all_descendants(dir: &Directory) -> Vec<File> {
    let mut out = Vec::new();
    let mut queue: VecDeque<File> = dir.children().into();

    while let Some(next) = queue.pop_front() {
        if next.is_directory() {
            queue.extend(next.children());
        }
        out.push(next);
    }
    out
}
