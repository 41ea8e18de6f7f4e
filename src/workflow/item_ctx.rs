//! 条目处理上下文
//!
//! 封装"我正在处理第几个条目、它的键是什么"这一信息

use std::fmt::Display;

/// 条目处理上下文
#[derive(Debug, Clone)]
pub struct ItemCtx {
    /// 工作项键
    pub key: String,

    /// 在本次运行中的序号（从1开始，仅用于日志显示）
    pub index: usize,

    /// 本次运行的条目总数
    pub total: usize,
}

impl ItemCtx {
    pub fn new(key: impl Into<String>, index: usize, total: usize) -> Self {
        Self {
            key: key.into(),
            index,
            total,
        }
    }
}

impl Display for ItemCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{} {}]", self.index, self.total, self.key)
    }
}

/// 单个条目的处理结果（失败以 `Err` 返回）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// 处理成功
    Succeeded,
    /// 跳过，附原因
    Skipped(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let ctx = ItemCtx::new("sub-01_ses-MR1_run-1", 2, 5);
        assert_eq!(ctx.to_string(), "[2/5 sub-01_ses-MR1_run-1]");
    }
}
