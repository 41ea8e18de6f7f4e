//! 运行汇总
//!
//! 汇总每个条目的处理结果，并决定进程退出码

use tracing::{error, warn};

use crate::error::AppError;
use crate::models::{InclusionFilter, InvalidEntry};
use crate::workflow::ItemOutcome;

/// 一次调用的处理统计
#[derive(Debug, Default)]
pub struct RunSummary {
    succeeded: Vec<String>,
    skipped: Vec<(String, String)>,
    failures: Vec<(String, AppError)>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录单个条目的结果
    pub fn record(&mut self, label: impl Into<String>, result: Result<ItemOutcome, AppError>) {
        let label = label.into();
        match result {
            Ok(ItemOutcome::Succeeded) => self.succeeded.push(label),
            Ok(ItemOutcome::Skipped(reason)) => self.skipped.push((label, reason)),
            Err(error) => self.failures.push((label, error)),
        }
    }

    pub fn record_failure(&mut self, label: impl Into<String>, error: AppError) {
        self.failures.push((label.into(), error));
    }

    /// 无效条目无法按参与者筛选，只在全量运行时记为失败
    pub fn record_invalid_entries(&mut self, filter: &InclusionFilter, invalid: Vec<InvalidEntry>) {
        for entry in invalid {
            if *filter == InclusionFilter::AllParticipants {
                error!("❌ 无效的暂存条目 {}: {}", entry.name, entry.error);
                self.record_failure(entry.name, entry.error);
            } else {
                warn!("⚠️ 忽略无效的暂存条目 {}: {}", entry.name, entry.error);
            }
        }
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.len()
    }

    pub fn skipped(&self) -> usize {
        self.skipped.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn total(&self) -> usize {
        self.succeeded() + self.skipped() + self.failed()
    }

    pub fn succeeded_labels(&self) -> &[String] {
        &self.succeeded
    }

    pub fn failures(&self) -> &[(String, AppError)] {
        &self.failures
    }

    /// 进程退出码
    ///
    /// 只有全部条目都失败时返回 1；有任何成功或跳过时返回 0
    pub fn exit_code(&self) -> u8 {
        if self.failed() > 0 && self.succeeded() == 0 && self.skipped() == 0 {
            1
        } else {
            0
        }
    }
}
