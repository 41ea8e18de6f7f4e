//! 批量脑提取阶段 - 编排层
//!
//! ## 职责
//!
//! 1. **确定待处理条目**：没有有效掩膜的暂存条目
//! 2. **组批**：把待处理图像链接到暂存目录内的临时批处理目录
//! 3. **单次推理**：整个批次只启动一次 hd-bet
//! 4. **回收**：把生成的掩膜移回各自的条目，未生成的记为失败
//!
//! GPU 资源只在这一阶段使用，因此不处理单个条目的其他细节。

use std::path::Path;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::RunContext;
use crate::error::{AppError, AppResult, StagingError};
use crate::infrastructure::CommandRunner;
use crate::models::staging::is_non_empty_file;
use crate::models::{StagingDir, StagingEntry};
use crate::orchestrator::RunSummary;
use crate::services::{C3d, HdBet};
use crate::utils::fs::{link_or_copy, move_file, remove_dir_if_exists, remove_file_if_exists};
use crate::utils::logging::log_phase_loaded;
use crate::workflow::ItemOutcome;

/// 批处理临时目录的名称前缀
const BATCH_DIR_PREFIX: &str = ".extract-";

pub struct BatchExtractor<'a> {
    ctx: &'a RunContext,
    runner: &'a dyn CommandRunner,
}

impl<'a> BatchExtractor<'a> {
    pub fn new(ctx: &'a RunContext, runner: &'a dyn CommandRunner) -> Self {
        Self { ctx, runner }
    }

    pub async fn run(&self) -> AppResult<RunSummary> {
        let staging = StagingDir::new(&self.ctx.staging_dir);
        let (entries, invalid) = staging.read_entries()?;
        remove_stale_batches(staging.root())?;
        let mut summary = RunSummary::new();
        summary.record_invalid_entries(&self.ctx.filter, invalid);

        let c3d = C3d::new(self.runner, &self.ctx.config.c3d);
        let mut pending = Vec::new();
        for entry in entries.into_iter().filter(|e| e.matches(&self.ctx.filter)) {
            match self.needs_mask(&c3d, &entry).await {
                Ok(true) => pending.push(entry),
                Ok(false) => {
                    debug!("{} 已有有效掩膜，跳过", entry.key());
                    summary.record(entry.key(), Ok(ItemOutcome::Skipped("已有掩膜".to_string())));
                }
                Err(e) => {
                    error!("{} ❌ {}", entry.key(), e);
                    summary.record_failure(entry.key(), e);
                }
            }
        }

        log_phase_loaded(pending.len(), "暂存条目（缺少脑掩膜）");
        if pending.is_empty() {
            return Ok(summary);
        }

        let batch_dir = tempfile::Builder::new()
            .prefix(BATCH_DIR_PREFIX)
            .tempdir_in(staging.root())
            .map_err(|e| AppError::write_failed(staging.root(), e))?;

        let mut batch = Vec::with_capacity(pending.len());
        for entry in pending {
            let input = batch_dir.path().join(HdBet::input_name(entry.key()));
            match link_or_copy(&entry.layout.image(), &input) {
                Ok(()) => batch.push(entry),
                Err(e) => {
                    error!("{} ❌ 无法加入批处理: {}", entry.key(), e);
                    summary.record_failure(entry.key(), e);
                }
            }
        }

        if batch.is_empty() {
            return Ok(summary);
        }

        let hdbet = HdBet::new(self.runner, &self.ctx.config.hdbet, self.ctx.device, self.ctx.verbose);
        info!("{}", "=".repeat(60));
        info!("🧠 hd-bet 批处理: {} 个图像, 设备 {}", batch.len(), self.ctx.device);
        info!("{}", "=".repeat(60));

        let start = Instant::now();
        if let Err(e) = hdbet.run_batch(batch_dir.path()).await {
            // 已生成的掩膜仍然回收
            error!("❌ hd-bet 批处理失败: {}", e);
        }
        info!("⏱️ hd-bet 耗时 {:.0} 秒", start.elapsed().as_secs_f64());

        for entry in &batch {
            summary.record(entry.key(), harvest(batch_dir.path(), entry));
        }

        Ok(summary)
    }

    /// 条目是否需要（重新）生成掩膜
    ///
    /// 掩膜与图像几何不一致或无法读取时删除，重新排队
    async fn needs_mask(&self, c3d: &C3d<'_>, entry: &StagingEntry) -> AppResult<bool> {
        if !entry.layout.has_image() {
            return Err(StagingError::MissingFile {
                key: entry.key().to_string(),
                what: "图像",
            }
            .into());
        }
        if !entry.layout.has_mask() {
            return Ok(true);
        }

        let image_geometry = c3d.geometry(&entry.layout.image()).await?;
        let stale = match c3d.geometry(&entry.layout.mask()).await {
            Ok(mask_geometry) => image_geometry.mismatch(&mask_geometry),
            Err(e) => Some(e.to_string()),
        };
        match stale {
            None => Ok(false),
            Some(detail) => {
                warn!("⚠️ {} 的掩膜与图像不一致 ({})，重新生成", entry.key(), detail);
                remove_file_if_exists(&entry.layout.mask())?;
                Ok(true)
            }
        }
    }
}

/// 删除被中断的批处理留下的临时目录
fn remove_stale_batches(staging_root: &Path) -> AppResult<()> {
    let read_dir = std::fs::read_dir(staging_root).map_err(|e| AppError::read_failed(staging_root, e))?;
    for dir_entry in read_dir {
        let dir_entry = dir_entry.map_err(|e| AppError::read_failed(staging_root, e))?;
        let path = dir_entry.path();
        if dir_entry.file_name().to_string_lossy().starts_with(BATCH_DIR_PREFIX) && path.is_dir() {
            warn!("🧹 删除残留的批处理目录 {}", path.display());
            remove_dir_if_exists(&path)?;
        }
    }
    Ok(())
}

fn harvest(batch_dir: &Path, entry: &StagingEntry) -> AppResult<ItemOutcome> {
    let produced = HdBet::mask_path(batch_dir, entry.key());
    if !is_non_empty_file(&produced) {
        error!("{} ❌ 未生成脑掩膜", entry.key());
        return Err(StagingError::MaskNotProduced {
            key: entry.key().to_string(),
        }
        .into());
    }
    move_file(&produced, &entry.layout.mask())?;
    info!("{} ✓ 掩膜已写入", entry.key());
    Ok(ItemOutcome::Succeeded)
}
