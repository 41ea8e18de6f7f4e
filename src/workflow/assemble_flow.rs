//! 组装流程 - 流程层
//!
//! 核心职责：把"一个暂存条目"变成目标数据集中的一组派生输出
//!
//! 流程顺序：
//! 1. 输出已完整 → 跳过
//! 2. 检查条目的图像与掩膜，几何必须一致
//! 3. 颈部裁剪（可选）→ 质控（原空间）→ 原点重置（可选）
//! 4. 质控失败 → 只复制质控图，报错
//! 5. 计算掩膜体积 → 原子写入输出和 sidecar，质控图最后写入

use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::{info, warn};

use crate::config::KeepWorkdir;
use crate::error::{AppError, AppResult, ConsistencyError, StagingError};
use crate::models::{OutputSet, StagingEntry};
use crate::services::{C3d, NeckTrimmer, OriginReset, QcService};
use crate::utils::fs::{copy_dir_all, copy_file_atomic, create_dir_all, remove_file_if_exists, write_json_pretty};
use crate::workflow::item_ctx::{ItemCtx, ItemOutcome};

/// 组装流程
///
/// - 编排裁剪、质控、原点重置的顺序
/// - 每个条目使用独立的临时工作目录
/// - 不修改暂存条目
pub struct AssembleFlow<'a> {
    c3d: C3d<'a>,
    trimmer: Option<NeckTrimmer<'a>>,
    origin_reset: Option<OriginReset<'a>>,
    qc: QcService<'a>,
    output_root: &'a Path,
    keep_workdir: KeepWorkdir,
}

impl<'a> AssembleFlow<'a> {
    pub fn new(
        c3d: C3d<'a>,
        trimmer: Option<NeckTrimmer<'a>>,
        origin_reset: Option<OriginReset<'a>>,
        output_root: &'a Path,
        keep_workdir: KeepWorkdir,
    ) -> Self {
        Self {
            c3d,
            trimmer,
            origin_reset,
            qc: QcService::new(c3d),
            output_root,
            keep_workdir,
        }
    }

    pub async fn run(&self, entry: &StagingEntry, ctx: &ItemCtx) -> AppResult<ItemOutcome> {
        let outputs = OutputSet::for_sidecar(self.output_root, &entry.sidecar);
        if outputs.is_complete() {
            info!("{} ⏭️ 输出已完整，跳过", ctx);
            return Ok(ItemOutcome::Skipped("输出已完整".to_string()));
        }

        if !entry.layout.has_image() {
            return Err(StagingError::MissingFile {
                key: entry.key().to_string(),
                what: "图像",
            }
            .into());
        }
        if !entry.layout.has_mask() {
            return Err(StagingError::MissingFile {
                key: entry.key().to_string(),
                what: "脑掩膜",
            }
            .into());
        }

        let image = entry.layout.image();
        let mask = entry.layout.mask();
        self.check_geometry("暂存条目", &image, &mask).await?;

        let workdir = tempfile::Builder::new()
            .prefix(&format!("{}.", entry.key()))
            .suffix(".t1wpreproc")
            .tempdir()
            .map_err(|e| AppError::write_failed(std::env::temp_dir(), e))?;

        info!("{} 🔧 开始处理 {}", ctx, entry.sidecar.source_path);
        let result = self.process(entry, &outputs, workdir.path()).await;

        if self.keep_workdir.keep(result.is_err()) {
            let target = outputs.workdir_copy();
            info!("{} 📂 保留工作目录: {}", ctx, target.display());
            let copied = create_dir_all(&outputs.anat_dir).and_then(|_| copy_dir_all(workdir.path(), &target));
            if let Err(e) = copied {
                warn!("{} ⚠️ 复制工作目录失败: {}", ctx, e);
            }
        }

        result?;
        info!("{} ✅ 处理完成", ctx);
        Ok(ItemOutcome::Succeeded)
    }

    async fn process(&self, entry: &StagingEntry, outputs: &OutputSet, workdir: &Path) -> AppResult<()> {
        let image = entry.layout.image();
        let mask = entry.layout.mask();
        create_dir_all(&outputs.anat_dir)?;
        // 质控图最后写入，它存在且其余文件齐全才算完整
        remove_file_if_exists(&outputs.qc_png)?;

        let mut final_image = image.clone();
        let mut final_mask = mask.clone();
        let mut trim_region: Option<PathBuf> = None;

        if let Some(trimmer) = &self.trimmer {
            let trimmed = trimmer.trim(&image, &mask, workdir).await?;
            self.check_geometry("颈部裁剪", &trimmed.image, &trimmed.mask).await?;
            final_image = trimmed.image;
            final_mask = trimmed.mask;
            trim_region = Some(trimmed.region);
        }

        // 质控在原空间进行，同时检查裁剪和脑提取
        let qc = self.qc.run(&image, &mask, trim_region.as_deref(), workdir).await?;

        if let Some(origin_reset) = &self.origin_reset {
            let (reset_image, reset_mask) = origin_reset.apply(&final_image, &final_mask, workdir).await?;
            self.check_geometry("原点重置", &reset_image, &reset_mask).await?;
            final_image = reset_image;
            final_mask = reset_mask;
        }

        if let Some(failure) = qc.failure() {
            for stale in [&outputs.preproc_image, &outputs.preproc_sidecar, &outputs.mask, &outputs.mask_sidecar] {
                remove_file_if_exists(stale)?;
            }
            copy_file_atomic(&qc.png, &outputs.qc_png)?;
            return Err(failure.into());
        }

        let volume_ml = self.c3d.mask_volume_ml(&final_mask).await?;

        copy_file_atomic(&final_image, &outputs.preproc_image)?;
        copy_file_atomic(&final_mask, &outputs.mask)?;

        let source = entry.sidecar.source_uri();
        write_json_pretty(
            &outputs.preproc_sidecar,
            &json!({
                "SkullStripped": false,
                "Sources": [source],
            }),
        )?;
        write_json_pretty(
            &outputs.mask_sidecar,
            &json!({
                "Type": "Brain",
                "Sources": [source, format!("bids::{}", outputs.preproc_rel_path())],
                "Volume": volume_ml,
                "VolumeUnit": "ml",
            }),
        )?;
        copy_file_atomic(&qc.png, &outputs.qc_png)?;

        Ok(())
    }

    async fn check_geometry(&self, stage: &'static str, image: &Path, mask: &Path) -> AppResult<()> {
        let image_geometry = self.c3d.geometry(image).await?;
        let mask_geometry = self.c3d.geometry(mask).await?;
        match image_geometry.mismatch(&mask_geometry) {
            None => Ok(()),
            Some(detail) => Err(ConsistencyError::GeometryMismatch {
                stage,
                left: display_name(image),
                right: display_name(mask),
                detail,
            }
            .into()),
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
