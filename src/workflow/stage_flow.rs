//! 暂存流程 - 流程层
//!
//! 核心职责：把"一个源图像"放进暂存目录
//!
//! 流程顺序：
//! 1. 目标数据集中输出已完整 → 跳过
//! 2. 已有同源的有效条目 → 复用
//! 3. 重定向图像 → 写 sidecar

use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::models::{EntryLayout, OutputSet, StagingDir, StagingSidecar, WorkItem};
use crate::services::C3d;
use crate::utils::fs::{create_dir_all, remove_dir_if_exists};
use crate::workflow::item_ctx::{ItemCtx, ItemOutcome};

/// 暂存流程
///
/// - 只处理单个 WorkItem
/// - 失败时删除不完整的条目，不留下半成品
pub struct StageFlow<'a> {
    c3d: C3d<'a>,
    staging: &'a StagingDir,
    output_dataset: Option<&'a Path>,
    dataset_name: &'a str,
    dataset_uri: &'a str,
    orientation: &'a str,
}

impl<'a> StageFlow<'a> {
    pub fn new(
        c3d: C3d<'a>,
        staging: &'a StagingDir,
        output_dataset: Option<&'a Path>,
        dataset_name: &'a str,
        dataset_uri: &'a str,
        orientation: &'a str,
    ) -> Self {
        Self {
            c3d,
            staging,
            output_dataset,
            dataset_name,
            dataset_uri,
            orientation,
        }
    }

    pub async fn run(&self, item: &WorkItem, ctx: &ItemCtx) -> AppResult<ItemOutcome> {
        if let Some(output_root) = self.output_dataset {
            if OutputSet::for_item(output_root, item).is_complete() {
                info!("{} ⏭️ 目标数据集中输出已完整，跳过", ctx);
                return Ok(ItemOutcome::Skipped("输出已完整".to_string()));
            }
        }

        let layout = self.staging.layout(&item.key);
        if self.is_reusable(&layout, item) {
            info!("{} ⏭️ 暂存条目已存在，复用", ctx);
            return Ok(ItemOutcome::Skipped("已暂存".to_string()));
        }

        if layout.dir().exists() {
            debug!("{} 删除过期的暂存条目 {}", ctx, layout.dir().display());
            remove_dir_if_exists(layout.dir())?;
        }

        info!("{} 📥 暂存 {}", ctx, item.source_rel_path);
        if let Err(e) = self.stage(&layout, item).await {
            warn!("{} ⚠️ 暂存失败，删除不完整的条目", ctx);
            if let Err(cleanup) = remove_dir_if_exists(layout.dir()) {
                warn!("{} 清理失败: {}", ctx, cleanup);
            }
            return Err(e);
        }

        info!("{} ✓ 暂存完成", ctx);
        Ok(ItemOutcome::Succeeded)
    }

    async fn stage(&self, layout: &EntryLayout, item: &WorkItem) -> AppResult<()> {
        create_dir_all(layout.dir())?;
        self.c3d
            .reorient(&item.source_path, &layout.image(), self.orientation)
            .await?;
        let sidecar = StagingSidecar::for_item(item, self.dataset_name, self.dataset_uri, self.orientation);
        layout.write_sidecar(&sidecar)
    }

    /// 同一源图像、同一方向、图像已写入的条目可以直接复用
    fn is_reusable(&self, layout: &EntryLayout, item: &WorkItem) -> bool {
        match layout.read_sidecar() {
            Ok(sidecar) => {
                sidecar.source_path == item.source_rel_path
                    && sidecar.source_dataset_uri == self.dataset_uri
                    && sidecar.orientation == self.orientation
                    && layout.has_image()
            }
            Err(_) => false,
        }
    }
}
