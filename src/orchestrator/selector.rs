//! 选择阶段 - 编排层
//!
//! ## 职责
//!
//! 1. **校验输入**：源数据集必须存在并带有名称
//! 2. **确定工作集**：按纳入条件扫描源数据集
//! 3. **逐项暂存**：委托 `StageFlow` 重定向图像并写 sidecar
//! 4. **汇总**：每个条目的结果记入 `RunSummary`

use tracing::{error, info};

use crate::config::RunContext;
use crate::error::{AppError, AppResult, ConfigError};
use crate::infrastructure::CommandRunner;
use crate::models::StagingDir;
use crate::orchestrator::RunSummary;
use crate::services::dataset_description::{dataset_uri, read_dataset_name};
use crate::services::{C3d, DatasetScanner};
use crate::utils::fs::create_dir_all;
use crate::utils::logging::log_phase_loaded;
use crate::workflow::{ItemCtx, StageFlow};

pub struct Selector<'a> {
    ctx: &'a RunContext,
    runner: &'a dyn CommandRunner,
}

impl<'a> Selector<'a> {
    pub fn new(ctx: &'a RunContext, runner: &'a dyn CommandRunner) -> Self {
        Self { ctx, runner }
    }

    pub async fn run(&self) -> AppResult<RunSummary> {
        let input_root = self.ctx.input_dataset.as_deref().ok_or_else(|| {
            AppError::from(ConfigError::InvalidOptions("select 需要 --input-dataset".to_string()))
        })?;
        if !input_root.is_dir() {
            return Err(AppError::missing_path(input_root));
        }
        let dataset_name = read_dataset_name(input_root)?;
        let dataset_uri = dataset_uri(input_root);
        info!("📚 源数据集: {} ({})", dataset_name, dataset_uri);

        info!("\n📁 正在扫描源数据集...");
        let scan = DatasetScanner::new(input_root, &self.ctx.filter).scan()?;
        log_phase_loaded(scan.items.len(), "T1w 图像");

        let mut summary = RunSummary::new();
        for (label, error) in scan.failures {
            summary.record_failure(label, error);
        }

        create_dir_all(&self.ctx.staging_dir)?;
        let staging = StagingDir::new(&self.ctx.staging_dir);
        let flow = StageFlow::new(
            C3d::new(self.runner, &self.ctx.config.c3d),
            &staging,
            self.ctx.output_dataset.as_deref(),
            &dataset_name,
            &dataset_uri,
            &self.ctx.config.orientation,
        );

        let total = scan.items.len();
        for (idx, item) in scan.items.iter().enumerate() {
            let item_ctx = ItemCtx::new(&item.key, idx + 1, total);
            let result = flow.run(item, &item_ctx).await;
            if let Err(e) = &result {
                error!("{} ❌ 处理失败: {}", item_ctx, e);
            }
            summary.record(&item.key, result);
        }

        Ok(summary)
    }
}
