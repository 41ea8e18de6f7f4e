//! 组装阶段 - 编排层
//!
//! ## 职责
//!
//! 1. **读取暂存条目**：逐条校验，按纳入条件筛选
//! 2. **数据集描述**：创建或更新目标数据集的 `dataset_description.json`
//! 3. **逐项组装**：委托 `AssembleFlow` 生成派生输出
//! 4. **汇总**：每个条目的结果记入 `RunSummary`
//!
//! 暂存条目只读，从不删除。

use std::collections::BTreeMap;

use tracing::{error, info, warn};

use crate::config::RunContext;
use crate::error::{AppError, AppResult, ConfigError};
use crate::infrastructure::CommandRunner;
use crate::models::{StagingDir, StagingEntry};
use crate::orchestrator::RunSummary;
use crate::services::dataset_description::{derivative_name, update_output_dataset};
use crate::services::{C3d, NeckTrimmer, OriginReset, Provenance};
use crate::utils::logging::log_phase_loaded;
use crate::workflow::{AssembleFlow, ItemCtx};

pub struct Assembler<'a> {
    ctx: &'a RunContext,
    runner: &'a dyn CommandRunner,
    provenance: Provenance,
}

impl<'a> Assembler<'a> {
    pub fn new(ctx: &'a RunContext, runner: &'a dyn CommandRunner) -> Self {
        Self::with_provenance(ctx, runner, Provenance::from_env())
    }

    pub fn with_provenance(ctx: &'a RunContext, runner: &'a dyn CommandRunner, provenance: Provenance) -> Self {
        Self {
            ctx,
            runner,
            provenance,
        }
    }

    pub async fn run(&self) -> AppResult<RunSummary> {
        self.ctx.validate_postprocessing()?;
        let output_root = self.ctx.output_dataset.as_deref().ok_or_else(|| {
            AppError::from(ConfigError::InvalidOptions("assemble 需要 --output-dataset".to_string()))
        })?;

        let staging = StagingDir::new(&self.ctx.staging_dir);
        let (entries, invalid) = staging.read_entries()?;
        let entries: Vec<StagingEntry> = entries
            .into_iter()
            .filter(|e| e.matches(&self.ctx.filter))
            .collect();

        let mut summary = RunSummary::new();
        summary.record_invalid_entries(&self.ctx.filter, invalid);
        log_phase_loaded(entries.len(), "暂存条目");

        match entries.first() {
            Some(first) => {
                let links = dataset_links(&entries)?;
                let name = derivative_name(&first.sidecar.source_dataset_name);
                update_output_dataset(output_root, &name, &links, &self.provenance)?;
            }
            None => {
                warn!("⚠️ 没有可组装的暂存条目，不修改目标数据集");
                return Ok(summary);
            }
        }

        let c3d = C3d::new(self.runner, &self.ctx.config.c3d);
        let trimmer = self.ctx.trim_neck.then(|| {
            NeckTrimmer::new(
                self.runner,
                &self.ctx.config.trim_neck,
                c3d,
                self.ctx.config.neck_cutoff_mm,
                self.ctx.config.neck_pad_mm,
            )
        });
        let origin_reset = self.ctx.reset_origin.then(|| OriginReset::new(c3d));
        info!(
            "⚙️ 颈部裁剪: {} | 原点重置: {} | 保留工作目录: {:?}",
            self.ctx.trim_neck, self.ctx.reset_origin, self.ctx.keep_workdir
        );

        let flow = AssembleFlow::new(c3d, trimmer, origin_reset, output_root, self.ctx.keep_workdir);

        let total = entries.len();
        for (idx, entry) in entries.iter().enumerate() {
            let item_ctx = ItemCtx::new(entry.key(), idx + 1, total);
            let result = flow.run(entry, &item_ctx).await;
            if let Err(e) = &result {
                error!("{} ❌ 处理失败: {}", item_ctx, e);
            }
            summary.record(entry.key(), result);
        }

        Ok(summary)
    }
}

/// 条目引用的源数据集：名称 → URI，同名不同 URI 视为配置错误
fn dataset_links(entries: &[StagingEntry]) -> AppResult<BTreeMap<String, String>> {
    let mut links: BTreeMap<String, String> = BTreeMap::new();
    for entry in entries {
        let name = &entry.sidecar.source_dataset_name;
        let uri = &entry.sidecar.source_dataset_uri;
        match links.get(name) {
            Some(existing) if existing != uri => {
                return Err(ConfigError::DatasetLinkConflict {
                    name: name.clone(),
                    existing: existing.clone(),
                    new: uri.clone(),
                }
                .into())
            }
            Some(_) => {}
            None => {
                links.insert(name.clone(), uri.clone());
            }
        }
    }
    Ok(links)
}
