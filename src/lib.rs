//! # T1w Preprocessing
//!
//! 解剖 T1w 图像的批量预处理流水线
//!
//! ## 架构设计
//!
//! 三个相互独立的阶段，只通过磁盘上的暂存目录耦合：
//!
//! 1. **选择**（`select`）：确定工作集，重定向源图像写入暂存目录
//! 2. **批量脑提取**（`extract`）：对缺少掩膜的条目运行一次 hd-bet
//! 3. **组装**（`assemble`）：颈部裁剪、质控、原点重置，写入目标数据集
//!
//! 代码采用四层结构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 外部进程执行，只暴露"运行命令"的能力
//! - `CommandRunner` - 可替换的执行接口，`ProcessRunner` 为生产实现
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个服务只封装一种外部工具或文件格式
//! - `C3d` / `HdBet` / `NeckTrimmer` / `OriginReset` / `QcService`
//! - `DatasetScanner` - 源数据集遍历
//! - `dataset_description` - 数据集描述与来源信息
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个条目"的完整处理流程
//! - `StageFlow` - 暂存一个源图像
//! - `AssembleFlow` - 组装一个暂存条目
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/` - 三个阶段的入口，遍历条目并汇总结果
//! - `RunSummary` - 处理统计与退出码
//!
//! ## 模块结构

pub mod cli;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, RunContext};
pub use error::{AppError, AppResult};
pub use infrastructure::{CommandOutput, CommandRunner, ProcessRunner};
pub use models::{InclusionFilter, OutputSet, StagingDir, WorkItem};
pub use orchestrator::{Assembler, BatchExtractor, RunSummary, Selector};
pub use workflow::{ItemCtx, ItemOutcome};
