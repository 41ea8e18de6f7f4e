//! 命令行定义
//!
//! 三个子命令对应三个独立阶段，共享同一个暂存目录

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{Config, Device, KeepWorkdir, RunContext};
use crate::error::AppResult;
use crate::models::InclusionFilter;

/// T1w 预处理流水线：选择 → 批量脑提取 → 组装
#[derive(Parser, Debug)]
#[command(name = "t1w-preprocess")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// 输出外部命令的完整命令行和输出
    #[arg(long, global = true)]
    pub verbose: bool,

    /// TOML 配置文件（外部工具路径、裁剪参数）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 选择工作集，把重定向后的图像写入暂存目录
    Select(SelectArgs),
    /// 对缺少掩膜的暂存条目批量运行 hd-bet
    Extract(ExtractArgs),
    /// 裁剪、质控，并把派生输出写入目标数据集
    Assemble(AssembleArgs),
}

/// 纳入条件，四种形式中最多指定一种
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// 单个参与者，如 01 或 sub-01
    #[arg(long)]
    pub participant: Option<String>,

    /// 参与者列表文件，每行一个
    #[arg(long)]
    pub participant_list: Option<PathBuf>,

    /// 单个会话，格式 participant,session
    #[arg(long)]
    pub session: Option<String>,

    /// 会话列表文件，每行 participant,session
    #[arg(long)]
    pub session_list: Option<PathBuf>,
}

impl FilterArgs {
    pub fn resolve(&self) -> AppResult<InclusionFilter> {
        InclusionFilter::resolve(
            self.participant.as_deref(),
            self.participant_list.as_deref(),
            self.session.as_deref(),
            self.session_list.as_deref(),
        )
    }
}

#[derive(Args, Debug)]
pub struct SelectArgs {
    /// 源 BIDS 数据集
    #[arg(long)]
    pub input_dataset: PathBuf,

    /// 暂存目录
    #[arg(long)]
    pub staging_dir: PathBuf,

    /// 目标数据集，给出时跳过输出已完整的图像
    #[arg(long)]
    pub output_dataset: Option<PathBuf>,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// 暂存目录
    #[arg(long)]
    pub staging_dir: PathBuf,

    /// 推理设备：cuda / mps / cpu
    #[arg(long, default_value = "cuda")]
    pub device: Device,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args, Debug)]
pub struct AssembleArgs {
    /// 暂存目录
    #[arg(long)]
    pub staging_dir: PathBuf,

    /// 目标数据集
    #[arg(long)]
    pub output_dataset: PathBuf,

    /// 裁剪颈部
    #[arg(long)]
    pub trim_neck: bool,

    /// 把原点移到脑掩膜质心（需要 --trim-neck）
    #[arg(long)]
    pub reset_origin: bool,

    /// 工作目录保留策略：never / on_error / always
    #[arg(long, default_value = "on_error")]
    pub keep_workdir: KeepWorkdir,

    #[command(flatten)]
    pub filter: FilterArgs,
}

/// 运行的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Select,
    Extract,
    Assemble,
}

impl Phase {
    pub fn title(self) -> &'static str {
        match self {
            Phase::Select => "选择阶段",
            Phase::Extract => "批量脑提取阶段",
            Phase::Assemble => "组装阶段",
        }
    }
}

impl Cli {
    /// 解析配置和纳入条件，得到不可变的运行上下文
    ///
    /// 所有配置错误都在这里暴露，早于任何文件写入
    pub fn into_context(self, config: Config) -> AppResult<(Phase, RunContext)> {
        let verbose = self.verbose;
        let (phase, ctx) = match self.command {
            Commands::Select(args) => {
                let mut ctx = RunContext::new(config, args.filter.resolve()?, args.staging_dir);
                ctx.input_dataset = Some(args.input_dataset);
                ctx.output_dataset = args.output_dataset;
                (Phase::Select, ctx)
            }
            Commands::Extract(args) => {
                let mut ctx = RunContext::new(config, args.filter.resolve()?, args.staging_dir);
                ctx.device = args.device;
                (Phase::Extract, ctx)
            }
            Commands::Assemble(args) => {
                let mut ctx = RunContext::new(config, args.filter.resolve()?, args.staging_dir);
                ctx.output_dataset = Some(args.output_dataset);
                ctx.trim_neck = args.trim_neck;
                ctx.reset_origin = args.reset_origin;
                ctx.keep_workdir = args.keep_workdir;
                ctx.validate_postprocessing()?;
                (Phase::Assemble, ctx)
            }
        };
        Ok((phase, RunContext { verbose, ..ctx }))
    }
}
