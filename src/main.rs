use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

use t1w_preprocessing::cli::{Cli, Phase};
use t1w_preprocessing::config::{Config, Device};
use t1w_preprocessing::infrastructure::ProcessRunner;
use t1w_preprocessing::orchestrator::{Assembler, BatchExtractor, RunSummary, Selector};
use t1w_preprocessing::utils::logging;
use t1w_preprocessing::AppError;

/// 配置错误的退出码
const EXIT_CONFIG_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 初始化日志
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(summary) => ExitCode::from(summary.exit_code()),
        Err(e) => {
            error!("❌ {:#}", e);
            match e.downcast_ref::<AppError>() {
                Some(app_error) if app_error.is_config() => ExitCode::from(EXIT_CONFIG_ERROR),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(cli: Cli) -> Result<RunSummary> {
    // 加载配置
    let config = Config::load(cli.config.as_deref())?;
    let (phase, ctx) = cli.into_context(config)?;

    if phase == Phase::Extract && ctx.device == Device::Cuda {
        ctx.device
            .check_available(std::env::var("CUDA_VISIBLE_DEVICES").ok().as_deref())?;
    }

    logging::log_startup(phase.title(), &ctx.filter.describe());

    let runner = ProcessRunner::new(ctx.verbose);
    let summary = match phase {
        Phase::Select => Selector::new(&ctx, &runner).run().await,
        Phase::Extract => BatchExtractor::new(&ctx, &runner).run().await,
        Phase::Assemble => Assembler::new(&ctx, &runner).run().await,
    }
    .with_context(|| format!("{}失败", phase.title()))?;

    logging::print_final_stats(&summary);
    Ok(summary)
}
