/// 日志工具模块
///
/// 提供日志初始化和运行横幅的辅助函数
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::orchestrator::RunSummary;

/// 初始化 tracing 订阅器
///
/// `RUST_LOG` 优先；未设置时默认 `info`，`--verbose` 时为 `debug`。
/// 重复调用（如测试中）会被忽略。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `phase`: 阶段名称
/// - `filter`: 纳入条件描述
pub fn log_startup(phase: &str, filter: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - {}", phase);
    info!("🎯 纳入范围: {}", filter);
    info!(
        "启动时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
}

/// 记录待处理条目数量
pub fn log_phase_loaded(total: usize, what: &str) {
    if total == 0 {
        warn!("⚠️ 没有找到待处理的{}", what);
    } else {
        info!("✓ 找到 {} 个待处理的{}", total, what);
    }
}

/// 打印最终统计信息
pub fn print_final_stats(summary: &RunSummary) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}", summary.succeeded());
    info!("⏭️ 跳过: {}", summary.skipped());
    info!("❌ 失败: {}", summary.failed());
    for (label, error) in summary.failures() {
        info!("   - {}: {}", label, error);
    }
    info!("{}", "=".repeat(60));
}
