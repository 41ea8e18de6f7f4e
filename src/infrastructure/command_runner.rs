//! 外部命令执行器 - 基础设施层
//!
//! 所有外部工具（c3d / hd-bet / trim_neck.sh）都通过这里调用，
//! 只暴露"执行命令并取回输出"的能力

use std::process::Stdio;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::error::{AppResult, ToolError};

/// 命令输出
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// 命令执行能力
///
/// 职责：
/// - 启动外部进程并等待结束
/// - 非零退出状态转换为 `ToolError`
/// - 不认识 WorkItem / 暂存条目
pub trait CommandRunner: Send + Sync {
    fn run<'a>(&'a self, program: &'a str, args: &'a [String]) -> BoxFuture<'a, AppResult<CommandOutput>>;
}

/// 基于 tokio::process 的执行器
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    verbose: bool,
}

impl ProcessRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl CommandRunner for ProcessRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [String]) -> BoxFuture<'a, AppResult<CommandOutput>> {
        async move {
            let command_line = render_command(program, args);
            if self.verbose {
                info!("--- 运行 {} ---\n{}", program, command_line);
            } else {
                debug!("运行命令: {}", command_line);
            }

            let output = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|source| ToolError::SpawnFailed {
                    program: program.to_string(),
                    source,
                })?;

            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

            if self.verbose {
                info!("--- stdout ---\n{}", stdout);
                info!("--- stderr ---\n{}", stderr);
                info!("--- 结束 {} ---", program);
            }

            if !output.status.success() {
                error!("命令执行失败: {}", command_line);
                if !self.verbose {
                    error!("stdout:\n{}", stdout);
                    error!("stderr:\n{}", stderr);
                }
                return Err(ToolError::NonZeroExit {
                    command: command_line,
                    status: output.status.to_string(),
                    stderr,
                }
                .into());
            }

            Ok(CommandOutput { stdout, stderr })
        }
        .boxed()
    }
}

/// 用于日志的命令行文本
pub fn render_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
