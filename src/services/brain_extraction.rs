//! 脑提取服务 - 业务能力层
//!
//! 只负责"对一个目录里的全部图像调用一次 hd-bet"，
//! 不关心暂存条目，也不决定哪些图像需要处理。

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::Device;
use crate::error::AppResult;
use crate::infrastructure::CommandRunner;

/// hd-bet 批处理
pub struct HdBet<'a> {
    runner: &'a dyn CommandRunner,
    program: &'a str,
    device: Device,
    verbose: bool,
}

impl<'a> HdBet<'a> {
    pub fn new(runner: &'a dyn CommandRunner, program: &'a str, device: Device, verbose: bool) -> Self {
        if device == Device::Cpu {
            warn!("⚠️ CPU 模式比 GPU 慢很多倍，结果也可能不够理想");
        }
        Self {
            runner,
            program,
            device,
            verbose,
        }
    }

    /// 批处理目录中输入图像的文件名
    pub fn input_name(key: &str) -> String {
        format!("{}.nii.gz", key)
    }

    /// hd-bet 为输入图像生成的掩膜文件名
    pub fn mask_name(key: &str) -> String {
        format!("{}_bet.nii.gz", key)
    }

    pub fn mask_path(batch_dir: &Path, key: &str) -> PathBuf {
        batch_dir.join(Self::mask_name(key))
    }

    /// 组装命令参数
    pub fn args(&self, batch_dir: &Path) -> Vec<String> {
        let dir = batch_dir.to_string_lossy().into_owned();
        let mut args = vec![
            "-i".to_string(),
            dir.clone(),
            "-o".to_string(),
            dir,
            "--no_bet_image".to_string(),
            "--save_bet_mask".to_string(),
        ];
        args.extend(self.device.hdbet_args());
        if self.verbose {
            args.push("--verbose".to_string());
        }
        args
    }

    /// 对批处理目录运行一次 hd-bet，掩膜写回同一目录
    pub async fn run_batch(&self, batch_dir: &Path) -> AppResult<()> {
        let args = self.args(batch_dir);
        self.runner.run(self.program, &args).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ProcessRunner;

    #[test]
    fn test_mask_naming() {
        assert_eq!(HdBet::input_name("sub-01_run-1"), "sub-01_run-1.nii.gz");
        assert_eq!(HdBet::mask_name("sub-01_run-1"), "sub-01_run-1_bet.nii.gz");
    }

    #[test]
    fn test_args_cpu_verbose() {
        let runner = ProcessRunner::new(false);
        let hdbet = HdBet::new(&runner, "hd-bet", Device::Cpu, true);
        let args = hdbet.args(Path::new("/staging/.extract-x"));
        assert_eq!(
            args,
            vec![
                "-i",
                "/staging/.extract-x",
                "-o",
                "/staging/.extract-x",
                "--no_bet_image",
                "--save_bet_mask",
                "-device",
                "cpu",
                "--disable_tta",
                "--verbose"
            ]
        );
    }
}
