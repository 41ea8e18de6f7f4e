use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{AppResult, ConfigError};
use crate::models::InclusionFilter;

/// 程序配置文件
///
/// 外部工具的位置和几何参数。可由 TOML 文件提供，环境变量优先。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// c3d 可执行文件
    pub c3d: String,
    /// hd-bet 可执行文件
    pub hdbet: String,
    /// 颈部裁剪脚本
    pub trim_neck: String,
    /// 颈部裁剪截断距离 (mm)，传给 trim_neck.sh -c
    pub neck_cutoff_mm: u32,
    /// 裁剪后各方向填充 (mm)
    pub neck_pad_mm: u32,
    /// 暂存图像统一的方向
    pub orientation: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            c3d: "c3d".to_string(),
            hdbet: "hd-bet".to_string(),
            trim_neck: "trim_neck.sh".to_string(),
            neck_cutoff_mm: 20,
            neck_pad_mm: 10,
            orientation: "LPI".to_string(),
        }
    }
}

impl Config {
    /// 读取配置：可选的 TOML 文件，然后应用环境变量覆盖
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let Some(path) = path else {
            return Self::from_env();
        };
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::MissingPath { path: path.to_path_buf() })?;
        let base: Self = toml::from_str(&content).map_err(|source| ConfigError::ConfigFileParseFailed {
            path: path.to_path_buf(),
            source,
        })?;
        base.with_env_overrides()
    }

    /// 默认配置加环境变量覆盖
    pub fn from_env() -> AppResult<Self> {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(self) -> AppResult<Self> {
        Ok(Self {
            c3d: std::env::var("T1W_C3D").unwrap_or(self.c3d),
            hdbet: std::env::var("T1W_HDBET").unwrap_or(self.hdbet),
            trim_neck: std::env::var("T1W_TRIM_NECK").unwrap_or(self.trim_neck),
            neck_cutoff_mm: env_number("T1W_NECK_CUTOFF_MM")?.unwrap_or(self.neck_cutoff_mm),
            neck_pad_mm: env_number("T1W_NECK_PAD_MM")?.unwrap_or(self.neck_pad_mm),
            orientation: self.orientation,
        })
    }
}

fn env_number(var_name: &str) -> AppResult<Option<u32>> {
    match std::env::var(var_name) {
        Ok(value) => {
            let parsed = value.trim().parse::<u32>();
            match parsed {
                Ok(number) => Ok(Some(number)),
                Err(_) => Err(ConfigError::EnvVarParseFailed {
                    var_name: var_name.to_string(),
                    value,
                    expected_type: "u32".to_string(),
                }
                .into()),
            }
        }
        Err(_) => Ok(None),
    }
}

/// 推理设备
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cuda,
    Mps,
    Cpu,
}

impl Device {
    pub fn as_str(self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Mps => "mps",
            Device::Cpu => "cpu",
        }
    }

    /// hd-bet 的设备参数
    ///
    /// CPU 模式关闭测试时增强，否则耗时过长
    pub fn hdbet_args(self) -> Vec<String> {
        let mut args = vec!["-device".to_string(), self.as_str().to_string()];
        if self == Device::Cpu {
            args.push("--disable_tta".to_string());
        }
        args
    }

    /// 检查设备在当前环境中是否可见
    pub fn check_available(self, cuda_visible_devices: Option<&str>) -> AppResult<()> {
        if self == Device::Cuda && cuda_visible_devices.map_or(true, |v| v.trim().is_empty()) {
            return Err(ConfigError::DeviceUnavailable {
                device: self.as_str().to_string(),
                reason: "CUDA_VISIBLE_DEVICES 未设置，进程看不到任何 GPU".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cuda" => Ok(Device::Cuda),
            "mps" => Ok(Device::Mps),
            "cpu" => Ok(Device::Cpu),
            other => Err(format!("不支持的设备 '{}'，可选 cuda / mps / cpu", other)),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 工作目录保留策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeepWorkdir {
    Never,
    #[default]
    OnError,
    Always,
}

impl KeepWorkdir {
    pub fn keep(self, failed: bool) -> bool {
        match self {
            KeepWorkdir::Never => false,
            KeepWorkdir::OnError => failed,
            KeepWorkdir::Always => true,
        }
    }
}

impl FromStr for KeepWorkdir {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "never" => Ok(KeepWorkdir::Never),
            "on_error" => Ok(KeepWorkdir::OnError),
            "always" => Ok(KeepWorkdir::Always),
            other => Err(format!("无效的取值 '{}'，可选 never / on_error / always", other)),
        }
    }
}

/// 单次调用的运行上下文
///
/// 在进程启动时解析一次，之后只读
#[derive(Clone, Debug)]
pub struct RunContext {
    pub config: Config,
    pub filter: InclusionFilter,
    pub staging_dir: PathBuf,
    pub input_dataset: Option<PathBuf>,
    pub output_dataset: Option<PathBuf>,
    pub device: Device,
    pub trim_neck: bool,
    pub reset_origin: bool,
    pub keep_workdir: KeepWorkdir,
    pub verbose: bool,
}

impl RunContext {
    pub fn new(config: Config, filter: InclusionFilter, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            filter,
            staging_dir: staging_dir.into(),
            input_dataset: None,
            output_dataset: None,
            device: Device::default(),
            trim_neck: false,
            reset_origin: false,
            keep_workdir: KeepWorkdir::default(),
            verbose: false,
        }
    }

    /// 校验后处理选项
    ///
    /// 原点重置作用于裁剪结果，因此必须同时开启裁剪
    pub fn validate_postprocessing(&self) -> AppResult<()> {
        if self.reset_origin && !self.trim_neck {
            return Err(ConfigError::InvalidOptions(
                "--reset-origin 需要同时指定 --trim-neck".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_parse_and_args() {
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda);
        assert_eq!(Device::Mps.hdbet_args(), vec!["-device", "mps"]);
        assert_eq!(Device::Cpu.hdbet_args(), vec!["-device", "cpu", "--disable_tta"]);
        assert!("tpu".parse::<Device>().is_err());
    }

    #[test]
    fn test_cuda_requires_visible_devices() {
        assert!(Device::Cuda.check_available(None).is_err());
        assert!(Device::Cuda.check_available(Some("  ")).is_err());
        assert!(Device::Cuda.check_available(Some("0")).is_ok());
        assert!(Device::Cpu.check_available(None).is_ok());
    }

    #[test]
    fn test_keep_workdir_policy() {
        assert!(!KeepWorkdir::Never.keep(true));
        assert!(KeepWorkdir::OnError.keep(true));
        assert!(!KeepWorkdir::OnError.keep(false));
        assert!(KeepWorkdir::Always.keep(false));
    }

    #[test]
    fn test_config_file_partial_override() {
        let parsed: Config = toml::from_str("c3d = \"/opt/c3d/bin/c3d\"\nneck_pad_mm = 5\n").unwrap();
        assert_eq!(parsed.c3d, "/opt/c3d/bin/c3d");
        assert_eq!(parsed.neck_pad_mm, 5);
        assert_eq!(parsed.hdbet, "hd-bet");
        assert_eq!(parsed.orientation, "LPI");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.orientation, "LPI");
        assert!(Config::load(Some(Path::new("/nonexistent/t1w.toml"))).is_err());
    }

    #[test]
    fn test_reset_origin_requires_trim() {
        let mut ctx = RunContext::new(Config::default(), InclusionFilter::AllParticipants, "/tmp/staging");
        ctx.reset_origin = true;
        assert!(ctx.validate_postprocessing().is_err());
        ctx.trim_neck = true;
        assert!(ctx.validate_postprocessing().is_ok());
    }
}
