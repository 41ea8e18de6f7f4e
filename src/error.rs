use std::path::{Path, PathBuf};

use thiserror::Error;

/// 应用程序错误类型
///
/// 分类对应三类处理方式：
/// - `Config`：启动前快速失败，进程以非零状态退出
/// - 其余类别：单个 WorkItem 的处理错误，记录后跳过该项
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 暂存目录错误
    #[error("暂存错误: {0}")]
    Staging(#[from] StagingError),
    /// 外部工具调用错误
    #[error("外部工具错误: {0}")]
    Tool(#[from] ToolError),
    /// 一致性错误（图像与掩膜几何不一致等）
    #[error("一致性错误: {0}")]
    Consistency(#[from] ConsistencyError),
    /// 质控失败
    #[error("质控失败: {0}")]
    Qc(#[from] QcError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
}

impl AppError {
    /// 是否为配置错误（需要在任何处理开始前终止进程）
    pub fn is_config(&self) -> bool {
        matches!(self, AppError::Config(_))
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 同一粒度同时给出了字面值和列表文件
    #[error("--{granularity} 与 --{granularity}-list 不能同时指定")]
    ConflictingFilterForms { granularity: &'static str },
    /// 同时按参与者和按会话筛选
    #[error("--participant 与 --session 类参数只能指定其中一种")]
    ConflictingGranularity,
    /// 会话条目格式错误
    #[error("会话条目格式错误 ({origin}): '{entry}'，应为 'participant,session'")]
    MalformedSessionEntry { origin: String, entry: String },
    /// 筛选值为空
    #[error("筛选值不能为空: --{flag}")]
    EmptyFilterValue { flag: &'static str },
    /// 必需的路径不存在
    #[error("路径不存在: {}", path.display())]
    MissingPath { path: PathBuf },
    /// 数据集描述文件缺失或无效
    #[error("数据集描述无效 ({}): {reason}", path.display())]
    InvalidDatasetDescription { path: PathBuf, reason: String },
    /// 数据集链接冲突
    #[error("数据集链接 {name} 已存在且 URI 为 {existing}，但提供了新的 URI {new}")]
    DatasetLinkConflict {
        name: String,
        existing: String,
        new: String,
    },
    /// 设备不可用
    #[error("设备 {device} 不可用: {reason}")]
    DeviceUnavailable { device: String, reason: String },
    /// 选项组合无效
    #[error("选项组合无效: {0}")]
    InvalidOptions(String),
    /// 配置文件解析失败
    #[error("配置文件解析失败 ({}): {source}", path.display())]
    ConfigFileParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

/// 暂存目录错误
#[derive(Debug, Error)]
pub enum StagingError {
    /// 暂存条目缺少 sidecar
    #[error("暂存条目 {key} 缺少 entry.json")]
    MissingSidecar { key: String },
    /// sidecar 无法解析
    #[error("暂存条目 {key} 的 entry.json 无法解析: {source}")]
    InvalidSidecar {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// 不支持的 schema 版本
    #[error("暂存条目 {key} 的 schema 版本 {found} 不受支持 (期望 {expected})")]
    UnsupportedSchema { key: String, found: u32, expected: u32 },
    /// 目录名与 sidecar 中的键不一致
    #[error("暂存条目目录 {dir_name} 与 sidecar 键 {key} 不一致")]
    KeyMismatch { dir_name: String, key: String },
    /// 暂存条目缺少文件
    #[error("暂存条目 {key} 缺少 {what}")]
    MissingFile { key: String, what: &'static str },
    /// 工作项键冲突
    #[error("工作项键 {key} 冲突: {first} 与 {second}")]
    DuplicateKey {
        key: String,
        first: String,
        second: String,
    },
    /// 源数据集中找不到对象
    #[error("源数据集中未找到 {0}")]
    SourceNotFound(String),
    /// 会话中没有 T1w 图像
    #[error("{0} 中没有找到 T1w 图像")]
    NoImages(String),
    /// 批处理未生成掩膜
    #[error("暂存条目 {key} 未生成脑掩膜")]
    MaskNotProduced { key: String },
}

/// 外部工具调用错误
#[derive(Debug, Error)]
pub enum ToolError {
    /// 无法启动进程
    #[error("无法启动 {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// 进程返回非零状态
    #[error("命令执行失败 (状态 {status}): {command}\n{stderr}")]
    NonZeroExit {
        command: String,
        status: String,
        stderr: String,
    },
    /// 无法解析工具输出
    #[error("无法解析 {program} 的输出 ({what}): {output}")]
    UnparseableOutput {
        program: String,
        what: &'static str,
        output: String,
    },
    /// 工具未生成预期的输出文件
    #[error("{program} 未生成输出文件 {}", path.display())]
    MissingOutput { program: String, path: PathBuf },
}

/// 一致性错误
#[derive(Debug, Error)]
pub enum ConsistencyError {
    /// 图像与掩膜的体素网格或仿射不一致
    #[error("{stage}: {left} 与 {right} 的几何不一致 ({detail})")]
    GeometryMismatch {
        stage: &'static str,
        left: String,
        right: String,
        detail: String,
    },
}

/// 质控失败
#[derive(Debug, Error)]
pub enum QcError {
    /// 脑掩膜超出裁剪区域
    #[error("颈部裁剪错误: 脑掩膜超出裁剪区域")]
    MaskOutsideTrimRegion,
    /// 裁剪区域内没有脑体素
    #[error("脑提取错误: 裁剪后的 T1w 空间中没有脑体素")]
    EmptyBrainMask,
    /// 多项质控失败
    #[error("{0}")]
    Multiple(String),
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取失败
    #[error("读取失败 ({}): {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 写入失败
    #[error("写入失败 ({}): {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// JSON 序列化/反序列化失败
    #[error("JSON 处理失败 ({}): {source}", path.display())]
    JsonFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// 图像编解码失败
    #[error("图像处理失败 ({}): {source}", path.display())]
    ImageFailed {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn read_failed(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.as_ref().to_path_buf(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn write_failed(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.as_ref().to_path_buf(),
            source,
        })
    }

    /// 创建 JSON 错误
    pub fn json_failed(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        AppError::File(FileError::JsonFailed {
            path: path.as_ref().to_path_buf(),
            source,
        })
    }

    /// 创建图像编解码错误
    pub fn image_failed(path: impl AsRef<Path>, source: image::ImageError) -> Self {
        AppError::File(FileError::ImageFailed {
            path: path.as_ref().to_path_buf(),
            source,
        })
    }

    /// 创建工具输出解析错误
    pub fn unparseable(program: impl Into<String>, what: &'static str, output: impl Into<String>) -> Self {
        AppError::Tool(ToolError::UnparseableOutput {
            program: program.into(),
            what,
            output: output.into(),
        })
    }

    /// 创建缺失路径的配置错误
    pub fn missing_path(path: impl AsRef<Path>) -> Self {
        AppError::Config(ConfigError::MissingPath {
            path: path.as_ref().to_path_buf(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
