//! 暂存目录契约
//!
//! 三个阶段之间唯一的耦合面。每个条目是以 `WorkItem.key` 命名的子目录：
//!
//! ```text
//! <staging>/<key>/T1w.nii.gz         重定向后的图像（选择阶段写入）
//! <staging>/<key>/brain_mask.nii.gz  脑掩膜（批量提取阶段写入）
//! <staging>/<key>/entry.json         来源与参数（选择阶段写入）
//! ```
//!
//! 以 `.` 开头的目录是批处理临时目录，读取时忽略。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, StagingError};
use crate::models::inclusion_filter::InclusionFilter;
use crate::models::work_item::{session_label, WorkItem};

/// 暂存 schema 版本，修改文件布局或 sidecar 字段时递增
pub const STAGING_SCHEMA_VERSION: u32 = 1;

pub const IMAGE_FILE: &str = "T1w.nii.gz";
pub const MASK_FILE: &str = "brain_mask.nii.gz";
pub const SIDECAR_FILE: &str = "entry.json";

/// 暂存条目的 sidecar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingSidecar {
    pub schema_version: u32,
    pub key: String,
    pub participant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub source_entities: String,
    /// 相对源数据集的路径
    pub source_path: String,
    pub source_dataset_name: String,
    pub source_dataset_uri: String,
    pub orientation: String,
    pub staged_at: DateTime<Utc>,
}

impl StagingSidecar {
    pub fn for_item(item: &WorkItem, dataset_name: &str, dataset_uri: &str, orientation: &str) -> Self {
        Self {
            schema_version: STAGING_SCHEMA_VERSION,
            key: item.key.clone(),
            participant: item.participant.clone(),
            session: item.session.clone(),
            source_entities: item.source_entities.clone(),
            source_path: item.source_rel_path.clone(),
            source_dataset_name: dataset_name.to_string(),
            source_dataset_uri: dataset_uri.to_string(),
            orientation: orientation.to_string(),
            staged_at: Utc::now(),
        }
    }

    /// BIDS URI 形式的源引用
    pub fn source_uri(&self) -> String {
        format!("bids:{}:{}", self.source_dataset_name, self.source_path)
    }

    pub fn label(&self) -> String {
        session_label(&self.participant, self.session.as_deref())
    }
}

/// 单个条目的文件布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryLayout {
    dir: PathBuf,
}

impl EntryLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn image(&self) -> PathBuf {
        self.dir.join(IMAGE_FILE)
    }

    pub fn mask(&self) -> PathBuf {
        self.dir.join(MASK_FILE)
    }

    pub fn sidecar(&self) -> PathBuf {
        self.dir.join(SIDECAR_FILE)
    }

    pub fn has_image(&self) -> bool {
        is_non_empty_file(&self.image())
    }

    pub fn has_mask(&self) -> bool {
        is_non_empty_file(&self.mask())
    }

    /// 读取并校验 sidecar
    pub fn read_sidecar(&self) -> AppResult<StagingSidecar> {
        let dir_name = self
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let path = self.sidecar();
        if !path.is_file() {
            return Err(StagingError::MissingSidecar { key: dir_name }.into());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| AppError::read_failed(&path, e))?;
        let sidecar: StagingSidecar = serde_json::from_str(&content).map_err(|source| {
            StagingError::InvalidSidecar {
                key: dir_name.clone(),
                source,
            }
        })?;

        if sidecar.schema_version != STAGING_SCHEMA_VERSION {
            return Err(StagingError::UnsupportedSchema {
                key: dir_name,
                found: sidecar.schema_version,
                expected: STAGING_SCHEMA_VERSION,
            }
            .into());
        }
        if sidecar.key != dir_name {
            return Err(StagingError::KeyMismatch {
                dir_name,
                key: sidecar.key,
            }
            .into());
        }
        Ok(sidecar)
    }

    pub fn write_sidecar(&self, sidecar: &StagingSidecar) -> AppResult<()> {
        let path = self.sidecar();
        let content = serde_json::to_string_pretty(sidecar).map_err(|e| AppError::json_failed(&path, e))?;
        std::fs::write(&path, content + "\n").map_err(|e| AppError::write_failed(&path, e))
    }
}

/// 已校验的暂存条目
#[derive(Debug, Clone)]
pub struct StagingEntry {
    pub layout: EntryLayout,
    pub sidecar: StagingSidecar,
}

impl StagingEntry {
    pub fn key(&self) -> &str {
        &self.sidecar.key
    }

    pub fn matches(&self, filter: &InclusionFilter) -> bool {
        filter.admits(&self.sidecar.participant, self.sidecar.session.as_deref())
    }
}

/// 读取失败的条目
#[derive(Debug)]
pub struct InvalidEntry {
    pub name: String,
    pub error: AppError,
}

/// 暂存目录
#[derive(Debug, Clone)]
pub struct StagingDir {
    root: PathBuf,
}

impl StagingDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self, key: &str) -> EntryLayout {
        EntryLayout::new(self.root.join(key))
    }

    /// 按名称顺序读取所有条目，逐条校验
    pub fn read_entries(&self) -> AppResult<(Vec<StagingEntry>, Vec<InvalidEntry>)> {
        if !self.root.is_dir() {
            return Err(AppError::missing_path(&self.root));
        }

        let mut names = Vec::new();
        let read_dir = std::fs::read_dir(&self.root).map_err(|e| AppError::read_failed(&self.root, e))?;
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| AppError::read_failed(&self.root, e))?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !dir_entry.path().is_dir() {
                continue;
            }
            names.push(name);
        }
        names.sort();

        let mut entries = Vec::new();
        let mut invalid = Vec::new();
        for name in names {
            let layout = self.layout(&name);
            match layout.read_sidecar() {
                Ok(sidecar) => entries.push(StagingEntry { layout, sidecar }),
                Err(error) => invalid.push(InvalidEntry { name, error }),
            }
        }
        Ok((entries, invalid))
    }
}

pub fn is_non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
