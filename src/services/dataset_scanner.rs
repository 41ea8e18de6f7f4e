//! 源数据集扫描 - 业务能力层
//!
//! 按纳入条件遍历 `sub-*/[ses-*/]anat/*_T1w.nii.gz`，结果顺序确定（按名称排序）。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{AppError, AppResult, StagingError};
use crate::models::work_item::{session_label, T1W_SUFFIX};
use crate::models::{InclusionFilter, WorkItem};

/// 扫描结果
#[derive(Debug, Default)]
pub struct ScanResult {
    pub items: Vec<WorkItem>,
    /// (标签, 错误)：不存在的参与者/会话、没有图像的会话、键冲突
    pub failures: Vec<(String, AppError)>,
}

pub struct DatasetScanner<'a> {
    root: &'a Path,
    filter: &'a InclusionFilter,
}

impl<'a> DatasetScanner<'a> {
    pub fn new(root: &'a Path, filter: &'a InclusionFilter) -> Self {
        Self { root, filter }
    }

    pub fn scan(&self) -> AppResult<ScanResult> {
        let mut result = ScanResult::default();

        let participants = list_prefixed_dirs(self.root, "sub-")?;
        for wanted in self.filter.explicit_participants() {
            if !participants.contains_key(&wanted) {
                let label = session_label(&wanted, None);
                warn!("⚠️ 源数据集中未找到 {}", label);
                result
                    .failures
                    .push((label.clone(), StagingError::SourceNotFound(label).into()));
            }
        }

        for (participant, participant_dir) in &participants {
            if !self.filter.admits_participant(participant) {
                continue;
            }
            let sessions = match list_prefixed_dirs(participant_dir, "ses-") {
                Ok(sessions) => sessions,
                Err(e) => {
                    let label = session_label(participant, None);
                    warn!("⚠️ 无法读取 {}: {}", label, e);
                    result.failures.push((label, e));
                    continue;
                }
            };

            for wanted in self.filter.explicit_sessions(participant) {
                if !sessions.contains_key(&wanted) {
                    let label = session_label(participant, Some(&wanted));
                    warn!("⚠️ 源数据集中未找到 {}", label);
                    result
                        .failures
                        .push((label.clone(), StagingError::SourceNotFound(label).into()));
                }
            }

            if sessions.is_empty() {
                if self.filter.admits(participant, None) {
                    self.scan_anat(participant, None, participant_dir, &mut result);
                }
                continue;
            }

            for (session, session_dir) in &sessions {
                if self.filter.admits(participant, Some(session)) {
                    self.scan_anat(participant, Some(session), session_dir, &mut result);
                }
            }
        }

        reject_duplicate_keys(&mut result);
        Ok(result)
    }

    fn scan_anat(&self, participant: &str, session: Option<&str>, dir: &Path, result: &mut ScanResult) {
        let label = session_label(participant, session);
        let images = match list_t1w_images(&dir.join("anat")) {
            Ok(images) => images,
            Err(e) => {
                warn!("⚠️ 无法读取 {}: {}", label, e);
                result.failures.push((label, e));
                return;
            }
        };

        let items: Vec<WorkItem> = images
            .into_iter()
            .filter_map(|path| WorkItem::new(self.root, participant, session, path))
            .collect();

        if items.is_empty() {
            warn!("⚠️ {} 中没有找到 T1w 图像", label);
            result
                .failures
                .push((label.clone(), StagingError::NoImages(label).into()));
            return;
        }

        debug!("{}: {} 个 T1w 图像", label, items.len());
        result.items.extend(items);
    }
}

/// `anat` 目录中的 T1w 图像（排序）；目录不存在时为空
fn list_t1w_images(anat: &Path) -> AppResult<Vec<PathBuf>> {
    let mut images = Vec::new();
    if !anat.is_dir() {
        return Ok(images);
    }
    for entry in std::fs::read_dir(anat).map_err(|e| AppError::read_failed(anat, e))? {
        let path = entry.map_err(|e| AppError::read_failed(anat, e))?.path();
        let is_t1w = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(T1W_SUFFIX));
        if is_t1w && path.is_file() {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// 键冲突时保留第一个，其余记为失败
fn reject_duplicate_keys(result: &mut ScanResult) {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    let mut kept = Vec::with_capacity(result.items.len());

    for item in result.items.drain(..) {
        match seen.get(&item.key) {
            Some(first) => {
                let error = StagingError::DuplicateKey {
                    key: item.key.clone(),
                    first: first.clone(),
                    second: item.source_rel_path.clone(),
                };
                warn!("⚠️ {}", error);
                result.failures.push((item.source_rel_path.clone(), error.into()));
            }
            None => {
                seen.insert(item.key.clone(), item.source_rel_path.clone());
                kept.push(item);
            }
        }
    }
    result.items = kept;
}

/// 列出带前缀的子目录，键为去掉前缀后的 ID
fn list_prefixed_dirs(dir: &Path, prefix: &str) -> AppResult<BTreeMap<String, PathBuf>> {
    let mut found = BTreeMap::new();
    for entry in std::fs::read_dir(dir).map_err(|e| AppError::read_failed(dir, e))? {
        let entry = entry.map_err(|e| AppError::read_failed(dir, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(id) = name.strip_prefix(prefix) {
            if !id.is_empty() {
                found.insert(id.to_string(), path);
            }
        }
    }
    Ok(found)
}
