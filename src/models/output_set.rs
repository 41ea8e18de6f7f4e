//! 派生输出集合
//!
//! 完整性判定集中在 [`OutputSet::is_complete`]，选择阶段（提前检查）和
//! 组装阶段（最终检查）共用同一判定。

use std::path::{Path, PathBuf};

use crate::models::staging::{is_non_empty_file, StagingSidecar};
use crate::models::work_item::WorkItem;

/// 完整性判定的版本。修改必需文件集合时递增，并在 DESIGN.md 中记录。
///
/// 版本 1：预处理图像、脑掩膜、两者的 sidecar、质控 PNG，五个文件均存在且非空。
pub const OUTPUT_SET_VERSION: u32 = 1;

/// 一个工作项在目标数据集中的全部输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSet {
    dataset_root: PathBuf,
    pub anat_dir: PathBuf,
    pub preproc_image: PathBuf,
    pub preproc_sidecar: PathBuf,
    pub mask: PathBuf,
    pub mask_sidecar: PathBuf,
    pub qc_png: PathBuf,
}

impl OutputSet {
    pub fn new(dataset_root: &Path, participant: &str, session: Option<&str>, entities: &str) -> Self {
        let mut anat_dir = dataset_root.join(format!("sub-{}", participant));
        if let Some(session) = session {
            anat_dir.push(format!("ses-{}", session));
        }
        anat_dir.push("anat");

        let file = |suffix: &str| anat_dir.join(format!("{}_{}", entities, suffix));

        Self {
            dataset_root: dataset_root.to_path_buf(),
            preproc_image: file("desc-preproc_T1w.nii.gz"),
            preproc_sidecar: file("desc-preproc_T1w.json"),
            mask: file("desc-brain_mask.nii.gz"),
            mask_sidecar: file("desc-brain_mask.json"),
            qc_png: file("desc-qcslice_rgb.png"),
            anat_dir,
        }
    }

    pub fn for_item(dataset_root: &Path, item: &WorkItem) -> Self {
        Self::new(
            dataset_root,
            &item.participant,
            item.session.as_deref(),
            &item.source_entities,
        )
    }

    pub fn for_sidecar(dataset_root: &Path, sidecar: &StagingSidecar) -> Self {
        Self::new(
            dataset_root,
            &sidecar.participant,
            sidecar.session.as_deref(),
            &sidecar.source_entities,
        )
    }

    /// 完整性判定所要求的文件
    pub fn required_files(&self) -> [&Path; 5] {
        [
            &self.preproc_image,
            &self.preproc_sidecar,
            &self.mask,
            &self.mask_sidecar,
            &self.qc_png,
        ]
    }

    /// 输出集合是否完整；部分存在视为不完整，需要重新处理
    pub fn is_complete(&self) -> bool {
        self.required_files().iter().all(|path| is_non_empty_file(path))
    }

    /// 调试用工作目录的复制位置
    pub fn workdir_copy(&self) -> PathBuf {
        self.anat_dir.join("workdir")
    }

    /// 预处理图像相对目标数据集的路径
    pub fn preproc_rel_path(&self) -> String {
        self.preproc_image
            .strip_prefix(&self.dataset_root)
            .map(|p| {
                p.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_else(|_| self.preproc_image.to_string_lossy().into_owned())
    }
}
