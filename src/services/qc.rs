//! 质控服务 - 业务能力层
//!
//! 在原始（未裁剪）空间中检查脑掩膜与裁剪区域的关系，并生成
//! 矢状位 + 冠状位叠加图。组合标签图中：
//! - 1：裁剪区域内、脑外
//! - 2：裁剪区域外的脑（颈部裁剪错误）
//! - 3：裁剪区域内的脑

use std::path::{Path, PathBuf};

use image::{imageops, RgbImage};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, QcError};
use crate::services::c3d::{require_output, C3d, QC_COLOR_LUT};

const LABEL_OUTSIDE_TRIM: u32 = 2;
const LABEL_BRAIN: u32 = 3;

/// 质控结果
#[derive(Debug, Clone)]
pub struct QcReport {
    /// 拼接后的 RGB PNG（工作目录中）
    pub png: PathBuf,
    pub mask_outside_trim_region: bool,
    pub empty_brain_mask: bool,
}

impl QcReport {
    /// 未通过时对应的错误
    pub fn failure(&self) -> Option<QcError> {
        match (self.mask_outside_trim_region, self.empty_brain_mask) {
            (false, false) => None,
            (true, false) => Some(QcError::MaskOutsideTrimRegion),
            (false, true) => Some(QcError::EmptyBrainMask),
            (true, true) => Some(QcError::Multiple(format!(
                "{}; {}",
                QcError::MaskOutsideTrimRegion,
                QcError::EmptyBrainMask
            ))),
        }
    }
}

pub struct QcService<'a> {
    c3d: C3d<'a>,
}

impl<'a> QcService<'a> {
    pub fn new(c3d: C3d<'a>) -> Self {
        Self { c3d }
    }

    /// 生成质控数据
    ///
    /// # 参数
    /// - `image`: 原空间的 T1w 图像
    /// - `brain_mask`: 原空间的脑掩膜
    /// - `trim_region`: 原空间的裁剪区域；`None` 表示不裁剪，区域覆盖整幅图像
    /// - `workdir`: 工作目录
    pub async fn run(
        &self,
        image: &Path,
        brain_mask: &Path,
        trim_region: Option<&Path>,
        workdir: &Path,
    ) -> AppResult<QcReport> {
        let region = match trim_region {
            Some(region) => region.to_path_buf(),
            None => {
                let full = workdir.join("full_coverage_mask.nii.gz");
                self.c3d.full_coverage_mask(image, &full).await?;
                full
            }
        };

        let combined = workdir.join("combined_mask.nii.gz");
        self.c3d.combine_qc_labels(brain_mask, &region, &combined).await?;

        let labels = self.c3d.labels_present(&combined).await?;
        debug!("质控标签: {:?}", labels);

        let mask_outside_trim_region = labels.contains(&LABEL_OUTSIDE_TRIM);
        let empty_brain_mask = !labels.contains(&LABEL_BRAIN);
        if mask_outside_trim_region {
            warn!("⚠️ 颈部裁剪错误: 脑掩膜超出裁剪区域");
        }
        if empty_brain_mask {
            warn!("⚠️ 脑提取错误: 裁剪区域内没有脑体素");
        }

        let color_lut = workdir.join("color_lut.txt");
        std::fs::write(&color_lut, QC_COLOR_LUT).map_err(|e| AppError::write_failed(&color_lut, e))?;

        let sagittal = workdir.join("qc_sag_slice.png");
        let coronal = workdir.join("qc_cor_slice.png");
        self.c3d
            .qc_slices(image, &combined, &color_lut, &sagittal, &coronal)
            .await?;
        require_output(self.c3d.program(), &sagittal)?;
        require_output(self.c3d.program(), &coronal)?;

        let png = workdir.join("qc_rgb_slices.png");
        tile_images(&[sagittal, coronal], &png)?;

        Ok(QcReport {
            png,
            mask_outside_trim_region,
            empty_brain_mask,
        })
    }
}

/// 从左到右拼接图像，底部对齐，空白处填黑
pub fn tile_images(inputs: &[PathBuf], output: &Path) -> AppResult<()> {
    let mut images = Vec::with_capacity(inputs.len());
    for path in inputs {
        let img = image::open(path).map_err(|e| AppError::image_failed(path, e))?;
        images.push(img.to_rgb8());
    }

    let height = images.iter().map(|img| img.height()).max().unwrap_or(0);
    let width = images.iter().map(|img| img.width()).sum();

    let mut canvas = RgbImage::new(width, height);
    let mut x = 0i64;
    for img in &images {
        let y = i64::from(height - img.height());
        imageops::replace(&mut canvas, img, x, y);
        x += i64::from(img.width());
    }

    canvas.save(output).map_err(|e| AppError::image_failed(output, e))
}
