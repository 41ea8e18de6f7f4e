//! 原点重置服务 - 业务能力层

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::AppResult;
use crate::services::c3d::{require_output, C3d};

/// 把图像和掩膜的原点移到脑掩膜质心
///
/// 同一个质心在一次 c3d 调用中同时作用于两幅图像，保证两者的头部仿射一致
pub struct OriginReset<'a> {
    c3d: C3d<'a>,
}

impl<'a> OriginReset<'a> {
    pub fn new(c3d: C3d<'a>) -> Self {
        Self { c3d }
    }

    /// 返回工作目录中重置后的 (图像, 掩膜)
    pub async fn apply(&self, image: &Path, mask: &Path, workdir: &Path) -> AppResult<(PathBuf, PathBuf)> {
        let output_image = workdir.join("T1wOriginReset.nii.gz");
        let output_mask = workdir.join("T1wOriginReset_mask.nii.gz");

        let centroid = self.c3d.centroid_voxel(mask).await?;
        debug!("脑掩膜质心 (体素): {:?}", centroid);

        self.c3d
            .set_origin_voxel(image, mask, centroid, &output_image, &output_mask)
            .await?;
        require_output(self.c3d.program(), &output_image)?;
        require_output(self.c3d.program(), &output_mask)?;

        Ok((output_image, output_mask))
    }
}
