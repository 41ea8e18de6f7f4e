//! 颈部裁剪服务 - 业务能力层

use std::path::{Path, PathBuf};

use crate::error::AppResult;
use crate::infrastructure::CommandRunner;
use crate::services::c3d::{args, require_output, C3d};

/// 裁剪结果，均位于工作目录中
#[derive(Debug, Clone)]
pub struct TrimOutputs {
    /// 裁剪并填充后的图像
    pub image: PathBuf,
    /// 重采样到裁剪空间的脑掩膜
    pub mask: PathBuf,
    /// 原空间中的裁剪区域掩膜（质控用）
    pub region: PathBuf,
}

/// 颈部裁剪
///
/// 职责：
/// - 调用 trim_neck.sh 去掉颈部
/// - 四周填充，并把脑掩膜最近邻重采样到裁剪后的空间
pub struct NeckTrimmer<'a> {
    runner: &'a dyn CommandRunner,
    program: &'a str,
    c3d: C3d<'a>,
    cutoff_mm: u32,
    pad_mm: u32,
}

impl<'a> NeckTrimmer<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        program: &'a str,
        c3d: C3d<'a>,
        cutoff_mm: u32,
        pad_mm: u32,
    ) -> Self {
        Self {
            runner,
            program,
            c3d,
            cutoff_mm,
            pad_mm,
        }
    }

    pub async fn trim(&self, image: &Path, mask: &Path, workdir: &Path) -> AppResult<TrimOutputs> {
        let outputs = TrimOutputs {
            image: workdir.join("T1wNeckTrim.nii.gz"),
            mask: workdir.join("T1wNeckTrim_mask.nii.gz"),
            region: workdir.join("T1wNeckTrim_region.nii.gz"),
        };

        let cutoff = self.cutoff_mm.to_string();
        let args = args![
            "-d",
            "-c",
            &cutoff,
            "-w",
            workdir,
            "-m",
            outputs.region.as_path(),
            image,
            outputs.image.as_path()
        ];
        self.runner.run(self.program, &args).await?;
        require_output(self.program, &outputs.image)?;
        require_output(self.program, &outputs.region)?;

        self.c3d
            .pad_and_reslice(&outputs.image, mask, self.pad_mm, &outputs.mask)
            .await?;
        require_output(self.c3d.program(), &outputs.mask)?;

        Ok(outputs)
    }
}
