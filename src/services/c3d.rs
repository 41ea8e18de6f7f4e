//! c3d 服务 - 业务能力层
//!
//! 把需要的 c3d 操作封装成方法，负责拼接参数和解析输出。
//! 所有体素级操作都交给 c3d，本 crate 不直接读写图像数据。

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AppError, AppResult, ToolError};
use crate::infrastructure::CommandRunner;
use crate::models::ImageGeometry;

/// 把路径和字符串统一转换为参数列表
macro_rules! args {
    ($($arg:expr),* $(,)?) => {
        vec![$(crate::services::c3d::ToArg::to_arg(&$arg)),*]
    };
}
pub(crate) use args;

pub(crate) trait ToArg {
    fn to_arg(&self) -> String;
}

impl ToArg for &Path {
    fn to_arg(&self) -> String {
        self.to_string_lossy().into_owned()
    }
}

impl ToArg for &str {
    fn to_arg(&self) -> String {
        (*self).to_string()
    }
}

impl ToArg for &String {
    fn to_arg(&self) -> String {
        (*self).clone()
    }
}

static CENTROID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"CENTROID_VOX \[([-+\deE.]+), ([-+\deE.]+), ([-+\deE.]+)\]").expect("centroid regex")
});

/// 质控叠加的颜色表：`label red green blue alpha`
///
/// 1 = 裁剪区域内的非脑组织，2 = 裁剪区域外的脑（错误），3 = 裁剪区域内的脑
pub const QC_COLOR_LUT: &str = "0 0 0 0 0\n1 255 0 0 0.3\n2 128 255 0 0.3\n3 32 32 255 0.3\n";

#[derive(Clone, Copy)]
pub struct C3d<'a> {
    runner: &'a dyn CommandRunner,
    program: &'a str,
}

impl<'a> C3d<'a> {
    pub fn new(runner: &'a dyn CommandRunner, program: &'a str) -> Self {
        Self { runner, program }
    }

    pub fn program(&self) -> &str {
        self.program
    }

    async fn run(&self, args: Vec<String>) -> AppResult<String> {
        let output = self.runner.run(self.program, &args).await?;
        Ok(output.stdout)
    }

    /// 重定向到指定方向（体素置换）
    pub async fn reorient(&self, input: &Path, output: &Path, orientation: &str) -> AppResult<()> {
        self.run(args![input, "-swapdim", orientation, "-o", output]).await?;
        require_output(self.program, output)
    }

    /// 读取图像头部几何
    pub async fn geometry(&self, image: &Path) -> AppResult<ImageGeometry> {
        let stdout = self.run(args![image, "-info"]).await?;
        ImageGeometry::parse_c3d_info(&stdout)
            .ok_or_else(|| AppError::unparseable(self.program, "-info", stdout))
    }

    /// 掩膜质心（体素坐标）
    pub async fn centroid_voxel(&self, mask: &Path) -> AppResult<[f64; 3]> {
        let stdout = self.run(args![mask, "-centroid"]).await?;
        parse_centroid(&stdout).ok_or_else(|| AppError::unparseable(self.program, "-centroid", stdout))
    }

    /// 在一次调用中把图像和掩膜的原点设为同一体素位置
    ///
    /// 只改写头部仿射，体素数据不变
    pub async fn set_origin_voxel(
        &self,
        image: &Path,
        mask: &Path,
        centroid: [f64; 3],
        output_image: &Path,
        output_mask: &Path,
    ) -> AppResult<()> {
        let centroid = format!("{}x{}x{}vox", centroid[0], centroid[1], centroid[2]);
        self.run(args![
            image,
            "-origin-voxel",
            &centroid,
            "-o",
            output_image,
            mask,
            "-origin-voxel",
            &centroid,
            "-type",
            "uchar",
            "-o",
            output_mask
        ])
        .await?;
        Ok(())
    }

    /// 填充裁剪后的图像，并把原空间的掩膜最近邻重采样到裁剪空间
    pub async fn pad_and_reslice(
        &self,
        trimmed: &Path,
        mask: &Path,
        pad_mm: u32,
        output_mask: &Path,
    ) -> AppResult<()> {
        let pad = format!("{0}x{0}x{0}mm", pad_mm);
        self.run(args![
            trimmed,
            "-pad",
            &pad,
            &pad,
            "0",
            "-o",
            trimmed,
            "-interpolation",
            "NearestNeighbor",
            mask,
            "-reslice-identity",
            "-type",
            "uchar",
            "-o",
            output_mask
        ])
        .await?;
        Ok(())
    }

    /// 覆盖整幅图像的掩膜（不裁剪时的裁剪区域）
    pub async fn full_coverage_mask(&self, image: &Path, output: &Path) -> AppResult<()> {
        self.run(args![image, "-thresh", "0", "0", "1", "1", "-o", output]).await?;
        Ok(())
    }

    /// 脑掩膜 ×2 加裁剪区域，得到质控标签图
    pub async fn combine_qc_labels(&self, brain_mask: &Path, trim_region: &Path, output: &Path) -> AppResult<()> {
        self.run(args![brain_mask, "-scale", "2", trim_region, "-add", "-o", output]).await?;
        Ok(())
    }

    /// 标签统计中出现的标签值
    pub async fn labels_present(&self, label_image: &Path) -> AppResult<Vec<u32>> {
        let stdout = self.run(args![label_image, "-dup", "-lstat"]).await?;
        Ok(parse_lstat_labels(&stdout))
    }

    /// 生成矢状位和冠状位中间切片的彩色叠加 PNG
    pub async fn qc_slices(
        &self,
        image: &Path,
        label_image: &Path,
        color_lut: &Path,
        sagittal_png: &Path,
        coronal_png: &Path,
    ) -> AppResult<()> {
        self.run(args![
            "-type", "uchar", image, "-stretch", "0", "99%", "0", "250", "-clip", "0", "255",
            "-as", "gray", "-slice", "x", "50%", "-popas", "gslice_sag",
            "-push", "gray", "-slice", "y", "50%", "-popas", "gslice_cor",
            label_image, "-as", "mask", "-slice", "x", "50%", "-popas", "mslice_sag",
            "-push", "mask", "-slice", "y", "50%", "-popas", "mslice_cor",
            "-clear", "-push", "gslice_sag", "-push", "mslice_sag",
            "-foreach", "-flip", "xy", "-endfor", "-oli", color_lut, "1", "-omc", sagittal_png,
            "-clear", "-push", "gslice_cor", "-push", "mslice_cor",
            "-foreach", "-flip", "xy", "-endfor", "-oli", color_lut, "1", "-omc", coronal_png
        ])
        .await?;
        Ok(())
    }

    /// 掩膜体积 (ml)
    pub async fn mask_volume_ml(&self, mask: &Path) -> AppResult<f64> {
        let stdout = self.run(args![mask, "-voxel-integral"]).await?;
        parse_voxel_integral(&stdout)
            .map(|mm3| mm3 / 1000.0)
            .ok_or_else(|| AppError::unparseable(self.program, "-voxel-integral", stdout))
    }
}

/// 确认外部工具生成了预期的输出文件
pub(crate) fn require_output(program: &str, path: &Path) -> AppResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ToolError::MissingOutput {
            program: program.to_string(),
            path: path.to_path_buf(),
        }
        .into())
    }
}

fn parse_centroid(output: &str) -> Option<[f64; 3]> {
    let caps = CENTROID_RE.captures(output)?;
    let value = |i: usize| caps.get(i)?.as_str().parse::<f64>().ok();
    Some([value(1)?, value(2)?, value(3)?])
}

/// `-lstat` 输出的第一列是标签值，表头行跳过
fn parse_lstat_labels(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|first| first.parse::<u32>().ok())
        .collect()
}

/// `Voxel Integral: 1.14778e+07`
fn parse_voxel_integral(output: &str) -> Option<f64> {
    output
        .lines()
        .find(|line| line.contains("Voxel Integral"))?
        .rsplit(':')
        .next()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::CommandOutput;
    use futures::future::BoxFuture;
    use futures::FutureExt;

    /// 成功退出但不写任何文件
    struct SilentRunner;

    impl CommandRunner for SilentRunner {
        fn run<'a>(&'a self, _program: &'a str, _args: &'a [String]) -> BoxFuture<'a, AppResult<CommandOutput>> {
            async { Ok(CommandOutput::default()) }.boxed()
        }
    }

    #[tokio::test]
    async fn test_reorient_requires_output_file() {
        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("T1w.nii.gz");
        let c3d = C3d::new(&SilentRunner, "c3d");

        let result = c3d.reorient(Path::new("/in.nii.gz"), &output, "LPI").await;
        assert!(matches!(
            result,
            Err(AppError::Tool(ToolError::MissingOutput { .. }))
        ));
    }

    #[test]
    fn test_parse_centroid() {
        let out = "CENTROID_VOX [127.5, 130.25, -8.0]\nCENTROID_MM [1, 2, 3]\n";
        assert_eq!(parse_centroid(out), Some([127.5, 130.25, -8.0]));
        assert_eq!(parse_centroid("nothing"), None);
    }

    #[test]
    fn test_parse_lstat_labels() {
        let out = "LabelID        Mean        StdD         Max         Min       Count     Vol(mm^3)        Extent(Vox)\n    0      0.00000     0.00000     0.00000     0.00000    1000000    1000000.000    256   256   176\n    1      1.00000     0.00000     1.00000     1.00000     200000     200000.000    200   200   120\n    3      3.00000     0.00000     3.00000     3.00000     100000     100000.000    140   170   120\n";
        assert_eq!(parse_lstat_labels(out), vec![0, 1, 3]);
    }

    #[test]
    fn test_parse_voxel_integral() {
        assert_eq!(parse_voxel_integral("Voxel Integral: 1.14778e+07\n"), Some(1.14778e7));
        assert_eq!(parse_voxel_integral("oops"), None);
    }

    #[test]
    fn test_args_macro_mixes_paths_and_strings() {
        let path = Path::new("/tmp/a.nii.gz");
        let pad = String::from("10x10x10mm");
        let args: Vec<String> = args![path, "-pad", &pad];
        assert_eq!(args, vec!["/tmp/a.nii.gz", "-pad", "10x10x10mm"]);
    }
}
