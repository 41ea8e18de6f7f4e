use std::sync::LazyLock;

use regex::Regex;

/// 原点与体素尺寸的绝对容差 (mm)
const TOLERANCE_MM: f64 = 1e-4;

static DIM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"dim = \[(\d+), (\d+), (\d+)\]").expect("dim regex"));
static BB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"bb = \{\[(\S+) (\S+) (\S+)\], \[(\S+) (\S+) (\S+)\]\}").expect("bb regex")
});
static VOX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"vox = \[(\S+), (\S+), (\S+)\]").expect("vox regex"));
static ORIENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"orient = (\w+)").expect("orient regex"));

/// 图像头部几何：体素网格、物理包围盒、体素尺寸、方向
///
/// 包围盒由原点和网格决定，两幅图像的几何一致即体素网格与仿射一致。
#[derive(Debug, Clone, PartialEq)]
pub struct ImageGeometry {
    pub dim: [u64; 3],
    pub bb_min: [f64; 3],
    pub bb_max: [f64; 3],
    pub vox: [f64; 3],
    pub orient: String,
}

impl ImageGeometry {
    /// 解析 `c3d <image> -info` 的输出
    ///
    /// ```text
    /// Image #1: dim = [256, 256, 176];  bb = {[-128 -128 -88], [128 128 88]};  vox = [1, 1, 1];  range = [0, 1044];  orient = LPI
    /// ```
    pub fn parse_c3d_info(output: &str) -> Option<Self> {
        let dim = DIM_RE.captures(output)?;
        let bb = BB_RE.captures(output)?;
        let vox = VOX_RE.captures(output)?;
        let orient = ORIENT_RE.captures(output)?;

        let int = |i: usize| dim.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
        let float = |caps: &regex::Captures, i: usize| {
            caps.get(i).and_then(|m| m.as_str().trim_end_matches(',').parse::<f64>().ok())
        };

        Some(Self {
            dim: [int(1)?, int(2)?, int(3)?],
            bb_min: [float(&bb, 1)?, float(&bb, 2)?, float(&bb, 3)?],
            bb_max: [float(&bb, 4)?, float(&bb, 5)?, float(&bb, 6)?],
            vox: [float(&vox, 1)?, float(&vox, 2)?, float(&vox, 3)?],
            orient: orient.get(1)?.as_str().to_string(),
        })
    }

    /// 与另一几何的差异描述，一致时返回 `None`
    pub fn mismatch(&self, other: &Self) -> Option<String> {
        if self.dim != other.dim {
            return Some(format!("dim {:?} != {:?}", self.dim, other.dim));
        }
        if !close(&self.vox, &other.vox) {
            return Some(format!("vox {:?} != {:?}", self.vox, other.vox));
        }
        if !close(&self.bb_min, &other.bb_min) || !close(&self.bb_max, &other.bb_max) {
            return Some(format!(
                "bb {:?}..{:?} != {:?}..{:?}",
                self.bb_min, self.bb_max, other.bb_min, other.bb_max
            ));
        }
        if self.orient != other.orient {
            return Some(format!("orient {} != {}", self.orient, other.orient));
        }
        None
    }
}

fn close(a: &[f64; 3], b: &[f64; 3]) -> bool {
    a.iter().zip(b).all(|(x, y)| (x - y).abs() <= TOLERANCE_MM)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = "Image #1: dim = [256, 256, 176];  bb = {[-128 -128 -88], [128 128 88]};  vox = [1, 1, 1];  range = [0, 1044];  orient = LPI\n";

    #[test]
    fn test_parse_c3d_info() {
        let geometry = ImageGeometry::parse_c3d_info(INFO).unwrap();
        assert_eq!(geometry.dim, [256, 256, 176]);
        assert_eq!(geometry.bb_min, [-128.0, -128.0, -88.0]);
        assert_eq!(geometry.vox, [1.0, 1.0, 1.0]);
        assert_eq!(geometry.orient, "LPI");
    }

    #[test]
    fn test_parse_scientific_notation() {
        let info = "Image #1: dim = [10, 10, 10];  bb = {[-1.5e+01 0 2.5], [-5 10 12.5]};  vox = [1, 1, 1];  range = [0, 1];  orient = RAS";
        let geometry = ImageGeometry::parse_c3d_info(info).unwrap();
        assert_eq!(geometry.bb_min[0], -15.0);
    }

    #[test]
    fn test_mismatch_detects_origin_shift() {
        let a = ImageGeometry::parse_c3d_info(INFO).unwrap();
        let mut b = a.clone();
        assert!(a.mismatch(&b).is_none());

        b.bb_min[2] += 1.0;
        b.bb_max[2] += 1.0;
        assert!(a.mismatch(&b).unwrap().starts_with("bb"));
    }

    #[test]
    fn test_small_shift_far_from_origin_is_mismatch() {
        let info = "Image #1: dim = [10, 10, 10];  bb = {[100 100 100], [110 110 110]};  vox = [1, 1, 1];  range = [0, 1];  orient = LPI";
        let a = ImageGeometry::parse_c3d_info(info).unwrap();
        let mut b = a.clone();
        b.bb_min[0] += 0.1;
        b.bb_max[0] += 0.1;
        assert!(a.mismatch(&b).is_some());

        let mut c = a.clone();
        c.bb_min[0] += 1e-5;
        c.bb_max[0] += 1e-5;
        assert!(a.mismatch(&c).is_none());
    }

    #[test]
    fn test_unparseable_info() {
        assert!(ImageGeometry::parse_c3d_info("garbage").is_none());
    }
}
