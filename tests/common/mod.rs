//! 集成测试共用的假工具链和数据集构造
//!
//! 图像文件是 JSON 文本（几何 + 体素数据占位），假 c3d / hd-bet / trim_neck.sh
//! 按真实工具的参数约定读写这些文件，并记录每次调用。

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::FutureExt;
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use t1w_preprocessing::config::{Config, Device};
use t1w_preprocessing::error::{AppResult, ToolError};
use t1w_preprocessing::{CommandOutput, CommandRunner, InclusionFilter, RunContext};

/// 脑掩膜为空
pub const FLAG_EMPTY_BRAIN: &str = "empty_brain";
/// 裁剪区域没有覆盖到全部脑组织
pub const FLAG_BRAIN_OUTSIDE_TRIM: &str = "brain_outside_trim";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FakeImage {
    pub dim: [u64; 3],
    pub origin: [f64; 3],
    pub vox: [f64; 3],
    pub orient: String,
    /// 体素数据占位，几何操作不得改变它
    pub data: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub labels: Vec<u32>,
    #[serde(default)]
    pub covers_brain: bool,
}

impl FakeImage {
    pub fn t1w(data: &str, flags: &[&str]) -> Self {
        Self {
            dim: [16, 16, 12],
            origin: [-8.0, -8.0, -6.0],
            vox: [1.0, 1.0, 1.0],
            orient: "RAS".to_string(),
            data: data.to_string(),
            flags: flags.iter().map(|f| f.to_string()).collect(),
            labels: Vec::new(),
            covers_brain: false,
        }
    }

    pub fn read(path: &Path) -> Self {
        let text = fs::read_to_string(path).unwrap_or_else(|e| panic!("读取 {} 失败: {}", path.display(), e));
        serde_json::from_str(&text).unwrap()
    }

    pub fn write(&self, path: &Path) {
        fs::write(path, serde_json::to_string(self).unwrap()).unwrap();
    }

    fn with_geometry_of(&self, other: &FakeImage) -> Self {
        Self {
            dim: other.dim,
            origin: other.origin,
            vox: other.vox,
            orient: other.orient.clone(),
            ..self.clone()
        }
    }

    fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    fn info(&self) -> String {
        let max: Vec<f64> = (0..3)
            .map(|i| self.origin[i] + self.dim[i] as f64 * self.vox[i])
            .collect();
        format!(
            "Image #1: dim = [{}, {}, {}];  bb = {{[{} {} {}], [{} {} {}]}};  vox = [{}, {}, {}];  range = [0, 1];  orient = {}\n",
            self.dim[0],
            self.dim[1],
            self.dim[2],
            self.origin[0],
            self.origin[1],
            self.origin[2],
            max[0],
            max[1],
            max[2],
            self.vox[0],
            self.vox[1],
            self.vox[2],
            self.orient
        )
    }
}

/// 假工具链
#[derive(Default)]
pub struct FakeToolchain {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    /// hd-bet 不为这些键生成掩膜
    hdbet_skip: Mutex<BTreeSet<String>>,
    /// hd-bet 生成掩膜后以非零状态退出
    hdbet_exit_error: Mutex<bool>,
    /// 这些键的重定向写出半个文件后失败
    reorient_fail: Mutex<BTreeSet<String>>,
    /// 带这些选项的 c3d 调用失败
    failing_c3d_args: Mutex<BTreeSet<String>>,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_mask_for(&self, key: &str) {
        self.hdbet_skip.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_hdbet_exit(&self) {
        *self.hdbet_exit_error.lock().unwrap() = true;
    }

    pub fn fail_reorient_for(&self, key: &str) {
        self.reorient_fail.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_c3d_with_arg(&self, arg: &str) {
        self.failing_c3d_args.lock().unwrap().insert(arg.to_string());
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// 某程序被调用的次数
    pub fn count(&self, program: &str) -> usize {
        self.calls().iter().filter(|(p, _)| p == program).count()
    }

    /// 参数中包含某个选项的调用次数
    pub fn count_with_arg(&self, arg: &str) -> usize {
        self.calls()
            .iter()
            .filter(|(_, args)| args.iter().any(|a| a == arg))
            .count()
    }

    fn c3d(&self, args: &[String]) -> Result<String, String> {
        let has = |flag: &str| args.iter().any(|a| a == flag);
        let path = |i: usize| PathBuf::from(&args[i]);

        let failing = self.failing_c3d_args.lock().unwrap().clone();
        if let Some(arg) = args.iter().find(|a| failing.contains(a.as_str())) {
            return Err(format!("c3d {} failed", arg));
        }

        if has("-omc") {
            for (i, arg) in args.iter().enumerate() {
                if arg == "-omc" {
                    let size = if i + 1 == args.len() - 1 { (4, 3) } else { (6, 5) };
                    RgbImage::from_pixel(size.0, size.1, Rgb([90, 90, 90]))
                        .save(path(i + 1))
                        .map_err(|e| e.to_string())?;
                }
            }
            return Ok(String::new());
        }
        if has("-origin-voxel") {
            // image -origin-voxel C -o out_image mask -origin-voxel C -type uchar -o out_mask
            let centroid = parse_voxel_triplet(&args[2]).ok_or("bad centroid")?;
            for (input, output) in [(0, 4), (5, 11)] {
                let mut img = read_image(&path(input))?;
                for axis in 0..3 {
                    img.origin[axis] = -centroid[axis] * img.vox[axis];
                }
                img.write(&path(output));
            }
            return Ok(String::new());
        }
        if has("-pad") {
            // trimmed -pad P P 0 -o trimmed -interpolation NearestNeighbor mask -reslice-identity -type uchar -o out
            let pad_mm: f64 = args[2].split('x').next().and_then(|v| v.parse().ok()).ok_or("bad pad")?;
            let mut trimmed = read_image(&path(0))?;
            for axis in 0..3 {
                let pad_vox = (pad_mm / trimmed.vox[axis]) as u64;
                trimmed.dim[axis] += 2 * pad_vox;
                trimmed.origin[axis] -= pad_mm;
            }
            trimmed.write(&path(6));
            let mask = read_image(&path(9))?;
            mask.with_geometry_of(&trimmed).write(&path(14));
            return Ok(String::new());
        }
        if has("-swapdim") {
            let output = path(4);
            let failing = self.reorient_fail.lock().unwrap().clone();
            if failing.iter().any(|key| output.to_string_lossy().contains(key.as_str())) {
                fs::write(&output, "{\"dim\": [1").map_err(|e| e.to_string())?;
                return Err("itk::ImageFileReaderException".to_string());
            }
            let mut img = read_image(&path(0))?;
            img.orient = args[2].clone();
            img.write(&path(4));
            return Ok(String::new());
        }
        if has("-info") {
            return Ok(read_image(&path(0))?.info());
        }
        if has("-centroid") {
            let img = read_image(&path(0))?;
            return Ok(format!(
                "CENTROID_VOX [{}, {}, {}]\nCENTROID_MM [0, 0, 0]\n",
                img.dim[0] as f64 / 2.0,
                img.dim[1] as f64 / 2.0,
                img.dim[2] as f64 / 2.0
            ));
        }
        if has("-thresh") {
            let mut region = read_image(&path(0))?;
            region.covers_brain = true;
            region.write(&path(7));
            return Ok(String::new());
        }
        if has("-scale") {
            // mask -scale 2 region -add -o out
            let mask = read_image(&path(0))?;
            let region = read_image(&path(3))?;
            let mut labels = vec![0, 1];
            if !mask.has_flag(FLAG_EMPTY_BRAIN) {
                if !region.covers_brain {
                    labels.push(2);
                }
                labels.push(3);
            }
            let mut combined = mask.clone();
            combined.labels = labels;
            combined.write(&path(6));
            return Ok(String::new());
        }
        if has("-lstat") {
            let img = read_image(&path(0))?;
            let mut out = String::from("LabelID        Mean        StdD         Max         Min       Count     Vol(mm^3)        Extent(Vox)\n");
            for label in img.labels {
                out.push_str(&format!(
                    "    {}      {}.00000     0.00000     {}.00000     {}.00000     100     100.000    4   4   4\n",
                    label, label, label, label
                ));
            }
            return Ok(out);
        }
        if has("-voxel-integral") {
            read_image(&path(0))?;
            return Ok("Voxel Integral: 1.14778e+06\n".to_string());
        }
        Err(format!("unsupported c3d call: {:?}", args))
    }

    fn trim_neck(&self, args: &[String]) -> Result<String, String> {
        // -d -c 20 -w wd -m region input output
        let region_path = PathBuf::from(&args[6]);
        let input = read_image(Path::new(&args[7]))?;

        let mut region = input.clone();
        region.covers_brain = !input.has_flag(FLAG_BRAIN_OUTSIDE_TRIM);
        region.write(&region_path);

        let mut trimmed = input;
        trimmed.dim[2] -= 4;
        trimmed.origin[2] += 4.0 * trimmed.vox[2];
        trimmed.write(Path::new(&args[8]));
        Ok(String::new())
    }

    fn hdbet(&self, args: &[String]) -> Result<String, String> {
        let dir = PathBuf::from(&args[1]);
        let skip = self.hdbet_skip.lock().unwrap().clone();
        let mut inputs: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(|e| e.to_string())?
            .map(|e| e.unwrap().path())
            .collect();
        inputs.sort();

        for input in inputs {
            let name = input.file_name().unwrap().to_string_lossy().into_owned();
            let Some(key) = name.strip_suffix(".nii.gz") else { continue };
            if key.ends_with("_bet") || skip.contains(key) {
                continue;
            }
            let image = read_image(&input)?;
            let mask = FakeImage {
                data: format!("mask-of-{}", image.data),
                ..image
            };
            mask.write(&dir.join(format!("{}_bet.nii.gz", key)));
        }

        if *self.hdbet_exit_error.lock().unwrap() {
            return Err("CUDA out of memory".to_string());
        }
        Ok(String::new())
    }
}

impl CommandRunner for FakeToolchain {
    fn run<'a>(&'a self, program: &'a str, args: &'a [String]) -> BoxFuture<'a, AppResult<CommandOutput>> {
        async move {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));

            let result = match program {
                "c3d" => self.c3d(args),
                "hd-bet" => self.hdbet(args),
                "trim_neck.sh" => self.trim_neck(args),
                other => Err(format!("unknown program {}", other)),
            };

            match result {
                Ok(stdout) => Ok(CommandOutput {
                    stdout,
                    stderr: String::new(),
                }),
                Err(stderr) => Err(ToolError::NonZeroExit {
                    command: format!("{} {}", program, args.join(" ")),
                    status: "exit status: 1".to_string(),
                    stderr,
                }
                .into()),
            }
        }
        .boxed()
    }
}

fn read_image(path: &Path) -> Result<FakeImage, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("{}: {}", path.display(), e))
}

fn parse_voxel_triplet(value: &str) -> Option<[f64; 3]> {
    let parts: Vec<f64> = value
        .strip_suffix("vox")?
        .split('x')
        .map(|v| v.parse().ok())
        .collect::<Option<_>>()?;
    Some([parts[0], parts[1], parts[2]])
}

/// 测试用的源数据集、暂存目录和目标数据集
pub struct Workspace {
    _tmp: tempfile::TempDir,
    pub input: PathBuf,
    pub staging: PathBuf,
    pub output: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("bids");
        let staging = tmp.path().join("staging");
        let output = tmp.path().join("derivatives");
        fs::create_dir_all(&input).unwrap();
        fs::write(
            input.join("dataset_description.json"),
            r#"{"Name": "Study", "BIDSVersion": "1.8.0"}"#,
        )
        .unwrap();
        Self {
            _tmp: tmp,
            input,
            staging,
            output,
        }
    }

    /// 在源数据集中添加一个 T1w 图像
    pub fn add_t1w(&self, rel: &str, flags: &[&str]) -> PathBuf {
        let path = self.input.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        FakeImage::t1w(rel, flags).write(&path);
        path
    }

    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self._tmp.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn context(&self, filter: InclusionFilter) -> RunContext {
        RunContext::new(Config::default(), filter, &self.staging)
    }

    pub fn select_ctx(&self, filter: InclusionFilter) -> RunContext {
        let mut ctx = self.context(filter);
        ctx.input_dataset = Some(self.input.clone());
        ctx
    }

    pub fn extract_ctx(&self, filter: InclusionFilter) -> RunContext {
        let mut ctx = self.context(filter);
        ctx.device = Device::Cpu;
        ctx
    }

    pub fn assemble_ctx(&self, filter: InclusionFilter, trim: bool, reset: bool) -> RunContext {
        let mut ctx = self.context(filter);
        ctx.output_dataset = Some(self.output.clone());
        ctx.trim_neck = trim;
        ctx.reset_origin = reset;
        ctx
    }

    /// 目录树快照：相对路径 → 文件内容
    pub fn snapshot(root: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files = Vec::new();
        collect(root, root, &mut files);
        files.sort();
        files
    }

    pub fn staged_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = fs::read_dir(&self.staging)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| !n.starts_with('.'))
            .collect();
        keys.sort();
        keys
    }
}

fn collect(root: &Path, dir: &Path, files: &mut Vec<(String, Vec<u8>)>) {
    if !dir.exists() {
        return;
    }
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect(root, &path, files);
        } else {
            let rel = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
            files.push((rel, fs::read(&path).unwrap()));
        }
    }
}
