//! 数据集描述服务 - 业务能力层
//!
//! 读取源数据集名称，创建或更新目标数据集的 `dataset_description.json`

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, info};

use crate::error::{AppError, AppResult, ConfigError};
use crate::utils::fs::{create_dir_all, write_json_pretty};

pub const DESCRIPTION_FILE: &str = "dataset_description.json";
pub const PIPELINE_NAME: &str = "T1wPreprocessing";
pub const BIDS_VERSION: &str = "1.10.1";

/// 源数据集名称（`Name` 字段）
pub fn read_dataset_name(dataset_root: &Path) -> AppResult<String> {
    let path = dataset_root.join(DESCRIPTION_FILE);
    let description = read_description(&path)?;
    description
        .get("Name")
        .and_then(JsonValue::as_str)
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| invalid(&path, "缺少 Name 字段"))
}

/// 数据集的 `file://` URI（绝对路径）
pub fn dataset_uri(dataset_root: &Path) -> String {
    let absolute = std::fs::canonicalize(dataset_root)
        .or_else(|_| std::path::absolute(dataset_root))
        .unwrap_or_else(|_| dataset_root.to_path_buf());
    format!("file://{}", absolute.display())
}

/// 目标数据集名称
pub fn derivative_name(source_name: &str) -> String {
    format!("{} T1w Preprocessed", source_name)
}

/// 本程序的来源信息，写入 `GeneratedBy`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub version: String,
    pub code_url: String,
    pub revision: String,
    pub container_type: String,
    pub container_tag: String,
}

impl Provenance {
    /// 从运行时环境读取容器信息，仓库信息在编译期确定
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let container_type = if lookup("APPTAINER_CONTAINER").is_some() {
            "apptainer"
        } else if lookup("SINGULARITY_CONTAINER").is_some() {
            "singularity"
        } else {
            "docker"
        };

        Self {
            version: lookup("DOCKER_IMAGE_VERSION").unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            code_url: code_url(option_env!("GIT_REMOTE"), env!("CARGO_PKG_REPOSITORY")),
            revision: option_env!("GIT_REVISION").unwrap_or("unknown").to_string(),
            container_type: container_type.to_string(),
            container_tag: lookup("DOCKER_IMAGE_TAG").unwrap_or_else(|| "unknown".to_string()),
        }
    }

    fn generated_by(&self) -> JsonValue {
        json!({
            "Name": PIPELINE_NAME,
            "Version": self.version,
            "CodeURL": self.code_url,
            "Revision": self.revision,
            "Container": {
                "Type": self.container_type,
                "Tag": self.container_tag,
            },
        })
    }

    /// 已有条目中是否包含同一容器标签的本程序
    fn is_recorded_in(&self, generated_by: &[JsonValue]) -> bool {
        generated_by.iter().any(|entry| {
            entry.get("Name").and_then(JsonValue::as_str) == Some(PIPELINE_NAME)
                && entry.pointer("/Container/Tag").and_then(JsonValue::as_str)
                    == Some(self.container_tag.as_str())
        })
    }
}

/// 代码地址：编译期的 `GIT_REMOTE`，其次是包的 `repository` 字段
fn code_url(git_remote: Option<&str>, repository: &str) -> String {
    [git_remote.unwrap_or(""), repository]
        .into_iter()
        .map(str::trim)
        .find(|url| !url.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// 目标数据集描述
///
/// # 参数
/// - `output_root`: 目标数据集根目录，不存在时创建
/// - `name`: 新建描述时使用的名称
/// - `links`: 数据集名称 → URI
///
/// # 返回
/// 是否写入了文件。内容没有变化时不重写。
pub fn update_output_dataset(
    output_root: &Path,
    name: &str,
    links: &BTreeMap<String, String>,
    provenance: &Provenance,
) -> AppResult<bool> {
    create_dir_all(output_root)?;
    let path = output_root.join(DESCRIPTION_FILE);

    if !path.exists() {
        let mut description = Map::new();
        description.insert("Name".to_string(), json!(name));
        description.insert("BIDSVersion".to_string(), json!(BIDS_VERSION));
        description.insert("DatasetType".to_string(), json!("derivative"));
        description.insert("GeneratedBy".to_string(), json!([provenance.generated_by()]));
        if !links.is_empty() {
            description.insert("DatasetLinks".to_string(), json!(links));
        }
        write_json_pretty(&path, &JsonValue::Object(description))?;
        info!("📝 已创建 {}", path.display());
        return Ok(true);
    }

    let mut description = read_description(&path)?;
    if description.get("Name").and_then(JsonValue::as_str).is_none() {
        return Err(invalid(&path, "缺少 Name 字段"));
    }

    let mut modified = false;

    let mut generated_by = match description.remove("GeneratedBy") {
        None => Vec::new(),
        Some(JsonValue::Array(entries)) => entries,
        Some(entry @ JsonValue::Object(_)) => vec![entry],
        Some(_) => return Err(invalid(&path, "GeneratedBy 必须是对象或对象数组")),
    };
    if !provenance.is_recorded_in(&generated_by) {
        generated_by.push(provenance.generated_by());
        modified = true;
    }
    description.insert("GeneratedBy".to_string(), JsonValue::Array(generated_by));

    let mut dataset_links = match description.remove("DatasetLinks") {
        None => Map::new(),
        Some(JsonValue::Object(existing)) => existing,
        Some(_) => return Err(invalid(&path, "DatasetLinks 必须是对象")),
    };
    for (link_name, uri) in links {
        match dataset_links.get(link_name) {
            Some(existing) if existing.as_str() == Some(uri.as_str()) => {}
            Some(existing) => {
                return Err(ConfigError::DatasetLinkConflict {
                    name: link_name.clone(),
                    existing: existing.as_str().map(str::to_string).unwrap_or_else(|| existing.to_string()),
                    new: uri.clone(),
                }
                .into())
            }
            None => {
                dataset_links.insert(link_name.clone(), json!(uri));
                modified = true;
            }
        }
    }
    if !dataset_links.is_empty() {
        description.insert("DatasetLinks".to_string(), JsonValue::Object(dataset_links));
    }

    if modified {
        write_json_pretty(&path, &JsonValue::Object(description))?;
        info!("📝 已更新 {}", path.display());
    } else {
        debug!("{} 无需更新", path.display());
    }
    Ok(modified)
}

fn read_description(path: &Path) -> AppResult<Map<String, JsonValue>> {
    let content = std::fs::read_to_string(path).map_err(|_| AppError::missing_path(path))?;
    match serde_json::from_str::<JsonValue>(&content) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(_) => Err(invalid(path, "顶层必须是 JSON 对象")),
        Err(e) => Err(invalid(path, &e.to_string())),
    }
}

fn invalid(path: &Path, reason: &str) -> AppError {
    ConfigError::InvalidDatasetDescription {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance(tag: &str) -> Provenance {
        Provenance::from_lookup(|key| match key {
            "DOCKER_IMAGE_TAG" => Some(tag.to_string()),
            "DOCKER_IMAGE_VERSION" => Some("1.0.0".to_string()),
            _ => None,
        })
    }

    fn links(name: &str, uri: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(name.to_string(), uri.to_string())])
    }

    #[test]
    fn test_read_dataset_name() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_dataset_name(tmp.path()).unwrap_err().is_config());

        std::fs::write(tmp.path().join(DESCRIPTION_FILE), r#"{"BIDSVersion": "1.8.0"}"#).unwrap();
        assert!(read_dataset_name(tmp.path()).unwrap_err().is_config());

        std::fs::write(tmp.path().join(DESCRIPTION_FILE), r#"{"Name": "Study"}"#).unwrap();
        assert_eq!(read_dataset_name(tmp.path()).unwrap(), "Study");
    }

    #[test]
    fn test_code_url_falls_back_to_repository() {
        assert_eq!(code_url(Some("https://git.example/remote"), "https://git.example/pkg"), "https://git.example/remote");
        assert_eq!(code_url(None, "https://git.example/pkg"), "https://git.example/pkg");
        assert_eq!(code_url(None, ""), "unknown");
    }

    #[test]
    fn test_container_type_detection() {
        let p = Provenance::from_lookup(|key| (key == "SINGULARITY_CONTAINER").then(|| "1".to_string()));
        assert_eq!(p.container_type, "singularity");
        assert_eq!(p.container_tag, "unknown");
        assert_eq!(p.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_create_then_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("derivatives");
        let links = links("Study", "file:///data/study");

        assert!(update_output_dataset(&root, "Study T1w Preprocessed", &links, &provenance("t1")).unwrap());
        let first = std::fs::read_to_string(root.join(DESCRIPTION_FILE)).unwrap();
        let parsed: JsonValue = serde_json::from_str(&first).unwrap();
        assert_eq!(parsed["Name"], "Study T1w Preprocessed");
        assert_eq!(parsed["BIDSVersion"], BIDS_VERSION);
        assert_eq!(parsed["DatasetLinks"]["Study"], "file:///data/study");
        assert_eq!(parsed["GeneratedBy"][0]["Container"]["Tag"], "t1");

        assert!(!update_output_dataset(&root, "ignored", &links, &provenance("t1")).unwrap());
        assert_eq!(std::fs::read_to_string(root.join(DESCRIPTION_FILE)).unwrap(), first);
    }

    #[test]
    fn test_new_container_tag_appended() {
        let tmp = tempfile::tempdir().unwrap();
        let links = links("Study", "file:///data/study");
        update_output_dataset(tmp.path(), "D", &links, &provenance("t1")).unwrap();
        assert!(update_output_dataset(tmp.path(), "D", &links, &provenance("t2")).unwrap());

        let text = std::fs::read_to_string(tmp.path().join(DESCRIPTION_FILE)).unwrap();
        let parsed: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["GeneratedBy"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_single_generated_by_object_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(DESCRIPTION_FILE),
            r#"{"Name": "D", "GeneratedBy": {"Name": "T1wPreprocessing", "Container": {"Tag": "t1"}}}"#,
        )
        .unwrap();
        assert!(!update_output_dataset(tmp.path(), "D", &BTreeMap::new(), &provenance("t1")).unwrap());
    }

    #[test]
    fn test_link_conflict_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        update_output_dataset(tmp.path(), "D", &links("Study", "file:///a"), &provenance("t1")).unwrap();
        let err = update_output_dataset(tmp.path(), "D", &links("Study", "file:///b"), &provenance("t1"))
            .unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::DatasetLinkConflict { .. })));
    }
}
