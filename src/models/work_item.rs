use std::fmt;
use std::path::{Path, PathBuf};

/// T1w 图像的文件名后缀
pub const T1W_SUFFIX: &str = "_T1w.nii.gz";

/// 一个待处理的解剖图像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub participant: String,
    pub session: Option<String>,
    /// 源图像的绝对路径
    pub source_path: PathBuf,
    /// 相对源数据集根目录的路径（`/` 分隔）
    pub source_rel_path: String,
    /// 文件名去掉 `_T1w.nii.gz` 后的实体前缀
    pub source_entities: String,
    /// 暂存条目名
    pub key: String,
}

impl WorkItem {
    /// 由源图像构造工作项，文件名不符合 T1w 约定时返回 `None`
    pub fn new(
        dataset_root: &Path,
        participant: &str,
        session: Option<&str>,
        source_path: PathBuf,
    ) -> Option<Self> {
        let file_name = source_path.file_name()?.to_str()?;
        let source_entities = file_name.strip_suffix(T1W_SUFFIX)?.to_string();
        if source_entities.is_empty() {
            return None;
        }

        let source_rel_path = source_path
            .strip_prefix(dataset_root)
            .ok()?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        let key = canonical_key(participant, session, &source_entities);

        Some(Self {
            participant: participant.to_string(),
            session: session.map(str::to_string),
            source_path,
            source_rel_path,
            source_entities,
            key,
        })
    }

    /// 会话级标签，如 `sub-01/ses-MR1`
    pub fn label(&self) -> String {
        session_label(&self.participant, self.session.as_deref())
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

pub fn session_label(participant: &str, session: Option<&str>) -> String {
    match session {
        Some(session) => format!("sub-{}/ses-{}", participant, session),
        None => format!("sub-{}", participant),
    }
}

/// 规范键 `sub-P[_ses-S][_其他实体]_run-N`
///
/// `run` 实体取整数值（`run-01` 与 `run-1` 相同），缺省为 1。
/// `sub`/`ses` 始终取目录层级给出的值。
pub fn canonical_key(participant: &str, session: Option<&str>, source_entities: &str) -> String {
    let mut parts = vec![format!("sub-{}", participant)];
    if let Some(session) = session {
        parts.push(format!("ses-{}", session));
    }

    let mut run = "1".to_string();
    for entity in source_entities.split('_') {
        match entity.split_once('-') {
            Some(("sub", _)) | Some(("ses", _)) => {}
            Some(("run", value)) => {
                run = value
                    .parse::<u32>()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|_| value.to_string());
            }
            _ if entity.is_empty() => {}
            _ => parts.push(entity.to_string()),
        }
    }
    parts.push(format!("run-{}", run));
    parts.join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_key_defaults_run() {
        assert_eq!(
            canonical_key("01", Some("MR1"), "sub-01_ses-MR1"),
            "sub-01_ses-MR1_run-1"
        );
        assert_eq!(canonical_key("01", None, "sub-01"), "sub-01_run-1");
    }

    #[test]
    fn test_canonical_key_keeps_other_entities() {
        assert_eq!(
            canonical_key("01", Some("MR1"), "sub-01_ses-MR1_acq-mprage_run-02"),
            "sub-01_ses-MR1_acq-mprage_run-2"
        );
    }

    #[test]
    fn test_work_item_paths() {
        let root = Path::new("/data/bids");
        let item = WorkItem::new(
            root,
            "01",
            Some("MR1"),
            root.join("sub-01/ses-MR1/anat/sub-01_ses-MR1_T1w.nii.gz"),
        )
        .unwrap();
        assert_eq!(item.source_rel_path, "sub-01/ses-MR1/anat/sub-01_ses-MR1_T1w.nii.gz");
        assert_eq!(item.source_entities, "sub-01_ses-MR1");
        assert_eq!(item.key, "sub-01_ses-MR1_run-1");
        assert_eq!(item.label(), "sub-01/ses-MR1");
    }

    #[test]
    fn test_non_t1w_is_rejected() {
        let root = Path::new("/data/bids");
        assert!(WorkItem::new(root, "01", None, root.join("sub-01/anat/sub-01_T2w.nii.gz")).is_none());
        assert!(WorkItem::new(root, "01", None, root.join("sub-01/anat/_T1w.nii.gz")).is_none());
    }
}
