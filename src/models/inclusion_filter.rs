//! 纳入筛选条件
//!
//! 三种形式互斥：全部参与者、参与者集合、(参与者, 会话) 集合。
//! 只能通过 [`InclusionFilter::resolve`] 一步校验构造。

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{AppError, AppResult, ConfigError};

/// 纳入筛选条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InclusionFilter {
    /// 数据集中的全部参与者
    AllParticipants,
    /// 指定参与者的全部会话
    ParticipantSet(BTreeSet<String>),
    /// 仅指定的 (参与者, 会话)
    SessionSet(BTreeSet<(String, String)>),
}

impl InclusionFilter {
    /// 从命令行的四种输入解析筛选条件
    ///
    /// 同一粒度的字面值与列表文件互斥，参与者粒度与会话粒度互斥，
    /// 都不提供时为 `AllParticipants`。
    pub fn resolve(
        participant: Option<&str>,
        participant_list: Option<&Path>,
        session: Option<&str>,
        session_list: Option<&Path>,
    ) -> AppResult<Self> {
        if participant.is_some() && participant_list.is_some() {
            return Err(ConfigError::ConflictingFilterForms {
                granularity: "participant",
            }
            .into());
        }
        if session.is_some() && session_list.is_some() {
            return Err(ConfigError::ConflictingFilterForms {
                granularity: "session",
            }
            .into());
        }
        let by_participant = participant.is_some() || participant_list.is_some();
        let by_session = session.is_some() || session_list.is_some();
        if by_participant && by_session {
            return Err(ConfigError::ConflictingGranularity.into());
        }

        if let Some(value) = participant {
            let id = normalize_participant(value);
            if id.is_empty() {
                return Err(ConfigError::EmptyFilterValue { flag: "participant" }.into());
            }
            return Ok(Self::ParticipantSet(BTreeSet::from([id])));
        }
        if let Some(path) = participant_list {
            return Ok(Self::ParticipantSet(parse_participant_lines(&read_list(path)?)));
        }
        if let Some(value) = session {
            let pair = parse_session_pair(value, "--session")?;
            return Ok(Self::SessionSet(BTreeSet::from([pair])));
        }
        if let Some(path) = session_list {
            let origin = path.display().to_string();
            return Ok(Self::SessionSet(parse_session_lines(&read_list(path)?, &origin)?));
        }
        Ok(Self::AllParticipants)
    }

    /// 参与者是否可能被纳入（至少有一个会话被纳入）
    pub fn admits_participant(&self, participant: &str) -> bool {
        match self {
            Self::AllParticipants => true,
            Self::ParticipantSet(ids) => ids.contains(participant),
            Self::SessionSet(pairs) => pairs.iter().any(|(p, _)| p == participant),
        }
    }

    /// 具体的 (参与者, 会话) 是否被纳入
    ///
    /// 会话级条件比参与者级更具体：`SessionSet` 只放行列出的会话，
    /// 无会话目录的参与者不会被 `SessionSet` 纳入。
    pub fn admits(&self, participant: &str, session: Option<&str>) -> bool {
        match self {
            Self::AllParticipants => true,
            Self::ParticipantSet(ids) => ids.contains(participant),
            Self::SessionSet(pairs) => match session {
                Some(session) => pairs.contains(&(participant.to_string(), session.to_string())),
                None => false,
            },
        }
    }

    /// 显式列出的参与者（用于报告数据集中不存在的参与者）
    pub fn explicit_participants(&self) -> Vec<String> {
        match self {
            Self::AllParticipants => Vec::new(),
            Self::ParticipantSet(ids) => ids.iter().cloned().collect(),
            Self::SessionSet(pairs) => pairs
                .iter()
                .map(|(p, _)| p.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        }
    }

    /// 某参与者显式列出的会话
    pub fn explicit_sessions(&self, participant: &str) -> Vec<String> {
        match self {
            Self::SessionSet(pairs) => pairs
                .iter()
                .filter(|(p, _)| p == participant)
                .map(|(_, s)| s.clone())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::AllParticipants => "全部参与者".to_string(),
            Self::ParticipantSet(ids) => format!("{} 个参与者", ids.len()),
            Self::SessionSet(pairs) => format!("{} 个会话", pairs.len()),
        }
    }
}

/// 解析参与者列表：每行一个，忽略空行和首尾空白，去重
pub fn parse_participant_lines(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .map(normalize_participant)
        .filter(|id| !id.is_empty())
        .collect()
}

/// 解析会话列表：每行 `participant,session`
pub fn parse_session_lines(content: &str, origin: &str) -> AppResult<BTreeSet<(String, String)>> {
    let mut pairs = BTreeSet::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let pair = parse_session_pair(line, &format!("{} 第 {} 行", origin, line_no + 1))?;
        pairs.insert(pair);
    }
    Ok(pairs)
}

fn parse_session_pair(value: &str, origin: &str) -> AppResult<(String, String)> {
    let malformed = || -> AppError {
        ConfigError::MalformedSessionEntry {
            origin: origin.to_string(),
            entry: value.trim().to_string(),
        }
        .into()
    };

    let fields: Vec<&str> = value.split(',').collect();
    if fields.len() != 2 {
        return Err(malformed());
    }
    let participant = normalize_participant(fields[0]);
    let session = normalize_session(fields[1]);
    if participant.is_empty() || session.is_empty() {
        return Err(malformed());
    }
    Ok((participant, session))
}

fn normalize_participant(value: &str) -> String {
    let value = value.trim();
    value.strip_prefix("sub-").unwrap_or(value).to_string()
}

fn normalize_session(value: &str) -> String {
    let value = value.trim();
    value.strip_prefix("ses-").unwrap_or(value).to_string()
}

fn read_list(path: &Path) -> AppResult<String> {
    if !path.is_file() {
        return Err(AppError::missing_path(path));
    }
    std::fs::read_to_string(path).map_err(|e| AppError::read_failed(path, e))
}
