use std::collections::HashMap;

use serde::Serialize;

use crate::services::generator::GenerationError;
use crate::store::operations::completions::WrongAnswer;
use crate::store::StoreError;

/// question id -> 选中的 option key
pub type AnswerSheet = HashMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("unit {unit_id} is locked")]
    Locked { unit_id: String, resume_unit_id: String },
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Store(StoreError),
}

impl EngineError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { entity, key } => Self::NotFound { entity, id: key },
            StoreError::Validation(message) => Self::Validation(message),
            other => Self::Store(other),
        }
    }
}

/// 一次作答评分后的结果
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptOutcome {
    pub unit_id: String,
    pub course_id: String,
    pub score: u8,
    pub passed: bool,
    pub wrong_answers: Vec<WrongAnswer>,
    pub attempts: u32,
}

/// 单元相对于某个学习者的状态
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UnitState {
    Locked,
    UnlockedIncomplete,
    Failed,
    Passed,
}

impl UnitState {
    pub fn is_unlocked(&self) -> bool {
        !matches!(self, Self::Locked)
    }

    /// 访问判定只关心门禁：失败过的单元对再次访问而言仍是"已解锁未完成"
    pub fn gate(&self) -> Self {
        match self {
            Self::Failed => Self::UnlockedIncomplete,
            other => *other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitAccess {
    Granted { unit_id: String, state: UnitState },
    Redirect { to_unit_id: String },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NextStep {
    /// 未通过：停留在当前单元
    #[serde(rename_all = "camelCase")]
    Retry { can_simplify: bool },
    #[serde(rename_all = "camelCase")]
    Advance { unit_id: String },
    #[serde(rename_all = "camelCase")]
    Reinforcement { unit_id: String },
    CourseComplete,
    /// 作答已记录，但巩固单元生成失败；可稍后重试
    #[serde(rename_all = "camelCase")]
    ReinforcementPending { reason: String },
}

impl NextStep {
    pub fn next_unit_id(&self) -> Option<&str> {
        match self {
            Self::Advance { unit_id } | Self::Reinforcement { unit_id } => Some(unit_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SimplifyResult {
    pub variant_unit_id: String,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnitOutline {
    pub unit_id: String,
    pub title: String,
    pub ordinal: u32,
    pub state: UnitState,
    pub has_quiz: bool,
    pub score: Option<u8>,
    pub attempts: u32,
    pub variant_of: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerOutline {
    pub container_id: String,
    pub title: String,
    pub ordinal: u32,
    pub kind: &'static str,
    pub percentage: u8,
    pub units: Vec<UnitOutline>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CourseOutline {
    pub course_id: String,
    pub title: String,
    pub percentage: u8,
    pub resume_unit_id: Option<String>,
    pub containers: Vec<ContainerOutline>,
}

/// 提交作答的完整响应
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptReport {
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
    pub next_step: NextStep,
    pub next_unit_id: Option<String>,
    pub course_percentage: u8,
}
