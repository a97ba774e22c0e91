use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::store::operations::courses::{Container, ContainerKind};
use crate::store::{abort, keys};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    Simplified,
    Reinforcement,
}

impl VariantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simplified => "simplified",
            Self::Reinforcement => "reinforcement",
        }
    }
}

/// 单元来源。变体只能指向原始单元，不存在"简化的简化"。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UnitOrigin {
    Original,
    Variant { of: String, kind: VariantKind },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    pub key: String,
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<AnswerOption>,
}

impl Question {
    pub fn correct_option(&self) -> Option<&AnswerOption> {
        self.options.iter().find(|option| option.is_correct)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub questions: Vec<Question>,
}

/// 尚未挂载到章节的单元内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDraft {
    pub title: String,
    pub body: String,
    pub description: String,
    pub quiz: Option<Quiz>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: String,
    pub course_id: String,
    pub container_id: String,
    pub title: String,
    pub body: String,
    pub description: String,
    pub ordinal: u32,
    pub difficulty: Difficulty,
    pub origin: UnitOrigin,
    pub quiz: Option<Quiz>,
    pub created_at: DateTime<Utc>,
}

impl Unit {
    pub fn new_original(
        container: &Container,
        ordinal: u32,
        difficulty: Difficulty,
        draft: UnitDraft,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            course_id: container.course_id.clone(),
            container_id: container.id.clone(),
            title: draft.title,
            body: draft.body,
            description: draft.description,
            ordinal,
            difficulty,
            origin: UnitOrigin::Original,
            quiz: draft.quiz,
            created_at: Utc::now(),
        }
    }

    /// 以原始单元为基础构建变体；基础单元本身是变体时拒绝。
    /// 变体在宿主章节中沿用原始单元的序号，保证每个原始单元至多一个槽位。
    pub fn new_variant(
        original: &Unit,
        kind: VariantKind,
        host: &Container,
        draft: UnitDraft,
    ) -> Result<Self, StoreError> {
        if original.is_variant() {
            return Err(StoreError::Validation(format!(
                "unit {} is already a variant and cannot be derived from",
                original.id
            )));
        }
        if host.course_id != original.course_id {
            return Err(StoreError::Validation(
                "variant host container belongs to another course".to_string(),
            ));
        }

        let ordinal = match kind {
            VariantKind::Simplified => original.ordinal,
            VariantKind::Reinforcement => 0,
        };

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            course_id: original.course_id.clone(),
            container_id: host.id.clone(),
            title: draft.title,
            body: draft.body,
            description: draft.description,
            ordinal,
            difficulty: Difficulty::Beginner,
            origin: UnitOrigin::Variant {
                of: original.id.clone(),
                kind,
            },
            quiz: draft.quiz,
            created_at: Utc::now(),
        })
    }

    pub fn is_variant(&self) -> bool {
        matches!(self.origin, UnitOrigin::Variant { .. })
    }

    pub fn variant_of(&self) -> Option<(&str, VariantKind)> {
        match &self.origin {
            UnitOrigin::Original => None,
            UnitOrigin::Variant { of, kind } => Some((of.as_str(), *kind)),
        }
    }

    pub fn has_quiz(&self) -> bool {
        self.quiz
            .as_ref()
            .map(|quiz| !quiz.questions.is_empty())
            .unwrap_or(false)
    }
}

impl Store {
    pub fn get_unit(&self, unit_id: &str) -> Result<Option<Unit>, StoreError> {
        let key = keys::unit_key(unit_id)?;
        match self.units.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn require_unit(&self, unit_id: &str) -> Result<Unit, StoreError> {
        self.get_unit(unit_id)?
            .ok_or_else(|| StoreError::not_found("unit", unit_id))
    }

    pub fn require_visible_unit(&self, unit_id: &str, learner_id: &str) -> Result<Unit, StoreError> {
        let unit = self.require_unit(unit_id)?;
        if !self.require_course(&unit.course_id)?.visible_to(learner_id) {
            return Err(StoreError::not_found("unit", unit_id));
        }
        Ok(unit)
    }

    pub fn list_container_units(&self, container_id: &str) -> Result<Vec<Unit>, StoreError> {
        let prefix = keys::container_unit_prefix(container_id)?;
        let mut units = Vec::new();
        for item in self.container_units.scan_prefix(prefix.as_bytes()) {
            let (_, unit_id) = item?;
            let unit_id = String::from_utf8_lossy(&unit_id).to_string();
            match self.get_unit(&unit_id)? {
                Some(unit) => units.push(unit),
                None => {
                    tracing::warn!(container_id, unit_id = %unit_id, "Dangling container unit index entry");
                }
            }
        }
        Ok(units)
    }

    pub fn find_variant(
        &self,
        course_id: &str,
        derived_from: &str,
        kind: VariantKind,
    ) -> Result<Option<Unit>, StoreError> {
        let key = keys::variant_index_key(course_id, derived_from, kind.as_str())?;
        let Some(raw) = self.variant_index.get(key.as_bytes())? else {
            return Ok(None);
        };
        let unit_id = String::from_utf8_lossy(&raw).to_string();
        self.get_unit(&unit_id)
    }

    /// 所有基于 `original_id` 的简化变体（跨课程唯一约束下至多一个）
    pub fn find_simplified_variant(&self, original: &Unit) -> Result<Option<Unit>, StoreError> {
        self.find_variant(&original.course_id, &original.id, VariantKind::Simplified)
    }

    /// 原子地写入变体单元及其宿主章节。
    ///
    /// (course, derived-from, kind) 已存在时返回 `StoreError::Conflict`，调用方应重新读取
    /// 已存在的变体。宿主章节的序号槽已被同类章节占用时复用该章节。
    pub fn insert_variant_unit(&self, host: &Container, unit: &Unit) -> Result<Unit, StoreError> {
        let Some((derived_from, kind)) = unit.variant_of() else {
            return Err(StoreError::Validation(format!(
                "unit {} is not a variant",
                unit.id
            )));
        };

        let index_key = keys::variant_index_key(&unit.course_id, derived_from, kind.as_str())?;
        let original_key = keys::unit_key(derived_from)?;
        let slot_key = keys::course_container_slot_key(&host.course_id, host.ordinal)?;
        let host_key = keys::container_key(&host.id)?;
        let host_bytes = Self::serialize(host)?;

        let stored = (
            &self.units,
            &self.container_units,
            &self.containers,
            &self.course_containers,
            &self.variant_index,
        )
            .transaction(
                |(tx_units, tx_container_units, tx_containers, tx_slots, tx_variants)| {
                    if tx_variants.get(index_key.as_bytes())?.is_some() {
                        return abort(StoreError::conflict("variant", &index_key));
                    }

                    match tx_units.get(original_key.as_bytes())? {
                        Some(raw) => {
                            let original: Unit = Store::tx_deserialize(&raw)?;
                            if original.is_variant() {
                                return abort(StoreError::Validation(format!(
                                    "unit {} is already a variant and cannot be derived from",
                                    original.id
                                )));
                            }
                        }
                        None => return abort(StoreError::not_found("unit", derived_from)),
                    }

                    let mut unit = unit.clone();
                    match tx_slots.get(slot_key.as_bytes())? {
                        Some(existing_id) => {
                            let existing_id = String::from_utf8_lossy(&existing_id).to_string();
                            let existing_key = keys::container_key(&existing_id)
                                .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                            let Some(raw) = tx_containers.get(existing_key.as_bytes())? else {
                                return abort(StoreError::not_found("container", &existing_id));
                            };
                            let existing: Container = Store::tx_deserialize(&raw)?;
                            if existing.kind != host.kind {
                                return abort(StoreError::conflict("container_slot", &slot_key));
                            }
                            unit.container_id = existing.id;
                        }
                        None => {
                            tx_containers.insert(host_key.as_bytes(), host_bytes.as_slice())?;
                            tx_slots.insert(slot_key.as_bytes(), host.id.as_bytes())?;
                            unit.container_id = host.id.clone();
                        }
                    }

                    let unit_slot = keys::container_unit_slot_key(&unit.container_id, unit.ordinal)
                        .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                    if tx_container_units.get(unit_slot.as_bytes())?.is_some() {
                        return abort(StoreError::conflict("unit_slot", &unit_slot));
                    }

                    let unit_key = keys::unit_key(&unit.id)
                        .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                    let unit_bytes = Store::tx_serialize(&unit)?;
                    tx_units.insert(unit_key.as_bytes(), unit_bytes)?;
                    tx_container_units.insert(unit_slot.as_bytes(), unit.id.as_bytes())?;
                    tx_variants.insert(index_key.as_bytes(), unit.id.as_bytes())?;

                    Ok(unit)
                },
            )
            .map_err(StoreError::from)?;

        Ok(stored)
    }
}

pub fn is_remedial_for(container: &Container, original_container_id: &str) -> bool {
    matches!(&container.kind, ContainerKind::Remedial { of_container } if of_container == original_container_id)
}
