use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::constants::{CONTAINER_ORDINAL_STRIDE, REINFORCEMENT_TITLE_PREFIX, REMEDIAL_TITLE_PREFIX};
use crate::store::operations::units::{Difficulty, Unit};
use crate::store::{abort, keys};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContainerKind {
    Main,
    #[serde(rename_all = "camelCase")]
    Remedial { of_container: String },
    Reinforcement,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub description: String,
    pub ordinal: u32,
    pub kind: ContainerKind,
    pub created_at: DateTime<Utc>,
}

impl Container {
    /// 主线章节，`position` 从 0 开始
    pub fn new_main(course_id: &str, position: usize, title: String, description: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            course_id: course_id.to_string(),
            title,
            description,
            ordinal: (position as u32 + 1) * CONTAINER_ORDINAL_STRIDE,
            kind: ContainerKind::Main,
            created_at: Utc::now(),
        }
    }

    /// 紧跟在原章节之后的补救章节
    pub fn remedial_for(original: &Container) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            course_id: original.course_id.clone(),
            title: format!("{REMEDIAL_TITLE_PREFIX}: {}", original.title),
            description: format!("Simplified explanations for {}", original.title),
            ordinal: original.ordinal + 1,
            kind: ContainerKind::Remedial {
                of_container: original.id.clone(),
            },
            created_at: Utc::now(),
        }
    }

    /// 课程末尾的强化章节
    pub fn reinforcement_for(course: &Course, existing: &[Container]) -> Self {
        let last = existing.iter().map(|c| c.ordinal).max().unwrap_or(0);
        let ordinal = (last / CONTAINER_ORDINAL_STRIDE + 1) * CONTAINER_ORDINAL_STRIDE;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            course_id: course.id.clone(),
            title: format!("{REINFORCEMENT_TITLE_PREFIX}: {}", course.title),
            description: "Review of the areas that needed more practice".to_string(),
            ordinal,
            kind: ContainerKind::Reinforcement,
            created_at: Utc::now(),
        }
    }

    pub fn is_main(&self) -> bool {
        matches!(self.kind, ContainerKind::Main)
    }
}

impl Course {
    /// 无 owner 的课程公开；其余只对 owner 可见
    pub fn visible_to(&self, learner_id: &str) -> bool {
        self.owner_id.as_deref().map_or(true, |owner| owner == learner_id)
    }
}

/// 一次性写入的完整课程
#[derive(Debug, Clone)]
pub struct CourseTree {
    pub course: Course,
    pub containers: Vec<Container>,
    pub units: Vec<Unit>,
}

impl CourseTree {
    fn check_consistency(&self) -> Result<(), StoreError> {
        let mut container_ids = HashSet::new();
        let mut container_ordinals = HashSet::new();
        for container in &self.containers {
            if container.course_id != self.course.id {
                return Err(StoreError::Validation(format!(
                    "container {} does not belong to course {}",
                    container.id, self.course.id
                )));
            }
            if !container_ordinals.insert(container.ordinal) {
                return Err(StoreError::Validation(format!(
                    "duplicate container ordinal {}",
                    container.ordinal
                )));
            }
            container_ids.insert(container.id.as_str());
        }

        let mut unit_slots = HashSet::new();
        for unit in &self.units {
            if unit.course_id != self.course.id || !container_ids.contains(unit.container_id.as_str()) {
                return Err(StoreError::Validation(format!(
                    "unit {} is not attached to this course tree",
                    unit.id
                )));
            }
            if !unit_slots.insert((unit.container_id.as_str(), unit.ordinal)) {
                return Err(StoreError::Validation(format!(
                    "duplicate unit ordinal {} in container {}",
                    unit.ordinal, unit.container_id
                )));
            }
        }
        Ok(())
    }
}

impl Store {
    pub fn get_course(&self, course_id: &str) -> Result<Option<Course>, StoreError> {
        let key = keys::course_key(course_id)?;
        match self.courses.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn require_course(&self, course_id: &str) -> Result<Course, StoreError> {
        self.get_course(course_id)?
            .ok_or_else(|| StoreError::not_found("course", course_id))
    }

    /// 对该学习者不可见的课程按不存在处理
    pub fn require_visible_course(&self, course_id: &str, learner_id: &str) -> Result<Course, StoreError> {
        let course = self.require_course(course_id)?;
        if !course.visible_to(learner_id) {
            return Err(StoreError::not_found("course", course_id));
        }
        Ok(course)
    }

    pub fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        let mut courses = Vec::new();
        for item in self.courses.iter() {
            let (_, value) = item?;
            courses.push(Self::deserialize::<Course>(&value)?);
        }
        courses.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(courses)
    }

    pub fn get_container(&self, container_id: &str) -> Result<Option<Container>, StoreError> {
        let key = keys::container_key(container_id)?;
        match self.containers.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn require_container(&self, container_id: &str) -> Result<Container, StoreError> {
        self.get_container(container_id)?
            .ok_or_else(|| StoreError::not_found("container", container_id))
    }

    /// 按序号升序返回课程下的全部章节
    pub fn list_course_containers(&self, course_id: &str) -> Result<Vec<Container>, StoreError> {
        let prefix = keys::course_container_prefix(course_id)?;
        let mut containers = Vec::new();
        for item in self.course_containers.scan_prefix(prefix.as_bytes()) {
            let (_, container_id) = item?;
            let container_id = String::from_utf8_lossy(&container_id).to_string();
            match self.get_container(&container_id)? {
                Some(container) => containers.push(container),
                None => {
                    tracing::warn!(course_id, container_id = %container_id, "Dangling course container index entry");
                }
            }
        }
        Ok(containers)
    }

    /// 按 (章节序号, 单元序号) 返回课程下全部单元
    pub fn list_course_units(&self, course_id: &str) -> Result<Vec<(Container, Vec<Unit>)>, StoreError> {
        let mut out = Vec::new();
        for container in self.list_course_containers(course_id)? {
            let units = self.list_container_units(&container.id)?;
            out.push((container, units));
        }
        Ok(out)
    }

    /// 课程、章节、单元在同一事务中写入；任何一项冲突则全部不写。
    pub fn persist_course_tree(&self, tree: &CourseTree) -> Result<(), StoreError> {
        tree.check_consistency()?;

        let course_key = keys::course_key(&tree.course.id)?;
        let course_bytes = Self::serialize(&tree.course)?;

        let mut container_rows = Vec::with_capacity(tree.containers.len());
        for container in &tree.containers {
            container_rows.push((
                keys::container_key(&container.id)?,
                keys::course_container_slot_key(&container.course_id, container.ordinal)?,
                container.id.clone(),
                Self::serialize(container)?,
            ));
        }

        let mut unit_rows = Vec::with_capacity(tree.units.len());
        for unit in &tree.units {
            unit_rows.push((
                keys::unit_key(&unit.id)?,
                keys::container_unit_slot_key(&unit.container_id, unit.ordinal)?,
                unit.id.clone(),
                Self::serialize(unit)?,
            ));
        }

        (
            &self.courses,
            &self.containers,
            &self.course_containers,
            &self.units,
            &self.container_units,
        )
            .transaction(
                |(tx_courses, tx_containers, tx_slots, tx_units, tx_unit_slots)| {
                    if tx_courses.get(course_key.as_bytes())?.is_some() {
                        return abort(StoreError::conflict("course", &course_key));
                    }
                    tx_courses.insert(course_key.as_bytes(), course_bytes.as_slice())?;

                    for (key, slot, id, bytes) in &container_rows {
                        if tx_slots.get(slot.as_bytes())?.is_some() {
                            return abort(StoreError::conflict("container_slot", slot));
                        }
                        tx_containers.insert(key.as_bytes(), bytes.as_slice())?;
                        tx_slots.insert(slot.as_bytes(), id.as_bytes())?;
                    }

                    for (key, slot, id, bytes) in &unit_rows {
                        if tx_unit_slots.get(slot.as_bytes())?.is_some() {
                            return abort(StoreError::conflict("unit_slot", slot));
                        }
                        tx_units.insert(key.as_bytes(), bytes.as_slice())?;
                        tx_unit_slots.insert(slot.as_bytes(), id.as_bytes())?;
                    }
                    Ok(())
                },
            )
            .map_err(StoreError::from)?;

        tracing::info!(
            course_id = %tree.course.id,
            containers = tree.containers.len(),
            units = tree.units.len(),
            "Course persisted"
        );
        Ok(())
    }
}
