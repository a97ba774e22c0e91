use chrono::Utc;
use serde::Serialize;

use crate::constants::{MAX_CHAPTERS, MIN_CHAPTERS};
use crate::engine::types::EngineError;
use crate::services::gateway::{ContentGateway, GeneratedCourse};
use crate::services::prompts::GenerationRequest;
use crate::store::operations::courses::{Container, Course, CourseTree};
use crate::store::operations::units::{Difficulty, Unit};
use crate::store::{keys, Store, StoreError};

#[derive(Debug, Clone)]
pub struct CourseBrief {
    pub topic: String,
    pub level: Difficulty,
    pub chapter_count: u32,
}

impl CourseBrief {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.topic.trim().is_empty() {
            return Err(EngineError::Validation("topic must not be empty".to_string()));
        }
        if !(MIN_CHAPTERS..=MAX_CHAPTERS).contains(&self.chapter_count) {
            return Err(EngineError::Validation(format!(
                "chapterCount must be between {MIN_CHAPTERS} and {MAX_CHAPTERS}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuiltCourse {
    pub course_id: String,
    pub first_unit_id: Option<String>,
}

/// 由校验后的内容构建完整课程树；不写库
pub fn build_tree(
    course_id: String,
    owner_id: Option<String>,
    difficulty: Difficulty,
    content: GeneratedCourse,
) -> CourseTree {
    let course = Course {
        id: course_id,
        title: content.title.trim().to_string(),
        description: content.description.trim().to_string(),
        difficulty,
        owner_id,
        created_at: Utc::now(),
    };

    let mut containers = Vec::with_capacity(content.chapters.len());
    let mut units = Vec::new();
    for (position, chapter) in content.chapters.into_iter().enumerate() {
        let container = Container::new_main(
            &course.id,
            position,
            chapter.title.trim().to_string(),
            chapter.description.trim().to_string(),
        );
        for (index, topic) in chapter.topics.into_iter().enumerate() {
            units.push(Unit::new_original(
                &container,
                index as u32 + 1,
                difficulty,
                topic.into_draft(),
            ));
        }
        containers.push(container);
    }

    CourseTree {
        course,
        containers,
        units,
    }
}

pub struct CourseBuilder<'a> {
    store: &'a Store,
    gateway: &'a ContentGateway,
}

impl<'a> CourseBuilder<'a> {
    pub fn new(store: &'a Store, gateway: &'a ContentGateway) -> Self {
        Self { store, gateway }
    }

    /// `course_id` 为空时由服务端分配；指定的 id 已存在时返回 Conflict，不调用生成器
    pub async fn generate(
        &self,
        course_id: Option<&str>,
        owner_id: Option<&str>,
        brief: &CourseBrief,
    ) -> Result<BuiltCourse, EngineError> {
        brief.validate()?;
        let course_id = match course_id {
            Some(id) => {
                keys::course_key(id)?;
                if self.store.get_course(id)?.is_some() {
                    return Err(EngineError::Conflict(format!("course {id} already exists")));
                }
                id.to_string()
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        let request = GenerationRequest::Course {
            topic: brief.topic.trim().to_string(),
            level: brief.level,
            chapter_count: brief.chapter_count,
        };
        let content = self.gateway.generate_course(&request).await?;
        self.persist(course_id, owner_id, brief.level, content)
    }

    /// 导入人工编写的课程内容，校验规则与生成内容相同
    pub fn import(
        &self,
        owner_id: Option<&str>,
        difficulty: Difficulty,
        content: GeneratedCourse,
    ) -> Result<BuiltCourse, EngineError> {
        content.validate().map_err(EngineError::Validation)?;
        self.persist(uuid::Uuid::new_v4().to_string(), owner_id, difficulty, content)
    }

    fn persist(
        &self,
        course_id: String,
        owner_id: Option<&str>,
        difficulty: Difficulty,
        content: GeneratedCourse,
    ) -> Result<BuiltCourse, EngineError> {
        let tree = build_tree(course_id, owner_id.map(str::to_string), difficulty, content);
        match self.store.persist_course_tree(&tree) {
            Ok(()) => {}
            Err(StoreError::Conflict { entity, key }) if entity == "course" => {
                return Err(EngineError::Conflict(format!("course {key} already exists")));
            }
            Err(other) => return Err(other.into()),
        }

        Ok(BuiltCourse {
            course_id: tree.course.id.clone(),
            first_unit_id: tree.units.first().map(|unit| unit.id.clone()),
        })
    }
}
