use std::collections::HashMap;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthLearner;
use crate::engine::completion::CompletionCalculator;
use crate::engine::course_builder::{CourseBrief, CourseBuilder};
use crate::engine::sequencer::TopicSequencer;
use crate::extractors::{JsonBody, PathIds};
use crate::response::{created, ok, AppError};
use crate::services::gateway::GeneratedCourse;
use crate::state::AppState;
use crate::store::operations::course_progress::CourseProgress;
use crate::store::operations::units::Difficulty;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_courses).post(import_course))
        .route("/generate", post(generate_course))
        .route("/:course_id/generate", post(generate_course_with_id))
        .route("/:course_id/outline", get(course_outline))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateCourseRequest {
    topic: String,
    #[serde(default)]
    level: Option<String>,
    chapter_count: u32,
}

impl GenerateCourseRequest {
    fn into_brief(self) -> Result<CourseBrief, AppError> {
        let level = match self.level.as_deref() {
            None => Difficulty::default(),
            Some(raw) => Difficulty::parse(raw).ok_or_else(|| {
                AppError::bad_request(
                    "VALIDATION_ERROR",
                    "level must be one of beginner, intermediate, advanced",
                )
            })?,
        };
        Ok(CourseBrief {
            topic: self.topic,
            level,
            chapter_count: self.chapter_count,
        })
    }
}

async fn generate_course(
    auth: AuthLearner,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<GenerateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let brief = req.into_brief()?;
    let built = CourseBuilder::new(state.store(), state.gateway())
        .generate(None, Some(&auth.learner_id), &brief)
        .await?;
    Ok(created(built))
}

async fn generate_course_with_id(
    auth: AuthLearner,
    State(state): State<AppState>,
    PathIds(course_id): PathIds<String>,
    JsonBody(req): JsonBody<GenerateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let brief = req.into_brief()?;
    let built = CourseBuilder::new(state.store(), state.gateway())
        .generate(Some(&course_id), Some(&auth.learner_id), &brief)
        .await?;
    Ok(created(built))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportCourseRequest {
    #[serde(default)]
    difficulty: Difficulty,
    course: GeneratedCourse,
}

async fn import_course(
    auth: AuthLearner,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ImportCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let built = CourseBuilder::new(state.store(), state.gateway()).import(
        Some(&auth.learner_id),
        req.difficulty,
        req.course,
    )?;
    Ok(created(built))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CourseSummary {
    id: String,
    title: String,
    description: String,
    difficulty: Difficulty,
    percentage: u8,
    last_accessed_unit_id: Option<String>,
    last_accessed_at: Option<DateTime<Utc>>,
}

/// 公共课程（无 owner）加上自己生成或导入的课程；最近学习过的排在前面
async fn list_courses(
    auth: AuthLearner,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let calculator = CompletionCalculator::new(state.store());
    let recent: HashMap<String, CourseProgress> = state
        .store()
        .list_learner_course_progress(&auth.learner_id)?
        .into_iter()
        .map(|pointer| (pointer.course_id.clone(), pointer))
        .collect();

    let mut summaries = Vec::new();
    for course in state.store().list_courses()? {
        if !course.visible_to(&auth.learner_id) {
            continue;
        }
        let pointer = recent.get(&course.id);
        summaries.push(CourseSummary {
            percentage: calculator.course_percentage(&auth.learner_id, &course.id)?,
            last_accessed_unit_id: pointer.map(|p| p.last_unit_id.clone()),
            last_accessed_at: pointer.map(|p| p.last_accessed_at),
            id: course.id,
            title: course.title,
            description: course.description,
            difficulty: course.difficulty,
        });
    }
    // None 排在 Some 之后；list_courses 已按创建时间排序，sort_by 是稳定排序
    summaries.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
    Ok(ok(summaries))
}

async fn course_outline(
    auth: AuthLearner,
    State(state): State<AppState>,
    PathIds(course_id): PathIds<String>,
) -> Result<impl IntoResponse, AppError> {
    state.store().require_visible_course(&course_id, &auth.learner_id)?;
    let outline =
        TopicSequencer::new(state.store(), state.gateway()).outline(&auth.learner_id, &course_id)?;
    Ok(ok(outline))
}
