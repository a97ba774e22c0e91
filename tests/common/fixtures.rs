use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::Method;
use serde_json::{json, Value};

use learnpath_backend::engine::course_builder::{CourseBrief, CourseBuilder};
use learnpath_backend::services::generator::{ContentGenerator, GenerationError};
use learnpath_backend::services::prompts::{GenerationRequest, RenderedPrompt};
use learnpath_backend::store::operations::units::Difficulty;

use super::app::TestApp;
use super::http::{assert_status_ok_json, call};

/// 测验固定使用 a/b/c 三个选项，正确答案总是 "a"
pub const CORRECT_KEY: &str = "a";
pub const WRONG_KEY: &str = "b";

/// 确定性的内容生成器；`broken_course` 时课程响应缺少 chapters 字段
pub struct FixtureGenerator {
    pub topics_per_chapter: usize,
    pub questions_per_quiz: usize,
    pub delay: Duration,
    pub broken_course: bool,
    pub calls: AtomicUsize,
}

impl Default for FixtureGenerator {
    fn default() -> Self {
        Self {
            topics_per_chapter: 3,
            questions_per_quiz: 5,
            delay: Duration::ZERO,
            broken_course: false,
            calls: AtomicUsize::new(0),
        }
    }
}

impl FixtureGenerator {
    fn topic(&self, title: &str) -> Value {
        let questions: Vec<Value> = (0..self.questions_per_quiz)
            .map(|index| {
                json!({
                    "question_text": format!("{title}: question {index}"),
                    "answers": [
                        { "answer_text": "right", "option_key": CORRECT_KEY },
                        { "answer_text": "wrong", "option_key": WRONG_KEY },
                        { "answer_text": "also wrong", "option_key": "c" }
                    ],
                    "correct_answer_key": CORRECT_KEY
                })
            })
            .collect();
        json!({
            "title": title,
            "description": format!("{title} in brief"),
            "content": format!("Everything about {title}."),
            "quiz": { "questions": questions }
        })
    }
}

#[async_trait]
impl ContentGenerator for FixtureGenerator {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        _prompt: &RenderedPrompt,
    ) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let payload = match request {
            GenerationRequest::Course {
                topic,
                chapter_count,
                ..
            } => {
                if self.broken_course {
                    json!({ "title": topic, "description": "no chapters here" })
                } else {
                    let chapters: Vec<Value> = (1..=*chapter_count)
                        .map(|chapter| {
                            let topics: Vec<Value> = (1..=self.topics_per_chapter)
                                .map(|index| self.topic(&format!("{topic} {chapter}.{index}")))
                                .collect();
                            json!({
                                "title": format!("{topic} chapter {chapter}"),
                                "description": "",
                                "topics": topics
                            })
                        })
                        .collect();
                    json!({ "title": topic, "description": "fixture course", "chapters": chapters })
                }
            }
            GenerationRequest::Simplify { unit_title, .. } => {
                self.topic(&format!("Simplified {unit_title}"))
            }
            GenerationRequest::Reinforce { course_title, .. } => {
                self.topic(&format!("Review of {course_title}"))
            }
        };
        Ok(payload.to_string())
    }
}

/// 调用生成接口，返回课程 id
pub async fn generate_course(
    app: &TestApp,
    auth: &(&str, String),
    course_id: &str,
    chapter_count: u32,
) -> String {
    let (status, body) = call(
        &app.app,
        Method::POST,
        &format!("/api/courses/{course_id}/generate"),
        Some(json!({ "topic": "Ownership", "level": "beginner", "chapterCount": chapter_count })),
        auth,
    )
    .await;
    assert_status_ok_json(status, &body);
    body["data"]["courseId"].as_str().expect("courseId").to_string()
}

/// 不经过 HTTP 直接生成一门无 owner 的公共课程
pub async fn seed_public_course(app: &TestApp, course_id: &str, chapter_count: u32) -> String {
    let brief = CourseBrief {
        topic: "Borrowing".to_string(),
        level: Difficulty::Beginner,
        chapter_count,
    };
    CourseBuilder::new(app.state.store(), app.state.gateway())
        .generate(Some(course_id), None, &brief)
        .await
        .expect("seed public course")
        .course_id
}

pub async fn outline(app: &TestApp, auth: &(&str, String), course_id: &str) -> Value {
    let (status, body) = call(
        &app.app,
        Method::GET,
        &format!("/api/courses/{course_id}/outline"),
        None,
        auth,
    )
    .await;
    assert_status_ok_json(status, &body);
    body["data"].clone()
}

/// 主章节中的单元 id，按课程顺序
pub fn main_unit_ids(outline: &Value) -> Vec<String> {
    outline["containers"]
        .as_array()
        .expect("containers")
        .iter()
        .filter(|container| container["kind"] == "main")
        .flat_map(|container| container["units"].as_array().cloned().unwrap_or_default())
        .map(|unit| unit["unitId"].as_str().expect("unitId").to_string())
        .collect()
}

pub fn find_unit<'a>(outline: &'a Value, unit_id: &str) -> Option<&'a Value> {
    outline["containers"]
        .as_array()?
        .iter()
        .flat_map(|container| container["units"].as_array().into_iter().flatten())
        .find(|unit| unit["unitId"] == unit_id)
}

/// 读取单元（会记录一次浏览）并构造答对 `correct` 题的答卷
pub async fn answer_sheet(
    app: &TestApp,
    auth: &(&str, String),
    unit_id: &str,
    correct: usize,
) -> Value {
    let (status, body) = call(&app.app, Method::GET, &format!("/api/units/{unit_id}"), None, auth).await;
    assert_status_ok_json(status, &body);
    assert_eq!(body["data"]["access"], "granted", "unit {unit_id} not granted: {body}");

    let answers: serde_json::Map<String, Value> = body["data"]["unit"]["questions"]
        .as_array()
        .expect("questions")
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let key = if index < correct { CORRECT_KEY } else { WRONG_KEY };
            (
                question["id"].as_str().expect("question id").to_string(),
                Value::String(key.to_string()),
            )
        })
        .collect();
    json!({ "answers": answers })
}

pub async fn submit(
    app: &TestApp,
    auth: &(&str, String),
    unit_id: &str,
    correct: usize,
) -> Value {
    let sheet = answer_sheet(app, auth, unit_id, correct).await;
    let (status, body) = call(
        &app.app,
        Method::POST,
        &format!("/api/units/{unit_id}/attempts"),
        Some(sheet),
        auth,
    )
    .await;
    assert_status_ok_json(status, &body);
    body["data"].clone()
}
