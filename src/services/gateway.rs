use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::GeneratorConfig;
use crate::constants::{
    MAX_ANSWER_OPTIONS, MAX_CHAPTERS, MAX_QUIZ_QUESTIONS, MAX_RETRY_BACKOFF_MS, MIN_ANSWER_OPTIONS,
    MIN_CHAPTERS, MIN_QUIZ_QUESTIONS,
};
use crate::services::generator::{
    ContentGenerator, DisabledGenerator, GenerationError, HttpContentGenerator, MockContentGenerator,
};
use crate::services::prompts::GenerationRequest;
use crate::store::operations::units::{AnswerOption, Question, Quiz, UnitDraft};

// ---------------------------------------------------------------------------
// 生成内容的结构（与提示中的 JSON 结构一致）
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedAnswer {
    pub answer_text: String,
    pub option_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedQuestion {
    pub question_text: String,
    pub answers: Vec<GeneratedAnswer>,
    pub correct_answer_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GeneratedQuiz {
    #[serde(default)]
    pub questions: Vec<GeneratedQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedTopic {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quiz: Option<GeneratedQuiz>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedChapter {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub topics: Vec<GeneratedTopic>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedCourse {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub chapters: Vec<GeneratedChapter>,
}

fn require_text(value: &str, field: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    Ok(())
}

impl GeneratedQuestion {
    fn validate(&self, path: &str) -> Result<(), String> {
        require_text(&self.question_text, &format!("{path}.question_text"))?;
        if !(MIN_ANSWER_OPTIONS..=MAX_ANSWER_OPTIONS).contains(&self.answers.len()) {
            return Err(format!(
                "{path} must have {MIN_ANSWER_OPTIONS}-{MAX_ANSWER_OPTIONS} answers, got {}",
                self.answers.len()
            ));
        }
        let mut keys = HashSet::new();
        for (index, answer) in self.answers.iter().enumerate() {
            require_text(&answer.answer_text, &format!("{path}.answers[{index}].answer_text"))?;
            require_text(&answer.option_key, &format!("{path}.answers[{index}].option_key"))?;
            if !keys.insert(answer.option_key.trim()) {
                return Err(format!(
                    "{path} has duplicate option key {}",
                    answer.option_key
                ));
            }
        }
        if !keys.contains(self.correct_answer_key.trim()) {
            return Err(format!(
                "{path}.correct_answer_key {:?} matches no answer",
                self.correct_answer_key
            ));
        }
        Ok(())
    }
}

impl GeneratedTopic {
    pub fn validate(&self, path: &str) -> Result<(), String> {
        require_text(&self.title, &format!("{path}.title"))?;
        require_text(&self.content, &format!("{path}.content"))?;
        if let Some(quiz) = &self.quiz {
            if quiz.questions.is_empty() {
                return Ok(());
            }
            if !(MIN_QUIZ_QUESTIONS..=MAX_QUIZ_QUESTIONS).contains(&quiz.questions.len()) {
                return Err(format!(
                    "{path}.quiz must have {MIN_QUIZ_QUESTIONS}-{MAX_QUIZ_QUESTIONS} questions, got {}",
                    quiz.questions.len()
                ));
            }
            for (index, question) in quiz.questions.iter().enumerate() {
                question.validate(&format!("{path}.quiz.questions[{index}]"))?;
            }
        }
        Ok(())
    }

    /// 转换为单元内容；空测验视为无测验。调用前必须已通过 validate。
    pub fn into_draft(self) -> UnitDraft {
        let quiz = self
            .quiz
            .filter(|quiz| !quiz.questions.is_empty())
            .map(|quiz| Quiz {
                questions: quiz
                    .questions
                    .into_iter()
                    .map(|question| {
                        let correct = question.correct_answer_key.trim().to_string();
                        Question {
                            id: uuid::Uuid::new_v4().to_string(),
                            text: question.question_text.trim().to_string(),
                            options: question
                                .answers
                                .into_iter()
                                .map(|answer| {
                                    let key = answer.option_key.trim().to_string();
                                    AnswerOption {
                                        is_correct: key == correct,
                                        key,
                                        text: answer.answer_text.trim().to_string(),
                                    }
                                })
                                .collect(),
                        }
                    })
                    .collect(),
            });

        UnitDraft {
            title: self.title.trim().to_string(),
            body: self.content,
            description: self.description.trim().to_string(),
            quiz,
        }
    }
}

impl GeneratedCourse {
    pub fn validate(&self) -> Result<(), String> {
        require_text(&self.title, "title")?;
        let count = self.chapters.len() as u32;
        if !(MIN_CHAPTERS..=MAX_CHAPTERS).contains(&count) {
            return Err(format!(
                "chapters must have {MIN_CHAPTERS}-{MAX_CHAPTERS} entries, got {count}"
            ));
        }
        for (chapter_index, chapter) in self.chapters.iter().enumerate() {
            let path = format!("chapters[{chapter_index}]");
            require_text(&chapter.title, &format!("{path}.title"))?;
            if chapter.topics.is_empty() {
                return Err(format!("{path}.topics must not be empty"));
            }
            for (topic_index, topic) in chapter.topics.iter().enumerate() {
                topic.validate(&format!("{path}.topics[{topic_index}]"))?;
            }
        }
        Ok(())
    }
}

/// 截取文本中第一个 '{' 到最后一个 '}' 之间的内容（容忍 markdown 代码块包裹）
pub fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

pub fn parse_course(raw: &str) -> Result<GeneratedCourse, String> {
    let json = extract_json(raw).ok_or_else(|| "response contains no JSON object".to_string())?;
    let course: GeneratedCourse = serde_json::from_str(json).map_err(|error| error.to_string())?;
    course.validate()?;
    Ok(course)
}

pub fn parse_topic(raw: &str) -> Result<GeneratedTopic, String> {
    let json = extract_json(raw).ok_or_else(|| "response contains no JSON object".to_string())?;
    let topic: GeneratedTopic = serde_json::from_str(json).map_err(|error| error.to_string())?;
    topic.validate("topic")?;
    Ok(topic)
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

pub struct ContentGateway {
    generator: Arc<dyn ContentGenerator>,
    max_attempts: u32,
    timeout: Duration,
    backoff: Duration,
}

impl std::fmt::Debug for ContentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentGateway")
            .field("generator", &self.generator.name())
            .field("max_attempts", &self.max_attempts)
            .field("timeout", &self.timeout)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl ContentGateway {
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        max_attempts: u32,
        timeout: Duration,
        backoff: Duration,
    ) -> Self {
        Self {
            generator,
            max_attempts: max_attempts.max(1),
            timeout,
            backoff,
        }
    }

    pub fn with_generator(generator: Arc<dyn ContentGenerator>, config: &GeneratorConfig) -> Self {
        Self::new(
            generator,
            config.max_attempts,
            Duration::from_secs(config.timeout_secs),
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        let generator: Arc<dyn ContentGenerator> = if !config.enabled {
            Arc::new(DisabledGenerator)
        } else if config.mock {
            Arc::new(MockContentGenerator)
        } else {
            Arc::new(HttpContentGenerator::new(config))
        };
        tracing::info!(generator = generator.name(), "Content generator selected");
        Self::with_generator(generator, config)
    }

    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    pub async fn generate_course(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedCourse, GenerationError> {
        if !matches!(request, GenerationRequest::Course { .. }) {
            return Err(GenerationError::Invalid(format!(
                "{} request cannot produce a course",
                request.kind()
            )));
        }
        self.run(request, parse_course).await
    }

    pub async fn generate_topic(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedTopic, GenerationError> {
        if matches!(request, GenerationRequest::Course { .. }) {
            return Err(GenerationError::Invalid(
                "course request cannot produce a single topic".to_string(),
            ));
        }
        self.run(request, parse_topic).await
    }

    async fn run<T: Send>(
        &self,
        request: &GenerationRequest,
        parse: fn(&str) -> Result<T, String>,
    ) -> Result<T, GenerationError> {
        let mut rejection: Option<String> = None;
        let mut last_error: Option<GenerationError> = None;

        for attempt in 1..=self.max_attempts {
            let prompt = request.render_prompt(attempt, rejection.as_deref());
            let outcome =
                match tokio::time::timeout(self.timeout, self.generator.generate(request, &prompt))
                    .await
                {
                    Ok(Ok(raw)) => parse(&raw).map_err(GenerationError::Invalid),
                    Ok(Err(error)) => Err(error),
                    Err(_) => Err(GenerationError::Timeout {
                        secs: self.timeout.as_secs(),
                    }),
                };

            let error = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(kind = request.kind(), attempt, "Content generation recovered after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                return Err(error);
            }

            tracing::warn!(
                kind = request.kind(),
                generator = self.generator.name(),
                attempt,
                max_attempts = self.max_attempts,
                error = %error,
                "Content generation attempt failed"
            );
            if let GenerationError::Invalid(reason) = &error {
                rejection = Some(reason.clone());
            }
            last_error = Some(error);

            if attempt < self.max_attempts {
                tokio::time::sleep(self.backoff_for(attempt)).await;
            }
        }

        let last = last_error
            .unwrap_or_else(|| GenerationError::Upstream("no generation attempt was made".to_string()));
        tracing::error!(
            kind = request.kind(),
            generator = self.generator.name(),
            attempts = self.max_attempts,
            error = %last,
            "Content generation exhausted"
        );
        Err(GenerationError::Exhausted {
            attempts: self.max_attempts,
            last: Box::new(last),
        })
    }

    /// 指数退避加随机抖动，上限 MAX_RETRY_BACKOFF_MS
    fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.backoff.as_millis() as u64;
        if base == 0 {
            return Duration::ZERO;
        }
        let exp = base.saturating_mul(1_u64 << attempt.saturating_sub(1).min(16));
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        Duration::from_millis(exp.saturating_add(jitter).min(MAX_RETRY_BACKOFF_MS))
    }
}
