use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GeneratorConfig;
use crate::services::prompts::{GenerationRequest, RenderedPrompt};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("content generation is disabled")]
    Disabled,
    #[error("content generation timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("content generator error: {0}")]
    Upstream(String),
    #[error("generated content is invalid: {0}")]
    Invalid(String),
    #[error("content generation failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<GenerationError>,
    },
}

impl GenerationError {
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Exhausted { last, .. } => last.is_timeout(),
            _ => false,
        }
    }

    pub(crate) fn is_retryable(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// 外部内容生成协作者：接收提示，返回原始文本（期望为 JSON）。
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(
        &self,
        request: &GenerationRequest,
        prompt: &RenderedPrompt,
    ) -> Result<String, GenerationError>;
}

pub struct DisabledGenerator;

#[async_trait]
impl ContentGenerator for DisabledGenerator {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn generate(
        &self,
        _request: &GenerationRequest,
        _prompt: &RenderedPrompt,
    ) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI 兼容的 chat completions 接口，使用 JSON 响应模式
#[derive(Debug, Clone)]
pub struct HttpContentGenerator {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl HttpContentGenerator {
    pub fn new(config: &GeneratorConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        }
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn generate(
        &self,
        _request: &GenerationRequest,
        prompt: &RenderedPrompt,
    ) -> Result<String, GenerationError> {
        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: prompt.system.clone(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: prompt.user.clone(),
            },
        ];
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "response_format": { "type": "json_object" },
            "temperature": 0.7,
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    GenerationError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    GenerationError::Upstream(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream(format!(
                "status={}, body={}",
                status.as_u16(),
                text.chars().take(512).collect::<String>()
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|error| GenerationError::Upstream(format!("unreadable response: {error}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| GenerationError::Upstream("empty completion".to_string()))
    }
}

/// 开发与测试用的确定性生成器，总是返回结构合法的内容
pub struct MockContentGenerator;

impl MockContentGenerator {
    fn topic(title: &str, body: &str) -> serde_json::Value {
        serde_json::json!({
            "title": title,
            "description": format!("About {title}"),
            "content": body,
            "quiz": {
                "questions": [
                    {
                        "question_text": format!("Which statement about {title} is true?"),
                        "answers": [
                            { "answer_text": "The correct statement", "option_key": "A" },
                            { "answer_text": "A common misconception", "option_key": "B" },
                            { "answer_text": "An unrelated fact", "option_key": "C" }
                        ],
                        "correct_answer_key": "A"
                    },
                    {
                        "question_text": format!("What is the main idea of {title}?"),
                        "answers": [
                            { "answer_text": "Something else", "option_key": "A" },
                            { "answer_text": "The main idea", "option_key": "B" }
                        ],
                        "correct_answer_key": "B"
                    }
                ]
            }
        })
    }
}

#[async_trait]
impl ContentGenerator for MockContentGenerator {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        _prompt: &RenderedPrompt,
    ) -> Result<String, GenerationError> {
        let value = match request {
            GenerationRequest::Course {
                topic,
                chapter_count,
                ..
            } => {
                let chapters: Vec<serde_json::Value> = (1..=*chapter_count)
                    .map(|chapter| {
                        serde_json::json!({
                            "title": format!("{topic}: Chapter {chapter}"),
                            "description": format!("Chapter {chapter} of {topic}"),
                            "topics": [
                                Self::topic(&format!("{topic} {chapter}.1"), "Introductory material."),
                                Self::topic(&format!("{topic} {chapter}.2"), "Follow-up material."),
                            ]
                        })
                    })
                    .collect();
                serde_json::json!({
                    "title": topic,
                    "description": format!("A generated course on {topic}"),
                    "chapters": chapters,
                })
            }
            GenerationRequest::Simplify { unit_title, .. } => Self::topic(
                &format!("Simplified: {unit_title}"),
                "The same ideas, explained step by step with more examples.",
            ),
            GenerationRequest::Reinforce { course_title, .. } => Self::topic(
                &format!("Reinforcement: {course_title}"),
                "A review of the areas that needed more practice.",
            ),
        };
        Ok(value.to_string())
    }
}

/// 启动时校验生成器配置
pub fn validate_config(config: &GeneratorConfig) -> Result<(), String> {
    if config.enabled && !config.mock && config.api_url.trim().is_empty() {
        return Err(
            "GENERATOR_ENABLED=true and GENERATOR_MOCK=false require GENERATOR_API_URL".to_string(),
        );
    }
    Ok(())
}
