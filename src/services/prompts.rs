use crate::constants::{BASIC_SCORE_BAND, MAX_WRONG_ANSWERS_IN_PROMPT, VERY_BASIC_SCORE_BAND};
use crate::store::operations::completions::WrongAnswer;
use crate::store::operations::units::Difficulty;

/// 按分数段选择简化程度，只影响生成提示，不影响流程
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexityTier {
    VeryBasic,
    Basic,
    Simplified,
}

impl ComplexityTier {
    pub fn for_score(score: u8) -> Self {
        if score < VERY_BASIC_SCORE_BAND {
            Self::VeryBasic
        } else if score < BASIC_SCORE_BAND {
            Self::Basic
        } else {
            Self::Simplified
        }
    }

    pub fn descriptor(&self) -> &'static str {
        match self {
            Self::VeryBasic => "very basic",
            Self::Basic => "basic",
            Self::Simplified => "simplified",
        }
    }

    fn example_multiplier(&self) -> &'static str {
        match self {
            Self::VeryBasic => "2x",
            Self::Basic => "1.5x",
            Self::Simplified => "1.2x",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeakArea {
    pub unit_title: String,
    pub score: u8,
    pub wrong_answers: Vec<WrongAnswer>,
}

#[derive(Debug, Clone)]
pub enum GenerationRequest {
    Course {
        topic: String,
        level: Difficulty,
        chapter_count: u32,
    },
    Simplify {
        course_title: String,
        unit_title: String,
        unit_body: String,
        score: u8,
        tier: ComplexityTier,
        wrong_answers: Vec<WrongAnswer>,
    },
    Reinforce {
        course_title: String,
        weak_areas: Vec<WeakArea>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

const SYSTEM_PROMPT: &str = "You write structured course material for an online learning platform. \
Always answer with a single JSON object and nothing else.";

const TOPIC_SCHEMA: &str = r#"{
  "title": "...",
  "description": "...",
  "content": "...",
  "quiz": {
    "questions": [
      {
        "question_text": "...",
        "answers": [
          { "answer_text": "...", "option_key": "A" },
          { "answer_text": "...", "option_key": "B" },
          { "answer_text": "...", "option_key": "C" },
          { "answer_text": "...", "option_key": "D" }
        ],
        "correct_answer_key": "B"
      }
    ]
  }
}"#;

impl GenerationRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Course { .. } => "course",
            Self::Simplify { .. } => "simplify",
            Self::Reinforce { .. } => "reinforce",
        }
    }

    /// `attempt` 从 1 开始；重试时附带上一次被拒绝的原因并收紧格式要求。
    pub fn render_prompt(&self, attempt: u32, rejection: Option<&str>) -> RenderedPrompt {
        let mut user = match self {
            Self::Course {
                topic,
                level,
                chapter_count,
            } => format!(
                "Create a {level} level course on \"{topic}\".\n\
                 The course must have exactly {chapter_count} chapters. Each chapter has a title, \
                 a description and 3-5 topics. Each topic has detailed content with examples in \
                 markdown and a multiple-choice quiz of 3 questions with 4 options (A-D) and one \
                 correct answer.\n\n\
                 Respond with JSON in this structure:\n\
                 {{\n  \"title\": \"...\",\n  \"description\": \"...\",\n  \"chapters\": [\n    {{\n      \
                 \"title\": \"...\",\n      \"description\": \"...\",\n      \"topics\": [{TOPIC_SCHEMA}]\n    }}\n  ]\n}}",
                level = level.as_str(),
            ),
            Self::Simplify {
                course_title,
                unit_title,
                unit_body,
                score,
                tier,
                wrong_answers,
            } => format!(
                "Create a simpler version of the topic \"{unit_title}\" from the course \"{course_title}\" \
                 for a learner who scored {score}%.\n\n{analysis}\
                 Original content:\n{unit_body}\n\n\
                 The new version must be at a {descriptor} level, use plain language, focus on the \
                 concepts the learner struggled with and include {multiplier} more examples than the \
                 original. Include a simpler quiz of 3 questions on the core concepts.\n\n\
                 Respond with JSON in this structure:\n{TOPIC_SCHEMA}",
                analysis = wrong_answer_analysis(wrong_answers),
                descriptor = tier.descriptor(),
                multiplier = tier.example_multiplier(),
            ),
            Self::Reinforce {
                course_title,
                weak_areas,
            } => {
                let mut areas = String::new();
                for (index, area) in weak_areas.iter().enumerate() {
                    areas.push_str(&format!(
                        "{}. {} (score {}%)\n",
                        index + 1,
                        area.unit_title,
                        area.score
                    ));
                    for wrong in area.wrong_answers.iter().take(MAX_WRONG_ANSWERS_IN_PROMPT) {
                        areas.push_str(&format!("   - {}\n", wrong.question));
                    }
                }
                format!(
                    "Create a reinforcement topic for the course \"{course_title}\". The learner \
                     finished the course but needs more practice on:\n{areas}\n\
                     Review the key concepts of these areas, give additional examples and practice, \
                     and include a quiz of 3-5 questions.\n\n\
                     Respond with JSON in this structure:\n{TOPIC_SCHEMA}"
                )
            }
        };

        if attempt > 1 {
            user.push_str("\n\nYour previous response was rejected");
            if let Some(reason) = rejection {
                user.push_str(&format!(": {reason}"));
            }
            user.push_str(
                ".\nReturn ONLY the JSON object with every required field present. \
                 Every question needs 2-6 answers with distinct option keys and a \
                 correct_answer_key that matches one of them.",
            );
        }

        RenderedPrompt {
            system: SYSTEM_PROMPT.to_string(),
            user,
        }
    }
}

fn wrong_answer_analysis(wrong_answers: &[WrongAnswer]) -> String {
    if wrong_answers.is_empty() {
        return String::new();
    }
    let mut out = String::from("The learner specifically struggled with:\n");
    for (index, wrong) in wrong_answers
        .iter()
        .take(MAX_WRONG_ANSWERS_IN_PROMPT)
        .enumerate()
    {
        out.push_str(&format!(
            "{}. {}\n   Their answer: {}\n   Correct answer: {}\n",
            index + 1,
            wrong.question,
            wrong.user_answer.as_deref().unwrap_or("No answer"),
            wrong.correct_answer_text
        ));
    }
    out.push('\n');
    out
}
