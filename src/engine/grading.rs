use crate::constants::PASS_THRESHOLD;
use crate::engine::types::AnswerSheet;
use crate::store::operations::completions::WrongAnswer;
use crate::store::operations::units::Quiz;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graded {
    pub score: u8,
    pub passed: bool,
    pub wrong_answers: Vec<WrongAnswer>,
}

/// round(100 * part / total)，半数向上取整；total 为 0 时返回 0，结果不超过 100
pub fn percentage(part: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let part = part.min(total) as u64;
    let total = total as u64;
    ((200 * part + total) / (2 * total)).min(100) as u8
}

pub fn is_passing(score: u8) -> bool {
    score >= PASS_THRESHOLD
}

/// 按题目顺序评分。缺失或未知的答案计为错误；无测验或零题测验直接满分。
pub fn grade(quiz: Option<&Quiz>, answers: &AnswerSheet) -> Graded {
    let questions = match quiz {
        Some(quiz) if !quiz.questions.is_empty() => &quiz.questions,
        _ => {
            return Graded {
                score: 100,
                passed: true,
                wrong_answers: Vec::new(),
            }
        }
    };

    let mut correct = 0_usize;
    let mut wrong_answers = Vec::new();
    for question in questions {
        let selected = answers.get(&question.id).map(|key| key.trim());
        let Some(expected) = question.correct_option() else {
            tracing::warn!(question_id = %question.id, "Question has no correct option, counted as wrong");
            wrong_answers.push(WrongAnswer {
                question_id: question.id.clone(),
                question: question.text.clone(),
                user_answer: selected.map(str::to_string),
                correct_answer: String::new(),
                correct_answer_text: String::new(),
            });
            continue;
        };

        if selected == Some(expected.key.as_str()) {
            correct += 1;
        } else {
            wrong_answers.push(WrongAnswer {
                question_id: question.id.clone(),
                question: question.text.clone(),
                user_answer: selected.map(str::to_string),
                correct_answer: expected.key.clone(),
                correct_answer_text: expected.text.clone(),
            });
        }
    }

    let score = percentage(correct, questions.len());
    Graded {
        score,
        passed: is_passing(score),
        wrong_answers,
    }
}
