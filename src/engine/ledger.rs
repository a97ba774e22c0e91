use chrono::Utc;

use crate::engine::grading::grade;
use crate::engine::types::{AnswerSheet, AttemptOutcome, EngineError};
use crate::store::operations::completions::{AttemptHistoryEntry, AttemptWrite, UnitView};
use crate::store::Store;

/// 学习者作答记录的唯一入口
pub struct ProgressLedger<'a> {
    store: &'a Store,
}

impl<'a> ProgressLedger<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn record_attempt(
        &self,
        learner_id: &str,
        unit_id: &str,
        answers: &AnswerSheet,
    ) -> Result<AttemptOutcome, EngineError> {
        let unit = self
            .store
            .get_unit(unit_id)?
            .ok_or_else(|| EngineError::not_found("unit", unit_id))?;

        let graded = grade(unit.quiz.as_ref(), answers);
        let record = self.store.apply_attempt(&AttemptWrite {
            learner_id,
            unit_id: &unit.id,
            course_id: &unit.course_id,
            score: graded.score,
            passed: graded.passed,
            wrong_answers: graded.wrong_answers,
            at: Utc::now(),
        })?;

        tracing::info!(
            learner_id,
            unit_id = %unit.id,
            course_id = %unit.course_id,
            attempt = record.attempts,
            score = record.score,
            passed = record.passed,
            "Attempt recorded"
        );

        Ok(AttemptOutcome {
            unit_id: record.unit_id,
            course_id: record.course_id,
            score: record.score,
            passed: record.passed,
            wrong_answers: record.wrong_answers,
            attempts: record.attempts,
        })
    }

    pub fn is_unit_passed(&self, learner_id: &str, unit_id: &str) -> Result<bool, EngineError> {
        Ok(self
            .store
            .get_completion(learner_id, unit_id)?
            .map(|record| record.passed)
            .unwrap_or(false))
    }

    pub fn record_view(&self, learner_id: &str, unit_id: &str) -> Result<UnitView, EngineError> {
        let unit = self.store.require_unit(unit_id)?;
        let view = self
            .store
            .record_unit_view(learner_id, &unit.id, &unit.course_id, Utc::now())?;
        tracing::debug!(learner_id, unit_id, views = view.view_count, "Unit viewed");
        Ok(view)
    }

    /// 最新的尝试在前
    pub fn attempt_history(
        &self,
        learner_id: &str,
        unit_id: &str,
    ) -> Result<Vec<AttemptHistoryEntry>, EngineError> {
        self.store.require_unit(unit_id)?;
        let mut entries = self.store.list_attempt_history(learner_id, unit_id)?;
        entries.reverse();
        Ok(entries)
    }
}
