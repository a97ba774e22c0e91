pub mod completion;
pub mod course_builder;
pub mod course_map;
pub mod grading;
pub mod ledger;
pub mod sequencer;
pub mod types;

use crate::services::gateway::ContentGateway;
use crate::store::Store;

use completion::CompletionCalculator;
use ledger::ProgressLedger;
use sequencer::TopicSequencer;
use types::{AnswerSheet, AttemptReport, EngineError, UnitAccess};

/// 提交作答：门禁检查 -> 评分记账 -> 决定下一步 -> 重新计算课程进度
pub async fn submit_attempt(
    store: &Store,
    gateway: &ContentGateway,
    learner_id: &str,
    unit_id: &str,
    answers: &AnswerSheet,
) -> Result<AttemptReport, EngineError> {
    let sequencer = TopicSequencer::new(store, gateway);
    if let UnitAccess::Redirect { to_unit_id } = sequencer.access_unit(learner_id, unit_id)? {
        return Err(EngineError::Locked {
            unit_id: unit_id.to_string(),
            resume_unit_id: to_unit_id,
        });
    }

    let outcome = ProgressLedger::new(store).record_attempt(learner_id, unit_id, answers)?;
    let next_step = sequencer.next_after_attempt(learner_id, &outcome).await?;
    let course_percentage =
        CompletionCalculator::new(store).course_percentage(learner_id, &outcome.course_id)?;

    Ok(AttemptReport {
        next_unit_id: next_step.next_unit_id().map(str::to_string),
        outcome,
        next_step,
        course_percentage,
    })
}
