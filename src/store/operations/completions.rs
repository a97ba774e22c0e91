use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::store::operations::course_progress::tx_touch_course_progress;
use crate::store::{keys, Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WrongAnswer {
    pub question_id: String,
    pub question: String,
    pub user_answer: Option<String>,
    pub correct_answer: String,
    pub correct_answer_text: String,
}

/// (learner, unit) 的最新作答结果；每对至多一条
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub learner_id: String,
    pub unit_id: String,
    pub course_id: String,
    pub score: u8,
    pub passed: bool,
    pub attempts: u32,
    pub wrong_answers: Vec<WrongAnswer>,
    pub first_attempt_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptHistoryEntry {
    pub learner_id: String,
    pub unit_id: String,
    pub attempt: u32,
    pub score: u8,
    pub passed: bool,
    pub wrong_answer_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnitView {
    pub learner_id: String,
    pub unit_id: String,
    #[serde(default)]
    pub course_id: String,
    pub view_count: u32,
    pub first_viewed_at: DateTime<Utc>,
    pub last_viewed_at: DateTime<Utc>,
}

/// 一次已评分作答的写入参数
#[derive(Debug, Clone)]
pub struct AttemptWrite<'a> {
    pub learner_id: &'a str,
    pub unit_id: &'a str,
    pub course_id: &'a str,
    pub score: u8,
    pub passed: bool,
    pub wrong_answers: Vec<WrongAnswer>,
    pub at: DateTime<Utc>,
}

impl Store {
    pub fn get_completion(
        &self,
        learner_id: &str,
        unit_id: &str,
    ) -> Result<Option<CompletionRecord>, StoreError> {
        let key = keys::completion_key(learner_id, unit_id)?;
        match self.completions.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// 学习者在某课程下的全部完成记录，按 unit_id 索引
    pub fn completions_for_course(
        &self,
        learner_id: &str,
        course_id: &str,
    ) -> Result<HashMap<String, CompletionRecord>, StoreError> {
        let prefix = keys::learner_prefix(learner_id)?;
        let mut out = HashMap::new();
        for item in self.completions.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            let record: CompletionRecord = Self::deserialize(&value)?;
            if record.course_id == course_id {
                out.insert(record.unit_id.clone(), record);
            }
        }
        Ok(out)
    }

    /// 写入一次作答：完成记录 upsert、尝试次数 +1、追加历史、更新课程位置，全部在同一事务中。
    pub fn apply_attempt(&self, write: &AttemptWrite<'_>) -> Result<CompletionRecord, StoreError> {
        let completion_key = keys::completion_key(write.learner_id, write.unit_id)?;
        let progress_key = keys::course_progress_key(write.learner_id, write.course_id)?;

        let record = (&self.completions, &self.attempt_history, &self.course_progress)
            .transaction(|(tx_completions, tx_history, tx_progress)| {
                let previous: Option<CompletionRecord> =
                    match tx_completions.get(completion_key.as_bytes())? {
                        Some(raw) => Some(Store::tx_deserialize(&raw)?),
                        None => None,
                    };

                let record = CompletionRecord {
                    learner_id: write.learner_id.to_string(),
                    unit_id: write.unit_id.to_string(),
                    course_id: write.course_id.to_string(),
                    score: write.score,
                    passed: write.passed,
                    attempts: previous.as_ref().map(|p| p.attempts).unwrap_or(0) + 1,
                    wrong_answers: write.wrong_answers.clone(),
                    first_attempt_at: previous
                        .as_ref()
                        .map(|p| p.first_attempt_at)
                        .unwrap_or(write.at),
                    last_activity_at: write.at,
                };

                let history = AttemptHistoryEntry {
                    learner_id: record.learner_id.clone(),
                    unit_id: record.unit_id.clone(),
                    attempt: record.attempts,
                    score: record.score,
                    passed: record.passed,
                    wrong_answer_count: record.wrong_answers.len(),
                    created_at: write.at,
                };
                let history_key =
                    keys::attempt_history_key(write.learner_id, write.unit_id, record.attempts)
                        .map_err(sled::transaction::ConflictableTransactionError::Abort)?;

                tx_completions.insert(completion_key.as_bytes(), Store::tx_serialize(&record)?)?;
                tx_history.insert(history_key.as_bytes(), Store::tx_serialize(&history)?)?;
                tx_touch_course_progress(
                    tx_progress,
                    &progress_key,
                    write.learner_id,
                    write.course_id,
                    write.unit_id,
                    write.at,
                )?;

                Ok(record)
            })
            .map_err(StoreError::from)?;

        Ok(record)
    }

    pub fn list_attempt_history(
        &self,
        learner_id: &str,
        unit_id: &str,
    ) -> Result<Vec<AttemptHistoryEntry>, StoreError> {
        let prefix = keys::attempt_history_prefix(learner_id, unit_id)?;
        let mut entries = Vec::new();
        for item in self.attempt_history.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            entries.push(Self::deserialize(&value)?);
        }
        Ok(entries)
    }

    pub fn get_unit_view(
        &self,
        learner_id: &str,
        course_id: &str,
        unit_id: &str,
    ) -> Result<Option<UnitView>, StoreError> {
        let key = keys::unit_view_key(learner_id, course_id, unit_id)?;
        match self.unit_views.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// 记录一次浏览并更新课程位置
    pub fn record_unit_view(
        &self,
        learner_id: &str,
        unit_id: &str,
        course_id: &str,
        at: DateTime<Utc>,
    ) -> Result<UnitView, StoreError> {
        let view_key = keys::unit_view_key(learner_id, course_id, unit_id)?;
        let progress_key = keys::course_progress_key(learner_id, course_id)?;

        let view = (&self.unit_views, &self.course_progress)
            .transaction(|(tx_views, tx_progress)| {
                let view = match tx_views.get(view_key.as_bytes())? {
                    Some(raw) => {
                        let mut view: UnitView = Store::tx_deserialize(&raw)?;
                        view.view_count = view.view_count.saturating_add(1);
                        view.last_viewed_at = at;
                        view
                    }
                    None => UnitView {
                        learner_id: learner_id.to_string(),
                        unit_id: unit_id.to_string(),
                        course_id: course_id.to_string(),
                        view_count: 1,
                        first_viewed_at: at,
                        last_viewed_at: at,
                    },
                };
                tx_views.insert(view_key.as_bytes(), Store::tx_serialize(&view)?)?;
                tx_touch_course_progress(tx_progress, &progress_key, learner_id, course_id, unit_id, at)?;
                Ok(view)
            })
            .map_err(StoreError::from)?;

        Ok(view)
    }

    pub fn viewed_units(&self, learner_id: &str, course_id: &str) -> Result<Vec<String>, StoreError> {
        let prefix = keys::unit_view_prefix(learner_id, course_id)?;
        let mut out = Vec::new();
        for item in self.unit_views.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            let view: UnitView = Self::deserialize(&value)?;
            out.push(view.unit_id);
        }
        Ok(out)
    }
}
