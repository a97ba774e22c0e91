use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionalTree};

use crate::store::{keys, Store, StoreError};

/// 学习者在课程中的当前位置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgress {
    pub learner_id: String,
    pub course_id: String,
    pub last_unit_id: String,
    pub started_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

pub(crate) fn tx_touch_course_progress(
    tree: &TransactionalTree,
    key: &str,
    learner_id: &str,
    course_id: &str,
    unit_id: &str,
    at: DateTime<Utc>,
) -> Result<(), ConflictableTransactionError<StoreError>> {
    let started_at = match tree.get(key.as_bytes())? {
        Some(raw) => Store::tx_deserialize::<CourseProgress>(&raw)?.started_at,
        None => at,
    };
    let progress = CourseProgress {
        learner_id: learner_id.to_string(),
        course_id: course_id.to_string(),
        last_unit_id: unit_id.to_string(),
        started_at,
        last_accessed_at: at,
    };
    tree.insert(key.as_bytes(), Store::tx_serialize(&progress)?)?;
    Ok(())
}

impl Store {
    pub fn get_course_progress(
        &self,
        learner_id: &str,
        course_id: &str,
    ) -> Result<Option<CourseProgress>, StoreError> {
        let key = keys::course_progress_key(learner_id, course_id)?;
        match self.course_progress.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn list_learner_course_progress(&self, learner_id: &str) -> Result<Vec<CourseProgress>, StoreError> {
        let prefix = keys::learner_prefix(learner_id)?;
        let mut out = Vec::new();
        for item in self.course_progress.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            out.push(Self::deserialize::<CourseProgress>(&value)?);
        }
        out.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn started_at_survives_later_activity() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let early = Utc::now() - chrono::Duration::hours(2);
        store.record_unit_view("l1", "u1", "c1", early).unwrap();
        store.record_unit_view("l1", "u2", "c1", Utc::now()).unwrap();

        let progress = store.get_course_progress("l1", "c1").unwrap().unwrap();
        assert_eq!(progress.started_at, early);
        assert_eq!(progress.last_unit_id, "u2");
        assert_eq!(store.list_learner_course_progress("l1").unwrap().len(), 1);
    }
}
