use crate::store::StoreError;

const SEPARATOR: char = ':';

fn segment(value: &str) -> Result<&str, StoreError> {
    if value.is_empty() {
        return Err(StoreError::Validation("key segment must not be empty".to_string()));
    }
    if value.contains(SEPARATOR) {
        return Err(StoreError::Validation(format!(
            "key segment must not contain '{SEPARATOR}': {value}"
        )));
    }
    Ok(value)
}

/// 外部传入的 id 在拼键前先校验
pub fn validate_key_segment(value: &str) -> Result<(), StoreError> {
    segment(value).map(|_| ())
}

pub fn course_key(course_id: &str) -> Result<String, StoreError> {
    Ok(segment(course_id)?.to_string())
}

pub fn container_key(container_id: &str) -> Result<String, StoreError> {
    Ok(segment(container_id)?.to_string())
}

/// 按序号排序的课程章节索引；同一课程内序号唯一
pub fn course_container_slot_key(course_id: &str, ordinal: u32) -> Result<String, StoreError> {
    Ok(format!("{}:{:010}", segment(course_id)?, ordinal))
}

pub fn course_container_prefix(course_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", segment(course_id)?))
}

pub fn unit_key(unit_id: &str) -> Result<String, StoreError> {
    Ok(segment(unit_id)?.to_string())
}

pub fn container_unit_slot_key(container_id: &str, ordinal: u32) -> Result<String, StoreError> {
    Ok(format!("{}:{:010}", segment(container_id)?, ordinal))
}

pub fn container_unit_prefix(container_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", segment(container_id)?))
}

/// (course, derived-from, kind) 唯一约束
pub fn variant_index_key(
    course_id: &str,
    derived_from: &str,
    kind: &str,
) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:{}",
        segment(course_id)?,
        segment(derived_from)?,
        segment(kind)?
    ))
}

pub fn completion_key(learner_id: &str, unit_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:{}", segment(learner_id)?, segment(unit_id)?))
}

/// completions / course_progress 中某学习者的全部记录
pub fn learner_prefix(learner_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", segment(learner_id)?))
}

pub fn attempt_history_key(
    learner_id: &str,
    unit_id: &str,
    attempt: u32,
) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:{:010}",
        segment(learner_id)?,
        segment(unit_id)?,
        attempt
    ))
}

pub fn attempt_history_prefix(learner_id: &str, unit_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:{}:", segment(learner_id)?, segment(unit_id)?))
}

/// 浏览记录按 (learner, course) 分组，课程进度只扫描本课程
pub fn unit_view_key(learner_id: &str, course_id: &str, unit_id: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:{}",
        segment(learner_id)?,
        segment(course_id)?,
        segment(unit_id)?
    ))
}

pub fn unit_view_prefix(learner_id: &str, course_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:{}:", segment(learner_id)?, segment(course_id)?))
}

pub fn course_progress_key(learner_id: &str, course_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:{}", segment(learner_id)?, segment(course_id)?))
}
