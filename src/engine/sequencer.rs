use crate::constants::WEAK_SCORE_THRESHOLD;
use crate::engine::course_map::{CourseMap, LearnerProgress, Progression};
use crate::engine::types::{
    AttemptOutcome, ContainerOutline, CourseOutline, EngineError, NextStep, SimplifyResult,
    UnitAccess, UnitOutline, UnitState,
};
use crate::services::gateway::ContentGateway;
use crate::services::prompts::{ComplexityTier, GenerationRequest, WeakArea};
use crate::store::operations::courses::{Container, ContainerKind};
use crate::store::operations::units::{is_remedial_for, Unit, VariantKind};
use crate::store::{Store, StoreError};

/// 决定学习者下一步看到什么。每次请求构造，不持有状态。
pub struct TopicSequencer<'a> {
    store: &'a Store,
    gateway: &'a ContentGateway,
}

impl<'a> TopicSequencer<'a> {
    pub fn new(store: &'a Store, gateway: &'a ContentGateway) -> Self {
        Self { store, gateway }
    }

    fn load(&self, learner_id: &str, unit_id: &str) -> Result<(Unit, CourseMap, LearnerProgress), EngineError> {
        let unit = self
            .store
            .get_unit(unit_id)?
            .ok_or_else(|| EngineError::not_found("unit", unit_id))?;
        let map = CourseMap::load(self.store, &unit.course_id)?;
        let progress = LearnerProgress::load(self.store, learner_id, &unit.course_id)?;
        Ok((unit, map, progress))
    }

    pub fn unit_state(&self, learner_id: &str, unit_id: &str) -> Result<UnitState, EngineError> {
        let (unit, map, progress) = self.load(learner_id, unit_id)?;
        Ok(Progression::new(&map, &progress).state_of(&unit))
    }

    /// 访问锁定单元时重定向到第一个已解锁但未完成的主线单元
    pub fn access_unit(&self, learner_id: &str, unit_id: &str) -> Result<UnitAccess, EngineError> {
        let (unit, map, progress) = self.load(learner_id, unit_id)?;
        let view = Progression::new(&map, &progress);
        let state = view.state_of(&unit);

        if state.is_unlocked() {
            return Ok(UnitAccess::Granted {
                unit_id: unit.id,
                state: state.gate(),
            });
        }

        let target = view
            .first_open_unit()
            .map(|open| open.id.clone())
            .unwrap_or_else(|| unit.id.clone());
        tracing::debug!(learner_id, unit_id, redirect_to = %target, "Locked unit access redirected");
        Ok(UnitAccess::Redirect { to_unit_id: target })
    }

    pub async fn next_after_attempt(
        &self,
        learner_id: &str,
        outcome: &AttemptOutcome,
    ) -> Result<NextStep, EngineError> {
        let (unit, map, progress) = self.load(learner_id, &outcome.unit_id)?;

        if !outcome.passed {
            return Ok(NextStep::Retry {
                can_simplify: !unit.is_variant() && unit.has_quiz(),
            });
        }

        // 简化版本从其原始单元处接回主线
        let anchor = match unit.variant_of() {
            Some((_, VariantKind::Reinforcement)) => return Ok(NextStep::CourseComplete),
            Some((original_id, VariantKind::Simplified)) => original_id.to_string(),
            None => unit.id.clone(),
        };

        let main_line = map.main_line();
        match map.main_index(&anchor) {
            Some(index) if index + 1 < main_line.len() => {
                return Ok(NextStep::Advance {
                    unit_id: main_line[index + 1].id.clone(),
                });
            }
            Some(_) => {}
            None => {
                tracing::warn!(unit_id = %unit.id, anchor = %anchor, "Unit is not on the main line, treating as course end");
            }
        }

        if Progression::new(&map, &progress).every_quiz_passed() {
            tracing::info!(learner_id, course_id = %map.course.id, "Course complete");
            return Ok(NextStep::CourseComplete);
        }

        match self.ensure_reinforcement(&map, &progress).await {
            Ok(Some((reinforcement, _))) => Ok(NextStep::Reinforcement {
                unit_id: reinforcement.id,
            }),
            Ok(None) => Ok(NextStep::CourseComplete),
            Err(EngineError::Generation(error)) => {
                tracing::error!(
                    learner_id,
                    course_id = %map.course.id,
                    error = %error,
                    "Reinforcement generation failed after attempt was recorded"
                );
                Ok(NextStep::ReinforcementPending {
                    reason: error.to_string(),
                })
            }
            Err(other) => Err(other),
        }
    }

    /// 每门课程至多一个巩固单元；已存在则复用
    async fn ensure_reinforcement(
        &self,
        map: &CourseMap,
        progress: &LearnerProgress,
    ) -> Result<Option<(Unit, bool)>, EngineError> {
        let Some(last) = map.main_line().last() else {
            return Ok(None);
        };
        if let Some(existing) = self
            .store
            .find_variant(&map.course.id, &last.id, VariantKind::Reinforcement)?
        {
            return Ok(Some((existing, false)));
        }

        let request = GenerationRequest::Reinforce {
            course_title: map.course.title.clone(),
            weak_areas: weak_areas(map, progress),
        };
        let topic = self.gateway.generate_topic(&request).await?;

        let host = map
            .reinforcement_container()
            .cloned()
            .unwrap_or_else(|| Container::reinforcement_for(&map.course, &map.all_containers()));
        let unit = Unit::new_variant(last, VariantKind::Reinforcement, &host, topic.into_draft())?;

        match self.store.insert_variant_unit(&host, &unit) {
            Ok(stored) => {
                tracing::info!(course_id = %map.course.id, unit_id = %stored.id, "Reinforcement unit created");
                Ok(Some((stored, true)))
            }
            Err(StoreError::Conflict { entity, key }) if entity == "variant" => {
                tracing::debug!(key = %key, "Reinforcement unit created concurrently, reusing");
                let winner = self
                    .store
                    .find_variant(&map.course.id, &last.id, VariantKind::Reinforcement)?
                    .ok_or_else(|| EngineError::Store(StoreError::not_found("variant", &key)))?;
                Ok(Some((winner, false)))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// 仅在学习者对原始单元有未通过记录时可用；同一原始单元的简化版本在课程内共享
    pub async fn request_simplified_variant(
        &self,
        learner_id: &str,
        unit_id: &str,
    ) -> Result<SimplifyResult, EngineError> {
        let unit = self
            .store
            .get_unit(unit_id)?
            .ok_or_else(|| EngineError::not_found("unit", unit_id))?;
        if unit.is_variant() {
            return Err(EngineError::Validation(
                "unit is already a variant and cannot be simplified".to_string(),
            ));
        }

        let completion = match self.store.get_completion(learner_id, &unit.id)? {
            Some(record) if !record.passed => record,
            Some(_) => {
                return Err(EngineError::Validation(
                    "unit was passed; simplification is only offered after a failed attempt".to_string(),
                ))
            }
            None => {
                return Err(EngineError::Validation(
                    "no failed attempt recorded for this unit".to_string(),
                ))
            }
        };

        if let Some(existing) = self.store.find_simplified_variant(&unit)? {
            return Ok(SimplifyResult {
                variant_unit_id: existing.id,
                created: false,
            });
        }

        let container = self.store.require_container(&unit.container_id)?;
        let course = self.store.require_course(&unit.course_id)?;
        let request = GenerationRequest::Simplify {
            course_title: course.title.clone(),
            unit_title: unit.title.clone(),
            unit_body: unit.body.clone(),
            score: completion.score,
            tier: ComplexityTier::for_score(completion.score),
            wrong_answers: completion.wrong_answers.clone(),
        };
        let topic = self.gateway.generate_topic(&request).await?;

        let host = self
            .store
            .list_course_containers(&course.id)?
            .into_iter()
            .find(|candidate| is_remedial_for(candidate, &container.id))
            .unwrap_or_else(|| Container::remedial_for(&container));
        let variant = Unit::new_variant(&unit, VariantKind::Simplified, &host, topic.into_draft())?;

        match self.store.insert_variant_unit(&host, &variant) {
            Ok(stored) => {
                tracing::info!(
                    learner_id,
                    unit_id = %unit.id,
                    variant_unit_id = %stored.id,
                    score = completion.score,
                    "Simplified variant created"
                );
                Ok(SimplifyResult {
                    variant_unit_id: stored.id,
                    created: true,
                })
            }
            Err(StoreError::Conflict { entity, key }) if entity == "variant" => {
                let winner = self
                    .store
                    .find_simplified_variant(&unit)?
                    .ok_or_else(|| EngineError::Store(StoreError::not_found("variant", &key)))?;
                tracing::debug!(unit_id = %unit.id, variant_unit_id = %winner.id, "Simplified variant created concurrently, reusing");
                Ok(SimplifyResult {
                    variant_unit_id: winner.id,
                    created: false,
                })
            }
            Err(other) => Err(other.into()),
        }
    }

    pub fn outline(&self, learner_id: &str, course_id: &str) -> Result<CourseOutline, EngineError> {
        let map = CourseMap::load(self.store, course_id)?;
        let progress = LearnerProgress::load(self.store, learner_id, course_id)?;
        let view = Progression::new(&map, &progress);

        let containers = map
            .containers
            .iter()
            .map(|(container, units)| ContainerOutline {
                container_id: container.id.clone(),
                title: container.title.clone(),
                ordinal: container.ordinal,
                kind: match container.kind {
                    ContainerKind::Main => "main",
                    ContainerKind::Remedial { .. } => "remedial",
                    ContainerKind::Reinforcement => "reinforcement",
                },
                percentage: view.container_percentage(container, units),
                units: units
                    .iter()
                    .map(|unit| {
                        let record = progress.completion(&unit.id);
                        UnitOutline {
                            unit_id: unit.id.clone(),
                            title: unit.title.clone(),
                            ordinal: unit.ordinal,
                            state: view.state_of(unit),
                            has_quiz: unit.has_quiz(),
                            score: record.map(|r| r.score),
                            attempts: record.map(|r| r.attempts).unwrap_or(0),
                            variant_of: unit.variant_of().map(|(of, _)| of.to_string()),
                        }
                    })
                    .collect(),
            })
            .collect();

        let resume_unit_id = match self.store.get_course_progress(learner_id, course_id)? {
            Some(pointer) => Some(pointer.last_unit_id),
            None => view.first_open_unit().map(|unit| unit.id.clone()),
        };

        Ok(CourseOutline {
            course_id: map.course.id.clone(),
            title: map.course.title.clone(),
            percentage: view.course_percentage(),
            resume_unit_id,
            containers,
        })
    }
}

/// 最新得分低于 WEAK_SCORE_THRESHOLD 的单元，含简化版本，按课程顺序
fn weak_areas(map: &CourseMap, progress: &LearnerProgress) -> Vec<WeakArea> {
    map.containers
        .iter()
        .flat_map(|(_, units)| units.iter())
        .filter(|unit| !matches!(unit.variant_of(), Some((_, VariantKind::Reinforcement))))
        .filter_map(|unit| {
            let record = progress.completion(&unit.id)?;
            (record.score < WEAK_SCORE_THRESHOLD).then(|| WeakArea {
                unit_title: unit.title.clone(),
                score: record.score,
                wrong_answers: record.wrong_answers.clone(),
            })
        })
        .collect()
}
