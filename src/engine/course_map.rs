use std::collections::{HashMap, HashSet};

use crate::engine::grading::percentage;
use crate::engine::types::UnitState;
use crate::store::operations::completions::CompletionRecord;
use crate::store::operations::courses::{Container, ContainerKind, Course};
use crate::store::operations::units::{Unit, VariantKind};
use crate::store::{Store, StoreError};

/// 课程结构快照：章节、单元以及主线顺序
#[derive(Debug, Clone)]
pub struct CourseMap {
    pub course: Course,
    pub containers: Vec<(Container, Vec<Unit>)>,
    main_line: Vec<Unit>,
}

impl CourseMap {
    pub fn load(store: &Store, course_id: &str) -> Result<Self, StoreError> {
        let course = store.require_course(course_id)?;
        let containers = store.list_course_units(course_id)?;
        Ok(Self::from_parts(course, containers))
    }

    pub fn from_parts(course: Course, containers: Vec<(Container, Vec<Unit>)>) -> Self {
        // 主线：主章节中的原始单元，按 (章节序号, 单元序号)
        let main_line = containers
            .iter()
            .filter(|(container, _)| container.is_main())
            .flat_map(|(_, units)| units.iter().filter(|unit| !unit.is_variant()).cloned())
            .collect();
        Self {
            course,
            containers,
            main_line,
        }
    }

    pub fn main_line(&self) -> &[Unit] {
        &self.main_line
    }

    pub fn main_index(&self, unit_id: &str) -> Option<usize> {
        self.main_line.iter().position(|unit| unit.id == unit_id)
    }

    pub fn find_unit(&self, unit_id: &str) -> Option<&Unit> {
        self.containers
            .iter()
            .flat_map(|(_, units)| units.iter())
            .find(|unit| unit.id == unit_id)
    }

    pub fn simplified_variants_of<'m>(&'m self, original_id: &'m str) -> impl Iterator<Item = &'m Unit> + 'm {
        self.containers
            .iter()
            .flat_map(|(_, units)| units.iter())
            .filter(move |unit| unit.variant_of() == Some((original_id, VariantKind::Simplified)))
    }

    pub fn reinforcement_container(&self) -> Option<&Container> {
        self.containers
            .iter()
            .map(|(container, _)| container)
            .find(|container| matches!(container.kind, ContainerKind::Reinforcement))
    }

    pub fn all_containers(&self) -> Vec<Container> {
        self.containers.iter().map(|(container, _)| container.clone()).collect()
    }
}

/// 学习者在某课程中的作答与浏览记录
#[derive(Debug, Clone, Default)]
pub struct LearnerProgress {
    completions: HashMap<String, CompletionRecord>,
    viewed: HashSet<String>,
}

impl LearnerProgress {
    pub fn load(store: &Store, learner_id: &str, course_id: &str) -> Result<Self, StoreError> {
        Ok(Self {
            completions: store.completions_for_course(learner_id, course_id)?,
            viewed: store.viewed_units(learner_id, course_id)?.into_iter().collect(),
        })
    }

    pub fn completion(&self, unit_id: &str) -> Option<&CompletionRecord> {
        self.completions.get(unit_id)
    }

    pub fn passed(&self, unit_id: &str) -> bool {
        self.completion(unit_id).map(|c| c.passed).unwrap_or(false)
    }

    /// 有作答记录且最新一次未通过
    pub fn failed(&self, unit_id: &str) -> bool {
        self.completion(unit_id).is_some_and(|c| !c.passed)
    }

    /// 有测验的单元需要通过；无测验的单元通过或浏览过即可
    pub fn completed(&self, unit: &Unit) -> bool {
        if self.passed(&unit.id) {
            return true;
        }
        !unit.has_quiz() && self.viewed.contains(&unit.id)
    }
}

/// 课程结构与学习记录的组合视图，所有状态判定都在这里
pub struct Progression<'a> {
    pub map: &'a CourseMap,
    pub progress: &'a LearnerProgress,
}

impl<'a> Progression<'a> {
    pub fn new(map: &'a CourseMap, progress: &'a LearnerProgress) -> Self {
        Self { map, progress }
    }

    /// 主线单元是否已"越过"：本身完成，或在原单元失败后完成了其简化版本
    pub fn satisfied(&self, unit: &Unit) -> bool {
        if self.progress.completed(unit) {
            return true;
        }
        !unit.is_variant()
            && self.progress.failed(&unit.id)
            && self
                .map
                .simplified_variants_of(&unit.id)
                .any(|variant| self.progress.completed(variant))
    }

    /// 简化版本在课程内共享，但只对在原单元上失败过的学习者开放；已作答过的保留访问
    fn variant_open(&self, original_id: &str, variant: &Unit) -> bool {
        self.progress.failed(original_id) || self.progress.completion(&variant.id).is_some()
    }

    fn main_unlocked(&self, index: usize) -> bool {
        index == 0 || self.satisfied(&self.map.main_line()[index - 1])
    }

    fn state_with_gate(&self, unit: &Unit, unlocked: bool) -> UnitState {
        if self.progress.completed(unit) {
            UnitState::Passed
        } else if !unlocked {
            UnitState::Locked
        } else if self.progress.completion(&unit.id).is_some() {
            UnitState::Failed
        } else {
            UnitState::UnlockedIncomplete
        }
    }

    pub fn state_of(&self, unit: &Unit) -> UnitState {
        match unit.variant_of() {
            None => {
                let unlocked = match self.map.main_index(&unit.id) {
                    Some(index) => self.main_unlocked(index),
                    // 不在主线中的原始单元不参与门禁
                    None => true,
                };
                self.state_with_gate(unit, unlocked)
            }
            Some((original_id, VariantKind::Simplified)) => {
                let original_open = match self.map.find_unit(original_id) {
                    Some(original) => self.state_of(original).is_unlocked(),
                    None => true,
                };
                let unlocked = original_open && self.variant_open(original_id, unit);
                self.state_with_gate(unit, unlocked)
            }
            Some((_, VariantKind::Reinforcement)) => {
                let unlocked = self
                    .map
                    .main_line()
                    .last()
                    .map(|last| self.satisfied(last))
                    .unwrap_or(true);
                self.state_with_gate(unit, unlocked)
            }
        }
    }

    /// 第一个已解锁但尚未越过的主线单元
    pub fn first_open_unit(&self) -> Option<&'a Unit> {
        let main_line = self.map.main_line();
        main_line
            .iter()
            .enumerate()
            .find(|(index, unit)| self.main_unlocked(*index) && !self.satisfied(unit))
            .map(|(_, unit)| unit)
            .or_else(|| main_line.first())
    }

    pub fn container_percentage(&self, container: &Container, units: &[Unit]) -> u8 {
        let done = units
            .iter()
            .filter(|unit| {
                if container.is_main() && !unit.is_variant() {
                    self.satisfied(unit)
                } else {
                    self.progress.completed(unit)
                }
            })
            .count();
        percentage(done, units.len())
    }

    pub fn course_percentage(&self) -> u8 {
        let main_line = self.map.main_line();
        let done = main_line.iter().filter(|unit| self.satisfied(unit)).count();
        percentage(done, main_line.len())
    }

    /// 主线中所有带测验的单元都由学习者本人直接通过
    pub fn every_quiz_passed(&self) -> bool {
        self.map
            .main_line()
            .iter()
            .filter(|unit| unit.has_quiz())
            .all(|unit| self.progress.passed(&unit.id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::store::operations::courses::tests::one_question_quiz;
    use crate::store::operations::units::{Difficulty, UnitDraft};

    fn course() -> Course {
        Course {
            id: "c1".to_string(),
            title: "Course".to_string(),
            description: String::new(),
            difficulty: Difficulty::Beginner,
            owner_id: None,
            created_at: Utc::now(),
        }
    }

    fn draft(title: &str, with_quiz: bool) -> UnitDraft {
        UnitDraft {
            title: title.to_string(),
            body: String::new(),
            description: String::new(),
            quiz: with_quiz.then(one_question_quiz),
        }
    }

    fn record(unit_id: &str, score: u8, passed: bool) -> CompletionRecord {
        CompletionRecord {
            learner_id: "l1".to_string(),
            unit_id: unit_id.to_string(),
            course_id: "c1".to_string(),
            score,
            passed,
            attempts: 1,
            wrong_answers: Vec::new(),
            first_attempt_at: Utc::now(),
            last_activity_at: Utc::now(),
        }
    }

    /// 两个主章节，各两个单元；第一个章节后面接一个补救章节
    fn map_with_variant() -> (CourseMap, Vec<Unit>, Unit) {
        let course = course();
        let a = Container::new_main("c1", 0, "A".to_string(), String::new());
        let b = Container::new_main("c1", 1, "B".to_string(), String::new());
        let units_a = vec![
            Unit::new_original(&a, 1, Difficulty::Beginner, draft("a1", true)),
            Unit::new_original(&a, 2, Difficulty::Beginner, draft("a2", true)),
        ];
        let units_b = vec![
            Unit::new_original(&b, 1, Difficulty::Beginner, draft("b1", false)),
            Unit::new_original(&b, 2, Difficulty::Beginner, draft("b2", true)),
        ];
        let remedial = Container::remedial_for(&a);
        let variant =
            Unit::new_variant(&units_a[0], VariantKind::Simplified, &remedial, draft("a1'", true)).unwrap();

        let main: Vec<Unit> = units_a.iter().chain(units_b.iter()).cloned().collect();
        let map = CourseMap::from_parts(
            course,
            vec![
                (a, units_a),
                (remedial, vec![variant.clone()]),
                (b, units_b),
            ],
        );
        (map, main, variant)
    }

    #[test]
    fn main_line_skips_variants() {
        let (map, main, variant) = map_with_variant();
        assert_eq!(map.main_line().len(), 4);
        assert!(map.main_index(&variant.id).is_none());
        assert_eq!(map.main_index(&main[2].id), Some(2));
    }

    #[test]
    fn first_unit_is_never_locked() {
        let (map, main, _) = map_with_variant();
        let progress = LearnerProgress::default();
        let view = Progression::new(&map, &progress);
        assert_eq!(view.state_of(&main[0]), UnitState::UnlockedIncomplete);
        assert_eq!(view.state_of(&main[1]), UnitState::Locked);
        assert_eq!(view.first_open_unit().unwrap().id, main[0].id);
        assert_eq!(view.course_percentage(), 0);
    }

    #[test]
    fn passing_a_variant_unlocks_the_next_main_unit() {
        let (map, main, variant) = map_with_variant();
        let mut progress = LearnerProgress::default();
        progress.completions.insert(main[0].id.clone(), record(&main[0].id, 0, false));
        progress.completions.insert(variant.id.clone(), record(&variant.id, 100, true));
        let view = Progression::new(&map, &progress);

        assert_eq!(view.state_of(&main[0]), UnitState::Failed);
        assert_eq!(view.state_of(&variant), UnitState::Passed);
        assert_eq!(view.state_of(&main[1]), UnitState::UnlockedIncomplete);
        assert_eq!(view.course_percentage(), 25);
        assert!(!view.every_quiz_passed());
    }

    #[test]
    fn quizless_unit_counts_once_viewed() {
        let (map, main, _) = map_with_variant();
        let mut progress = LearnerProgress::default();
        for unit in &main[..2] {
            progress.completions.insert(unit.id.clone(), record(&unit.id, 100, true));
        }
        progress.viewed.insert(main[2].id.clone());
        let view = Progression::new(&map, &progress);

        assert_eq!(view.state_of(&main[2]), UnitState::Passed);
        assert_eq!(view.state_of(&main[3]), UnitState::UnlockedIncomplete);
        assert_eq!(view.course_percentage(), 75);
        assert_eq!(view.first_open_unit().unwrap().id, main[3].id);
    }

    #[test]
    fn variant_stays_locked_without_a_failed_original() {
        let (map, main, variant) = map_with_variant();
        let progress = LearnerProgress::default();
        let view = Progression::new(&map, &progress);
        assert_eq!(view.state_of(&variant), UnitState::Locked);

        // 别人的简化版本即使被通过，也不能替代原单元
        let mut progress = LearnerProgress::default();
        progress.completions.insert(variant.id.clone(), record(&variant.id, 100, true));
        let view = Progression::new(&map, &progress);
        assert!(!view.satisfied(&main[0]));
        assert_eq!(view.state_of(&main[1]), UnitState::Locked);
        assert_eq!(view.course_percentage(), 0);
    }

    #[test]
    fn variant_opens_after_failing_the_original() {
        let (map, main, variant) = map_with_variant();
        let mut progress = LearnerProgress::default();
        progress.completions.insert(main[0].id.clone(), record(&main[0].id, 40, false));
        let view = Progression::new(&map, &progress);
        assert_eq!(view.state_of(&variant), UnitState::UnlockedIncomplete);

        // 原单元直接通过后，没有作答过的简化版本不再开放
        progress.completions.insert(main[0].id.clone(), record(&main[0].id, 100, true));
        let view = Progression::new(&map, &progress);
        assert_eq!(view.state_of(&variant), UnitState::Locked);
    }

    #[test]
    fn empty_container_is_zero_percent() {
        let (map, _, _) = map_with_variant();
        let progress = LearnerProgress::default();
        let view = Progression::new(&map, &progress);
        let container = Container::new_main("c1", 9, "Empty".to_string(), String::new());
        assert_eq!(view.container_percentage(&container, &[]), 0);
    }
}
