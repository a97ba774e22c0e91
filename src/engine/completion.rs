use crate::engine::course_map::{CourseMap, LearnerProgress, Progression};
use crate::engine::types::EngineError;
use crate::store::Store;

/// 只读的完成度计算，每次从作答记录推导，不保存派生计数
pub struct CompletionCalculator<'a> {
    store: &'a Store,
}

impl<'a> CompletionCalculator<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn container_progress(&self, learner_id: &str, container_id: &str) -> Result<u8, EngineError> {
        let container = self.store.require_container(container_id)?;
        let map = CourseMap::load(self.store, &container.course_id)?;
        let progress = LearnerProgress::load(self.store, learner_id, &container.course_id)?;
        let view = Progression::new(&map, &progress);

        let units = map
            .containers
            .iter()
            .find(|(candidate, _)| candidate.id == container.id)
            .map(|(_, units)| units.as_slice())
            .unwrap_or(&[]);
        Ok(view.container_percentage(&container, units))
    }

    pub fn course_percentage(&self, learner_id: &str, course_id: &str) -> Result<u8, EngineError> {
        let map = CourseMap::load(self.store, course_id)?;
        let progress = LearnerProgress::load(self.store, learner_id, course_id)?;
        Ok(Progression::new(&map, &progress).course_percentage())
    }
}
