use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::auth::AuthLearner;
use crate::engine::sequencer::TopicSequencer;
use crate::engine::types::ContainerOutline;
use crate::extractors::PathIds;
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/:learner_id/:course_id", get(get_course_progress))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CourseProgressResponse {
    course_id: String,
    percentage: u8,
    last_accessed_unit_id: Option<String>,
    containers: Vec<ContainerOutline>,
}

async fn get_course_progress(
    auth: AuthLearner,
    State(state): State<AppState>,
    PathIds((learner_id, course_id)): PathIds<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    auth.ensure_self(&learner_id)?;
    state.store().require_visible_course(&course_id, &learner_id)?;

    let outline = TopicSequencer::new(state.store(), state.gateway()).outline(&learner_id, &course_id)?;
    let last_accessed_unit_id = state
        .store()
        .get_course_progress(&learner_id, &course_id)?
        .map(|pointer| pointer.last_unit_id);

    Ok(ok(CourseProgressResponse {
        course_id: outline.course_id,
        percentage: outline.percentage,
        last_accessed_unit_id,
        containers: outline.containers,
    }))
}
