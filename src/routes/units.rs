use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::auth::AuthLearner;
use crate::engine::ledger::ProgressLedger;
use crate::engine::sequencer::TopicSequencer;
use crate::engine::types::{AnswerSheet, UnitAccess, UnitState};
use crate::extractors::{JsonBody, PathIds};
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::units::{Quiz, Unit};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:unit_id", get(get_unit))
        .route("/:unit_id/attempts", post(submit_attempt).get(list_attempts))
        .route("/:unit_id/simplify", post(simplify_unit))
}

// ---------------------------------------------------------------------------
// 单元内容（不含正确答案）
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OptionView {
    key: String,
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuestionView {
    id: String,
    text: String,
    options: Vec<OptionView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UnitView {
    id: String,
    course_id: String,
    container_id: String,
    title: String,
    description: String,
    body: String,
    ordinal: u32,
    state: UnitState,
    variant_of: Option<String>,
    questions: Vec<QuestionView>,
}

fn strip_answers(quiz: Option<Quiz>) -> Vec<QuestionView> {
    quiz.map(|quiz| {
        quiz.questions
            .into_iter()
            .map(|question| QuestionView {
                id: question.id,
                text: question.text,
                options: question
                    .options
                    .into_iter()
                    .map(|option| OptionView {
                        key: option.key,
                        text: option.text,
                    })
                    .collect(),
            })
            .collect()
    })
    .unwrap_or_default()
}

impl UnitView {
    fn new(unit: Unit, state: UnitState) -> Self {
        let variant_of = unit.variant_of().map(|(of, _)| of.to_string());
        Self {
            variant_of,
            id: unit.id,
            course_id: unit.course_id,
            container_id: unit.container_id,
            title: unit.title,
            description: unit.description,
            body: unit.body,
            ordinal: unit.ordinal,
            state,
            questions: strip_answers(unit.quiz),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "access", rename_all = "camelCase")]
enum UnitResponse {
    Granted { unit: UnitView },
    #[serde(rename_all = "camelCase")]
    Redirect { redirect_to_unit_id: String },
}

async fn get_unit(
    auth: AuthLearner,
    State(state): State<AppState>,
    PathIds(unit_id): PathIds<String>,
) -> Result<impl IntoResponse, AppError> {
    state.store().require_visible_unit(&unit_id, &auth.learner_id)?;
    let sequencer = TopicSequencer::new(state.store(), state.gateway());
    let response = match sequencer.access_unit(&auth.learner_id, &unit_id)? {
        UnitAccess::Granted { unit_id, state: unit_state } => {
            ProgressLedger::new(state.store()).record_view(&auth.learner_id, &unit_id)?;
            let unit = state.store().require_unit(&unit_id)?;
            UnitResponse::Granted {
                unit: UnitView::new(unit, unit_state),
            }
        }
        UnitAccess::Redirect { to_unit_id } => UnitResponse::Redirect {
            redirect_to_unit_id: to_unit_id,
        },
    };
    Ok(ok(response))
}

// ---------------------------------------------------------------------------
// 作答
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitAttemptRequest {
    #[serde(default)]
    answers: AnswerSheet,
}

async fn submit_attempt(
    auth: AuthLearner,
    State(state): State<AppState>,
    PathIds(unit_id): PathIds<String>,
    JsonBody(req): JsonBody<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.store().require_visible_unit(&unit_id, &auth.learner_id)?;
    let report = crate::engine::submit_attempt(
        state.store(),
        state.gateway(),
        &auth.learner_id,
        &unit_id,
        &req.answers,
    )
    .await?;
    Ok(ok(report))
}

async fn list_attempts(
    auth: AuthLearner,
    State(state): State<AppState>,
    PathIds(unit_id): PathIds<String>,
) -> Result<impl IntoResponse, AppError> {
    state.store().require_visible_unit(&unit_id, &auth.learner_id)?;
    let history = ProgressLedger::new(state.store()).attempt_history(&auth.learner_id, &unit_id)?;
    Ok(ok(history))
}

async fn simplify_unit(
    auth: AuthLearner,
    State(state): State<AppState>,
    PathIds(unit_id): PathIds<String>,
) -> Result<axum::response::Response, AppError> {
    state.store().require_visible_unit(&unit_id, &auth.learner_id)?;
    let result = TopicSequencer::new(state.store(), state.gateway())
        .request_simplified_variant(&auth.learner_id, &unit_id)
        .await?;
    let response = if result.created {
        created(result).into_response()
    } else {
        ok(result).into_response()
    };
    Ok(response)
}
