mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::app::{spawn_test_app, spawn_with, TestLimits};
use common::auth::learner_auth;
use common::fixtures::{generate_course, main_unit_ids, outline, FixtureGenerator};
use common::http::{assert_json_error, assert_status_ok_json, call};
use learnpath_backend::services::generator::DisabledGenerator;

#[tokio::test]
async fn it_invalid_generation_persists_nothing() {
    let generator = Arc::new(FixtureGenerator {
        broken_course: true,
        ..FixtureGenerator::default()
    });
    let app = spawn_with(generator.clone(), TestLimits::default()).await;
    let auth = learner_auth(&app, "learner-broken");

    let (status, body) = call(
        &app.app,
        Method::POST,
        "/api/courses/broken/generate",
        Some(json!({ "topic": "Macros", "chapterCount": 2 })),
        &auth,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_json_error(&body, "GENERATION_FAILED");

    // 一次重试后放弃
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    let store = app.state.store();
    assert_eq!(store.courses.len(), 0);
    assert_eq!(store.containers.len(), 0);
    assert_eq!(store.units.len(), 0);
    assert_eq!(store.course_containers.len(), 0);
    assert_eq!(store.container_units.len(), 0);
}

#[tokio::test]
async fn it_generated_course_is_laid_out_in_order() {
    let app = spawn_test_app().await;
    let auth = learner_auth(&app, "learner-gen");

    let (status, body) = call(
        &app.app,
        Method::POST,
        "/api/courses/generate",
        Some(json!({ "topic": "Async", "level": "advanced", "chapterCount": 2 })),
        &auth,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let course_id = body["data"]["courseId"].as_str().unwrap().to_string();
    let first_unit = body["data"]["firstUnitId"].as_str().unwrap().to_string();

    let tree = outline(&app, &auth, &course_id).await;
    let units = main_unit_ids(&tree);
    assert_eq!(units.len(), 6);
    assert_eq!(units[0], first_unit);
    assert_eq!(tree["percentage"], 0);
    assert_eq!(tree["resumeUnitId"], first_unit.as_str());
    assert_eq!(tree["containers"][0]["units"][0]["state"], "unlockedIncomplete");
    assert_eq!(tree["containers"][0]["units"][1]["state"], "locked");
}

#[tokio::test]
async fn it_taken_course_id_conflicts_without_generating() {
    let generator = Arc::new(FixtureGenerator::default());
    let app = spawn_with(generator.clone(), TestLimits::default()).await;
    let auth = learner_auth(&app, "learner-dup");
    generate_course(&app, &auth, "dup-course", 1).await;
    let calls = generator.calls.load(Ordering::SeqCst);

    let (status, body) = call(
        &app.app,
        Method::POST,
        "/api/courses/dup-course/generate",
        Some(json!({ "topic": "Again", "chapterCount": 1 })),
        &auth,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_json_error(&body, "COURSE_EXISTS");
    assert_eq!(generator.calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn it_bad_generation_requests_are_rejected() {
    let app = spawn_test_app().await;
    let auth = learner_auth(&app, "learner-bad");

    for payload in [
        json!({ "topic": "", "chapterCount": 1 }),
        json!({ "topic": "Errors", "chapterCount": 0 }),
        json!({ "topic": "Errors", "chapterCount": 11 }),
        json!({ "topic": "Errors", "level": "expert", "chapterCount": 1 }),
    ] {
        let (status, body) = call(&app.app, Method::POST, "/api/courses/generate", Some(payload), &auth).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_json_error(&body, "VALIDATION_ERROR");
    }

    let (status, body) = call(
        &app.app,
        Method::POST,
        "/api/courses/generate",
        Some(json!({ "chapterCount": 1 })),
        &auth,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "INVALID_REQUEST_BODY");
    assert_eq!(app.state.store().courses.len(), 0);
}

#[tokio::test]
async fn it_disabled_generator_is_unavailable() {
    let app = spawn_with(Arc::new(DisabledGenerator), TestLimits::default()).await;
    let auth = learner_auth(&app, "learner-off");

    let (status, body) = call(
        &app.app,
        Method::POST,
        "/api/courses/generate",
        Some(json!({ "topic": "Anything", "chapterCount": 1 })),
        &auth,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_json_error(&body, "GENERATION_DISABLED");
}

fn authored_course() -> serde_json::Value {
    json!({
        "difficulty": "intermediate",
        "course": {
            "title": "Error handling",
            "description": "Result and the ? operator",
            "chapters": [{
                "title": "Basics",
                "topics": [
                    { "title": "Reading", "content": "No quiz here." },
                    {
                        "title": "Result",
                        "content": "Result<T, E> carries errors.",
                        "quiz": { "questions": [{
                            "question_text": "What does ? do?",
                            "answers": [
                                { "answer_text": "Propagates the error", "option_key": "x" },
                                { "answer_text": "Panics", "option_key": "y" }
                            ],
                            "correct_answer_key": "x"
                        }]}
                    }
                ]
            }]
        }
    })
}

#[tokio::test]
async fn it_imported_course_shows_on_dashboard() {
    let app = spawn_test_app().await;
    let owner = learner_auth(&app, "learner-owner");
    let other = learner_auth(&app, "learner-other");

    let (status, body) = call(&app.app, Method::POST, "/api/courses", Some(authored_course()), &owner).await;
    assert_eq!(status, StatusCode::CREATED);
    let course_id = body["data"]["courseId"].as_str().unwrap().to_string();
    let reading = body["data"]["firstUnitId"].as_str().unwrap().to_string();

    // 无测验单元浏览即完成
    let (status, _) = call(&app.app, Method::GET, &format!("/api/units/{reading}"), None, &owner).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app.app, Method::GET, "/api/courses", None, &owner).await;
    assert_status_ok_json(status, &body);
    let courses = body["data"].as_array().unwrap();
    assert_eq!(courses.len(), 1);
    assert_eq!(courses[0]["id"], course_id.as_str());
    assert_eq!(courses[0]["difficulty"], "intermediate");
    assert_eq!(courses[0]["percentage"], 50);
    assert_eq!(courses[0]["lastAccessedUnitId"], reading.as_str());

    let (status, body) = call(&app.app, Method::GET, "/api/courses", None, &other).await;
    assert_status_ok_json(status, &body);
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn it_invalid_import_writes_nothing() {
    let app = spawn_test_app().await;
    let auth = learner_auth(&app, "learner-imp");
    let mut payload = authored_course();
    payload["course"]["chapters"][0]["topics"][1]["quiz"]["questions"][0]["correct_answer_key"] = json!("z");

    let (status, body) = call(&app.app, Method::POST, "/api/courses", Some(payload), &auth).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "VALIDATION_ERROR");
    assert_eq!(app.state.store().courses.len(), 0);
    assert_eq!(app.state.store().units.len(), 0);
}

#[tokio::test]
async fn it_private_course_is_hidden_from_other_learners() {
    let app = spawn_test_app().await;
    let owner = learner_auth(&app, "learner-private");
    let other = learner_auth(&app, "learner-stranger");

    let (status, body) = call(&app.app, Method::POST, "/api/courses", Some(authored_course()), &owner).await;
    assert_eq!(status, StatusCode::CREATED);
    let course_id = body["data"]["courseId"].as_str().unwrap().to_string();
    let unit_id = body["data"]["firstUnitId"].as_str().unwrap().to_string();

    let requests = [
        (Method::GET, format!("/api/courses/{course_id}/outline"), None),
        (Method::GET, format!("/api/units/{unit_id}"), None),
        (
            Method::POST,
            format!("/api/units/{unit_id}/attempts"),
            Some(json!({ "answers": {} })),
        ),
        (Method::GET, format!("/api/units/{unit_id}/attempts"), None),
        (Method::POST, format!("/api/units/{unit_id}/simplify"), None),
        (Method::GET, format!("/api/progress/learner-stranger/{course_id}"), None),
    ];
    for (method, path, payload) in requests {
        let (status, body) = call(&app.app, method, &path, payload, &other).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}: {body}");
        assert_json_error(&body, "NOT_FOUND");
    }
    assert_eq!(app.state.store().completions.len(), 0);
    assert_eq!(app.state.store().unit_views.len(), 0);

    let (status, body) = call(
        &app.app,
        Method::GET,
        &format!("/api/courses/{course_id}/outline"),
        None,
        &owner,
    )
    .await;
    assert_status_ok_json(status, &body);
}
