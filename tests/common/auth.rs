use learnpath_backend::auth::sign_jwt_for_learner;

use super::app::TestApp;

pub fn learner_token(app: &TestApp, learner_id: &str) -> String {
    sign_jwt_for_learner(learner_id, &app.config.jwt_secret, 1).expect("sign learner token")
}

pub fn auth_header(token: &str) -> String {
    format!("Bearer {token}")
}

/// 为学习者生成一个 authorization 头
pub fn learner_auth(app: &TestApp, learner_id: &str) -> (&'static str, String) {
    ("authorization", auth_header(&learner_token(app, learner_id)))
}
