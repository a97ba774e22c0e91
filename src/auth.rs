use axum::extract::{FromRef, FromRequestParts};
use axum::http::{request::Parts, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::response::AppError;
use crate::state::AppState;

const LEARNER_TOKEN_TYPE: &str = "learner";

/// 身份由上游签发，这里只校验签名与有效期
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub jti: String,
}

pub fn sign_jwt_for_learner(
    learner_id: &str,
    secret: &str,
    expires_in_hours: u64,
) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: learner_id.to_string(),
        token_type: LEARNER_TOKEN_TYPE.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(expires_in_hours as i64)).timestamp(),
        jti: uuid::Uuid::new_v4().to_string(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(&format!("jwt sign failed: {e}")))
}

pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.algorithms = vec![Algorithm::HS256];

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::unauthorized("Invalid or expired token"))
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[derive(Debug, Clone)]
pub struct AuthLearner {
    pub learner_id: String,
}

impl AuthLearner {
    /// 只能读写自己的进度
    pub fn ensure_self(&self, learner_id: &str) -> Result<(), AppError> {
        if self.learner_id == learner_id {
            Ok(())
        } else {
            Err(AppError::forbidden(
                "FORBIDDEN",
                "Cannot access another learner's progress",
            ))
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthLearner
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AppError::unauthorized("Missing bearer token"))?;
        let claims = verify_jwt(token, &app_state.config().jwt_secret)?;

        if claims.token_type != LEARNER_TOKEN_TYPE {
            return Err(AppError::unauthorized("Invalid token type"));
        }
        if crate::store::keys::validate_key_segment(&claims.sub).is_err() {
            return Err(AppError::unauthorized("Invalid token subject"));
        }

        Ok(AuthLearner {
            learner_id: claims.sub,
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn jwt_sign_and_verify() {
        let token = sign_jwt_for_learner("l1", "secret", 1).unwrap();
        let claims = verify_jwt(&token, "secret").unwrap();
        assert_eq!(claims.sub, "l1");
        assert_eq!(claims.token_type, "learner");
        assert!(verify_jwt(&token, "other").is_err());
    }

    #[test]
    fn bearer_prefix_required() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Token abc"));
        assert!(extract_bearer_token(&headers).is_none());
        headers.insert("authorization", HeaderValue::from_static("Bearer abc "));
        assert_eq!(extract_bearer_token(&headers), Some("abc"));
    }

    #[test]
    fn other_learner_is_forbidden() {
        let learner = AuthLearner {
            learner_id: "l1".to_string(),
        };
        assert!(learner.ensure_self("l1").is_ok());
        assert_eq!(
            learner.ensure_self("l2").unwrap_err().status,
            axum::http::StatusCode::FORBIDDEN
        );
    }
}
