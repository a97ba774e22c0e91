use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use crate::response::AppError;

/// `axum::Json<T>`，失败时返回统一的 ErrorBody 而不是纯文本
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        axum::Json::<T>::from_request(req, state)
            .await
            .map(|axum::Json(value)| JsonBody(value))
            .map_err(json_rejection_to_app_error)
    }
}

fn json_rejection_to_app_error(rejection: JsonRejection) -> AppError {
    match rejection {
        JsonRejection::JsonDataError(e) => {
            tracing::warn!(error = %e, "JSON data deserialization failed");
            // serde 的消息只包含字段名与期望类型，可以回给调用方
            AppError::bad_request("INVALID_REQUEST_BODY", &format!("请求体格式无效: {}", e.body_text()))
        }
        JsonRejection::MissingJsonContentType(e) => {
            tracing::warn!(error = %e, "Missing or invalid JSON Content-Type");
            AppError::bad_request("INVALID_REQUEST_BODY", "Content-Type 必须为 application/json")
        }
        other => {
            tracing::warn!(error = %other, "JSON body rejected");
            AppError::bad_request("INVALID_REQUEST_BODY", "请求体格式无效")
        }
    }
}

/// 路径参数提取；每个 id 段都必须能作为存储键
pub struct PathIds<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for PathIds<T>
where
    T: DeserializeOwned + Send + PathSegments,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: PathRejection| {
                tracing::warn!(error = %rejection, "Path rejected");
                AppError::bad_request("INVALID_PATH", "路径参数无效")
            })?;
        for segment in value.segments() {
            if crate::store::keys::validate_key_segment(segment).is_err() {
                return Err(AppError::bad_request(
                    "INVALID_PATH",
                    &format!("invalid id: {segment}"),
                ));
            }
        }
        Ok(PathIds(value))
    }
}

pub trait PathSegments {
    fn segments(&self) -> Vec<&str>;
}

impl PathSegments for String {
    fn segments(&self) -> Vec<&str> {
        vec![self.as_str()]
    }
}

impl PathSegments for (String, String) {
    fn segments(&self) -> Vec<&str> {
        vec![self.0.as_str(), self.1.as_str()]
    }
}
