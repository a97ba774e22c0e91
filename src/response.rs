use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::engine::types::EngineError;
use crate::services::generator::GenerationError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub is_operational: bool,
}

impl AppError {
    fn operational(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn bad_request(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::operational(StatusCode::UNAUTHORIZED, "AUTH_UNAUTHORIZED", message)
    }

    pub fn forbidden(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::FORBIDDEN, code, message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::CONFLICT, code, message)
    }

    pub fn too_many_requests(message: &str) -> Self {
        Self::operational(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", message)
    }

    /// 生成器返回了错误或不合格的内容
    pub fn bad_gateway(message: &str) -> Self {
        Self::operational(StatusCode::BAD_GATEWAY, "GENERATION_FAILED", message)
    }

    pub fn service_unavailable(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }

    pub fn gateway_timeout(message: &str) -> Self {
        Self::operational(StatusCode::GATEWAY_TIMEOUT, "GENERATION_TIMEOUT", message)
    }

    pub fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.to_string(),
            is_operational: false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let exposed_message = if self.is_operational {
            self.message.clone()
        } else {
            "服务器内部错误".to_string()
        };

        if self.is_operational {
            tracing::warn!(status = %self.status, code = %self.code, error = %self.message, "API error");
        } else {
            tracing::error!(status = %self.status, code = %self.code, error = %self.message, "Internal API error");
        }

        (
            self.status,
            Json(ErrorBody {
                success: false,
                code: self.code,
                message: exposed_message,
                trace_id: None,
            }),
        )
            .into_response()
    }
}

// StoreError 只有 NotFound / Validation 可以原样暴露，其余一律 500 并隐藏细节
impl From<crate::store::StoreError> for AppError {
    fn from(value: crate::store::StoreError) -> Self {
        AppError::from(EngineError::from(value))
    }
}

impl From<GenerationError> for AppError {
    fn from(value: GenerationError) -> Self {
        if value.is_timeout() {
            return AppError::gateway_timeout(&value.to_string());
        }
        match value {
            GenerationError::Disabled => {
                AppError::service_unavailable("GENERATION_DISABLED", "内容生成未启用")
            }
            other => AppError::bad_gateway(&other.to_string()),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(value: EngineError) -> Self {
        match value {
            EngineError::NotFound { entity, id } => {
                AppError::not_found(&format!("{entity} not found: {id}"))
            }
            EngineError::Validation(message) => AppError::bad_request("VALIDATION_ERROR", &message),
            EngineError::Conflict(message) => AppError::conflict("COURSE_EXISTS", &message),
            EngineError::Locked {
                unit_id,
                resume_unit_id,
            } => AppError::forbidden(
                "UNIT_LOCKED",
                &format!("unit {unit_id} is locked; continue with {resume_unit_id}"),
            ),
            EngineError::Generation(err) => AppError::from(err),
            EngineError::Store(err) => AppError::internal(&err.to_string()),
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}

pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}
