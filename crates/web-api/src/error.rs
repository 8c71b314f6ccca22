use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// 对外错误体。所有错误都渲染成 `{"detail": ...}`。
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                detail: detail.into(),
            },
        }
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use domain::DomainError;

        match error {
            ApplicationError::Domain(domain_err) => match &domain_err {
                DomainError::InvalidArgument { .. }
                | DomainError::SelfConversation
                | DomainError::LoginCodeInvalid => {
                    ApiError::new(StatusCode::BAD_REQUEST, domain_err.to_string())
                }
                DomainError::ConversationNotFound
                | DomainError::UserNotFound
                | DomainError::RefCodeNotFound => {
                    ApiError::new(StatusCode::NOT_FOUND, domain_err.to_string())
                }
                DomainError::RefCodeSpaceExhausted => {
                    tracing::error!(error = %domain_err, "引用码分配失败");
                    ApiError::new(StatusCode::SERVICE_UNAVAILABLE, domain_err.to_string())
                }
            },
            ApplicationError::RateLimited { detail } => {
                ApiError::new(StatusCode::TOO_MANY_REQUESTS, detail)
            }
            ApplicationError::Repository(repo_err) => {
                tracing::error!(error = %repo_err, "仓储层错误");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error.",
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
