use domain::{DomainError, RepositoryError};
use thiserror::Error;

/// 应用层错误。
///
/// 限流是正常业务结果而非异常路径，但为了让调用方统一用 `?`
/// 传播，这里仍然建模成一个独立变体。
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("repository error: {0}")]
    Repository(RepositoryError),

    #[error("{detail}")]
    RateLimited { detail: String },
}

impl ApplicationError {
    pub fn rate_limited(detail: impl Into<String>) -> Self {
        Self::RateLimited {
            detail: detail.into(),
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}
