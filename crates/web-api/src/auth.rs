//! 不透明令牌认证。
//!
//! 客户端在 `Authorization` 头里携带 `Token <key>`（兼容
//! `Bearer <key>`），提取器负责把它解析成当前用户。

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// 已认证的当前用户。
pub struct CurrentUser(pub Uuid);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ApiError::unauthorized("Authentication credentials were not provided.")
            })?;

        let key = header
            .strip_prefix("Token ")
            .or_else(|| header.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthorized("Invalid authorization header."))?;

        let user_id = state
            .auth_service
            .resolve_token(key.trim())
            .await
            .map_err(ApiError::from)?
            .ok_or_else(|| ApiError::unauthorized("Invalid token."))?;

        Ok(Self(Uuid::from(user_id)))
    }
}
