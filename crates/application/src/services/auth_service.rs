//! 一次性邮箱登录码认证。
//!
//! 申请：按邮箱隐式建号 → 限流 → 落库一条限时登录码 → 交给
//! 发信通道（fire-and-forget）。
//! 验证：取最近一条未用未过期且匹配的码，标记已用，补齐资料
//! 与引用码，返回不透明令牌。

use std::sync::Arc;

use chrono::Duration;
use domain::{DomainError, LoginCode, LoginCodeId, Profile, UserEmail, UserId};
use uuid::Uuid;

use crate::{
    clock::Clock,
    codes,
    dto::{AuthUserDto, AuthenticatedUserDto, ProfileDto},
    error::ApplicationError,
    mailer::LoginCodeMailer,
    rate_limiter::{RateLimitPolicy, SlidingWindowLimiter},
    repository::{
        AuthTokenRepository, LoginCodeRepository, ProfileRepository, UserRepository,
    },
};

pub struct AuthServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub profile_repository: Arc<dyn ProfileRepository>,
    pub login_code_repository: Arc<dyn LoginCodeRepository>,
    pub token_repository: Arc<dyn AuthTokenRepository>,
    pub mailer: Arc<dyn LoginCodeMailer>,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub clock: Arc<dyn Clock>,
    pub login_code: config::LoginCodeConfig,
    pub ref_code: config::RefCodeConfig,
    pub rate_limit: config::RateLimitConfig,
}

pub struct AuthService {
    deps: AuthServiceDependencies,
}

impl AuthService {
    pub fn new(deps: AuthServiceDependencies) -> Self {
        Self { deps }
    }

    /// 申请登录码。用户不存在则按邮箱创建，用户名默认取
    /// 邮箱本地部分。
    pub async fn request_login_code(&self, raw_email: &str) -> Result<(), ApplicationError> {
        let email = UserEmail::parse(raw_email)?;
        let now = self.deps.clock.now();

        let user = self
            .deps
            .user_repository
            .upsert_by_email(email.clone(), email.local_part().to_owned(), now)
            .await?;

        let policy = RateLimitPolicy::per_minute(self.deps.rate_limit.login_codes_per_minute);
        if !self
            .deps
            .limiter
            .check_and_record(&format!("login_code:{}", user.id), policy)
        {
            tracing::debug!(user_id = %user.id, "登录码申请触发限流");
            return Err(ApplicationError::rate_limited(
                "Too many login code requests. Please wait a bit before trying again.",
            ));
        }

        let code = codes::random_code(self.deps.login_code.length);
        let ttl = self.deps.login_code.ttl_minutes;
        let login_code = LoginCode::new(
            LoginCodeId::new(Uuid::new_v4()),
            user.id,
            code.clone(),
            now,
            now + Duration::minutes(ttl),
        );
        self.deps.login_code_repository.create(login_code).await?;

        // 投递失败不影响请求结果
        if let Err(err) = self
            .deps
            .mailer
            .send_login_code(&email, &code, ttl)
            .await
        {
            tracing::warn!(user_id = %user.id, error = %err, "登录码投递失败");
        }

        Ok(())
    }

    /// 验证登录码并签发令牌。
    pub async fn verify_login_code(
        &self,
        raw_email: &str,
        raw_code: &str,
    ) -> Result<AuthenticatedUserDto, ApplicationError> {
        let email = UserEmail::parse(raw_email)?;
        let code = raw_code.trim().to_uppercase();
        if code.is_empty() {
            return Err(DomainError::invalid_argument("code", "is required").into());
        }

        let now = self.deps.clock.now();
        let user = self
            .deps
            .user_repository
            .find_by_email(&email)
            .await?
            .ok_or(DomainError::LoginCodeInvalid)?;

        let login_code = self
            .deps
            .login_code_repository
            .find_latest_valid(user.id, &code, now)
            .await?
            .ok_or(DomainError::LoginCodeInvalid)?;
        self.deps
            .login_code_repository
            .mark_used(login_code.id)
            .await?;

        // 用户名含邮箱时收窄到本地部分，避免对外泄露
        let username = if user.username.contains('@') {
            let local = user
                .username
                .split('@')
                .next()
                .unwrap_or(&user.username)
                .to_owned();
            self.deps
                .user_repository
                .update_username(user.id, local.clone())
                .await?;
            local
        } else {
            user.username.clone()
        };

        let profile = self.ensure_ref_code(user.id).await?;
        let ref_code = profile.ref_code.clone().unwrap_or_default();

        let token = self
            .deps
            .token_repository
            .get_or_create(user.id, codes::random_token_key(), now)
            .await?;

        tracing::info!(user_id = %user.id, "登录码验证通过");

        Ok(AuthenticatedUserDto {
            token,
            user: AuthUserDto {
                id: Uuid::from(user.id),
                username,
                email: email.as_str().to_owned(),
                ref_code,
                display_name: profile.display_name,
                avatar_color: profile.avatar_color,
            },
        })
    }

    /// 确保资料存在且带引用码。碰撞时换码重试，重试耗尽
    /// 返回 `RefCodeSpaceExhausted` 而不是死循环。
    async fn ensure_ref_code(&self, user_id: UserId) -> Result<Profile, ApplicationError> {
        let now = self.deps.clock.now();
        let profile = self.deps.profile_repository.ensure(user_id, now).await?;
        if profile.ref_code.is_some() {
            return Ok(profile);
        }

        for _ in 0..self.deps.ref_code.max_attempts {
            let candidate = codes::random_code(self.deps.ref_code.length);
            if self
                .deps
                .profile_repository
                .claim_ref_code(user_id, &candidate)
                .await?
            {
                return self
                    .deps
                    .profile_repository
                    .find_by_user(user_id)
                    .await?
                    .ok_or_else(|| domain::RepositoryError::NotFound.into());
            }
        }

        tracing::error!(user_id = %user_id, "引用码重试耗尽");
        Err(DomainError::RefCodeSpaceExhausted.into())
    }

    /// 不透明令牌 → 用户。认证中间件使用。
    pub async fn resolve_token(&self, key: &str) -> Result<Option<UserId>, ApplicationError> {
        Ok(self.deps.token_repository.find_user_by_key(key).await?)
    }

    /// `/me/profile/` 的读形状。
    pub async fn my_profile(&self, user_id: Uuid) -> Result<ProfileDto, ApplicationError> {
        let user_id = UserId::from(user_id);
        let now = self.deps.clock.now();

        let user = self
            .deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .ok_or(DomainError::UserNotFound)?;
        let profile = self.deps.profile_repository.ensure(user_id, now).await?;

        if let Err(err) = self
            .deps
            .profile_repository
            .touch_last_seen(user_id, now)
            .await
        {
            tracing::warn!(user_id = %user_id, error = %err, "推进 last_seen_at 失败");
        }

        Ok(ProfileDto {
            user_id: Uuid::from(user.id),
            email: user.email.as_str().to_owned(),
            display_name: profile.display_name,
            ref_code: profile.ref_code.unwrap_or_default(),
            avatar_color: profile.avatar_color,
        })
    }

    /// 更新展示字段。`ref_code` 只读。
    pub async fn update_my_profile(
        &self,
        user_id: Uuid,
        display_name: Option<String>,
        avatar_color: Option<String>,
    ) -> Result<ProfileDto, ApplicationError> {
        let user_id = UserId::from(user_id);
        let now = self.deps.clock.now();

        let user = self
            .deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .ok_or(DomainError::UserNotFound)?;
        self.deps.profile_repository.ensure(user_id, now).await?;

        let profile = self
            .deps
            .profile_repository
            .update_profile(user_id, display_name, avatar_color)
            .await?;

        Ok(ProfileDto {
            user_id: Uuid::from(user.id),
            email: user.email.as_str().to_owned(),
            display_name: profile.display_name,
            ref_code: profile.ref_code.unwrap_or_default(),
            avatar_color: profile.avatar_color,
        })
    }
}
