use async_trait::async_trait;
use domain::UserEmail;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// 登录码出站投递通道。
///
/// 发送是 fire-and-forget：投递失败由调用方记日志，
/// 不会让发码请求失败。
#[async_trait]
pub trait LoginCodeMailer: Send + Sync {
    async fn send_login_code(
        &self,
        email: &UserEmail,
        code: &str,
        ttl_minutes: i64,
    ) -> Result<(), MailerError>;
}
