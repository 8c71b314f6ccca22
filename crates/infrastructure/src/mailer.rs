//! 登录码投递通道。
//!
//! 默认实现把邮件内容写进日志，开发与演示环境够用；
//! 生产环境换成真正的 SMTP/API 适配器即可。

use async_trait::async_trait;

use application::{LoginCodeMailer, MailerError};
use domain::UserEmail;

#[derive(Debug, Default)]
pub struct LogMailer;

impl LogMailer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LoginCodeMailer for LogMailer {
    async fn send_login_code(
        &self,
        email: &UserEmail,
        code: &str,
        ttl_minutes: i64,
    ) -> Result<(), MailerError> {
        tracing::info!(
            email = %email,
            code = %code,
            ttl_minutes,
            "登录码已生成（日志投递通道）"
        );
        Ok(())
    }
}
