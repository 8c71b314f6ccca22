//! 领域错误定义。

use thiserror::Error;

/// 领域错误类型。
///
/// 变体按对外语义划分：输入非法、资源不存在、非法操作、
/// 以及登录码 / 引用码相关的失败。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("{field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("conversation not found")]
    ConversationNotFound,

    #[error("user not found")]
    UserNotFound,

    /// ref_code 未命中任何用户。
    #[error("no user found with this code")]
    RefCodeNotFound,

    /// 不能与自己建立 1:1 会话。
    #[error("cannot start a conversation with yourself")]
    SelfConversation,

    /// 登录码不存在、已过期或已被使用。统一成一个变体，
    /// 避免对外泄露到底是哪一种。
    #[error("invalid or expired code")]
    LoginCodeInvalid,

    /// 引用码空间重试耗尽。
    #[error("unable to allocate a unique ref code")]
    RefCodeSpaceExhausted,
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 仓储层错误。
///
/// `Conflict` 专门用于唯一约束冲突，调用方据此实现
/// “插入失败则取已有记录”的幂等语义。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("unique constraint conflict")]
    Conflict,

    #[error("record not found")]
    NotFound,
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
