//! 领域层。
//!
//! 定义聊天服务的核心实体与值对象：会话、成员关系、消息、
//! 登录码、用户资料与输入状态，以及统一的领域错误类型。

pub mod conversation;
pub mod errors;
pub mod login_code;
pub mod message;
pub mod typing;
pub mod user;
pub mod value_objects;

pub use conversation::{Conversation, ConversationMember, Participant};
pub use errors::{DomainError, RepositoryError};
pub use login_code::LoginCode;
pub use message::Message;
pub use typing::TypingState;
pub use user::{Profile, User, UserSummary};
pub use value_objects::{
    ConversationId, LoginCodeId, MessageContent, MessageId, Timestamp, UserEmail, UserId,
};
