use serde::{Deserialize, Serialize};

use crate::value_objects::{ConversationId, Timestamp, UserId};

/// 会话：两人及以上参与者之间的逻辑聊天通道。
///
/// `updated_at` 在每条新消息写入时被推进，会话列表按它倒序。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub is_group: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Conversation {
    /// 新建 1:1 会话。标题仅是展示性元数据，由创建时对方的
    /// 显示名决定，不参与任何业务判断。
    pub fn new_direct(id: ConversationId, title: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id,
            title: title.into(),
            is_group: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 会话成员关系。(conversation, user) 上唯一。
///
/// `last_read_at` 是已读水位：该成员已看完此时间点之前的所有消息。
/// 只允许单调推进，绝不回退。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMember {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub joined_at: Timestamp,
    pub is_admin: bool,
    pub last_read_at: Option<Timestamp>,
}

impl ConversationMember {
    pub fn new(conversation_id: ConversationId, user_id: UserId, now: Timestamp) -> Self {
        Self {
            conversation_id,
            user_id,
            joined_at: now,
            is_admin: false,
            last_read_at: None,
        }
    }
}

/// 会话参与者读模型：成员关系连同用户名与资料字段，
/// 供在线状态聚合使用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user_id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub last_seen_at: Option<Timestamp>,
    pub joined_at: Timestamp,
}

impl Participant {
    /// 展示名：资料里的 display_name，否则用户名，否则字面量
    /// "User"。绝不返回原始邮箱。
    pub fn display_label(&self) -> String {
        resolve_display_label(self.display_name.as_deref(), &self.username)
    }
}

/// 统一的展示名回退规则。含 `@` 的用户名按邮箱处理，只保留
/// 本地部分。
pub fn resolve_display_label(display_name: Option<&str>, username: &str) -> String {
    let display_name = display_name.unwrap_or("").trim();
    if !display_name.is_empty() {
        return display_name.to_owned();
    }
    let username = username.trim();
    if username.is_empty() {
        return "User".to_owned();
    }
    username.split('@').next().unwrap_or("User").to_owned()
}
