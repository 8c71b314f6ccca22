use serde::{Deserialize, Serialize};

use crate::conversation::resolve_display_label;
use crate::value_objects::{Timestamp, UserEmail, UserId};

/// 账户主体。按邮箱首次请求登录码时隐式创建。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: UserEmail,
    pub created_at: Timestamp,
}

/// 每用户的轻量资料。
///
/// `ref_code` 是公开的短引用码，用于在不暴露邮箱的前提下
/// 发起 1:1 会话；首次验证登录时分配，全局唯一。
/// `last_seen_at` 由任何已认证访问尽力而为地推进。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub ref_code: Option<String>,
    pub display_name: String,
    pub avatar_color: String,
    pub last_seen_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Profile {
    pub fn new(user_id: UserId, now: Timestamp) -> Self {
        Self {
            user_id,
            ref_code: None,
            display_name: String::new(),
            avatar_color: String::new(),
            last_seen_at: None,
            created_at: now,
        }
    }
}

/// 消息发送者等场景使用的用户摘要读模型。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
    pub avatar_color: String,
}

impl UserSummary {
    pub fn display_label(&self) -> String {
        resolve_display_label(Some(&self.display_name), &self.username)
    }
}
