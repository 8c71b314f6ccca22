use serde::{Deserialize, Serialize};

use crate::value_objects::{LoginCodeId, Timestamp, UserId};

/// 发送到用户邮箱的一次性登录码。
///
/// 一个用户可以同时存在多条记录；只有最近一条未使用、未过期
/// 且码值匹配的才有效。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCode {
    pub id: LoginCodeId,
    pub user_id: UserId,
    pub code: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub is_used: bool,
}

impl LoginCode {
    pub fn new(
        id: LoginCodeId,
        user_id: UserId,
        code: impl Into<String>,
        created_at: Timestamp,
        expires_at: Timestamp,
    ) -> Self {
        Self {
            id,
            user_id,
            code: code.into(),
            created_at,
            expires_at,
            is_used: false,
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }

    /// 码值比较不区分大小写。
    pub fn matches(&self, candidate: &str) -> bool {
        self.code.eq_ignore_ascii_case(candidate.trim())
    }
}
