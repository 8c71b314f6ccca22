use serde::{Deserialize, Serialize};

use crate::value_objects::{ConversationId, Timestamp, UserId};

/// 每个 (conversation, user) 的输入状态，最后写入者胜。
///
/// 过期的 typing 标记靠时间窗口自然失效，没有清理任务。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingState {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub is_typing: bool,
    pub updated_at: Timestamp,
}

impl TypingState {
    /// 该标记在 `now` 往前 `window` 秒内是否仍算有效。
    pub fn is_active(&self, now: Timestamp, window: chrono::Duration) -> bool {
        self.is_typing && self.updated_at >= now - window
    }
}
