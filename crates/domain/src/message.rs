use serde::{Deserialize, Serialize};

use crate::value_objects::{ConversationId, MessageContent, MessageId, Timestamp, UserId};

/// 会话内的一条消息。创建后不可变。
///
/// 分页排序键是 `(created_at, id)`：时间戳相同的消息用 id
/// 打破平局，保证全序。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: MessageContent,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            conversation_id,
            sender_id,
            content,
            created_at,
        }
    }

    /// 分页排序键。
    pub fn ordering_key(&self) -> (Timestamp, MessageId) {
        (self.created_at, self.id)
    }
}
