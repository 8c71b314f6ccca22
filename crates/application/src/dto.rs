//! 对外 JSON 形状。字段名是 API 兼容性的一部分，不要改。

use domain::{Conversation, Timestamp, UserSummary};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDto {
    pub id: Uuid,
    pub title: String,
    pub is_group: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<&Conversation> for ConversationDto {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: Uuid::from(conversation.id),
            title: conversation.title.clone(),
            is_group: conversation.is_group,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationPage {
    pub results: Vec<ConversationDto>,
    pub has_more: bool,
    pub next_offset: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummaryDto {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub avatar_color: String,
}

impl From<&UserSummary> for UserSummaryDto {
    fn from(summary: &UserSummary) -> Self {
        Self {
            id: Uuid::from(summary.id),
            username: summary.username.clone(),
            display_name: summary.display_name.clone(),
            avatar_color: summary.avatar_color.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: Uuid,
    pub conversation: Uuid,
    pub sender: UserSummaryDto,
    pub content: String,
    pub created_at: Timestamp,
    pub is_mine: bool,
    pub read_by_all: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub results: Vec<MessageDto>,
    pub has_more: bool,
    pub next_before: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantDto {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub last_seen_at: Option<Timestamp>,
    pub is_online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingStatusDto {
    pub participants: Vec<ParticipantDto>,
    pub typing_ids: Vec<Uuid>,
}

/// 验证登录码成功后的返回：令牌 + 用户摘要。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUserDto {
    pub token: String,
    pub user: AuthUserDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUserDto {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub ref_code: String,
    pub display_name: String,
    pub avatar_color: String,
}

/// `/me/profile/` 的读形状。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDto {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub ref_code: String,
    pub avatar_color: String,
}
