//! 输入状态与在线状态聚合。
//!
//! typing 标记最后写入者胜，靠时间窗口自然过期；在线判定为
//! `last_seen_at` 距今不超过配置的窗口。没有清理任务。

use std::sync::Arc;

use chrono::Duration;
use domain::{Conversation, ConversationId, DomainError, TypingState, UserId};
use uuid::Uuid;

use crate::{
    clock::Clock,
    dto::{ParticipantDto, TypingStatusDto},
    error::ApplicationError,
    repository::{
        ConversationRepository, MembershipRepository, ProfileRepository, TypingRepository,
    },
};

pub struct PresenceServiceDependencies {
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub membership_repository: Arc<dyn MembershipRepository>,
    pub typing_repository: Arc<dyn TypingRepository>,
    pub profile_repository: Arc<dyn ProfileRepository>,
    pub clock: Arc<dyn Clock>,
    pub presence: config::PresenceConfig,
}

pub struct PresenceService {
    deps: PresenceServiceDependencies,
}

impl PresenceService {
    pub fn new(deps: PresenceServiceDependencies) -> Self {
        Self { deps }
    }

    async fn conversation_or_not_found(
        &self,
        id: ConversationId,
    ) -> Result<Conversation, ApplicationError> {
        self.deps
            .conversation_repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::ConversationNotFound.into())
    }

    async fn touch_last_seen(&self, user_id: UserId) {
        let now = self.deps.clock.now();
        if let Err(err) = self
            .deps
            .profile_repository
            .touch_last_seen(user_id, now)
            .await
        {
            tracing::warn!(user_id = %user_id, error = %err, "推进 last_seen_at 失败");
        }
    }

    /// 更新当前用户在会话里的输入状态。幂等。
    pub async fn set_typing(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    ) -> Result<(), ApplicationError> {
        let conversation_id = ConversationId::from(conversation_id);
        let user_id = UserId::from(user_id);
        let now = self.deps.clock.now();

        let conversation = self.conversation_or_not_found(conversation_id).await?;
        self.deps
            .membership_repository
            .ensure(conversation.id, user_id, now)
            .await?;
        self.touch_last_seen(user_id).await;

        self.deps
            .typing_repository
            .upsert(TypingState {
                conversation_id: conversation.id,
                user_id,
                is_typing,
                updated_at: now,
            })
            .await?;

        Ok(())
    }

    /// 会话的参与者在线快照与正在输入的用户集合。
    pub async fn status(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<TypingStatusDto, ApplicationError> {
        let conversation_id = ConversationId::from(conversation_id);
        let user_id = UserId::from(user_id);
        let now = self.deps.clock.now();

        let conversation = self.conversation_or_not_found(conversation_id).await?;
        self.deps
            .membership_repository
            .ensure(conversation.id, user_id, now)
            .await?;
        self.touch_last_seen(user_id).await;

        let online_window = Duration::seconds(self.deps.presence.online_window_secs);
        let typing_window = Duration::seconds(self.deps.presence.typing_window_secs);

        let participants = self
            .deps
            .membership_repository
            .list_participants(conversation.id)
            .await?
            .into_iter()
            .map(|p| ParticipantDto {
                id: Uuid::from(p.user_id),
                username: p.username.clone(),
                display_name: p.display_label(),
                last_seen_at: p.last_seen_at,
                is_online: p
                    .last_seen_at
                    .is_some_and(|seen| now - seen <= online_window),
            })
            .collect();

        let typing_ids = self
            .deps
            .typing_repository
            .list_typing_since(conversation.id, now - typing_window)
            .await?
            .into_iter()
            .map(Uuid::from)
            .collect();

        Ok(TypingStatusDto {
            participants,
            typing_ids,
        })
    }
}
