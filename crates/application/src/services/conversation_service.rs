//! 会话列表与 1:1 会话解析。

use std::sync::Arc;

use domain::{
    Conversation, ConversationId, ConversationMember, DomainError, UserId,
};
use uuid::Uuid;

use crate::{
    clock::Clock,
    dto::{ConversationDto, ConversationPage},
    error::ApplicationError,
    repository::{
        ConversationRepository, MembershipRepository, ProfileRepository, UserRepository,
    },
};

pub const DEFAULT_LIST_SIZE: u32 = 20;
pub const MAX_LIST_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct ListConversationsRequest {
    pub user_id: Uuid,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub struct ConversationServiceDependencies {
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub membership_repository: Arc<dyn MembershipRepository>,
    pub profile_repository: Arc<dyn ProfileRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct ConversationService {
    deps: ConversationServiceDependencies,
}

impl ConversationService {
    pub fn new(deps: ConversationServiceDependencies) -> Self {
        Self { deps }
    }

    /// 已认证访问顺带推进 last_seen_at，失败只记日志。
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

    /// 当前用户的会话列表，按 `updated_at` 倒序。
    ///
    /// 1:1 会话的标题按查看者重写为对方的显示名；任何混进
    /// 标题的邮箱都在 `@` 处截断。
    pub async fn list(
        &self,
        request: ListConversationsRequest,
    ) -> Result<ConversationPage, ApplicationError> {
        let user_id = UserId::from(request.user_id);
        self.touch_last_seen(user_id).await;

        let limit = request
            .limit
            .unwrap_or(DEFAULT_LIST_SIZE)
            .clamp(1, MAX_LIST_SIZE);
        let offset = request.offset.unwrap_or(0);

        let (conversations, total) = self
            .deps
            .conversation_repository
            .list_for_user(user_id, limit, offset)
            .await?;

        let mut results = Vec::with_capacity(conversations.len());
        for conversation in &conversations {
            let mut dto = ConversationDto::from(conversation);
            if !conversation.is_group {
                dto.title = self.direct_title_for(conversation, user_id).await?;
            }
            if let Some(local) = dto.title.split('@').next() {
                if local.len() < dto.title.len() {
                    dto.title = local.to_owned();
                }
            }
            results.push(dto);
        }

        let fetched = results.len() as u64;
        let has_more = offset as u64 + fetched < total;
        let next_offset = has_more.then(|| offset + fetched as u32);

        Ok(ConversationPage {
            results,
            has_more,
            next_offset,
        })
    }

    /// 1:1 会话标题 = 对方的显示名。对方缺席（历史数据）时
    /// 退回自己的显示名。
    async fn direct_title_for(
        &self,
        conversation: &Conversation,
        viewer: UserId,
    ) -> Result<String, ApplicationError> {
        let participants = self
            .deps
            .membership_repository
            .list_participants(conversation.id)
            .await?;

        let subject = participants
            .iter()
            .find(|p| p.user_id != viewer)
            .or_else(|| participants.iter().find(|p| p.user_id == viewer));

        Ok(subject
            .map(|p| p.display_label())
            .unwrap_or_else(|| "User".to_owned()))
    }

    /// 用引用码找到或创建与对方的 1:1 会话。
    ///
    /// 查找按存储自然序取第一个；创建时两条成员关系走一次
    /// 冲突静默的批量插入，并发重复入会不报错。
    pub async fn start_direct(
        &self,
        user_id: Uuid,
        raw_ref_code: &str,
    ) -> Result<ConversationDto, ApplicationError> {
        let requester = UserId::from(user_id);
        let ref_code = raw_ref_code.trim().to_uppercase();
        if ref_code.is_empty() {
            return Err(DomainError::invalid_argument("ref_code", "is required").into());
        }

        let target_profile = self
            .deps
            .profile_repository
            .find_by_ref_code(&ref_code)
            .await?
            .ok_or(DomainError::RefCodeNotFound)?;
        let target = target_profile.user_id;

        self.touch_last_seen(requester).await;

        if target == requester {
            return Err(DomainError::SelfConversation.into());
        }

        if let Some(existing) = self
            .deps
            .conversation_repository
            .find_direct_between(requester, target)
            .await?
        {
            return Ok(ConversationDto::from(&existing));
        }

        let title = self.display_label_of(target).await?;
        let now = self.deps.clock.now();
        let conversation = Conversation::new_direct(
            ConversationId::new(Uuid::new_v4()),
            title,
            now,
        );
        let conversation = self
            .deps
            .conversation_repository
            .create(conversation)
            .await?;

        self.deps
            .membership_repository
            .insert_ignoring_conflicts(&[
                ConversationMember::new(conversation.id, requester, now),
                ConversationMember::new(conversation.id, target, now),
            ])
            .await?;

        tracing::info!(
            conversation_id = %conversation.id,
            requester = %requester,
            target = %target,
            "创建 1:1 会话"
        );

        Ok(ConversationDto::from(&conversation))
    }

    async fn display_label_of(&self, user_id: UserId) -> Result<String, ApplicationError> {
        let summaries = self
            .deps
            .user_repository
            .summaries_by_ids(&[user_id])
            .await?;
        Ok(summaries
            .first()
            .map(|s| s.display_label())
            .unwrap_or_else(|| "User".to_owned()))
    }
}
