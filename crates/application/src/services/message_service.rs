//! 消息分页与发送。
//!
//! 分页窗口按 `(created_at, id)` 倒序选取、升序返回；游标解析
//! 失败视为无游标而不是报错。非空窗口会把请求者的已读水位
//! 单调推进到窗口内最新一条消息的时间戳。

use std::collections::HashMap;
use std::sync::Arc;

use domain::{
    Conversation, ConversationId, DomainError, Message, MessageContent, MessageId, UserId,
    UserSummary,
};
use uuid::Uuid;

use crate::{
    clock::Clock,
    dto::{MessageDto, MessagePage, UserSummaryDto},
    error::ApplicationError,
    rate_limiter::{RateLimitPolicy, SlidingWindowLimiter},
    read_receipts,
    repository::{
        ConversationRepository, MembershipRepository, MessageRepository, UserRepository,
    },
};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone)]
pub struct FetchMessagesRequest {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub limit: Option<u32>,
    pub before: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
}

pub struct MessageServiceDependencies {
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub membership_repository: Arc<dyn MembershipRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub clock: Arc<dyn Clock>,
    pub rate_limit: config::RateLimitConfig,
}

pub struct MessageService {
    deps: MessageServiceDependencies,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
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

    /// 拉取一页消息，升序返回，并推进请求者的已读水位。
    pub async fn fetch_page(
        &self,
        request: FetchMessagesRequest,
    ) -> Result<MessagePage, ApplicationError> {
        let conversation_id = ConversationId::from(request.conversation_id);
        let user_id = UserId::from(request.user_id);
        let now = self.deps.clock.now();

        let conversation = self.conversation_or_not_found(conversation_id).await?;

        // 自动入会：访问即成员，幂等
        self.deps
            .membership_repository
            .ensure(conversation.id, user_id, now)
            .await?;

        let limit = request
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        // 游标指向的消息必须在本会话内，否则当作没有游标
        let before = match request.before {
            Some(raw) => self
                .deps
                .message_repository
                .find_in_conversation(conversation.id, MessageId::from(raw))
                .await?
                .map(|anchor| anchor.ordering_key()),
            None => None,
        };

        let mut window = self
            .deps
            .message_repository
            .list_page_desc(conversation.id, before, limit)
            .await?;
        window.reverse();

        if let Some(newest) = window.last() {
            self.deps
                .membership_repository
                .advance_last_read(conversation.id, user_id, newest.created_at)
                .await?;
        }

        let members = self
            .deps
            .membership_repository
            .list_members(conversation.id)
            .await?;
        let other_watermarks: Vec<_> = members
            .iter()
            .filter(|member| member.user_id != user_id)
            .map(|member| member.last_read_at)
            .collect();
        let read_map = read_receipts::read_by_all_map(&window, &other_watermarks);

        let (has_more, next_before) = match window.first() {
            Some(oldest) => {
                let has_more = self
                    .deps
                    .message_repository
                    .has_older(conversation.id, oldest.ordering_key())
                    .await?;
                (has_more, has_more.then(|| Uuid::from(oldest.id)))
            }
            None => (false, None),
        };

        let senders = self.sender_summaries(&window).await?;
        let results = window
            .iter()
            .map(|message| {
                self.to_dto(
                    message,
                    &senders,
                    message.sender_id == user_id,
                    read_map.get(&message.id).copied().unwrap_or(false),
                )
            })
            .collect();

        Ok(MessagePage {
            results,
            has_more,
            next_before,
        })
    }

    /// 追加一条消息。限流在任何写入之前检查。
    pub async fn send(&self, request: SendMessageRequest) -> Result<MessageDto, ApplicationError> {
        let conversation_id = ConversationId::from(request.conversation_id);
        let sender_id = UserId::from(request.user_id);
        let now = self.deps.clock.now();

        let conversation = self.conversation_or_not_found(conversation_id).await?;
        self.deps
            .membership_repository
            .ensure(conversation.id, sender_id, now)
            .await?;

        let content = MessageContent::parse(request.content)?;

        let policy = RateLimitPolicy::per_minute(self.deps.rate_limit.messages_per_minute);
        if !self
            .deps
            .limiter
            .check_and_record(&format!("message:{sender_id}"), policy)
        {
            tracing::debug!(user_id = %sender_id, "消息发送触发限流");
            return Err(ApplicationError::rate_limited(
                "You're sending messages too quickly. Please slow down for a moment.",
            ));
        }

        let message = Message::new(
            MessageId::new(Uuid::new_v4()),
            conversation.id,
            sender_id,
            content,
            now,
        );
        let message = self.deps.message_repository.create(message).await?;

        self.deps
            .conversation_repository
            .touch_updated_at(conversation.id, self.deps.clock.now())
            .await?;

        let senders = self.sender_summaries(std::slice::from_ref(&message)).await?;
        Ok(self.to_dto(&message, &senders, true, false))
    }

    async fn sender_summaries(
        &self,
        messages: &[Message],
    ) -> Result<HashMap<UserId, UserSummary>, ApplicationError> {
        let mut ids: Vec<UserId> = messages.iter().map(|m| m.sender_id).collect();
        ids.sort();
        ids.dedup();

        let summaries = self.deps.user_repository.summaries_by_ids(&ids).await?;
        Ok(summaries.into_iter().map(|s| (s.id, s)).collect())
    }

    fn to_dto(
        &self,
        message: &Message,
        senders: &HashMap<UserId, UserSummary>,
        is_mine: bool,
        read_by_all: bool,
    ) -> MessageDto {
        let sender = senders
            .get(&message.sender_id)
            .map(UserSummaryDto::from)
            .unwrap_or_else(|| UserSummaryDto {
                id: Uuid::from(message.sender_id),
                username: String::new(),
                display_name: String::new(),
                avatar_color: String::new(),
            });

        MessageDto {
            id: Uuid::from(message.id),
            conversation: Uuid::from(message.conversation_id),
            sender,
            content: message.content.as_str().to_owned(),
            created_at: message.created_at,
            is_mine,
            read_by_all,
        }
    }
}
