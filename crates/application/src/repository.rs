//! 仓储端口。
//!
//! 应用层只依赖这些 trait；PostgreSQL 实现在 infrastructure，
//! 测试用的内存实现在 [`crate::testing`]。
//!
//! 两个易竞态的操作——成员关系 get-or-create 与 1:1 会话
//! find-or-create——都要求实现方依赖存储层的唯一约束做原子的
//! 条件插入，绝不允许裸的先查后插。

use async_trait::async_trait;
use domain::{
    Conversation, ConversationId, ConversationMember, LoginCode, LoginCodeId, Message, MessageId,
    Participant, Profile, RepositoryError, Timestamp, TypingState, User, UserEmail, UserId,
    UserSummary,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 按邮箱取用户，不存在则以默认用户名原子地创建。
    async fn upsert_by_email(
        &self,
        email: UserEmail,
        default_username: String,
        now: Timestamp,
    ) -> Result<User, RepositoryError>;

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn update_username(&self, id: UserId, username: String) -> Result<(), RepositoryError>;

    /// 连同资料字段的用户摘要，供消息发送者展示。
    async fn summaries_by_ids(&self, ids: &[UserId]) -> Result<Vec<UserSummary>, RepositoryError>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// 资料 get-or-create，幂等。
    async fn ensure(&self, user_id: UserId, now: Timestamp) -> Result<Profile, RepositoryError>;

    async fn find_by_user(&self, user_id: UserId) -> Result<Option<Profile>, RepositoryError>;

    /// 尝试把引用码绑定到用户。返回 `false` 表示码已被占用，
    /// 调用方换一个重试。
    async fn claim_ref_code(&self, user_id: UserId, code: &str) -> Result<bool, RepositoryError>;

    /// 按引用码查资料，不区分大小写。
    async fn find_by_ref_code(&self, code: &str) -> Result<Option<Profile>, RepositoryError>;

    async fn update_profile(
        &self,
        user_id: UserId,
        display_name: Option<String>,
        avatar_color: Option<String>,
    ) -> Result<Profile, RepositoryError>;

    /// 推进 last_seen_at。尽力而为，失败由调用方记日志。
    async fn touch_last_seen(&self, user_id: UserId, now: Timestamp)
        -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create(&self, conversation: Conversation) -> Result<Conversation, RepositoryError>;

    async fn find_by_id(&self, id: ConversationId)
        -> Result<Option<Conversation>, RepositoryError>;

    /// 用户参与的会话，按 `updated_at` 倒序；同时返回总数。
    async fn list_for_user(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Conversation>, u64), RepositoryError>;

    /// 两个用户之间已存在的非群聊会话。历史竞态可能留下多个，
    /// 按存储自然序（created_at, id）取第一个，后续查询收敛到它。
    async fn find_direct_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    async fn touch_updated_at(
        &self,
        id: ConversationId,
        now: Timestamp,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// 成员关系 get-or-create（自动入会）。唯一约束 + 条件插入，
    /// 并发下绝不报错、绝不产生重复行。
    async fn ensure(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        now: Timestamp,
    ) -> Result<ConversationMember, RepositoryError>;

    /// 批量插入成员，冲突行静默跳过。
    async fn insert_ignoring_conflicts(
        &self,
        members: &[ConversationMember],
    ) -> Result<(), RepositoryError>;

    /// 会话全部成员，按 joined_at 升序。
    async fn list_members(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<ConversationMember>, RepositoryError>;

    /// 成员连同用户名/资料的参与者读模型，按 joined_at 升序。
    async fn list_participants(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Participant>, RepositoryError>;

    /// 单调推进已读水位：仅当 `up_to` 大于当前值时才更新。
    async fn advance_last_read(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        up_to: Timestamp,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError>;

    /// 游标解析：消息必须属于该会话，否则按不存在处理。
    async fn find_in_conversation(
        &self,
        conversation_id: ConversationId,
        id: MessageId,
    ) -> Result<Option<Message>, RepositoryError>;

    /// 取排序键严格小于 `before` 的最近 `limit` 条消息，
    /// 按 `(created_at, id)` 倒序。`before` 为空则从最新开始。
    async fn list_page_desc(
        &self,
        conversation_id: ConversationId,
        before: Option<(Timestamp, MessageId)>,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// 是否存在排序键严格小于 `than` 的消息。
    async fn has_older(
        &self,
        conversation_id: ConversationId,
        than: (Timestamp, MessageId),
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait LoginCodeRepository: Send + Sync {
    async fn create(&self, code: LoginCode) -> Result<LoginCode, RepositoryError>;

    /// 最近一条未使用、未过期且码值匹配（不区分大小写）的记录。
    async fn find_latest_valid(
        &self,
        user_id: UserId,
        candidate: &str,
        now: Timestamp,
    ) -> Result<Option<LoginCode>, RepositoryError>;

    async fn mark_used(&self, id: LoginCodeId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AuthTokenRepository: Send + Sync {
    /// 每用户一个不透明令牌；已有则返回现有键。
    async fn get_or_create(
        &self,
        user_id: UserId,
        candidate_key: String,
        now: Timestamp,
    ) -> Result<String, RepositoryError>;

    async fn find_user_by_key(&self, key: &str) -> Result<Option<UserId>, RepositoryError>;
}

#[async_trait]
pub trait TypingRepository: Send + Sync {
    /// (conversation, user) 上的 upsert，最后写入者胜。
    async fn upsert(&self, state: TypingState) -> Result<(), RepositoryError>;

    /// `updated_at >= since` 且 is_typing 的去重用户列表。
    async fn list_typing_since(
        &self,
        conversation_id: ConversationId,
        since: Timestamp,
    ) -> Result<Vec<UserId>, RepositoryError>;
}
