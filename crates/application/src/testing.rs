//! 内存仓储实现。
//!
//! 单元测试用的存储替身：一个 `MemoryStore` 实现全部仓储端口，
//! 语义与 PostgreSQL 实现保持一致（唯一约束、单调水位、
//! 自然序收敛）。

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use domain::{
    Conversation, ConversationId, ConversationMember, LoginCode, LoginCodeId, Message, MessageId,
    Participant, Profile, RepositoryError, Timestamp, TypingState, User, UserEmail, UserId,
    UserSummary,
};
use uuid::Uuid;

use crate::mailer::{LoginCodeMailer, MailerError};
use crate::repository::{
    AuthTokenRepository, ConversationRepository, LoginCodeRepository, MembershipRepository,
    MessageRepository, ProfileRepository, TypingRepository, UserRepository,
};

#[derive(Default)]
struct State {
    users: Vec<User>,
    profiles: Vec<Profile>,
    conversations: Vec<Conversation>,
    members: Vec<ConversationMember>,
    messages: Vec<Message>,
    login_codes: Vec<LoginCode>,
    tokens: HashMap<String, (UserId, Timestamp)>,
    typing: Vec<TypingState>,
}

/// 全部仓储端口的内存实现。
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 测试脚手架：直接写入一条成员的已读水位。
    pub fn set_last_read(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        at: Option<Timestamp>,
    ) {
        let mut state = self.lock();
        if let Some(member) = state
            .members
            .iter_mut()
            .find(|m| m.conversation_id == conversation_id && m.user_id == user_id)
        {
            member.last_read_at = at;
        }
    }

    /// 测试脚手架：读取一条成员的已读水位。
    pub fn last_read(&self, conversation_id: ConversationId, user_id: UserId) -> Option<Timestamp> {
        let state = self.lock();
        state
            .members
            .iter()
            .find(|m| m.conversation_id == conversation_id && m.user_id == user_id)
            .and_then(|m| m.last_read_at)
    }

    /// 测试脚手架：最近为某用户落库的登录码码值。
    pub fn latest_login_code(&self, user_id: UserId) -> Option<String> {
        let state = self.lock();
        state
            .login_codes
            .iter()
            .filter(|c| c.user_id == user_id)
            .max_by_key(|c| c.created_at)
            .map(|c| c.code.clone())
    }

    /// 测试脚手架：会话总数。
    pub fn conversation_count(&self) -> usize {
        self.lock().conversations.len()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn upsert_by_email(
        &self,
        email: UserEmail,
        default_username: String,
        now: Timestamp,
    ) -> Result<User, RepositoryError> {
        let mut state = self.lock();
        if let Some(user) = state.users.iter().find(|u| u.email == email) {
            return Ok(user.clone());
        }
        let user = User {
            id: UserId::new(Uuid::new_v4()),
            username: default_username,
            email,
            created_at: now,
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        let state = self.lock();
        Ok(state.users.iter().find(|u| &u.email == email).cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let state = self.lock();
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn update_username(&self, id: UserId, username: String) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepositoryError::NotFound)?;
        user.username = username;
        Ok(())
    }

    async fn summaries_by_ids(&self, ids: &[UserId]) -> Result<Vec<UserSummary>, RepositoryError> {
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.users.iter().find(|u| u.id == *id))
            .map(|user| {
                let profile = state.profiles.iter().find(|p| p.user_id == user.id);
                UserSummary {
                    id: user.id,
                    username: user.username.clone(),
                    display_name: profile
                        .map(|p| p.display_name.clone())
                        .unwrap_or_default(),
                    avatar_color: profile
                        .map(|p| p.avatar_color.clone())
                        .unwrap_or_default(),
                }
            })
            .collect())
    }
}

#[async_trait]
impl ProfileRepository for MemoryStore {
    async fn ensure(&self, user_id: UserId, now: Timestamp) -> Result<Profile, RepositoryError> {
        let mut state = self.lock();
        if let Some(profile) = state.profiles.iter().find(|p| p.user_id == user_id) {
            return Ok(profile.clone());
        }
        let profile = Profile::new(user_id, now);
        state.profiles.push(profile.clone());
        Ok(profile)
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Option<Profile>, RepositoryError> {
        let state = self.lock();
        Ok(state.profiles.iter().find(|p| p.user_id == user_id).cloned())
    }

    async fn claim_ref_code(&self, user_id: UserId, code: &str) -> Result<bool, RepositoryError> {
        let mut state = self.lock();
        let taken = state.profiles.iter().any(|p| {
            p.user_id != user_id
                && p.ref_code
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(code))
        });
        if taken {
            return Ok(false);
        }
        let profile = state
            .profiles
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or(RepositoryError::NotFound)?;
        if profile.ref_code.is_none() {
            profile.ref_code = Some(code.to_owned());
        }
        Ok(true)
    }

    async fn find_by_ref_code(&self, code: &str) -> Result<Option<Profile>, RepositoryError> {
        let state = self.lock();
        Ok(state
            .profiles
            .iter()
            .find(|p| {
                p.ref_code
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(code))
            })
            .cloned())
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        display_name: Option<String>,
        avatar_color: Option<String>,
    ) -> Result<Profile, RepositoryError> {
        let mut state = self.lock();
        let profile = state
            .profiles
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or(RepositoryError::NotFound)?;
        if let Some(display_name) = display_name {
            profile.display_name = display_name;
        }
        if let Some(avatar_color) = avatar_color {
            profile.avatar_color = avatar_color;
        }
        Ok(profile.clone())
    }

    async fn touch_last_seen(
        &self,
        user_id: UserId,
        now: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if let Some(profile) = state.profiles.iter_mut().find(|p| p.user_id == user_id) {
            profile.last_seen_at = Some(now);
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationRepository for MemoryStore {
    async fn create(&self, conversation: Conversation) -> Result<Conversation, RepositoryError> {
        let mut state = self.lock();
        state.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let state = self.lock();
        Ok(state.conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Conversation>, u64), RepositoryError> {
        let state = self.lock();
        let mut joined: Vec<Conversation> = state
            .conversations
            .iter()
            .filter(|c| {
                state
                    .members
                    .iter()
                    .any(|m| m.conversation_id == c.id && m.user_id == user_id)
            })
            .cloned()
            .collect();
        joined.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.0.cmp(&a.id.0)));
        let total = joined.len() as u64;
        let page = joined
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn find_direct_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let state = self.lock();
        let mut candidates: Vec<&Conversation> = state
            .conversations
            .iter()
            .filter(|c| !c.is_group)
            .filter(|c| {
                let members: Vec<UserId> = state
                    .members
                    .iter()
                    .filter(|m| m.conversation_id == c.id)
                    .map(|m| m.user_id)
                    .collect();
                members.contains(&a) && members.contains(&b)
            })
            .collect();
        // 与 SQL 一致：按 (created_at, id) 自然序取第一个
        candidates.sort_by(|x, y| {
            x.created_at
                .cmp(&y.created_at)
                .then(x.id.0.cmp(&y.id.0))
        });
        Ok(candidates.first().map(|c| (*c).clone()))
    }

    async fn touch_updated_at(
        &self,
        id: ConversationId,
        now: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let conversation = state
            .conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(RepositoryError::NotFound)?;
        conversation.updated_at = now;
        Ok(())
    }
}

#[async_trait]
impl MembershipRepository for MemoryStore {
    async fn ensure(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        now: Timestamp,
    ) -> Result<ConversationMember, RepositoryError> {
        let mut state = self.lock();
        if let Some(member) = state
            .members
            .iter()
            .find(|m| m.conversation_id == conversation_id && m.user_id == user_id)
        {
            return Ok(member.clone());
        }
        let member = ConversationMember::new(conversation_id, user_id, now);
        state.members.push(member.clone());
        Ok(member)
    }

    async fn insert_ignoring_conflicts(
        &self,
        members: &[ConversationMember],
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        for member in members {
            let exists = state
                .members
                .iter()
                .any(|m| m.conversation_id == member.conversation_id && m.user_id == member.user_id);
            if !exists {
                state.members.push(member.clone());
            }
        }
        Ok(())
    }

    async fn list_members(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<ConversationMember>, RepositoryError> {
        let state = self.lock();
        let mut members: Vec<ConversationMember> = state
            .members
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.joined_at);
        Ok(members)
    }

    async fn list_participants(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Participant>, RepositoryError> {
        let state = self.lock();
        let mut members: Vec<&ConversationMember> = state
            .members
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .collect();
        members.sort_by_key(|m| m.joined_at);

        Ok(members
            .into_iter()
            .map(|member| {
                let user = state.users.iter().find(|u| u.id == member.user_id);
                let profile = state.profiles.iter().find(|p| p.user_id == member.user_id);
                Participant {
                    user_id: member.user_id,
                    username: user.map(|u| u.username.clone()).unwrap_or_default(),
                    display_name: profile.map(|p| p.display_name.clone()),
                    last_seen_at: profile.and_then(|p| p.last_seen_at),
                    joined_at: member.joined_at,
                }
            })
            .collect())
    }

    async fn advance_last_read(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        up_to: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if let Some(member) = state
            .members
            .iter_mut()
            .find(|m| m.conversation_id == conversation_id && m.user_id == user_id)
        {
            // 只进不退
            if member.last_read_at.is_none_or(|current| current < up_to) {
                member.last_read_at = Some(up_to);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut state = self.lock();
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn find_in_conversation(
        &self,
        conversation_id: ConversationId,
        id: MessageId,
    ) -> Result<Option<Message>, RepositoryError> {
        let state = self.lock();
        Ok(state
            .messages
            .iter()
            .find(|m| m.conversation_id == conversation_id && m.id == id)
            .cloned())
    }

    async fn list_page_desc(
        &self,
        conversation_id: ConversationId,
        before: Option<(Timestamp, MessageId)>,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.lock();
        let mut window: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .filter(|m| before.is_none_or(|cursor| m.ordering_key() < cursor))
            .cloned()
            .collect();
        window.sort_by(|a, b| b.ordering_key().cmp(&a.ordering_key()));
        window.truncate(limit as usize);
        Ok(window)
    }

    async fn has_older(
        &self,
        conversation_id: ConversationId,
        than: (Timestamp, MessageId),
    ) -> Result<bool, RepositoryError> {
        let state = self.lock();
        Ok(state
            .messages
            .iter()
            .any(|m| m.conversation_id == conversation_id && m.ordering_key() < than))
    }
}

#[async_trait]
impl LoginCodeRepository for MemoryStore {
    async fn create(&self, code: LoginCode) -> Result<LoginCode, RepositoryError> {
        let mut state = self.lock();
        state.login_codes.push(code.clone());
        Ok(code)
    }

    async fn find_latest_valid(
        &self,
        user_id: UserId,
        candidate: &str,
        now: Timestamp,
    ) -> Result<Option<LoginCode>, RepositoryError> {
        let state = self.lock();
        Ok(state
            .login_codes
            .iter()
            .filter(|c| c.user_id == user_id && !c.is_used && !c.is_expired(now))
            .filter(|c| c.matches(candidate))
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    async fn mark_used(&self, id: LoginCodeId) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let code = state
            .login_codes
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(RepositoryError::NotFound)?;
        code.is_used = true;
        Ok(())
    }
}

#[async_trait]
impl AuthTokenRepository for MemoryStore {
    async fn get_or_create(
        &self,
        user_id: UserId,
        candidate_key: String,
        now: Timestamp,
    ) -> Result<String, RepositoryError> {
        let mut state = self.lock();
        if let Some((key, _)) = state
            .tokens
            .iter()
            .find(|(_, (uid, _))| *uid == user_id)
        {
            return Ok(key.clone());
        }
        state
            .tokens
            .insert(candidate_key.clone(), (user_id, now));
        Ok(candidate_key)
    }

    async fn find_user_by_key(&self, key: &str) -> Result<Option<UserId>, RepositoryError> {
        let state = self.lock();
        Ok(state.tokens.get(key).map(|(uid, _)| *uid))
    }
}

#[async_trait]
impl TypingRepository for MemoryStore {
    async fn upsert(&self, incoming: TypingState) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if let Some(existing) = state.typing.iter_mut().find(|t| {
            t.conversation_id == incoming.conversation_id && t.user_id == incoming.user_id
        }) {
            *existing = incoming;
        } else {
            state.typing.push(incoming);
        }
        Ok(())
    }

    async fn list_typing_since(
        &self,
        conversation_id: ConversationId,
        since: Timestamp,
    ) -> Result<Vec<UserId>, RepositoryError> {
        let state = self.lock();
        let mut ids: Vec<UserId> = state
            .typing
            .iter()
            .filter(|t| t.conversation_id == conversation_id && t.is_typing && t.updated_at >= since)
            .map(|t| t.user_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

/// 记录发出的邮件，供断言使用。
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        match self.sent.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl LoginCodeMailer for RecordingMailer {
    async fn send_login_code(
        &self,
        email: &UserEmail,
        code: &str,
        _ttl_minutes: i64,
    ) -> Result<(), MailerError> {
        let mut sent = match self.sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sent.push((email.as_str().to_owned(), code.to_owned()));
        Ok(())
    }
}
