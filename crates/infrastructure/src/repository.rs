//! 仓储端口的 PostgreSQL 实现。
//!
//! 一个 `PgStore` 实现全部端口。两个易竞态的 get-or-create
//! （成员关系、令牌）都压到唯一约束上用 `ON CONFLICT` 解决，
//! 已读水位的单调性由 `WHERE` 条件保证，不依赖应用层判断。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use application::{
    AuthTokenRepository, ConversationRepository, LoginCodeRepository, MembershipRepository,
    MessageRepository, ProfileRepository, TypingRepository, UserRepository,
};
use domain::{
    Conversation, ConversationId, ConversationMember, LoginCode, LoginCodeId, Message,
    MessageContent, MessageId, Participant, Profile, RepositoryError, Timestamp, TypingState,
    User, UserEmail, UserId, UserSummary,
};

use crate::db::DbPool;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn storage_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = UserEmail::parse(row.email)
            .map_err(|err| RepositoryError::storage(format!("corrupt email column: {err}")))?;
        Ok(User {
            id: UserId::from(row.id),
            username: row.username,
            email,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ProfileRow {
    user_id: Uuid,
    ref_code: Option<String>,
    display_name: String,
    avatar_color: String,
    last_seen_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            user_id: UserId::from(row.user_id),
            ref_code: row.ref_code,
            display_name: row.display_name,
            avatar_color: row.avatar_color,
            last_seen_at: row.last_seen_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: Uuid,
    title: String,
    is_group: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            id: ConversationId::from(row.id),
            title: row.title,
            is_group: row.is_group,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MemberRow {
    conversation_id: Uuid,
    user_id: Uuid,
    joined_at: DateTime<Utc>,
    is_admin: bool,
    last_read_at: Option<DateTime<Utc>>,
}

impl From<MemberRow> for ConversationMember {
    fn from(row: MemberRow) -> Self {
        ConversationMember {
            conversation_id: ConversationId::from(row.conversation_id),
            user_id: UserId::from(row.user_id),
            joined_at: row.joined_at,
            is_admin: row.is_admin,
            last_read_at: row.last_read_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ParticipantRow {
    user_id: Uuid,
    username: String,
    display_name: Option<String>,
    last_seen_at: Option<DateTime<Utc>>,
    joined_at: DateTime<Utc>,
}

impl From<ParticipantRow> for Participant {
    fn from(row: ParticipantRow) -> Self {
        Participant {
            user_id: UserId::from(row.user_id),
            username: row.username,
            display_name: row.display_name,
            last_seen_at: row.last_seen_at,
            joined_at: row.joined_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = RepositoryError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let content = MessageContent::parse(row.content)
            .map_err(|err| RepositoryError::storage(format!("corrupt content column: {err}")))?;
        Ok(Message {
            id: MessageId::from(row.id),
            conversation_id: ConversationId::from(row.conversation_id),
            sender_id: UserId::from(row.sender_id),
            content,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LoginCodeRow {
    id: Uuid,
    user_id: Uuid,
    code: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_used: bool,
}

impl From<LoginCodeRow> for LoginCode {
    fn from(row: LoginCodeRow) -> Self {
        LoginCode {
            id: LoginCodeId::from(row.id),
            user_id: UserId::from(row.user_id),
            code: row.code,
            created_at: row.created_at,
            expires_at: row.expires_at,
            is_used: row.is_used,
        }
    }
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    id: Uuid,
    username: String,
    display_name: String,
    avatar_color: String,
}

#[async_trait]
impl UserRepository for PgStore {
    async fn upsert_by_email(
        &self,
        email: UserEmail,
        default_username: String,
        now: Timestamp,
    ) -> Result<User, RepositoryError> {
        // DO UPDATE 的空操作让 RETURNING 在冲突时也返回已有行
        let row = sqlx::query_as::<_, UserRow>(
            r#"INSERT INTO users (id, username, email, created_at)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (email) DO UPDATE SET email = excluded.email
               RETURNING id, username, email, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(&default_username)
        .bind(email.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        User::try_from(row)
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"SELECT id, username, email, created_at FROM users WHERE email = $1"#,
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"SELECT id, username, email, created_at FROM users WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.map(User::try_from).transpose()
    }

    async fn update_username(&self, id: UserId, username: String) -> Result<(), RepositoryError> {
        let affected = sqlx::query(r#"UPDATE users SET username = $2 WHERE id = $1"#)
            .bind(Uuid::from(id))
            .bind(&username)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?
            .rows_affected();
        if affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn summaries_by_ids(&self, ids: &[UserId]) -> Result<Vec<UserSummary>, RepositoryError> {
        let raw: Vec<Uuid> = ids.iter().copied().map(Uuid::from).collect();
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"SELECT u.id,
                      u.username,
                      COALESCE(p.display_name, '') AS display_name,
                      COALESCE(p.avatar_color, '') AS avatar_color
               FROM users u
               LEFT JOIN profiles p ON p.user_id = u.id
               WHERE u.id = ANY($1)"#,
        )
        .bind(&raw)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows
            .into_iter()
            .map(|row| UserSummary {
                id: UserId::from(row.id),
                username: row.username,
                display_name: row.display_name,
                avatar_color: row.avatar_color,
            })
            .collect())
    }
}

#[async_trait]
impl ProfileRepository for PgStore {
    async fn ensure(&self, user_id: UserId, now: Timestamp) -> Result<Profile, RepositoryError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"INSERT INTO profiles (user_id, display_name, avatar_color, created_at)
               VALUES ($1, '', '', $2)
               ON CONFLICT (user_id) DO UPDATE SET user_id = excluded.user_id
               RETURNING user_id, ref_code, display_name, avatar_color, last_seen_at, created_at"#,
        )
        .bind(Uuid::from(user_id))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(Profile::from(row))
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Option<Profile>, RepositoryError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"SELECT user_id, ref_code, display_name, avatar_color, last_seen_at, created_at
               FROM profiles WHERE user_id = $1"#,
        )
        .bind(Uuid::from(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(row.map(Profile::from))
    }

    async fn claim_ref_code(&self, user_id: UserId, code: &str) -> Result<bool, RepositoryError> {
        // 唯一索引兜底；已经持有引用码的资料不会被覆盖
        let result = sqlx::query(
            r#"UPDATE profiles SET ref_code = $2
               WHERE user_id = $1 AND ref_code IS NULL"#,
        )
        .bind(Uuid::from(user_id))
        .bind(code)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) if is_unique_violation(&err) => Ok(false),
            Err(err) => Err(storage_err(err)),
        }
    }

    async fn find_by_ref_code(&self, code: &str) -> Result<Option<Profile>, RepositoryError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"SELECT user_id, ref_code, display_name, avatar_color, last_seen_at, created_at
               FROM profiles WHERE upper(ref_code) = upper($1)"#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(row.map(Profile::from))
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        display_name: Option<String>,
        avatar_color: Option<String>,
    ) -> Result<Profile, RepositoryError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"UPDATE profiles
               SET display_name = COALESCE($2, display_name),
                   avatar_color = COALESCE($3, avatar_color)
               WHERE user_id = $1
               RETURNING user_id, ref_code, display_name, avatar_color, last_seen_at, created_at"#,
        )
        .bind(Uuid::from(user_id))
        .bind(display_name)
        .bind(avatar_color)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.map(Profile::from).ok_or(RepositoryError::NotFound)
    }

    async fn touch_last_seen(
        &self,
        user_id: UserId,
        now: Timestamp,
    ) -> Result<(), RepositoryError> {
        sqlx::query(r#"UPDATE profiles SET last_seen_at = $2 WHERE user_id = $1"#)
            .bind(Uuid::from(user_id))
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl ConversationRepository for PgStore {
    async fn create(&self, conversation: Conversation) -> Result<Conversation, RepositoryError> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"INSERT INTO conversations (id, title, is_group, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, title, is_group, created_at, updated_at"#,
        )
        .bind(Uuid::from(conversation.id))
        .bind(&conversation.title)
        .bind(conversation.is_group)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(Conversation::from(row))
    }

    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"SELECT id, title, is_group, created_at, updated_at
               FROM conversations WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(row.map(Conversation::from))
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Conversation>, u64), RepositoryError> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"SELECT c.id, c.title, c.is_group, c.created_at, c.updated_at
               FROM conversations c
               JOIN conversation_members m ON m.conversation_id = c.id
               WHERE m.user_id = $1
               ORDER BY c.updated_at DESC, c.id DESC
               LIMIT $2 OFFSET $3"#,
        )
        .bind(Uuid::from(user_id))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let total: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*)
               FROM conversation_members m
               WHERE m.user_id = $1"#,
        )
        .bind(Uuid::from(user_id))
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok((
            rows.into_iter().map(Conversation::from).collect(),
            total as u64,
        ))
    }

    async fn find_direct_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"SELECT c.id, c.title, c.is_group, c.created_at, c.updated_at
               FROM conversations c
               JOIN conversation_members ma ON ma.conversation_id = c.id AND ma.user_id = $1
               JOIN conversation_members mb ON mb.conversation_id = c.id AND mb.user_id = $2
               WHERE c.is_group = FALSE
               ORDER BY c.created_at, c.id
               LIMIT 1"#,
        )
        .bind(Uuid::from(a))
        .bind(Uuid::from(b))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(row.map(Conversation::from))
    }

    async fn touch_updated_at(
        &self,
        id: ConversationId,
        now: Timestamp,
    ) -> Result<(), RepositoryError> {
        let affected = sqlx::query(r#"UPDATE conversations SET updated_at = $2 WHERE id = $1"#)
            .bind(Uuid::from(id))
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?
            .rows_affected();
        if affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl MembershipRepository for PgStore {
    async fn ensure(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        now: Timestamp,
    ) -> Result<ConversationMember, RepositoryError> {
        sqlx::query(
            r#"INSERT INTO conversation_members (conversation_id, user_id, joined_at, is_admin)
               VALUES ($1, $2, $3, FALSE)
               ON CONFLICT (conversation_id, user_id) DO NOTHING"#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(user_id))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        let row = sqlx::query_as::<_, MemberRow>(
            r#"SELECT conversation_id, user_id, joined_at, is_admin, last_read_at
               FROM conversation_members
               WHERE conversation_id = $1 AND user_id = $2"#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(user_id))
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(ConversationMember::from(row))
    }

    async fn insert_ignoring_conflicts(
        &self,
        members: &[ConversationMember],
    ) -> Result<(), RepositoryError> {
        for member in members {
            sqlx::query(
                r#"INSERT INTO conversation_members (conversation_id, user_id, joined_at, is_admin)
                   VALUES ($1, $2, $3, $4)
                   ON CONFLICT (conversation_id, user_id) DO NOTHING"#,
            )
            .bind(Uuid::from(member.conversation_id))
            .bind(Uuid::from(member.user_id))
            .bind(member.joined_at)
            .bind(member.is_admin)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        }
        Ok(())
    }

    async fn list_members(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<ConversationMember>, RepositoryError> {
        let rows = sqlx::query_as::<_, MemberRow>(
            r#"SELECT conversation_id, user_id, joined_at, is_admin, last_read_at
               FROM conversation_members
               WHERE conversation_id = $1
               ORDER BY joined_at, user_id"#,
        )
        .bind(Uuid::from(conversation_id))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(rows.into_iter().map(ConversationMember::from).collect())
    }

    async fn list_participants(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Participant>, RepositoryError> {
        let rows = sqlx::query_as::<_, ParticipantRow>(
            r#"SELECT m.user_id,
                      COALESCE(u.username, '') AS username,
                      p.display_name,
                      p.last_seen_at,
                      m.joined_at
               FROM conversation_members m
               LEFT JOIN users u ON u.id = m.user_id
               LEFT JOIN profiles p ON p.user_id = m.user_id
               WHERE m.conversation_id = $1
               ORDER BY m.joined_at, m.user_id"#,
        )
        .bind(Uuid::from(conversation_id))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(rows.into_iter().map(Participant::from).collect())
    }

    async fn advance_last_read(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        up_to: Timestamp,
    ) -> Result<(), RepositoryError> {
        // 单调性由条件保证，并发下也只进不退
        sqlx::query(
            r#"UPDATE conversation_members SET last_read_at = $3
               WHERE conversation_id = $1 AND user_id = $2
                 AND (last_read_at IS NULL OR last_read_at < $3)"#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(user_id))
        .bind(up_to)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for PgStore {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, conversation_id, sender_id, content, created_at"#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.conversation_id))
        .bind(Uuid::from(message.sender_id))
        .bind(message.content.as_str())
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Message::try_from(row)
    }

    async fn find_in_conversation(
        &self,
        conversation_id: ConversationId,
        id: MessageId,
    ) -> Result<Option<Message>, RepositoryError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"SELECT id, conversation_id, sender_id, content, created_at
               FROM messages WHERE conversation_id = $1 AND id = $2"#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.map(Message::try_from).transpose()
    }

    async fn list_page_desc(
        &self,
        conversation_id: ConversationId,
        before: Option<(Timestamp, MessageId)>,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let (cursor_at, cursor_id) = match before {
            Some((at, id)) => (Some(at), Some(Uuid::from(id))),
            None => (None, None),
        };
        // 行比较走 (created_at, id) 复合索引，平局由 id 决出
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"SELECT id, conversation_id, sender_id, content, created_at
               FROM messages
               WHERE conversation_id = $1
                 AND ($2::timestamptz IS NULL
                      OR (created_at, id) < ($2::timestamptz, $3::uuid))
               ORDER BY created_at DESC, id DESC
               LIMIT $4"#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(cursor_at)
        .bind(cursor_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.into_iter().map(Message::try_from).collect()
    }

    async fn has_older(
        &self,
        conversation_id: ConversationId,
        than: (Timestamp, MessageId),
    ) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (
                   SELECT 1 FROM messages
                   WHERE conversation_id = $1
                     AND (created_at, id) < ($2::timestamptz, $3::uuid)
               )"#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(than.0)
        .bind(Uuid::from(than.1))
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(exists)
    }
}

#[async_trait]
impl LoginCodeRepository for PgStore {
    async fn create(&self, code: LoginCode) -> Result<LoginCode, RepositoryError> {
        let row = sqlx::query_as::<_, LoginCodeRow>(
            r#"INSERT INTO login_codes (id, user_id, code, created_at, expires_at, is_used)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING id, user_id, code, created_at, expires_at, is_used"#,
        )
        .bind(Uuid::from(code.id))
        .bind(Uuid::from(code.user_id))
        .bind(&code.code)
        .bind(code.created_at)
        .bind(code.expires_at)
        .bind(code.is_used)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(LoginCode::from(row))
    }

    async fn find_latest_valid(
        &self,
        user_id: UserId,
        candidate: &str,
        now: Timestamp,
    ) -> Result<Option<LoginCode>, RepositoryError> {
        let row = sqlx::query_as::<_, LoginCodeRow>(
            r#"SELECT id, user_id, code, created_at, expires_at, is_used
               FROM login_codes
               WHERE user_id = $1
                 AND is_used = FALSE
                 AND expires_at > $3
                 AND upper(code) = upper($2)
               ORDER BY created_at DESC
               LIMIT 1"#,
        )
        .bind(Uuid::from(user_id))
        .bind(candidate.trim())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(row.map(LoginCode::from))
    }

    async fn mark_used(&self, id: LoginCodeId) -> Result<(), RepositoryError> {
        let affected = sqlx::query(r#"UPDATE login_codes SET is_used = TRUE WHERE id = $1"#)
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(storage_err)?
            .rows_affected();
        if affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl AuthTokenRepository for PgStore {
    async fn get_or_create(
        &self,
        user_id: UserId,
        candidate_key: String,
        now: Timestamp,
    ) -> Result<String, RepositoryError> {
        // 冲突时空更新，RETURNING 带回已有键
        let key: String = sqlx::query_scalar(
            r#"INSERT INTO auth_tokens (key, user_id, created_at)
               VALUES ($1, $2, $3)
               ON CONFLICT (user_id) DO UPDATE SET user_id = excluded.user_id
               RETURNING key"#,
        )
        .bind(&candidate_key)
        .bind(Uuid::from(user_id))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(key)
    }

    async fn find_user_by_key(&self, key: &str) -> Result<Option<UserId>, RepositoryError> {
        let row: Option<Uuid> =
            sqlx::query_scalar(r#"SELECT user_id FROM auth_tokens WHERE key = $1"#)
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_err)?;
        Ok(row.map(UserId::from))
    }
}

#[async_trait]
impl TypingRepository for PgStore {
    async fn upsert(&self, state: TypingState) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO typing_states (conversation_id, user_id, is_typing, updated_at)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (conversation_id, user_id)
               DO UPDATE SET is_typing = excluded.is_typing, updated_at = excluded.updated_at"#,
        )
        .bind(Uuid::from(state.conversation_id))
        .bind(Uuid::from(state.user_id))
        .bind(state.is_typing)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn list_typing_since(
        &self,
        conversation_id: ConversationId,
        since: Timestamp,
    ) -> Result<Vec<UserId>, RepositoryError> {
        let rows: Vec<Uuid> = sqlx::query_scalar(
            r#"SELECT user_id FROM typing_states
               WHERE conversation_id = $1 AND is_typing AND updated_at >= $2
               ORDER BY user_id"#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(rows.into_iter().map(UserId::from).collect())
    }
}
