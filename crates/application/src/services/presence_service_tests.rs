//! 输入状态与在线状态的单元测试。

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use domain::{Conversation, ConversationId, DomainError, Timestamp, UserEmail, UserId};
use uuid::Uuid;

use crate::clock::{Clock, ManualClock};
use crate::error::ApplicationError;
use crate::repository::{
    ConversationRepository, MembershipRepository, ProfileRepository, UserRepository,
};
use crate::services::presence_service::{PresenceService, PresenceServiceDependencies};
use crate::testing::MemoryStore;

fn base_time() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

struct Fixture {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    service: PresenceService,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(base_time()));
    let service = PresenceService::new(PresenceServiceDependencies {
        conversation_repository: store.clone(),
        membership_repository: store.clone(),
        typing_repository: store.clone(),
        profile_repository: store.clone(),
        clock: clock.clone(),
        presence: config::PresenceConfig::default(),
    });
    Fixture {
        store,
        clock,
        service,
    }
}

async fn seed_user(store: &MemoryStore, username: &str, display_name: &str) -> UserId {
    let email = UserEmail::parse(format!("{username}@example.com")).unwrap();
    let user = store
        .upsert_by_email(email, username.to_owned(), base_time())
        .await
        .unwrap();
    ProfileRepository::ensure(store, user.id, base_time())
        .await
        .unwrap();
    if !display_name.is_empty() {
        store
            .update_profile(user.id, Some(display_name.to_owned()), None)
            .await
            .unwrap();
    }
    user.id
}

async fn seed_conversation(store: &MemoryStore, members: &[UserId]) -> ConversationId {
    let conversation =
        Conversation::new_direct(ConversationId::new(Uuid::new_v4()), "chat", base_time());
    let conversation = ConversationRepository::create(store, conversation)
        .await
        .unwrap();
    for member in members {
        MembershipRepository::ensure(store, conversation.id, *member, base_time())
            .await
            .unwrap();
    }
    conversation.id
}

#[tokio::test]
async fn typing_flag_expires_after_the_window() {
    let f = fixture();
    let alice = seed_user(&f.store, "alice", "Alice").await;
    let bob = seed_user(&f.store, "bob", "Bob").await;
    let conversation = seed_conversation(&f.store, &[alice, bob]).await;

    f.service
        .set_typing(Uuid::from(conversation), Uuid::from(alice), true)
        .await
        .unwrap();

    let status = f
        .service
        .status(Uuid::from(conversation), Uuid::from(bob))
        .await
        .unwrap();
    assert_eq!(status.typing_ids, vec![Uuid::from(alice)]);

    // 窗口是 10 秒，+11 秒后自然过期
    f.clock.advance(Duration::seconds(11));
    let status = f
        .service
        .status(Uuid::from(conversation), Uuid::from(bob))
        .await
        .unwrap();
    assert!(status.typing_ids.is_empty());
}

#[tokio::test]
async fn typing_false_clears_the_flag_immediately() {
    let f = fixture();
    let alice = seed_user(&f.store, "alice", "Alice").await;
    let bob = seed_user(&f.store, "bob", "Bob").await;
    let conversation = seed_conversation(&f.store, &[alice, bob]).await;

    f.service
        .set_typing(Uuid::from(conversation), Uuid::from(alice), true)
        .await
        .unwrap();
    f.service
        .set_typing(Uuid::from(conversation), Uuid::from(alice), false)
        .await
        .unwrap();

    let status = f
        .service
        .status(Uuid::from(conversation), Uuid::from(bob))
        .await
        .unwrap();
    assert!(status.typing_ids.is_empty());
}

#[tokio::test]
async fn online_is_bounded_by_the_sixty_second_window() {
    let f = fixture();
    let alice = seed_user(&f.store, "alice", "Alice").await;
    let bob = seed_user(&f.store, "bob", "Bob").await;
    let conversation = seed_conversation(&f.store, &[alice, bob]).await;

    f.store.touch_last_seen(bob, base_time()).await.unwrap();

    let status = f
        .service
        .status(Uuid::from(conversation), Uuid::from(alice))
        .await
        .unwrap();
    let online: Vec<_> = status
        .participants
        .iter()
        .filter(|p| p.is_online)
        .map(|p| p.id)
        .collect();
    assert!(online.contains(&Uuid::from(alice)));
    assert!(online.contains(&Uuid::from(bob)));

    f.clock.advance(Duration::seconds(61));
    let status = f
        .service
        .status(Uuid::from(conversation), Uuid::from(alice))
        .await
        .unwrap();
    let bob_dto = status
        .participants
        .iter()
        .find(|p| p.id == Uuid::from(bob))
        .unwrap();
    assert!(!bob_dto.is_online);
    // 查询方在调用中刷新了 last_seen_at，仍然在线
    let alice_dto = status
        .participants
        .iter()
        .find(|p| p.id == Uuid::from(alice))
        .unwrap();
    assert!(alice_dto.is_online);
}

#[tokio::test]
async fn participant_labels_never_leak_emails() {
    let f = fixture();
    let alice = seed_user(&f.store, "alice", "Alice").await;
    // 历史数据：用户名仍是整个邮箱地址
    let carol = seed_user(&f.store, "carol@example.com", "").await;
    let conversation = seed_conversation(&f.store, &[alice, carol]).await;

    let status = f
        .service
        .status(Uuid::from(conversation), Uuid::from(alice))
        .await
        .unwrap();
    let carol_dto = status
        .participants
        .iter()
        .find(|p| p.id == Uuid::from(carol))
        .unwrap();
    assert_eq!(carol_dto.display_name, "carol");
    assert!(!carol_dto.display_name.contains('@'));
}

#[tokio::test]
async fn participants_are_ordered_by_join_time() {
    let f = fixture();
    let alice = seed_user(&f.store, "alice", "Alice").await;
    let conversation = seed_conversation(&f.store, &[alice]).await;

    f.clock.advance(Duration::seconds(5));
    let bob = seed_user(&f.store, "bob", "Bob").await;
    // bob 通过访问状态接口自动入会，时间晚于 alice
    MembershipRepository::ensure(&*f.store, conversation, bob, f.clock.now())
        .await
        .unwrap();

    let status = f
        .service
        .status(Uuid::from(conversation), Uuid::from(alice))
        .await
        .unwrap();
    let order: Vec<_> = status.participants.iter().map(|p| p.id).collect();
    assert_eq!(order, vec![Uuid::from(alice), Uuid::from(bob)]);
}

#[tokio::test]
async fn status_on_missing_conversation_is_not_found() {
    let f = fixture();
    let alice = seed_user(&f.store, "alice", "Alice").await;

    let err = f
        .service
        .status(Uuid::new_v4(), Uuid::from(alice))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::ConversationNotFound)
    ));

    let err = f
        .service
        .set_typing(Uuid::new_v4(), Uuid::from(alice), true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::ConversationNotFound)
    ));
}
