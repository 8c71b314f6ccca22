//! 登录码认证流程的单元测试。

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use domain::{DomainError, Timestamp, UserEmail, UserId};

use crate::clock::ManualClock;
use crate::codes::CODE_ALPHABET;
use crate::error::ApplicationError;
use crate::rate_limiter::SlidingWindowLimiter;
use crate::repository::UserRepository;
use crate::services::auth_service::{AuthService, AuthServiceDependencies};
use crate::testing::{MemoryStore, RecordingMailer};

fn base_time() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

struct Fixture {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    mailer: Arc<RecordingMailer>,
    service: AuthService,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(base_time()));
    let mailer = Arc::new(RecordingMailer::new());
    let limiter = Arc::new(SlidingWindowLimiter::new(clock.clone()));
    let service = AuthService::new(AuthServiceDependencies {
        user_repository: store.clone(),
        profile_repository: store.clone(),
        login_code_repository: store.clone(),
        token_repository: store.clone(),
        mailer: mailer.clone(),
        limiter,
        clock: clock.clone(),
        login_code: config::LoginCodeConfig::default(),
        ref_code: config::RefCodeConfig::default(),
        rate_limit: config::RateLimitConfig::default(),
    });
    Fixture {
        store,
        clock,
        mailer,
        service,
    }
}

async fn user_id_of(store: &MemoryStore, email: &str) -> UserId {
    let email = UserEmail::parse(email).unwrap();
    store.find_by_email(&email).await.unwrap().unwrap().id
}

#[tokio::test]
async fn request_creates_the_user_and_mails_a_code() {
    let f = fixture();

    f.service
        .request_login_code("  Alice@Example.COM ")
        .await
        .unwrap();

    let alice = user_id_of(&f.store, "alice@example.com").await;
    let sent = f.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "alice@example.com");

    let code = &sent[0].1;
    assert_eq!(code.len(), 4);
    assert!(code.chars().all(|c| CODE_ALPHABET.contains(&(c as u8))));
    assert_eq!(f.store.latest_login_code(alice), Some(code.clone()));
}

#[tokio::test]
async fn request_rejects_malformed_emails() {
    let f = fixture();
    let err = f
        .service
        .request_login_code("not-an-email")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::InvalidArgument { .. })
    ));
    assert!(f.mailer.sent().is_empty());
}

#[tokio::test]
async fn sixth_request_within_a_minute_is_rate_limited() {
    let f = fixture();
    for _ in 0..5 {
        f.service
            .request_login_code("alice@example.com")
            .await
            .unwrap();
    }

    let err = f
        .service
        .request_login_code("alice@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::RateLimited { .. }));
    assert_eq!(f.mailer.sent().len(), 5);

    f.clock.advance(Duration::seconds(61));
    f.service
        .request_login_code("alice@example.com")
        .await
        .unwrap();
}

#[tokio::test]
async fn verify_issues_a_token_and_a_ref_code() {
    let f = fixture();
    f.service
        .request_login_code("alice@example.com")
        .await
        .unwrap();
    let alice = user_id_of(&f.store, "alice@example.com").await;
    let code = f.store.latest_login_code(alice).unwrap();

    let authed = f
        .service
        .verify_login_code("alice@example.com", &code)
        .await
        .unwrap();

    assert_eq!(authed.token.len(), 40);
    assert!(authed.token.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(authed.user.username, "alice");
    assert_eq!(authed.user.email, "alice@example.com");
    assert_eq!(authed.user.ref_code.len(), 6);
    assert!(authed
        .user
        .ref_code
        .chars()
        .all(|c| CODE_ALPHABET.contains(&(c as u8))));
}

#[tokio::test]
async fn verify_accepts_lowercase_codes_once_only() {
    let f = fixture();
    f.service
        .request_login_code("alice@example.com")
        .await
        .unwrap();
    let alice = user_id_of(&f.store, "alice@example.com").await;
    let code = f.store.latest_login_code(alice).unwrap();

    f.service
        .verify_login_code("alice@example.com", &code.to_lowercase())
        .await
        .unwrap();

    // 同一个码不能用第二次
    let err = f
        .service
        .verify_login_code("alice@example.com", &code)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::LoginCodeInvalid)
    ));
}

#[tokio::test]
async fn verify_rejects_expired_codes() {
    let f = fixture();
    f.service
        .request_login_code("alice@example.com")
        .await
        .unwrap();
    let alice = user_id_of(&f.store, "alice@example.com").await;
    let code = f.store.latest_login_code(alice).unwrap();

    f.clock.advance(Duration::minutes(10));
    let err = f
        .service
        .verify_login_code("alice@example.com", &code)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::LoginCodeInvalid)
    ));
}

#[tokio::test]
async fn verify_rejects_unknown_emails_and_wrong_codes() {
    let f = fixture();
    let err = f
        .service
        .verify_login_code("ghost@example.com", "AAAA")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::LoginCodeInvalid)
    ));

    f.service
        .request_login_code("alice@example.com")
        .await
        .unwrap();
    let err = f
        .service
        .verify_login_code("alice@example.com", "WRONG")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::LoginCodeInvalid)
    ));
}

#[tokio::test]
async fn token_and_ref_code_are_stable_across_logins() {
    let f = fixture();
    let mut seen = Vec::new();
    for _ in 0..2 {
        f.service
            .request_login_code("alice@example.com")
            .await
            .unwrap();
        let alice = user_id_of(&f.store, "alice@example.com").await;
        let code = f.store.latest_login_code(alice).unwrap();
        let authed = f
            .service
            .verify_login_code("alice@example.com", &code)
            .await
            .unwrap();
        seen.push((authed.token, authed.user.ref_code));
    }
    assert_eq!(seen[0], seen[1]);
}

#[tokio::test]
async fn resolve_token_round_trips() {
    let f = fixture();
    f.service
        .request_login_code("alice@example.com")
        .await
        .unwrap();
    let alice = user_id_of(&f.store, "alice@example.com").await;
    let code = f.store.latest_login_code(alice).unwrap();
    let authed = f
        .service
        .verify_login_code("alice@example.com", &code)
        .await
        .unwrap();

    assert_eq!(
        f.service.resolve_token(&authed.token).await.unwrap(),
        Some(alice)
    );
    assert_eq!(f.service.resolve_token("not-a-token").await.unwrap(), None);
}

#[tokio::test]
async fn profile_update_keeps_the_ref_code_read_only() {
    let f = fixture();
    f.service
        .request_login_code("alice@example.com")
        .await
        .unwrap();
    let alice = user_id_of(&f.store, "alice@example.com").await;
    let code = f.store.latest_login_code(alice).unwrap();
    let authed = f
        .service
        .verify_login_code("alice@example.com", &code)
        .await
        .unwrap();

    let updated = f
        .service
        .update_my_profile(
            authed.user.id,
            Some("Alice Liddell".to_owned()),
            Some("#336699".to_owned()),
        )
        .await
        .unwrap();
    assert_eq!(updated.display_name, "Alice Liddell");
    assert_eq!(updated.avatar_color, "#336699");
    assert_eq!(updated.ref_code, authed.user.ref_code);

    let profile = f.service.my_profile(authed.user.id).await.unwrap();
    assert_eq!(profile.display_name, "Alice Liddell");
    assert_eq!(profile.ref_code, authed.user.ref_code);
}
