//! HTTP 层端到端测试：内存仓储 + 手动时钟驱动完整请求流。

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use application::clock::ManualClock;
use application::rate_limiter::SlidingWindowLimiter;
use application::repository::UserRepository;
use application::services::{
    AuthService, AuthServiceDependencies, ConversationService, ConversationServiceDependencies,
    MessageService, MessageServiceDependencies, PresenceService, PresenceServiceDependencies,
};
use application::testing::{MemoryStore, RecordingMailer};
use domain::{Timestamp, UserEmail};
use web_api::{router, AppState};

fn base_time() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

struct TestApp {
    app: Router,
    store: Arc<MemoryStore>,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(base_time()));
    let mailer = Arc::new(RecordingMailer::new());
    let limiter = Arc::new(SlidingWindowLimiter::new(clock.clone()));

    let auth_service = Arc::new(AuthService::new(AuthServiceDependencies {
        user_repository: store.clone(),
        profile_repository: store.clone(),
        login_code_repository: store.clone(),
        token_repository: store.clone(),
        mailer,
        limiter: limiter.clone(),
        clock: clock.clone(),
        login_code: config::LoginCodeConfig::default(),
        ref_code: config::RefCodeConfig::default(),
        rate_limit: config::RateLimitConfig::default(),
    }));
    let conversation_service = Arc::new(ConversationService::new(
        ConversationServiceDependencies {
            conversation_repository: store.clone(),
            membership_repository: store.clone(),
            profile_repository: store.clone(),
            user_repository: store.clone(),
            clock: clock.clone(),
        },
    ));
    let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
        conversation_repository: store.clone(),
        membership_repository: store.clone(),
        message_repository: store.clone(),
        user_repository: store.clone(),
        limiter,
        clock: clock.clone(),
        rate_limit: config::RateLimitConfig::default(),
    }));
    let presence_service = Arc::new(PresenceService::new(PresenceServiceDependencies {
        conversation_repository: store.clone(),
        membership_repository: store.clone(),
        typing_repository: store.clone(),
        profile_repository: store.clone(),
        clock,
        presence: config::PresenceConfig::default(),
    }));

    let app = router(AppState::new(
        auth_service,
        conversation_service,
        message_service,
        presence_service,
    ));
    TestApp { app, store }
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Token {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Token {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

/// 走一遍申请 + 验证，返回 (token, ref_code)。
async fn login(t: &TestApp, email: &str) -> (String, String) {
    let (status, _) = call(
        &t.app,
        json_request("POST", "/auth/request-code/", None, json!({"email": email})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let parsed = UserEmail::parse(email).unwrap();
    let user = t.store.find_by_email(&parsed).await.unwrap().unwrap();
    let code = t.store.latest_login_code(user.id).unwrap();

    let (status, body) = call(
        &t.app,
        json_request(
            "POST",
            "/auth/verify-code/",
            None,
            json!({"email": email, "code": code}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    (
        body["token"].as_str().unwrap().to_owned(),
        body["user"]["ref_code"].as_str().unwrap().to_owned(),
    )
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let t = test_app();
    let (status, body) = call(&t.app, get_request("/health/", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let t = test_app();
    let (status, body) = call(&t.app, get_request("/conversations/", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].is_string());

    let (status, body) = call(&t.app, get_request("/conversations/", Some("bogus"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Invalid token.");
}

#[tokio::test]
async fn full_conversation_flow_over_http() {
    let t = test_app();
    let (alice_token, _) = login(&t, "alice@example.com").await;
    let (_, bob_ref) = login(&t, "bob@example.com").await;

    // 用对方的引用码建会话
    let (status, conversation) = call(
        &t.app,
        json_request(
            "POST",
            "/conversations/start/",
            Some(&alice_token),
            json!({"ref_code": bob_ref}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let conversation_id = conversation["id"].as_str().unwrap().to_owned();

    // 发一条消息
    let (status, message) = call(
        &t.app,
        json_request(
            "POST",
            &format!("/conversations/{conversation_id}/messages/"),
            Some(&alice_token),
            json!({"content": "hello bob"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["content"], "hello bob");
    assert_eq!(message["is_mine"], true);
    assert_eq!(message["read_by_all"], false);

    // 拉历史：升序窗口 + 游标字段
    let (status, page) = call(
        &t.app,
        get_request(
            &format!("/conversations/{conversation_id}/messages/?limit=10"),
            Some(&alice_token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["results"].as_array().unwrap().len(), 1);
    assert_eq!(page["has_more"], false);
    assert!(page["next_before"].is_null());

    // 会话列表：标题是对方的显示名
    let (status, list) = call(&t.app, get_request("/conversations/", Some(&alice_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["results"][0]["title"], "bob");

    // 输入状态
    let (status, ack) = call(
        &t.app,
        json_request(
            "POST",
            &format!("/conversations/{conversation_id}/typing/"),
            Some(&alice_token),
            json!({"is_typing": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["detail"], "updated");

    let (status, typing) = call(
        &t.app,
        get_request(
            &format!("/conversations/{conversation_id}/typing/"),
            Some(&alice_token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(typing["typing_ids"].as_array().unwrap().len(), 1);
    assert_eq!(typing["participants"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn error_bodies_use_the_detail_shape() {
    let t = test_app();
    let (token, own_ref) = login(&t, "alice@example.com").await;

    // 未知引用码 → 404
    let (status, body) = call(
        &t.app,
        json_request(
            "POST",
            "/conversations/start/",
            Some(&token),
            json!({"ref_code": "ZZZZ99"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "no user found with this code");

    // 自己的引用码 → 400
    let (status, body) = call(
        &t.app,
        json_request(
            "POST",
            "/conversations/start/",
            Some(&token),
            json!({"ref_code": own_ref}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "cannot start a conversation with yourself");

    // 错误的登录码 → 400，措辞不区分不存在/过期/已用
    let (status, body) = call(
        &t.app,
        json_request(
            "POST",
            "/auth/verify-code/",
            None,
            json!({"email": "alice@example.com", "code": "XXXX"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "invalid or expired code");

    // 不存在的会话 → 404
    let (status, body) = call(
        &t.app,
        get_request(
            "/conversations/00000000-0000-0000-0000-000000000000/messages/",
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "conversation not found");
}

#[tokio::test]
async fn login_code_requests_are_rate_limited_over_http() {
    let t = test_app();
    for _ in 0..5 {
        let (status, _) = call(
            &t.app,
            json_request(
                "POST",
                "/auth/request-code/",
                None,
                json!({"email": "alice@example.com"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = call(
        &t.app,
        json_request(
            "POST",
            "/auth/request-code/",
            None,
            json!({"email": "alice@example.com"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["detail"].as_str().unwrap().contains("Too many"));
}

#[tokio::test]
async fn profile_round_trip_over_http() {
    let t = test_app();
    let (token, ref_code) = login(&t, "alice@example.com").await;

    let (status, profile) = call(&t.app, get_request("/me/profile/", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["email"], "alice@example.com");
    assert_eq!(profile["ref_code"], ref_code);

    let request = Request::builder()
        .method("PATCH")
        .uri("/me/profile/")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Token {token}"))
        .body(Body::from(
            json!({"display_name": "Alice Liddell"}).to_string(),
        ))
        .unwrap();
    let (status, updated) = call(&t.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["display_name"], "Alice Liddell");
    assert_eq!(updated["ref_code"], ref_code);
}
