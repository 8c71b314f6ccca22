//! 主应用程序入口。
//!
//! 启动 Axum Web API 服务：连接 PostgreSQL、跑迁移、
//! 组装应用层服务并监听 HTTP。

use std::sync::Arc;

use application::services::{
    AuthService, AuthServiceDependencies, ConversationService, ConversationServiceDependencies,
    MessageService, MessageServiceDependencies, PresenceService, PresenceServiceDependencies,
};
use application::{Clock, SlidingWindowLimiter, SystemClock};
use config::AppConfig;
use infrastructure::{create_pool, LogMailer, PgStore};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env();

    tracing::info!(
        database = %config.database.url.split('@').next_back().unwrap_or("unknown"),
        "连接数据库"
    );
    let pool = create_pool(&config.database.url, config.database.max_connections).await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let limiter = Arc::new(SlidingWindowLimiter::new(clock.clone()));
    let mailer = Arc::new(LogMailer::new());

    let auth_service = Arc::new(AuthService::new(AuthServiceDependencies {
        user_repository: store.clone(),
        profile_repository: store.clone(),
        login_code_repository: store.clone(),
        token_repository: store.clone(),
        mailer,
        limiter: limiter.clone(),
        clock: clock.clone(),
        login_code: config.login_code.clone(),
        ref_code: config.ref_code.clone(),
        rate_limit: config.rate_limit.clone(),
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
        rate_limit: config.rate_limit.clone(),
    }));

    let presence_service = Arc::new(PresenceService::new(PresenceServiceDependencies {
        conversation_repository: store.clone(),
        membership_repository: store.clone(),
        typing_repository: store.clone(),
        profile_repository: store,
        clock,
        presence: config.presence.clone(),
    }));

    let state = AppState::new(
        auth_service,
        conversation_service,
        message_service,
        presence_service,
    );

    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(addr = %addr, "聊天服务已启动");
    axum::serve(listener, app).await?;

    Ok(())
}
