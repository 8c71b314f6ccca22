use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::{
    AuthenticatedUserDto, ConversationDto, ConversationPage, MessageDto, MessagePage, ProfileDto,
    TypingStatusDto,
};
use application::services::{
    FetchMessagesRequest, ListConversationsRequest, SendMessageRequest,
};

use crate::{auth::CurrentUser, error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
struct RequestCodePayload {
    email: String,
}

#[derive(Debug, Deserialize)]
struct VerifyCodePayload {
    email: String,
    code: String,
}

#[derive(Debug, Deserialize)]
struct StartConversationPayload {
    ref_code: String,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TypingPayload {
    is_typing: bool,
}

#[derive(Debug, Deserialize)]
struct UpdateProfilePayload {
    display_name: Option<String>,
    avatar_color: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
    before: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct DetailBody {
    detail: String,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    service: &'static str,
    time: chrono::DateTime<chrono::Utc>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/", get(health))
        .route("/auth/request-code/", post(request_code))
        .route("/auth/verify-code/", post(verify_code))
        .route("/conversations/", get(list_conversations))
        .route("/conversations/start/", post(start_conversation))
        .route(
            "/conversations/{conversation_id}/messages/",
            get(fetch_messages).post(send_message),
        )
        .route(
            "/conversations/{conversation_id}/typing/",
            get(typing_status).post(set_typing),
        )
        .route("/me/profile/", get(my_profile).patch(update_profile))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        service: "truesight-chat",
        time: chrono::Utc::now(),
    })
}

async fn request_code(
    State(state): State<AppState>,
    Json(payload): Json<RequestCodePayload>,
) -> Result<Json<DetailBody>, ApiError> {
    state.auth_service.request_login_code(&payload.email).await?;
    Ok(Json(DetailBody {
        detail: "We've sent a login code to your email.".to_owned(),
    }))
}

async fn verify_code(
    State(state): State<AppState>,
    Json(payload): Json<VerifyCodePayload>,
) -> Result<Json<AuthenticatedUserDto>, ApiError> {
    let authed = state
        .auth_service
        .verify_login_code(&payload.email, &payload.code)
        .await?;
    Ok(Json(authed))
}

async fn list_conversations(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ConversationPage>, ApiError> {
    let page = state
        .conversation_service
        .list(ListConversationsRequest {
            user_id,
            limit: query.limit,
            offset: query.offset,
        })
        .await?;
    Ok(Json(page))
}

async fn start_conversation(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<StartConversationPayload>,
) -> Result<(StatusCode, Json<ConversationDto>), ApiError> {
    let dto = state
        .conversation_service
        .start_direct(user_id, &payload.ref_code)
        .await?;
    Ok((StatusCode::CREATED, Json(dto)))
}

async fn fetch_messages(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<MessagePage>, ApiError> {
    let page = state
        .message_service
        .fetch_page(FetchMessagesRequest {
            conversation_id,
            user_id,
            limit: query.limit,
            before: query.before,
        })
        .await?;
    Ok(Json(page))
}

async fn send_message(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<MessageDto>), ApiError> {
    let dto = state
        .message_service
        .send(SendMessageRequest {
            conversation_id,
            user_id,
            content: payload.content,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(dto)))
}

async fn typing_status(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<TypingStatusDto>, ApiError> {
    let dto = state
        .presence_service
        .status(conversation_id, user_id)
        .await?;
    Ok(Json(dto))
}

async fn set_typing(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<TypingPayload>,
) -> Result<Json<DetailBody>, ApiError> {
    state
        .presence_service
        .set_typing(conversation_id, user_id, payload.is_typing)
        .await?;
    Ok(Json(DetailBody {
        detail: "updated".to_owned(),
    }))
}

async fn my_profile(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<ProfileDto>, ApiError> {
    let dto = state.auth_service.my_profile(user_id).await?;
    Ok(Json(dto))
}

async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<UpdateProfilePayload>,
) -> Result<Json<ProfileDto>, ApiError> {
    let dto = state
        .auth_service
        .update_my_profile(user_id, payload.display_name, payload.avatar_color)
        .await?;
    Ok(Json(dto))
}
