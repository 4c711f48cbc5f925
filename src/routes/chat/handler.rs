use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::chat::{ChatMessage, ChatRoom};
use crate::error::ActivityError;
use crate::store::UserProfile;
use crate::utils::{ApiResponse, Identity, success_to_api_response};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ActivityError>;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub text: String,
}

#[axum::debug_handler]
pub async fn list_my_rooms(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
) -> ApiResult<Vec<ChatRoom>> {
    let rooms = state.chat.my_rooms(me.user_id).await?;
    Ok(success_to_api_response(rooms))
}

#[axum::debug_handler]
pub async fn get_room_messages(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<ChatMessage>> {
    let messages = state
        .chat
        .room_messages(room_id, me.user_id, query.limit)
        .await?;
    Ok(success_to_api_response(messages))
}

#[axum::debug_handler]
pub async fn post_message(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ChatMessage>>), ActivityError> {
    let message = state
        .chat
        .post_message(room_id, me.user_id, &req.text)
        .await?;
    Ok((StatusCode::CREATED, success_to_api_response(message)))
}

#[axum::debug_handler]
pub async fn room_participants(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path(room_id): Path<Uuid>,
) -> ApiResult<Vec<UserProfile>> {
    let members = state.chat.participants(room_id, me.user_id).await?;
    Ok(success_to_api_response(members))
}
