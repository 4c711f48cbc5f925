use axum::{
    Extension, Json,
    extract::{Query, State},
};

use super::model::{InboxQuery, InboxResponse, MarkReadRequest, MarkReadResponse};
use crate::AppState;
use crate::error::ActivityError;
use crate::store::clamp_paging;
use crate::utils::{ApiResponse, Identity, success_to_api_response};

const DEFAULT_PAGE_SIZE: i64 = 20;

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Query(query): Query<InboxQuery>,
) -> Result<Json<ApiResponse<InboxResponse>>, ActivityError> {
    let (page, limit) = clamp_paging(
        query.page.unwrap_or(0),
        query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    );
    let (page, unread_count) = state.notifications.list(me.user_id, page, limit).await?;
    Ok(success_to_api_response(InboxResponse { page, unread_count }))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Json(req): Json<MarkReadRequest>,
) -> Result<Json<ApiResponse<MarkReadResponse>>, ActivityError> {
    if req.ids.is_empty() {
        return Err(ActivityError::Validation("ids must not be empty".into()));
    }
    let updated = state.notifications.mark_read(me.user_id, &req.ids).await?;
    Ok(success_to_api_response(MarkReadResponse { updated }))
}

#[axum::debug_handler]
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
) -> Result<Json<ApiResponse<MarkReadResponse>>, ActivityError> {
    let updated = state.notifications.mark_all_read(me.user_id).await?;
    tracing::debug!(user_id = %me.user_id, updated, "notifications marked read");
    Ok(success_to_api_response(MarkReadResponse { updated }))
}
