use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use super::model::{
    DEFAULT_PAGE_SIZE, JoinResponse, ListQuery, SubmitRatingsRequest, WaitlistResponse,
};
use crate::AppState;
use crate::activity::{Activity, ActivityPatch, NewActivity, Participation, ParticipantsSnapshot};
use crate::error::ActivityError;
use crate::feedback::{RateCandidate, Rating};
use crate::participation::ActivityView;
use crate::store::Page;
use crate::utils::{ApiResponse, Identity, success_to_api_response};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ActivityError>;

#[axum::debug_handler]
pub async fn create_activity(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Json(req): Json<NewActivity>,
) -> Result<(StatusCode, Json<ApiResponse<Activity>>), ActivityError> {
    let activity = state.coordinator.create_activity(me.user_id, req).await?;
    Ok((StatusCode::CREATED, success_to_api_response(activity)))
}

#[axum::debug_handler]
pub async fn get_activity(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path(activity_id): Path<Uuid>,
) -> ApiResult<ActivityView> {
    let view = state.coordinator.get_activity(activity_id, me.user_id).await?;
    Ok(success_to_api_response(view))
}

#[axum::debug_handler]
pub async fn update_activity(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path(activity_id): Path<Uuid>,
    Json(patch): Json<ActivityPatch>,
) -> ApiResult<Activity> {
    let activity = state
        .coordinator
        .update_activity(activity_id, me.user_id, patch)
        .await?;
    Ok(success_to_api_response(activity))
}

#[axum::debug_handler]
pub async fn publish_activity(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path(activity_id): Path<Uuid>,
) -> ApiResult<Activity> {
    let activity = state.coordinator.publish_activity(activity_id, me.user_id).await?;
    Ok(success_to_api_response(activity))
}

#[axum::debug_handler]
pub async fn cancel_activity(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path(activity_id): Path<Uuid>,
) -> ApiResult<Activity> {
    let activity = state.coordinator.cancel_activity(activity_id, me.user_id).await?;
    Ok(success_to_api_response(activity))
}

#[axum::debug_handler]
pub async fn list_hosted(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Page<Activity>> {
    let page = state
        .coordinator
        .list_hosted(
            me.user_id,
            query.status()?,
            query.page.unwrap_or(0),
            query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(success_to_api_response(page))
}

#[axum::debug_handler]
pub async fn list_joined(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Page<Activity>> {
    let page = state
        .coordinator
        .list_joined(
            me.user_id,
            query.status()?,
            query.page.unwrap_or(0),
            query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(success_to_api_response(page))
}

// 申请加入
#[axum::debug_handler]
pub async fn request_join(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path(activity_id): Path<Uuid>,
) -> ApiResult<JoinResponse> {
    let status = state.coordinator.request_join(activity_id, me.user_id).await?;
    Ok(success_to_api_response(JoinResponse {
        activity_id,
        status,
    }))
}

// 撤回申请
#[axum::debug_handler]
pub async fn withdraw_request(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path(activity_id): Path<Uuid>,
) -> ApiResult<()> {
    state.coordinator.withdraw(activity_id, me.user_id).await?;
    Ok(success_to_api_response(()))
}

#[axum::debug_handler]
pub async fn pending_requests(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path(activity_id): Path<Uuid>,
) -> ApiResult<Vec<Participation>> {
    let requests = state
        .coordinator
        .pending_requests(activity_id, me.user_id)
        .await?;
    Ok(success_to_api_response(requests))
}

#[axum::debug_handler]
pub async fn approve_request(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path((activity_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<ParticipantsSnapshot> {
    let activity = state
        .coordinator
        .approve(activity_id, me.user_id, user_id)
        .await?;
    Ok(success_to_api_response(activity.snapshot()))
}

#[axum::debug_handler]
pub async fn reject_request(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path((activity_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<()> {
    state
        .coordinator
        .reject(activity_id, me.user_id, user_id)
        .await?;
    Ok(success_to_api_response(()))
}

#[axum::debug_handler]
pub async fn remove_participant(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path((activity_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<ParticipantsSnapshot> {
    let activity = state
        .coordinator
        .remove_participant(activity_id, me.user_id, user_id)
        .await?;
    Ok(success_to_api_response(activity.snapshot()))
}

#[axum::debug_handler]
pub async fn leave_activity(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path(activity_id): Path<Uuid>,
) -> ApiResult<ParticipantsSnapshot> {
    let activity = state.coordinator.leave(activity_id, me.user_id).await?;
    Ok(success_to_api_response(activity.snapshot()))
}

#[axum::debug_handler]
pub async fn participants(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path(activity_id): Path<Uuid>,
) -> ApiResult<ParticipantsSnapshot> {
    let snapshot = state
        .coordinator
        .participants_snapshot(activity_id, me.user_id)
        .await?;
    Ok(success_to_api_response(snapshot))
}

#[axum::debug_handler]
pub async fn join_waitlist(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path(activity_id): Path<Uuid>,
) -> ApiResult<WaitlistResponse> {
    let position = state
        .coordinator
        .join_waitlist(activity_id, me.user_id)
        .await?;
    Ok(success_to_api_response(WaitlistResponse {
        activity_id,
        position,
    }))
}

#[axum::debug_handler]
pub async fn submit_ratings(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path(activity_id): Path<Uuid>,
    Json(req): Json<SubmitRatingsRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<Rating>>>), ActivityError> {
    let ratings = state
        .feedback
        .submit_ratings(activity_id, me.user_id, req.ratings)
        .await?;
    Ok((StatusCode::CREATED, success_to_api_response(ratings)))
}

#[axum::debug_handler]
pub async fn participants_to_rate(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Path(activity_id): Path<Uuid>,
) -> ApiResult<Vec<RateCandidate>> {
    let candidates = state
        .feedback
        .participants_to_rate(activity_id, me.user_id)
        .await?;
    Ok(success_to_api_response(candidates))
}

#[axum::debug_handler]
pub async fn pending_ratings(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
) -> ApiResult<Vec<Activity>> {
    let activities = state.feedback.pending_ratings(me.user_id).await?;
    Ok(success_to_api_response(activities))
}
