use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;
use crate::middleware::{auth_middleware, log_errors};

pub mod activity;
pub mod chat;
pub mod notification;
pub mod report;

/// 全部接口都需要认证，统一挂在 `api_base_uri` 下
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        // 活动
        .route("/activities", post(activity::create_activity))
        .route("/activities/hosted", get(activity::list_hosted))
        .route("/activities/joined", get(activity::list_joined))
        .route(
            "/activities/{activity_id}",
            get(activity::get_activity).patch(activity::update_activity),
        )
        .route("/activities/{activity_id}/publish", post(activity::publish_activity))
        .route("/activities/{activity_id}/cancel", post(activity::cancel_activity))
        // 参与
        .route(
            "/activities/{activity_id}/join",
            post(activity::request_join).delete(activity::withdraw_request),
        )
        .route("/activities/{activity_id}/requests", get(activity::pending_requests))
        .route(
            "/activities/{activity_id}/requests/{user_id}/approve",
            post(activity::approve_request),
        )
        .route(
            "/activities/{activity_id}/requests/{user_id}/reject",
            post(activity::reject_request),
        )
        .route("/activities/{activity_id}/participants", get(activity::participants))
        .route(
            "/activities/{activity_id}/participants/{user_id}",
            axum::routing::delete(activity::remove_participant),
        )
        .route("/activities/{activity_id}/leave", post(activity::leave_activity))
        .route("/activities/{activity_id}/waitlist", post(activity::join_waitlist))
        // 评价
        .route("/activities/{activity_id}/ratings", post(activity::submit_ratings))
        .route(
            "/activities/{activity_id}/ratings/participants",
            get(activity::participants_to_rate),
        )
        .route("/ratings/pending", get(activity::pending_ratings))
        // 通知
        .route("/notifications", get(notification::list_notifications))
        .route("/notifications/read", post(notification::mark_read))
        .route("/notifications/read-all", post(notification::mark_all_read))
        // 聊天
        .route("/chat/rooms", get(chat::list_my_rooms))
        .route(
            "/chat/rooms/{room_id}/messages",
            get(chat::get_room_messages).post(chat::post_message),
        )
        .route("/chat/rooms/{room_id}/participants", get(chat::room_participants))
        // 举报
        .route("/reports", post(report::submit_report))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest(&state.config.api_base_uri, protected_routes)
        .layer(axum::middleware::from_fn(log_errors))
        .with_state(state)
}
