use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::utils::{error_codes, error_to_api_response};

/// 协作方（存储、缓存、推送）的错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 乐观锁版本不一致
    #[error("version conflict")]
    VersionConflict,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Unavailable(String),
}

/// 面向调用方的业务错误，每种错误都有稳定的错误码
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("this activity is no longer available")]
    ActivityClosed,
    #[error("activity is full")]
    Full,
    #[error("participant cannot move from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
    #[error("cannot remove participants within {hours} hours of the activity start")]
    TooLateToRemove { hours: i64 },
    #[error("you cannot request to join your own activity")]
    SelfJoin,
    #[error("you have already joined this activity")]
    AlreadyConfirmed,
    #[error("you already have a pending request")]
    AlreadyPending,
    #[error("already on waitlist")]
    AlreadyWaitlisted,
    #[error("you have already rated this member for this activity")]
    AlreadyRated,
    #[error("{0}")]
    Validation(String),
    #[error("activity was modified concurrently, please retry")]
    Conflict,
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ActivityError {
    pub fn code(&self) -> i32 {
        match self {
            ActivityError::NotFound(_) => error_codes::NOT_FOUND,
            ActivityError::Forbidden(_) => error_codes::PERMISSION_DENIED,
            ActivityError::ActivityClosed => error_codes::ACTIVITY_CLOSED,
            ActivityError::Full => error_codes::ACTIVITY_FULL,
            ActivityError::InvalidTransition { .. } => error_codes::INVALID_TRANSITION,
            ActivityError::TooLateToRemove { .. } => error_codes::TOO_LATE_TO_REMOVE,
            ActivityError::SelfJoin => error_codes::SELF_JOIN,
            ActivityError::AlreadyConfirmed => error_codes::ALREADY_CONFIRMED,
            ActivityError::AlreadyPending => error_codes::ALREADY_PENDING,
            ActivityError::AlreadyWaitlisted => error_codes::ALREADY_WAITLISTED,
            ActivityError::AlreadyRated => error_codes::ALREADY_RATED,
            ActivityError::Validation(_) => error_codes::VALIDATION_ERROR,
            ActivityError::Conflict => error_codes::CONFLICT,
            ActivityError::Storage(_) => error_codes::INTERNAL_ERROR,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ActivityError::NotFound(_) => StatusCode::NOT_FOUND,
            ActivityError::Forbidden(_) => StatusCode::FORBIDDEN,
            ActivityError::Conflict => StatusCode::CONFLICT,
            ActivityError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ActivityError {
    fn into_response(self) -> Response {
        let status = self.status();
        // 内部错误只记录日志，不把细节暴露给客户端
        let message = match &self {
            ActivityError::Storage(e) => {
                tracing::error!("storage failure: {}", e);
                "内部服务器错误".to_string()
            }
            other => other.to_string(),
        };

        (status, error_to_api_response::<()>(self.code(), message)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_and_distinct() {
        let errors = [
            ActivityError::NotFound("activity not found"),
            ActivityError::Forbidden("only the host can approve requests"),
            ActivityError::ActivityClosed,
            ActivityError::Full,
            ActivityError::InvalidTransition {
                from: "confirmed",
                to: "rejected",
            },
            ActivityError::TooLateToRemove { hours: 5 },
            ActivityError::SelfJoin,
            ActivityError::AlreadyConfirmed,
            ActivityError::AlreadyPending,
            ActivityError::AlreadyWaitlisted,
            ActivityError::AlreadyRated,
            ActivityError::Validation("bad".into()),
            ActivityError::Conflict,
            ActivityError::Storage(StoreError::VersionConflict),
        ];

        let mut codes: Vec<i32> = errors.iter().map(ActivityError::code).collect();
        assert_eq!(codes[3], error_codes::ACTIVITY_FULL);
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn maps_http_status() {
        assert_eq!(
            ActivityError::NotFound("x").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ActivityError::Forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ActivityError::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(ActivityError::Full.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ActivityError::TooLateToRemove { hours: 5 }.to_string(),
            "cannot remove participants within 5 hours of the activity start"
        );
    }
}
