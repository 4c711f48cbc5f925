use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    JoinRequest,
    JoinApproved,
    JoinRejected,
    MemberRemoved,
    ActivityCancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::JoinRequest => "join_request",
            NotificationKind::JoinApproved => "join_approved",
            NotificationKind::JoinRejected => "join_rejected",
            NotificationKind::MemberRemoved => "member_removed",
            NotificationKind::ActivityCancelled => "activity_cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "join_request" => Some(NotificationKind::JoinRequest),
            "join_approved" => Some(NotificationKind::JoinApproved),
            "join_rejected" => Some(NotificationKind::JoinRejected),
            "member_removed" => Some(NotificationKind::MemberRemoved),
            "activity_cancelled" => Some(NotificationKind::ActivityCancelled),
            _ => None,
        }
    }
}

/// 持久化的站内通知，发给单个用户
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
        data: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            title: title.into(),
            body: body.into(),
            data,
            is_read: false,
            created_at: now,
        }
    }
}
