use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 聊天室，活动群聊的成员与活动的确认成员保持一致
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: Uuid,
    // 私聊房间没有关联活动
    pub activity_id: Option<Uuid>,
    pub members: Vec<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ChatRoom {
    pub fn for_activity(activity_id: Uuid, host_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            activity_id: Some(activity_id),
            members: vec![host_id],
            is_active: true,
            created_at: now,
            last_message_at: None,
        }
    }

    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::System => "system",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "system" => MessageKind::System,
            _ => MessageKind::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub kind: MessageKind,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn text(room_id: Uuid, sender_id: Uuid, text: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            sender_id,
            kind: MessageKind::Text,
            text,
            created_at: now,
        }
    }

    pub fn system(room_id: Uuid, sender_id: Uuid, text: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            sender_id,
            kind: MessageKind::System,
            text,
            created_at: now,
        }
    }
}

/// 成员离开聊天室的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartureReason {
    Removed,
    Left,
}
