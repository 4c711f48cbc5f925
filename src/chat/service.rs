use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::json;
use uuid::Uuid;

use super::model::{ChatMessage, ChatRoom};
use crate::clock::Clock;
use crate::error::ActivityError;
use crate::fanout::events;
use crate::realtime::{RealtimeBus, room_channel};
use crate::store::{RoomStore, UserDirectory, UserProfile};

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 100;
pub const MESSAGE_MAX_CHARS: usize = 2000;

/// 聊天室的读写接口，所有操作都只对房间成员开放
pub struct ChatService {
    rooms: Arc<dyn RoomStore>,
    users: Arc<dyn UserDirectory>,
    bus: Arc<dyn RealtimeBus>,
    clock: Arc<dyn Clock>,
}

impl ChatService {
    pub fn new(
        rooms: Arc<dyn RoomStore>,
        users: Arc<dyn UserDirectory>,
        bus: Arc<dyn RealtimeBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rooms,
            users,
            bus,
            clock,
        }
    }

    async fn member_room(&self, room_id: Uuid, user_id: Uuid) -> Result<ChatRoom, ActivityError> {
        let room = self
            .rooms
            .find(room_id)
            .await?
            .ok_or(ActivityError::NotFound("chat room not found"))?;
        if !room.is_member(user_id) {
            return Err(ActivityError::Forbidden("you are not a member of this chat"));
        }
        Ok(room)
    }

    /// 最近的消息，按时间正序
    pub async fn room_messages(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<ChatMessage>, ActivityError> {
        self.member_room(room_id, user_id).await?;

        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        Ok(self.rooms.recent_messages(room_id, limit).await?)
    }

    /// 成员发言。已停用的房间（活动取消后）不再接受消息
    pub async fn post_message(
        &self,
        room_id: Uuid,
        sender_id: Uuid,
        text: &str,
    ) -> Result<ChatMessage, ActivityError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ActivityError::Validation("message text is required".into()));
        }
        if text.chars().count() > MESSAGE_MAX_CHARS {
            return Err(ActivityError::Validation(format!(
                "message must be at most {} characters",
                MESSAGE_MAX_CHARS
            )));
        }

        let room = self.member_room(room_id, sender_id).await?;
        if !room.is_active {
            return Err(ActivityError::ActivityClosed);
        }

        let message = ChatMessage::text(room_id, sender_id, text.to_string(), self.clock.now());
        self.rooms.append_message(&message).await?;
        tracing::debug!(%room_id, %sender_id, message_id = %message.id, "chat message posted");

        let sender = self.profile(sender_id).await;
        let payload = json!({
            "chatRoomId": room_id,
            "message": message,
            "sender": { "id": sender.user_id, "name": sender.display_name },
        });
        if let Err(e) = self
            .bus
            .publish(&room_channel(room_id), events::CHAT_MESSAGE_NEW, payload)
            .await
        {
            tracing::warn!(%room_id, "failed to broadcast chat message: {}", e);
        }

        Ok(message)
    }

    /// 当前用户所在的活跃房间
    pub async fn my_rooms(&self, user_id: Uuid) -> Result<Vec<ChatRoom>, ActivityError> {
        Ok(self.rooms.rooms_for_member(user_id).await?)
    }

    /// 房间成员的资料，顺序与加入顺序一致
    pub async fn participants(
        &self,
        room_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<UserProfile>, ActivityError> {
        let room = self.member_room(room_id, user_id).await?;
        Ok(join_all(room.members.iter().map(|member| self.profile(*member))).await)
    }

    // 资料查询失败不影响聊天，退回占位资料
    async fn profile(&self, user_id: Uuid) -> UserProfile {
        match self.users.get(user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => UserProfile::fallback(user_id),
            Err(e) => {
                tracing::warn!(%user_id, "profile lookup failed: {}", e);
                UserProfile::fallback(user_id)
            }
        }
    }
}
