use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::model::{ChatMessage, DepartureReason};
use crate::activity::ParticipantStatus;
use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::{ActivityStore, RoomStore};

const ROOM_LOCK_STRIPES: usize = 64;

/// 让活动群聊的成员跟随确认成员变化，并写入系统消息
///
/// 重复加入已在房间内的成员、移除不在房间内的成员都是空操作。
/// 同一房间的对齐操作按房间分段加锁串行执行。
#[derive(Clone)]
pub struct RoomSync {
    rooms: Arc<dyn RoomStore>,
    activities: Arc<dyn ActivityStore>,
    clock: Arc<dyn Clock>,
    locks: Arc<Vec<Mutex<()>>>,
}

impl RoomSync {
    pub fn new(
        rooms: Arc<dyn RoomStore>,
        activities: Arc<dyn ActivityStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rooms,
            activities,
            clock,
            locks: Arc::new((0..ROOM_LOCK_STRIPES).map(|_| Mutex::new(())).collect()),
        }
    }

    async fn lock_room(&self, room_id: Uuid) -> MutexGuard<'_, ()> {
        let stripe = (room_id.as_u128() % ROOM_LOCK_STRIPES as u128) as usize;
        self.locks[stripe].lock().await
    }

    /// 按账本的最新状态对齐某个用户在活动群聊里的成员资格
    ///
    /// 读取账本和修改成员在同一把房间锁内完成，后执行的对齐总是看到更新的账本，
    /// 所以无论各次提交的副作用以什么顺序到达，房间成员最终都与确认成员一致。
    pub async fn reconcile(
        &self,
        activity_id: Uuid,
        room_id: Uuid,
        user_id: Uuid,
        display_name: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.lock_room(room_id).await;

        let Some(activity) = self.activities.load(activity_id).await? else {
            tracing::warn!(%activity_id, %room_id, "activity vanished before room sync");
            return Ok(());
        };

        let status = activity.participation_status(user_id);
        if activity.is_host(user_id) || status == Some(ParticipantStatus::Confirmed) {
            return self.on_participant_confirmed(room_id, user_id, display_name).await;
        }

        let (reason, actor) = match status {
            Some(ParticipantStatus::Removed) => (DepartureReason::Removed, activity.host_id),
            _ => (DepartureReason::Left, user_id),
        };
        self.on_participant_removed(room_id, user_id, display_name, reason, actor)
            .await
    }

    pub async fn on_participant_confirmed(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        display_name: &str,
    ) -> Result<(), StoreError> {
        if !self.rooms.add_member(room_id, user_id).await? {
            tracing::debug!(%room_id, %user_id, "member already in room");
            return Ok(());
        }

        let message = ChatMessage::system(
            room_id,
            user_id,
            format!("{} joined the activity", display_name),
            self.clock.now(),
        );
        self.rooms.append_message(&message).await
    }

    /// `actor` 是触发离开的人：被移除时为房主，主动退出时为本人
    pub async fn on_participant_removed(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        display_name: &str,
        reason: DepartureReason,
        actor: Uuid,
    ) -> Result<(), StoreError> {
        if !self.rooms.remove_member(room_id, user_id).await? {
            tracing::debug!(%room_id, %user_id, "member not in room");
            return Ok(());
        }

        let text = match reason {
            DepartureReason::Removed => {
                format!("{} was removed from the activity", display_name)
            }
            DepartureReason::Left => format!("{} left the activity", display_name),
        };
        let message = ChatMessage::system(room_id, actor, text, self.clock.now());
        self.rooms.append_message(&message).await
    }

    /// 活动取消时停用群聊
    pub async fn deactivate(&self, room_id: Uuid) -> Result<(), StoreError> {
        self.rooms.set_active(room_id, false).await
    }
}
