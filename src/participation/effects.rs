use uuid::Uuid;

use crate::chat::RoomSync;
use crate::fanout::{DomainEvent, FanOut};

/// 账本提交之后才执行的附带副作用
#[derive(Debug, Clone)]
pub enum SideEffect {
    /// 按账本对齐某个用户在活动群聊里的成员资格
    SyncMember {
        room_id: Uuid,
        user_id: Uuid,
        display_name: String,
    },
    RoomDeactivate {
        room_id: Uuid,
    },
    Publish(DomainEvent),
}

impl SideEffect {
    /// 聊天室成员相关的副作用在返回前同步执行，其余可以脱离请求
    pub fn touches_room(&self) -> bool {
        matches!(
            self,
            SideEffect::SyncMember { .. } | SideEffect::RoomDeactivate { .. }
        )
    }
}

/// 副作用执行器
///
/// 语义是最多一次、不重试：任何一步失败都只记录日志，
/// 已提交的账本修改不会回滚，调用方也不会感知。
#[derive(Clone)]
pub struct EffectRunner {
    rooms: RoomSync,
    fanout: FanOut,
}

impl EffectRunner {
    pub fn new(rooms: RoomSync, fanout: FanOut) -> Self {
        Self { rooms, fanout }
    }

    pub async fn run(&self, activity_id: Uuid, effects: Vec<SideEffect>) {
        for effect in effects {
            match effect {
                SideEffect::SyncMember {
                    room_id,
                    user_id,
                    display_name,
                } => {
                    if let Err(e) = self
                        .rooms
                        .reconcile(activity_id, room_id, user_id, &display_name)
                        .await
                    {
                        tracing::error!(
                            %activity_id,
                            %room_id,
                            %user_id,
                            "room membership sync failed: {}",
                            e
                        );
                    }
                }
                SideEffect::RoomDeactivate { room_id } => {
                    if let Err(e) = self.rooms.deactivate(room_id).await {
                        tracing::error!(
                            %activity_id,
                            %room_id,
                            "room deactivation failed: {}",
                            e
                        );
                    }
                }
                SideEffect::Publish(event) => self.fanout.deliver(&event).await,
            }
        }
    }
}
