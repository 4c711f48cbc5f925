/// 实时推送总线
/// 私有频道 `user:{id}`，活动广播频道 `activity:{id}`，聊天室频道 `chat:{id}`
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::StoreError;

const USER_CHANNEL_PREFIX: &str = "user:";
const ACTIVITY_CHANNEL_PREFIX: &str = "activity:";
const ROOM_CHANNEL_PREFIX: &str = "chat:";

/// 生成用户私有频道名
pub fn user_channel(user_id: Uuid) -> String {
    format!("{}{}", USER_CHANNEL_PREFIX, user_id)
}

/// 生成活动广播频道名
pub fn activity_channel(activity_id: Uuid) -> String {
    format!("{}{}", ACTIVITY_CHANNEL_PREFIX, activity_id)
}

/// 生成聊天室频道名
pub fn room_channel(room_id: Uuid) -> String {
    format!("{}{}", ROOM_CHANNEL_PREFIX, room_id)
}

/// 推送到频道上的消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub channel: String,
    pub event: String,
    pub payload: serde_json::Value,
}

/// 尽力而为的推送，调用方不等待送达确认
#[async_trait]
pub trait RealtimeBus: Send + Sync {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError>;
}

/// 通过 Redis PUBLISH 推送，由网关进程订阅后转发给客户端
pub struct RedisBus {
    redis: Arc<RedisClient>,
}

impl RedisBus {
    pub fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    event: &'a str,
    payload: &'a serde_json::Value,
}

#[async_trait]
impl RealtimeBus for RedisBus {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let body = serde_json::to_string(&Envelope {
            event,
            payload: &payload,
        })?;

        let receivers: i64 = conn.publish(channel, body).await?;
        tracing::debug!(channel, event, receivers, "published realtime event");
        Ok(())
    }
}

/// 进程内总线，基于 broadcast 通道
///
/// 同时保留最近 `capacity` 条消息便于检查，更早的消息被丢弃。
pub struct LocalBus {
    tx: broadcast::Sender<RealtimeMessage>,
    history: Mutex<VecDeque<RealtimeMessage>>,
    capacity: usize,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            tx: broadcast::channel(capacity).0,
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeMessage> {
        self.tx.subscribe()
    }

    pub fn published(&self) -> Vec<RealtimeMessage> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn published_on(&self, channel: &str) -> Vec<RealtimeMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.channel == channel)
            .collect()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl RealtimeBus for LocalBus {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        let message = RealtimeMessage {
            channel: channel.to_string(),
            event: event.to_string(),
            payload,
        };
        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() == self.capacity {
                history.pop_front();
            }
            history.push_back(message.clone());
        }
        // 没有订阅者时发送失败，忽略即可
        let _ = self.tx.send(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names() {
        let id = Uuid::nil();
        assert_eq!(user_channel(id), format!("user:{}", id));
        assert_eq!(activity_channel(id), format!("activity:{}", id));
        assert_eq!(room_channel(id), format!("chat:{}", id));
    }

    #[tokio::test]
    async fn local_bus_delivers_to_subscribers() {
        let bus = LocalBus::default();
        let mut rx = bus.subscribe();

        bus.publish("user:1", "notification:new", serde_json::json!({"x": 1}))
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event, "notification:new");
        assert_eq!(bus.published_on("user:1").len(), 1);
    }

    #[tokio::test]
    async fn local_bus_history_is_bounded() {
        let bus = LocalBus::new(3);
        for i in 0..5 {
            bus.publish("activity:1", "activity:cancelled", serde_json::json!({ "n": i }))
                .await
                .unwrap();
        }

        let kept: Vec<i64> = bus
            .published()
            .iter()
            .filter_map(|m| m.payload["n"].as_i64())
            .collect();
        assert_eq!(kept, vec![2, 3, 4]);
    }
}
