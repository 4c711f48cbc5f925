/// 存储与外部协作方接口
/// 业务层只依赖这里的 trait，Postgres 与内存实现分别在子模块中
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::activity::{Activity, ActivityStatus};
use crate::chat::{ChatMessage, ChatRoom};
use crate::error::StoreError;
use crate::feedback::{Rating, Report};
use crate::notification::Notification;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// 分页结果
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// 活动聚合存储，写入采用版本号比较交换
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// 在同一事务内创建活动及其群聊
    async fn create(&self, activity: &Activity, room: &ChatRoom) -> Result<(), StoreError>;

    async fn load(&self, activity_id: Uuid) -> Result<Option<Activity>, StoreError>;

    /// 仅当存储中的版本等于 `expected_version` 时写入，返回新版本号；
    /// 否则返回 [`StoreError::VersionConflict`]
    async fn save(&self, activity: &Activity, expected_version: i64) -> Result<i64, StoreError>;

    async fn list_hosted(
        &self,
        host_id: Uuid,
        status: Option<ActivityStatus>,
        page: i64,
        limit: i64,
    ) -> Result<Page<Activity>, StoreError>;

    async fn list_joined(
        &self,
        user_id: Uuid,
        status: Option<ActivityStatus>,
        page: i64,
        limit: i64,
    ) -> Result<Page<Activity>, StoreError>;

    /// 预定时间已过但仍为 active/full 的活动
    async fn find_elapsed(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError>;
}

/// 聊天室存储。成员增删是单条原子操作，同一房间的修改不会互相覆盖
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn find(&self, room_id: Uuid) -> Result<Option<ChatRoom>, StoreError>;

    /// 返回是否新加入
    async fn add_member(&self, room_id: Uuid, user_id: Uuid) -> Result<bool, StoreError>;

    /// 返回是否确实移除
    async fn remove_member(&self, room_id: Uuid, user_id: Uuid) -> Result<bool, StoreError>;

    async fn append_message(&self, message: &ChatMessage) -> Result<(), StoreError>;

    async fn recent_messages(
        &self,
        room_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, StoreError>;

    async fn set_active(&self, room_id: Uuid, active: bool) -> Result<(), StoreError>;

    /// 用户所在的活跃房间，最近有消息的在前
    async fn rooms_for_member(&self, user_id: Uuid) -> Result<Vec<ChatRoom>, StoreError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, notification: &Notification) -> Result<(), StoreError>;

    /// 返回分页结果与未读数
    async fn list(
        &self,
        user_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<(Page<Notification>, i64), StoreError>;

    async fn mark_read(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64, StoreError>;

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, StoreError>;
}

/// 用户资料（只读）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub display_name: String,
    pub gender: Option<String>,
}

impl UserProfile {
    /// 资料缺失时使用的占位资料
    pub fn fallback(user_id: Uuid) -> Self {
        Self {
            user_id,
            display_name: "A user".to_string(),
            gender: None,
        }
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError>;
}

#[async_trait]
pub trait RatingStore: Send + Sync {
    /// 同一活动内同一评价人对同一被评价人只能评一次，重复时返回 false
    async fn insert(&self, rating: &Rating) -> Result<bool, StoreError>;

    /// 某人在某活动中已经评价过的用户
    async fn rated_by(&self, activity_id: Uuid, rater_id: Uuid) -> Result<Vec<Uuid>, StoreError>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn insert(&self, report: &Report) -> Result<(), StoreError>;
}

/// 信任分重算，计算细节不在本服务范围内
#[async_trait]
pub trait TrustScoreEngine: Send + Sync {
    async fn recalculate(&self, user_id: Uuid) -> Result<(), StoreError>;
}

pub(crate) const MAX_PAGE_SIZE: i64 = 50;
const MAX_PAGE: i64 = 1_000_000;

pub(crate) fn clamp_paging(page: i64, limit: i64) -> (i64, i64) {
    (page.clamp(0, MAX_PAGE), limit.clamp(1, MAX_PAGE_SIZE))
}

/// 分页偏移量，不会溢出
pub(crate) fn page_offset(page: i64, limit: i64) -> i64 {
    page.max(0).saturating_mul(limit.max(0))
}
