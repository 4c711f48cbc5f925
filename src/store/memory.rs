// 内存实现，用于测试和本地开发
// 每张“表”一把 tokio Mutex；需要同时持有多把锁时按 activities -> rooms 的顺序获取

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    ActivityStore, NotificationStore, Page, RatingStore, ReportStore, RoomStore, TrustScoreEngine,
    UserDirectory, UserProfile, page_offset,
};
use crate::activity::{Activity, ActivityStatus, ParticipantStatus};
use crate::chat::{ChatMessage, ChatRoom};
use crate::error::StoreError;
use crate::feedback::{Rating, Report};
use crate::notification::Notification;

#[derive(Default)]
pub struct MemoryStore {
    activities: Mutex<HashMap<Uuid, Activity>>,
    rooms: Mutex<HashMap<Uuid, ChatRoom>>,
    messages: Mutex<Vec<ChatMessage>>,
    notifications: Mutex<Vec<Notification>>,
    users: Mutex<HashMap<Uuid, UserProfile>>,
    ratings: Mutex<Vec<Rating>>,
    reports: Mutex<Vec<Report>>,
    recalculated: Mutex<Vec<Uuid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_room(&self, room: ChatRoom) {
        self.rooms.lock().await.insert(room.id, room);
    }

    pub async fn put_user(&self, profile: UserProfile) {
        self.users.lock().await.insert(profile.user_id, profile);
    }

    pub async fn notifications_for(&self, user_id: Uuid) -> Vec<Notification> {
        self.notifications
            .lock()
            .await
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn reports(&self) -> Vec<Report> {
        self.reports.lock().await.clone()
    }

    /// 触发过信任分重算的用户，按调用顺序
    pub async fn recalculated(&self) -> Vec<Uuid> {
        self.recalculated.lock().await.clone()
    }
}

fn paginate<T: Clone>(mut items: Vec<T>, page: i64, limit: i64) -> Page<T> {
    let total = items.len() as i64;
    let start = page_offset(page, limit).min(total) as usize;
    let end = start.saturating_add(limit.max(0) as usize).min(items.len());
    Page {
        items: items.drain(start..end).collect(),
        total,
        page,
        limit,
    }
}

fn status_matches(activity: &Activity, status: Option<ActivityStatus>) -> bool {
    match status {
        Some(s) => activity.status == s,
        None => activity.status != ActivityStatus::Cancelled,
    }
}

fn newest_first(mut activities: Vec<Activity>) -> Vec<Activity> {
    activities.sort_by(|a, b| b.date_time.cmp(&a.date_time));
    activities
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn create(&self, activity: &Activity, room: &ChatRoom) -> Result<(), StoreError> {
        let mut activities = self.activities.lock().await;
        let mut rooms = self.rooms.lock().await;
        if activities.contains_key(&activity.id) || rooms.contains_key(&room.id) {
            return Err(StoreError::Unavailable("duplicate id".into()));
        }
        rooms.insert(room.id, room.clone());
        activities.insert(activity.id, activity.clone());
        Ok(())
    }

    async fn load(&self, activity_id: Uuid) -> Result<Option<Activity>, StoreError> {
        Ok(self.activities.lock().await.get(&activity_id).cloned())
    }

    async fn save(&self, activity: &Activity, expected_version: i64) -> Result<i64, StoreError> {
        let mut activities = self.activities.lock().await;
        let stored = activities
            .get_mut(&activity.id)
            .ok_or_else(|| StoreError::Unavailable("activity does not exist".into()))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict);
        }

        let mut next = activity.clone();
        next.version = expected_version + 1;
        *stored = next;
        Ok(expected_version + 1)
    }

    async fn list_hosted(
        &self,
        host_id: Uuid,
        status: Option<ActivityStatus>,
        page: i64,
        limit: i64,
    ) -> Result<Page<Activity>, StoreError> {
        let matching = self
            .activities
            .lock()
            .await
            .values()
            .filter(|a| a.host_id == host_id && status_matches(a, status))
            .cloned()
            .collect();
        Ok(paginate(newest_first(matching), page, limit))
    }

    async fn list_joined(
        &self,
        user_id: Uuid,
        status: Option<ActivityStatus>,
        page: i64,
        limit: i64,
    ) -> Result<Page<Activity>, StoreError> {
        let matching = self
            .activities
            .lock()
            .await
            .values()
            .filter(|a| {
                !a.is_host(user_id)
                    && a.participation_status(user_id) == Some(ParticipantStatus::Confirmed)
                    && status_matches(a, status)
            })
            .cloned()
            .collect();
        Ok(paginate(newest_first(matching), page, limit))
    }

    async fn find_elapsed(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .activities
            .lock()
            .await
            .values()
            .filter(|a| {
                matches!(a.status, ActivityStatus::Active | ActivityStatus::Full)
                    && a.has_elapsed(now)
            })
            .map(|a| a.id)
            .collect())
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn find(&self, room_id: Uuid) -> Result<Option<ChatRoom>, StoreError> {
        Ok(self.rooms.lock().await.get(&room_id).cloned())
    }

    async fn add_member(&self, room_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let mut rooms = self.rooms.lock().await;
        let room = rooms
            .get_mut(&room_id)
            .ok_or_else(|| StoreError::Unavailable("room does not exist".into()))?;
        if room.is_member(user_id) {
            return Ok(false);
        }
        room.members.push(user_id);
        Ok(true)
    }

    async fn remove_member(&self, room_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let mut rooms = self.rooms.lock().await;
        let room = rooms
            .get_mut(&room_id)
            .ok_or_else(|| StoreError::Unavailable("room does not exist".into()))?;
        let before = room.members.len();
        room.members.retain(|m| *m != user_id);
        Ok(room.members.len() != before)
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get_mut(&message.room_id) {
            room.last_message_at = Some(message.created_at);
        }
        self.messages.lock().await.push(message.clone());
        Ok(())
    }

    async fn recent_messages(
        &self,
        room_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let messages = self.messages.lock().await;
        let in_room: Vec<&ChatMessage> = messages.iter().filter(|m| m.room_id == room_id).collect();
        let skip = in_room.len().saturating_sub(limit.max(0) as usize);
        Ok(in_room.into_iter().skip(skip).cloned().collect())
    }

    async fn set_active(&self, room_id: Uuid, active: bool) -> Result<(), StoreError> {
        if let Some(room) = self.rooms.lock().await.get_mut(&room_id) {
            room.is_active = active;
        }
        Ok(())
    }

    async fn rooms_for_member(&self, user_id: Uuid) -> Result<Vec<ChatRoom>, StoreError> {
        let mut rooms: Vec<ChatRoom> = self
            .rooms
            .lock()
            .await
            .values()
            .filter(|r| r.is_active && r.is_member(user_id))
            .cloned()
            .collect();
        // None 排在最后
        rooms.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(rooms)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create(&self, notification: &Notification) -> Result<(), StoreError> {
        self.notifications.lock().await.push(notification.clone());
        Ok(())
    }

    async fn list(
        &self,
        user_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<(Page<Notification>, i64), StoreError> {
        let mut mine = self.notifications_for(user_id).await;
        let unread = mine.iter().filter(|n| !n.is_read).count() as i64;
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((paginate(mine, page, limit), unread))
    }

    async fn mark_read(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64, StoreError> {
        let mut updated = 0;
        for n in self.notifications.lock().await.iter_mut() {
            if n.user_id == user_id && !n.is_read && ids.contains(&n.id) {
                n.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut updated = 0;
        for n in self.notifications.lock().await.iter_mut() {
            if n.user_id == user_id && !n.is_read {
                n.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.users.lock().await.get(&user_id).cloned())
    }
}

#[async_trait]
impl RatingStore for MemoryStore {
    async fn insert(&self, rating: &Rating) -> Result<bool, StoreError> {
        let mut ratings = self.ratings.lock().await;
        let duplicate = ratings.iter().any(|r| {
            r.activity_id == rating.activity_id
                && r.rater_id == rating.rater_id
                && r.ratee_id == rating.ratee_id
        });
        if duplicate {
            return Ok(false);
        }
        ratings.push(rating.clone());
        Ok(true)
    }

    async fn rated_by(&self, activity_id: Uuid, rater_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .ratings
            .lock()
            .await
            .iter()
            .filter(|r| r.activity_id == activity_id && r.rater_id == rater_id)
            .map(|r| r.ratee_id)
            .collect())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn insert(&self, report: &Report) -> Result<(), StoreError> {
        self.reports.lock().await.push(report.clone());
        Ok(())
    }
}

#[async_trait]
impl TrustScoreEngine for MemoryStore {
    async fn recalculate(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.recalculated.lock().await.push(user_id);
        Ok(())
    }
}
