// Postgres 实现
// 活动聚合存为一行，参与记录/候补/性别统计为 JSONB 列，version 列用于比较交换

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{
    ActivityStore, NotificationStore, Page, RatingStore, ReportStore, RoomStore, TrustScoreEngine,
    UserDirectory, UserProfile, page_offset,
};
use crate::activity::{Activity, ActivityStatus, GenderCount, Participation, WaitlistEntry};
use crate::chat::{ChatMessage, ChatRoom, MessageKind};
use crate::error::StoreError;
use crate::feedback::{Rating, Report};
use crate::notification::{Notification, NotificationKind};

pub struct PgStore {
    db: Arc<PgPool>,
}

impl PgStore {
    pub fn new(db: Arc<PgPool>) -> Self {
        Self { db }
    }
}

const ACTIVITY_COLUMNS: &str = r#"
    id, host_id, title, description, emoji, categories, city, venue_name, venue_address,
    date_time, duration_minutes, max_participants, participants, waitlist, gender_count,
    mood, status, companion_room_id, version, created_at, updated_at
"#;

#[derive(FromRow)]
struct ActivityRow {
    id: Uuid,
    host_id: Uuid,
    title: String,
    description: Option<String>,
    emoji: Option<String>,
    categories: Vec<String>,
    city: String,
    venue_name: Option<String>,
    venue_address: Option<String>,
    date_time: DateTime<Utc>,
    duration_minutes: Option<i32>,
    max_participants: i32,
    participants: Json<Vec<Participation>>,
    waitlist: Json<Vec<WaitlistEntry>>,
    gender_count: Json<GenderCount>,
    mood: Option<String>,
    status: String,
    companion_room_id: Uuid,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ActivityRow> for Activity {
    type Error = StoreError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        let status = ActivityStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Unavailable(format!("unknown activity status {}", row.status))
        })?;

        Ok(Activity {
            id: row.id,
            host_id: row.host_id,
            title: row.title,
            description: row.description,
            emoji: row.emoji,
            categories: row.categories,
            city: row.city,
            venue_name: row.venue_name,
            venue_address: row.venue_address,
            date_time: row.date_time,
            duration_minutes: row.duration_minutes,
            max_participants: row.max_participants,
            participants: row.participants.0,
            waitlist: row.waitlist.0,
            gender_count: row.gender_count.0,
            mood: row.mood,
            status,
            companion_room_id: row.companion_room_id,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_activities(rows: Vec<ActivityRow>) -> Result<Vec<Activity>, StoreError> {
    rows.into_iter().map(Activity::try_from).collect()
}

#[derive(FromRow)]
struct RoomRow {
    id: Uuid,
    activity_id: Option<Uuid>,
    is_active: bool,
    created_at: DateTime<Utc>,
    last_message_at: Option<DateTime<Utc>>,
}

#[derive(FromRow)]
struct MessageRow {
    id: Uuid,
    room_id: Uuid,
    sender_id: Uuid,
    kind: String,
    text: String,
    created_at: DateTime<Utc>,
}

impl RoomRow {
    fn into_room(self, members: Vec<Uuid>) -> ChatRoom {
        ChatRoom {
            id: self.id,
            activity_id: self.activity_id,
            members,
            is_active: self.is_active,
            created_at: self.created_at,
            last_message_at: self.last_message_at,
        }
    }
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        ChatMessage {
            id: row.id,
            room_id: row.room_id,
            sender_id: row.sender_id,
            kind: MessageKind::parse(&row.kind),
            text: row.text,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    title: String,
    body: String,
    data: Json<serde_json::Value>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind = NotificationKind::parse(&row.kind).ok_or_else(|| {
            StoreError::Unavailable(format!("unknown notification kind {}", row.kind))
        })?;

        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            kind,
            title: row.title,
            body: row.body,
            data: row.data.0,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl ActivityStore for PgStore {
    async fn create(&self, activity: &Activity, room: &ChatRoom) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO chat_rooms (id, activity_id, is_active, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(room.id)
        .bind(room.activity_id)
        .bind(room.is_active)
        .bind(room.created_at)
        .execute(&mut *tx)
        .await?;

        for member in &room.members {
            sqlx::query(
                r#"
                INSERT INTO chat_room_members (room_id, user_id, joined_at)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(room.id)
            .bind(member)
            .bind(room.created_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO activities (
                id, host_id, title, description, emoji, categories, city, venue_name,
                venue_address, date_time, duration_minutes, max_participants, participants,
                waitlist, gender_count, mood, status, companion_room_id, version,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21)
            "#,
        )
        .bind(activity.id)
        .bind(activity.host_id)
        .bind(&activity.title)
        .bind(&activity.description)
        .bind(&activity.emoji)
        .bind(&activity.categories)
        .bind(&activity.city)
        .bind(&activity.venue_name)
        .bind(&activity.venue_address)
        .bind(activity.date_time)
        .bind(activity.duration_minutes)
        .bind(activity.max_participants)
        .bind(Json(&activity.participants))
        .bind(Json(&activity.waitlist))
        .bind(Json(&activity.gender_count))
        .bind(&activity.mood)
        .bind(activity.status.as_str())
        .bind(activity.companion_room_id)
        .bind(activity.version)
        .bind(activity.created_at)
        .bind(activity.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn load(&self, activity_id: Uuid) -> Result<Option<Activity>, StoreError> {
        let row = sqlx::query_as::<_, ActivityRow>(&format!(
            "SELECT {} FROM activities WHERE id = $1",
            ACTIVITY_COLUMNS
        ))
        .bind(activity_id)
        .fetch_optional(&*self.db)
        .await?;

        row.map(Activity::try_from).transpose()
    }

    async fn save(&self, activity: &Activity, expected_version: i64) -> Result<i64, StoreError> {
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE activities SET
                title = $3, description = $4, categories = $5, venue_name = $6,
                venue_address = $7, date_time = $8, max_participants = $9,
                participants = $10, waitlist = $11, gender_count = $12, mood = $13,
                status = $14, updated_at = $15, version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(activity.id)
        .bind(expected_version)
        .bind(&activity.title)
        .bind(&activity.description)
        .bind(&activity.categories)
        .bind(&activity.venue_name)
        .bind(&activity.venue_address)
        .bind(activity.date_time)
        .bind(activity.max_participants)
        .bind(Json(&activity.participants))
        .bind(Json(&activity.waitlist))
        .bind(Json(&activity.gender_count))
        .bind(&activity.mood)
        .bind(activity.status.as_str())
        .bind(activity.updated_at)
        .fetch_optional(&*self.db)
        .await?;

        version.ok_or(StoreError::VersionConflict)
    }

    async fn list_hosted(
        &self,
        host_id: Uuid,
        status: Option<ActivityStatus>,
        page: i64,
        limit: i64,
    ) -> Result<Page<Activity>, StoreError> {
        let filter = r#"
            host_id = $1
            AND (($2::text IS NULL AND status <> 'cancelled') OR status = $2)
        "#;
        let status = status.map(|s| s.as_str());

        let rows = sqlx::query_as::<_, ActivityRow>(&format!(
            "SELECT {} FROM activities WHERE {} ORDER BY date_time DESC LIMIT $3 OFFSET $4",
            ACTIVITY_COLUMNS, filter
        ))
        .bind(host_id)
        .bind(status)
        .bind(limit)
        .bind(page_offset(page, limit))
        .fetch_all(&*self.db)
        .await?;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM activities WHERE {}", filter))
                .bind(host_id)
                .bind(status)
                .fetch_one(&*self.db)
                .await?;

        Ok(Page {
            items: into_activities(rows)?,
            total,
            page,
            limit,
        })
    }

    async fn list_joined(
        &self,
        user_id: Uuid,
        status: Option<ActivityStatus>,
        page: i64,
        limit: i64,
    ) -> Result<Page<Activity>, StoreError> {
        let filter = r#"
            host_id <> $1
            AND participants @> $2
            AND (($3::text IS NULL AND status <> 'cancelled') OR status = $3)
        "#;
        let confirmed = Json(json!([{ "user_id": user_id, "status": "confirmed" }]));
        let status = status.map(|s| s.as_str());

        let rows = sqlx::query_as::<_, ActivityRow>(&format!(
            "SELECT {} FROM activities WHERE {} ORDER BY date_time DESC LIMIT $4 OFFSET $5",
            ACTIVITY_COLUMNS, filter
        ))
        .bind(user_id)
        .bind(&confirmed)
        .bind(status)
        .bind(limit)
        .bind(page_offset(page, limit))
        .fetch_all(&*self.db)
        .await?;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM activities WHERE {}", filter))
                .bind(user_id)
                .bind(&confirmed)
                .bind(status)
                .fetch_one(&*self.db)
                .await?;

        Ok(Page {
            items: into_activities(rows)?,
            total,
            page,
            limit,
        })
    }

    async fn find_elapsed(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT id FROM activities
            WHERE status IN ('active', 'full') AND date_time < $1
            "#,
        )
        .bind(now)
        .fetch_all(&*self.db)
        .await?;

        Ok(ids)
    }
}

#[async_trait]
impl RoomStore for PgStore {
    async fn find(&self, room_id: Uuid) -> Result<Option<ChatRoom>, StoreError> {
        let row = sqlx::query_as::<_, RoomRow>(
            r#"
            SELECT id, activity_id, is_active, created_at, last_message_at
            FROM chat_rooms
            WHERE id = $1
            "#,
        )
        .bind(room_id)
        .fetch_optional(&*self.db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let members = sqlx::query_scalar(
            r#"
            SELECT user_id FROM chat_room_members
            WHERE room_id = $1
            ORDER BY joined_at
            "#,
        )
        .bind(room_id)
        .fetch_all(&*self.db)
        .await?;

        Ok(Some(row.into_room(members)))
    }

    async fn add_member(&self, room_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO chat_room_members (room_id, user_id, joined_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (room_id, user_id) DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .execute(&*self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove_member(&self, room_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM chat_room_members WHERE room_id = $1 AND user_id = $2")
                .bind(room_id)
                .bind(user_id)
                .execute(&*self.db)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            WITH inserted AS (
                INSERT INTO chat_messages (id, room_id, sender_id, kind, text, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING room_id, created_at
            )
            UPDATE chat_rooms SET last_message_at = inserted.created_at
            FROM inserted
            WHERE chat_rooms.id = inserted.room_id
            "#,
        )
        .bind(message.id)
        .bind(message.room_id)
        .bind(message.sender_id)
        .bind(message.kind.as_str())
        .bind(&message.text)
        .bind(message.created_at)
        .execute(&*self.db)
        .await?;

        Ok(())
    }

    async fn recent_messages(
        &self,
        room_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        // 取最近的 limit 条，再按时间正序返回
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT * FROM (
                SELECT id, room_id, sender_id, kind, text, created_at
                FROM chat_messages
                WHERE room_id = $1
                ORDER BY created_at DESC
                LIMIT $2
            ) recent
            ORDER BY created_at ASC
            "#,
        )
        .bind(room_id)
        .bind(limit)
        .fetch_all(&*self.db)
        .await?;

        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }

    async fn set_active(&self, room_id: Uuid, active: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE chat_rooms SET is_active = $2 WHERE id = $1")
            .bind(room_id)
            .bind(active)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn rooms_for_member(&self, user_id: Uuid) -> Result<Vec<ChatRoom>, StoreError> {
        let rows = sqlx::query_as::<_, RoomRow>(
            r#"
            SELECT r.id, r.activity_id, r.is_active, r.created_at, r.last_message_at
            FROM chat_rooms r
            JOIN chat_room_members m ON m.room_id = r.id
            WHERE m.user_id = $1 AND r.is_active
            ORDER BY r.last_message_at DESC NULLS LAST, r.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&*self.db)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let pairs: Vec<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            SELECT room_id, user_id FROM chat_room_members
            WHERE room_id = ANY($1)
            ORDER BY joined_at
            "#,
        )
        .bind(&ids)
        .fetch_all(&*self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let members = pairs
                    .iter()
                    .filter(|(room_id, _)| *room_id == row.id)
                    .map(|(_, user_id)| *user_id)
                    .collect();
                row.into_room(members)
            })
            .collect())
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn create(&self, notification: &Notification) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, body, data, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(Json(&notification.data))
        .bind(notification.is_read)
        .bind(notification.created_at)
        .execute(&*self.db)
        .await?;

        Ok(())
    }

    async fn list(
        &self,
        user_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<(Page<Notification>, i64), StoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, user_id, kind, title, body, data, is_read, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(page_offset(page, limit))
        .fetch_all(&*self.db)
        .await?;

        let (total, unread): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE NOT is_read)
            FROM notifications
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&*self.db)
        .await?;

        let items = rows
            .into_iter()
            .map(Notification::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((
            Page {
                items,
                total,
                page,
                limit,
            },
            unread,
        ))
    }

    async fn mark_read(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications SET is_read = TRUE
            WHERE user_id = $1 AND id = ANY($2) AND NOT is_read
            "#,
        )
        .bind(user_id)
        .bind(ids)
        .execute(&*self.db)
        .await?;

        Ok(result.rows_affected())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .execute(&*self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError> {
        let row: Option<(Uuid, String, Option<String>)> =
            sqlx::query_as("SELECT id, display_name, gender FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&*self.db)
                .await?;

        Ok(row.map(|(user_id, display_name, gender)| UserProfile {
            user_id,
            display_name,
            gender,
        }))
    }
}

#[async_trait]
impl RatingStore for PgStore {
    async fn insert(&self, rating: &Rating) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO ratings (
                id, activity_id, rater_id, ratee_id, score, tags, comment, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (activity_id, rater_id, ratee_id) DO NOTHING
            "#,
        )
        .bind(rating.id)
        .bind(rating.activity_id)
        .bind(rating.rater_id)
        .bind(rating.ratee_id)
        .bind(rating.score)
        .bind(&rating.tags)
        .bind(&rating.comment)
        .bind(rating.created_at)
        .execute(&*self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn rated_by(&self, activity_id: Uuid, rater_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let ratees = sqlx::query_scalar(
            "SELECT ratee_id FROM ratings WHERE activity_id = $1 AND rater_id = $2",
        )
        .bind(activity_id)
        .bind(rater_id)
        .fetch_all(&*self.db)
        .await?;

        Ok(ratees)
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn insert(&self, report: &Report) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO reports (
                id, reporter_id, reported_user_id, activity_id, reason, description, status,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(report.id)
        .bind(report.reporter_id)
        .bind(report.reported_user_id)
        .bind(report.activity_id)
        .bind(report.reason.as_str())
        .bind(&report.description)
        .bind(&report.status)
        .bind(report.created_at)
        .execute(&*self.db)
        .await?;

        Ok(())
    }
}

/// 信任分取收到评分的平均值
#[async_trait]
impl TrustScoreEngine for PgStore {
    async fn recalculate(&self, user_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users SET trust_score = COALESCE(
                (SELECT AVG(score)::float8 FROM ratings WHERE ratee_id = $1),
                trust_score
            )
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&*self.db)
        .await?;

        Ok(())
    }
}
