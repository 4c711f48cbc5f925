use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 活动人数上限的合法范围
pub const MIN_PARTICIPANTS: i32 = 2;
pub const MAX_PARTICIPANTS: i32 = 20;

/// 活动生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Draft,
    Active,
    Full,
    Completed,
    Cancelled,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Draft => "draft",
            ActivityStatus::Active => "active",
            ActivityStatus::Full => "full",
            ActivityStatus::Completed => "completed",
            ActivityStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(ActivityStatus::Draft),
            "active" => Some(ActivityStatus::Active),
            "full" => Some(ActivityStatus::Full),
            "completed" => Some(ActivityStatus::Completed),
            "cancelled" => Some(ActivityStatus::Cancelled),
            _ => None,
        }
    }

    /// 已取消或已结束的活动不再接受任何修改
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActivityStatus::Completed | ActivityStatus::Cancelled)
    }
}

/// 参与记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Pending,
    Confirmed,
    Rejected,
    Removed,
    Left,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Pending => "pending",
            ParticipantStatus::Confirmed => "confirmed",
            ParticipantStatus::Rejected => "rejected",
            ParticipantStatus::Removed => "removed",
            ParticipantStatus::Left => "left",
        }
    }
}

/// 性别统计分桶
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderCategory {
    Male,
    Female,
    Other,
}

impl GenderCategory {
    /// 用户资料中的性别字段映射到统计分桶，未知或未填写的都计入 other
    pub fn from_profile(gender: Option<&str>) -> Self {
        match gender.map(str::trim) {
            Some(g) if g.eq_ignore_ascii_case("male") => GenderCategory::Male,
            Some(g) if g.eq_ignore_ascii_case("female") => GenderCategory::Female,
            _ => GenderCategory::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenderCount {
    pub male: i32,
    pub female: i32,
    pub other: i32,
}

impl GenderCount {
    pub fn total(&self) -> i32 {
        self.male + self.female + self.other
    }

    pub(crate) fn bucket_mut(&mut self, category: GenderCategory) -> &mut i32 {
        match category {
            GenderCategory::Male => &mut self.male,
            GenderCategory::Female => &mut self.female,
            GenderCategory::Other => &mut self.other,
        }
    }
}

/// 活动内的一条参与记录，没有独立的生命周期
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participation {
    pub user_id: Uuid,
    pub status: ParticipantStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
    // 确认时记录的性别分桶，移除/退出时按它回退计数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<GenderCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub user_id: Uuid,
    pub requested_at: DateTime<Utc>,
}

/// 活动聚合：活动本身加上内嵌的参与记录，作为一个整体加载、修改和持久化
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub host_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
    pub categories: Vec<String>,
    pub city: String,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub date_time: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub max_participants: i32,
    pub participants: Vec<Participation>,
    pub waitlist: Vec<WaitlistEntry>,
    pub gender_count: GenderCount,
    pub mood: Option<String>,
    pub status: ActivityStatus,
    pub companion_room_id: Uuid,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 创建活动的参数
#[derive(Debug, Clone, Deserialize)]
pub struct NewActivity {
    pub title: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub city: String,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub date_time: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub max_participants: i32,
    pub mood: Option<String>,
    #[serde(default)]
    pub draft: bool,
}

/// 房主可以修改的字段
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub date_time: Option<DateTime<Utc>>,
    pub max_participants: Option<i32>,
    pub categories: Option<Vec<String>>,
    pub mood: Option<String>,
}

/// 给列表/信息流消费方的只读快照
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantsSnapshot {
    pub confirmed_count: i32,
    pub gender_count: GenderCount,
    pub participants: Vec<Participation>,
}

impl Activity {
    pub fn new(
        host_id: Uuid,
        companion_room_id: Uuid,
        req: NewActivity,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            host_id,
            title: req.title,
            description: req.description,
            emoji: req.emoji,
            categories: req.categories,
            city: req.city,
            venue_name: req.venue_name,
            venue_address: req.venue_address,
            date_time: req.date_time,
            duration_minutes: req.duration_minutes,
            max_participants: req.max_participants,
            participants: Vec::new(),
            waitlist: Vec::new(),
            gender_count: GenderCount::default(),
            mood: req.mood,
            status: if req.draft {
                ActivityStatus::Draft
            } else {
                ActivityStatus::Active
            },
            companion_room_id,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_host(&self, user_id: Uuid) -> bool {
        self.host_id == user_id
    }

    pub fn snapshot(&self) -> ParticipantsSnapshot {
        ParticipantsSnapshot {
            confirmed_count: self.confirmed_count(),
            gender_count: self.gender_count,
            participants: self.participants.clone(),
        }
    }
}

pub fn validate_capacity(max_participants: i32) -> bool {
    (MIN_PARTICIPANTS..=MAX_PARTICIPANTS).contains(&max_participants)
}
