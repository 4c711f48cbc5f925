use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::UserProfile;

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 5;

/// 对同一活动中另一位成员的评价
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub rater_id: Uuid,
    pub ratee_id: Uuid,
    pub score: i32,
    pub tags: Vec<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatingInput {
    pub ratee_id: Uuid,
    pub score: i32,
    #[serde(default)]
    pub tags: Vec<String>,
    pub comment: Option<String>,
}

/// 可以评价的同伴，附带是否已经评价过
#[derive(Debug, Clone, Serialize)]
pub struct RateCandidate {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub already_rated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportReason {
    Harassment,
    Inappropriate,
    FakeProfile,
    NoShow,
    SafetyConcern,
    Spam,
    Other,
}

impl ReportReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportReason::Harassment => "harassment",
            ReportReason::Inappropriate => "inappropriate",
            ReportReason::FakeProfile => "fake-profile",
            ReportReason::NoShow => "no-show",
            ReportReason::SafetyConcern => "safety-concern",
            ReportReason::Spam => "spam",
            ReportReason::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "harassment" => Some(ReportReason::Harassment),
            "inappropriate" => Some(ReportReason::Inappropriate),
            "fake-profile" => Some(ReportReason::FakeProfile),
            "no-show" => Some(ReportReason::NoShow),
            "safety-concern" => Some(ReportReason::SafetyConcern),
            "spam" => Some(ReportReason::Spam),
            "other" => Some(ReportReason::Other),
            _ => None,
        }
    }
}

/// 举报，审核流程不在本服务内
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub reporter_id: Uuid,
    pub reported_user_id: Uuid,
    pub activity_id: Option<Uuid>,
    pub reason: ReportReason,
    pub description: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Report {
    /// 给用户看的举报编号，取 id 末四位十六进制
    pub fn reference(&self) -> String {
        let hex = self.id.simple().to_string();
        format!("R-{}", hex[hex.len() - 4..].to_uppercase())
    }
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub reported_user_id: Uuid,
    pub activity_id: Option<Uuid>,
    pub reason: String,
    pub description: Option<String>,
}
