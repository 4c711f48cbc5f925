use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::activity::{ActivityStatus, ParticipantStatus};
use crate::error::ActivityError;
use crate::feedback::RatingInput;

pub const DEFAULT_PAGE_SIZE: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ListQuery {
    pub fn status(&self) -> Result<Option<ActivityStatus>, ActivityError> {
        match self.status.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => ActivityStatus::parse(raw)
                .map(Some)
                .ok_or_else(|| ActivityError::Validation(format!("unknown status {}", raw))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub activity_id: Uuid,
    pub status: ParticipantStatus,
}

#[derive(Debug, Serialize)]
pub struct WaitlistResponse {
    pub activity_id: Uuid,
    pub position: usize,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRatingsRequest {
    pub ratings: Vec<RatingInput>,
}
