use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::notification::Notification;
use crate::store::Page;

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct InboxResponse {
    #[serde(flatten)]
    pub page: Page<Notification>,
    pub unread_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: u64,
}
