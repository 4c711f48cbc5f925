use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::ActivityError;
use crate::feedback::{NewReport, Report};
use crate::utils::{ApiResponse, Identity, success_to_api_response};

#[derive(Debug, Deserialize)]
pub struct SubmitReportRequest {
    pub reported_user_id: Uuid,
    pub activity_id: Option<Uuid>,
    pub reason: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportReceipt {
    pub reference: String,
    #[serde(flatten)]
    pub report: Report,
}

#[axum::debug_handler]
pub async fn submit_report(
    State(state): State<AppState>,
    Extension(me): Extension<Identity>,
    Json(req): Json<SubmitReportRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ReportReceipt>>), ActivityError> {
    let report = state
        .feedback
        .submit_report(
            me.user_id,
            NewReport {
                reported_user_id: req.reported_user_id,
                activity_id: req.activity_id,
                reason: req.reason,
                description: req.description,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        success_to_api_response(ReportReceipt {
            reference: report.reference(),
            report,
        }),
    ))
}
