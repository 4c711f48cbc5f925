use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use super::model::{
    MAX_SCORE, MIN_SCORE, NewReport, RateCandidate, Rating, RatingInput, Report, ReportReason,
};
use crate::activity::{Activity, ActivityStatus, ParticipantStatus};
use crate::clock::Clock;
use crate::error::ActivityError;
use crate::store::{
    ActivityStore, RatingStore, ReportStore, TrustScoreEngine, UserDirectory, UserProfile,
};

const REPORT_DESCRIPTION_MAX_CHARS: usize = 500;
// 待评价列表只看最近的这么多场活动
const PENDING_SCAN_LIMIT: i64 = 50;

/// 活动结束后的互评与举报
pub struct FeedbackService {
    activities: Arc<dyn ActivityStore>,
    ratings: Arc<dyn RatingStore>,
    reports: Arc<dyn ReportStore>,
    users: Arc<dyn UserDirectory>,
    trust: Arc<dyn TrustScoreEngine>,
    clock: Arc<dyn Clock>,
    detach: bool,
}

// 房主或确认成员
fn took_part(activity: &Activity, user_id: Uuid) -> bool {
    activity.is_host(user_id)
        || activity.participation_status(user_id) == Some(ParticipantStatus::Confirmed)
}

// 除自己以外的房主和确认成员
fn fellow_members(activity: &Activity, user_id: Uuid) -> Vec<Uuid> {
    std::iter::once(activity.host_id)
        .chain(activity.confirmed_user_ids())
        .filter(|member| *member != user_id)
        .collect()
}

impl FeedbackService {
    pub fn new(
        activities: Arc<dyn ActivityStore>,
        ratings: Arc<dyn RatingStore>,
        reports: Arc<dyn ReportStore>,
        users: Arc<dyn UserDirectory>,
        trust: Arc<dyn TrustScoreEngine>,
        clock: Arc<dyn Clock>,
        detach: bool,
    ) -> Self {
        Self {
            activities,
            ratings,
            reports,
            users,
            trust,
            clock,
            detach,
        }
    }

    /// 批量评价同一活动中的其他成员
    ///
    /// 全部校验通过后才逐条写入；写入后触发被评价人的信任分重算，失败只记日志。
    pub async fn submit_ratings(
        &self,
        activity_id: Uuid,
        rater_id: Uuid,
        inputs: Vec<RatingInput>,
    ) -> Result<Vec<Rating>, ActivityError> {
        if inputs.is_empty() {
            return Err(ActivityError::Validation("ratings are required".into()));
        }

        let activity = self
            .activities
            .load(activity_id)
            .await?
            .ok_or(ActivityError::NotFound("activity not found"))?;
        if activity.status != ActivityStatus::Completed {
            return Err(ActivityError::Validation(
                "ratings are only accepted for completed activities".into(),
            ));
        }
        if !took_part(&activity, rater_id) {
            return Err(ActivityError::Forbidden("only participants can rate members"));
        }

        let mut seen = HashSet::new();
        for input in &inputs {
            if !(MIN_SCORE..=MAX_SCORE).contains(&input.score) {
                return Err(ActivityError::Validation(format!(
                    "score must be between {} and {}",
                    MIN_SCORE, MAX_SCORE
                )));
            }
            if input.ratee_id == rater_id {
                return Err(ActivityError::Validation("you cannot rate yourself".into()));
            }
            if !took_part(&activity, input.ratee_id) {
                return Err(ActivityError::Validation(
                    "rated user did not take part in this activity".into(),
                ));
            }
            if !seen.insert(input.ratee_id) {
                return Err(ActivityError::Validation(
                    "each member can only be rated once per submission".into(),
                ));
            }
        }

        let now = self.clock.now();
        let mut saved = Vec::with_capacity(inputs.len());
        for input in inputs {
            let rating = Rating {
                id: Uuid::new_v4(),
                activity_id,
                rater_id,
                ratee_id: input.ratee_id,
                score: input.score,
                tags: input.tags,
                comment: input.comment,
                created_at: now,
            };
            if !self.ratings.insert(&rating).await? {
                return Err(ActivityError::AlreadyRated);
            }
            saved.push(rating);
        }

        info!(%activity_id, %rater_id, count = saved.len(), "ratings submitted");

        let ratees: Vec<Uuid> = saved.iter().map(|r| r.ratee_id).collect();
        if self.detach {
            let trust = self.trust.clone();
            tokio::spawn(async move { recalculate_all(trust, ratees).await });
        } else {
            recalculate_all(self.trust.clone(), ratees).await;
        }

        Ok(saved)
    }

    /// 已完成、且还有同伴没评价过的活动，最近的在前
    pub async fn pending_ratings(&self, user_id: Uuid) -> Result<Vec<Activity>, ActivityError> {
        let completed = Some(ActivityStatus::Completed);
        let joined = self
            .activities
            .list_joined(user_id, completed, 0, PENDING_SCAN_LIMIT)
            .await?;
        let hosted = self
            .activities
            .list_hosted(user_id, completed, 0, PENDING_SCAN_LIMIT)
            .await?;

        let mut pending = Vec::new();
        for activity in joined.items.into_iter().chain(hosted.items) {
            let rated = self.ratings.rated_by(activity.id, user_id).await?;
            let outstanding = fellow_members(&activity, user_id)
                .iter()
                .any(|member| !rated.contains(member));
            if outstanding {
                pending.push(activity);
            }
        }

        pending.sort_by(|a, b| b.date_time.cmp(&a.date_time));
        Ok(pending)
    }

    /// 某活动中当前用户可以评价的同伴
    pub async fn participants_to_rate(
        &self,
        activity_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<RateCandidate>, ActivityError> {
        let activity = self
            .activities
            .load(activity_id)
            .await?
            .ok_or(ActivityError::NotFound("activity not found"))?;
        if !took_part(&activity, user_id) {
            return Err(ActivityError::Forbidden("only participants can rate members"));
        }

        let rated = self.ratings.rated_by(activity_id, user_id).await?;
        let members = fellow_members(&activity, user_id);
        let profiles = join_all(members.iter().map(|member| self.users.get(*member))).await;

        members
            .into_iter()
            .zip(profiles)
            .map(|(member, profile)| -> Result<RateCandidate, ActivityError> {
                Ok(RateCandidate {
                    profile: profile?.unwrap_or_else(|| UserProfile::fallback(member)),
                    already_rated: rated.contains(&member),
                })
            })
            .collect()
    }

    pub async fn submit_report(
        &self,
        reporter_id: Uuid,
        req: NewReport,
    ) -> Result<Report, ActivityError> {
        if req.reported_user_id == reporter_id {
            return Err(ActivityError::Validation("you cannot report yourself".into()));
        }
        let reason = ReportReason::parse(&req.reason)
            .ok_or_else(|| ActivityError::Validation("invalid report reason".into()))?;
        if let Some(description) = &req.description {
            if description.chars().count() > REPORT_DESCRIPTION_MAX_CHARS {
                return Err(ActivityError::Validation(format!(
                    "description must be at most {} characters",
                    REPORT_DESCRIPTION_MAX_CHARS
                )));
            }
        }
        if self.users.get(req.reported_user_id).await?.is_none() {
            return Err(ActivityError::NotFound("user not found"));
        }

        let report = Report {
            id: Uuid::new_v4(),
            reporter_id,
            reported_user_id: req.reported_user_id,
            activity_id: req.activity_id,
            reason,
            description: req.description,
            status: "pending".into(),
            created_at: self.clock.now(),
        };
        self.reports.insert(&report).await?;

        info!(
            report_id = %report.id,
            reference = %report.reference(),
            reason = reason.as_str(),
            "report submitted"
        );
        Ok(report)
    }
}

async fn recalculate_all(trust: Arc<dyn TrustScoreEngine>, ratees: Vec<Uuid>) {
    let results = join_all(ratees.iter().map(|user_id| trust.recalculate(*user_id))).await;
    for (user_id, result) in ratees.iter().zip(results) {
        if let Err(e) = result {
            warn!(%user_id, "trust score recalculation failed: {}", e);
        }
    }
}
