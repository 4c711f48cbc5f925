// 活动本身的生命周期：创建、发布、修改、取消、查询、候补，以及过期活动的清扫

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::coordinator::Coordinator;
use super::effects::SideEffect;
use crate::activity::{
    Activity, ActivityPatch, ActivityStatus, NewActivity, ParticipantStatus, WaitlistEntry,
    validate_capacity,
};
use crate::chat::ChatRoom;
use crate::error::ActivityError;
use crate::fanout::DomainEvent;
use crate::store::{Page, clamp_paging};

const TITLE_MAX_CHARS: usize = 100;
const DESCRIPTION_MAX_CHARS: usize = 500;

/// 单个活动的详情，附带查看者自己的参与状态
#[derive(Debug, Clone, Serialize)]
pub struct ActivityView {
    #[serde(flatten)]
    pub activity: Activity,
    pub request_status: Option<ParticipantStatus>,
    pub is_participant: bool,
    pub is_host: bool,
}

fn validate_title(title: &str) -> Result<(), ActivityError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ActivityError::Validation("title is required".into()));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(ActivityError::Validation(format!(
            "title must be at most {} characters",
            TITLE_MAX_CHARS
        )));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<(), ActivityError> {
    match description {
        Some(d) if d.chars().count() > DESCRIPTION_MAX_CHARS => Err(ActivityError::Validation(
            format!("description must be at most {} characters", DESCRIPTION_MAX_CHARS),
        )),
        _ => Ok(()),
    }
}

fn validate_schedule(date_time: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), ActivityError> {
    if date_time <= now {
        return Err(ActivityError::Validation(
            "activity must be scheduled in the future".into(),
        ));
    }
    Ok(())
}

fn capacity_error() -> ActivityError {
    ActivityError::Validation("max participants must be between 2 and 20".into())
}

impl Coordinator {
    /// 创建活动，同时创建只包含房主的活动群聊
    pub async fn create_activity(
        &self,
        host_id: Uuid,
        req: NewActivity,
    ) -> Result<Activity, ActivityError> {
        let now = self.clock.now();

        validate_title(&req.title)?;
        validate_description(req.description.as_deref())?;
        if req.city.trim().is_empty() {
            return Err(ActivityError::Validation("city is required".into()));
        }
        if !validate_capacity(req.max_participants) {
            return Err(capacity_error());
        }
        validate_schedule(req.date_time, now)?;

        let room_id = Uuid::new_v4();
        let activity = Activity::new(host_id, room_id, req, now);
        let room = ChatRoom {
            id: room_id,
            ..ChatRoom::for_activity(activity.id, host_id, now)
        };

        self.store.create(&activity, &room).await?;

        info!(
            activity_id = %activity.id,
            %host_id,
            status = activity.status.as_str(),
            "activity created"
        );
        Ok(activity)
    }

    /// 草稿 -> active
    pub async fn publish_activity(
        &self,
        activity_id: Uuid,
        host_id: Uuid,
    ) -> Result<Activity, ActivityError> {
        let (activity, _) = self
            .mutate(activity_id, |a, now| {
                if !a.is_host(host_id) {
                    return Err(ActivityError::Forbidden("only the host can publish this activity"));
                }
                validate_schedule(a.date_time, now)?;
                a.publish()
            })
            .await?;

        info!(%activity_id, "activity published");
        Ok(activity)
    }

    /// 修改活动信息。人数上限不能低于当前确认人数，修改后重算 active/full
    pub async fn update_activity(
        &self,
        activity_id: Uuid,
        host_id: Uuid,
        patch: ActivityPatch,
    ) -> Result<Activity, ActivityError> {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        validate_description(patch.description.as_deref())?;
        if let Some(max) = patch.max_participants {
            if !validate_capacity(max) {
                return Err(capacity_error());
            }
        }

        let (activity, change) = self
            .mutate(activity_id, |a, now| {
                if !a.is_host(host_id) {
                    return Err(ActivityError::Forbidden("only the host can update this activity"));
                }
                a.ensure_open(now)?;
                if let Some(max) = patch.max_participants {
                    if max < a.confirmed_count() {
                        return Err(ActivityError::Validation(
                            "max participants cannot be lower than the confirmed count".into(),
                        ));
                    }
                    a.max_participants = max;
                }
                if let Some(date_time) = patch.date_time {
                    validate_schedule(date_time, now)?;
                    a.date_time = date_time;
                }
                if let Some(title) = &patch.title {
                    a.title = title.trim().to_string();
                }
                if let Some(description) = &patch.description {
                    a.description = Some(description.clone());
                }
                if let Some(venue_name) = &patch.venue_name {
                    a.venue_name = Some(venue_name.clone());
                }
                if let Some(venue_address) = &patch.venue_address {
                    a.venue_address = Some(venue_address.clone());
                }
                if let Some(categories) = &patch.categories {
                    a.categories = categories.clone();
                }
                if let Some(mood) = &patch.mood {
                    a.mood = Some(mood.clone());
                }
                Ok(a.recompute_status())
            })
            .await?;

        info!(%activity_id, "activity updated");
        if let Some((from, to)) = change {
            info!(%activity_id, from = from.as_str(), to = to.as_str(), "activity status changed");
        }
        Ok(activity)
    }

    /// 房主取消活动：停用群聊，通知所有确认成员
    pub async fn cancel_activity(
        &self,
        activity_id: Uuid,
        host_id: Uuid,
    ) -> Result<Activity, ActivityError> {
        let (activity, previous) = self
            .mutate(activity_id, |a, now| {
                if !a.is_host(host_id) {
                    return Err(ActivityError::Forbidden("only the host can cancel this activity"));
                }
                a.ensure_open(now)?;
                a.cancel()
            })
            .await?;

        info!(%activity_id, from = previous.as_str(), "activity cancelled");

        let effects = vec![
            SideEffect::RoomDeactivate {
                room_id: activity.companion_room_id,
            },
            SideEffect::Publish(DomainEvent::ActivityCancelled {
                activity_id,
                title: activity.title.clone(),
                participants: activity.confirmed_user_ids(),
            }),
        ];
        self.dispatch(activity_id, effects).await;

        Ok(activity)
    }

    /// 活动详情。已过预定时间的活动在读取时落为 completed
    pub async fn get_activity(
        &self,
        activity_id: Uuid,
        viewer: Uuid,
    ) -> Result<ActivityView, ActivityError> {
        let mut activity = self.load(activity_id).await?;
        if activity.status == ActivityStatus::Draft && !activity.is_host(viewer) {
            return Err(ActivityError::NotFound("activity not found"));
        }

        let now = self.clock.now();
        let completable =
            !activity.status.is_terminal() && activity.status != ActivityStatus::Draft;
        if completable && activity.has_elapsed(now) {
            if let Some(completed) = self.complete(activity_id).await? {
                activity = completed;
            } else {
                activity = self.load(activity_id).await?;
            }
        }

        let request_status = activity.participation_status(viewer);
        Ok(ActivityView {
            is_participant: request_status == Some(ParticipantStatus::Confirmed),
            is_host: activity.is_host(viewer),
            request_status,
            activity,
        })
    }

    /// 把单个已过期活动落为 completed；已被其他请求处理过时返回 None
    async fn complete(&self, activity_id: Uuid) -> Result<Option<Activity>, ActivityError> {
        let result = self
            .mutate(activity_id, |a, now| {
                if a.complete_if_elapsed(now) {
                    Ok(())
                } else {
                    Err(ActivityError::ActivityClosed)
                }
            })
            .await;

        match result {
            Ok((activity, _)) => {
                info!(%activity_id, "activity completed");
                Ok(Some(activity))
            }
            Err(ActivityError::ActivityClosed) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 定时清扫：所有已过期的 active/full 活动落为 completed，返回处理数量
    pub async fn complete_elapsed(&self) -> Result<usize, ActivityError> {
        let ids = self.store.find_elapsed(self.clock.now()).await?;
        let mut completed = 0;

        for activity_id in ids {
            match self.complete(activity_id).await {
                Ok(Some(_)) => completed += 1,
                Ok(None) => {}
                Err(e) => warn!(%activity_id, "failed to complete activity: {}", e),
            }
        }

        Ok(completed)
    }

    pub async fn list_hosted(
        &self,
        host_id: Uuid,
        status: Option<ActivityStatus>,
        page: i64,
        limit: i64,
    ) -> Result<Page<Activity>, ActivityError> {
        let (page, limit) = clamp_paging(page, limit);
        Ok(self.store.list_hosted(host_id, status, page, limit).await?)
    }

    /// 用户作为确认成员参加的活动
    pub async fn list_joined(
        &self,
        user_id: Uuid,
        status: Option<ActivityStatus>,
        page: i64,
        limit: i64,
    ) -> Result<Page<Activity>, ActivityError> {
        let (page, limit) = clamp_paging(page, limit);
        Ok(self.store.list_joined(user_id, status, page, limit).await?)
    }

    /// 加入候补名单，返回从 1 开始的排队位置
    pub async fn join_waitlist(
        &self,
        activity_id: Uuid,
        user_id: Uuid,
    ) -> Result<usize, ActivityError> {
        let (_, position) = self
            .mutate(activity_id, |a, now| {
                if a.status == ActivityStatus::Draft {
                    return Err(ActivityError::NotFound("activity not found"));
                }
                a.ensure_open(now)?;
                if a.is_host(user_id) {
                    return Err(ActivityError::SelfJoin);
                }
                if a.participation_status(user_id) == Some(ParticipantStatus::Confirmed) {
                    return Err(ActivityError::AlreadyConfirmed);
                }
                if a.waitlist.iter().any(|w| w.user_id == user_id) {
                    return Err(ActivityError::AlreadyWaitlisted);
                }
                a.waitlist.push(WaitlistEntry {
                    user_id,
                    requested_at: now,
                });
                Ok(a.waitlist.len())
            })
            .await?;

        info!(%activity_id, %user_id, position, "joined waitlist");
        Ok(position)
    }
}
