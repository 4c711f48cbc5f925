use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::effects::{EffectRunner, SideEffect};
use crate::activity::{
    Activity, ActivityStatus, GenderCategory, ParticipantStatus, Participation,
    ParticipantsSnapshot,
};
use crate::chat::RoomSync;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{ActivityError, StoreError};
use crate::fanout::{DomainEvent, FanOut};
use crate::realtime::RealtimeBus;
use crate::store::{ActivityStore, NotificationStore, RoomStore, UserDirectory, UserProfile};

/// 活动参与协调器
///
/// 申请/审批/拒绝/撤回/移除/退出都经过这里。每个操作对活动聚合做一次
/// 读-校验-写，写入用版本号比较交换，冲突时重新加载并重新校验，
/// 因此同一活动上的修改是串行化的，不同活动之间互不影响。
/// 聊天室同步、通知和推送在写入提交之后才执行：聊天室成员在返回前同步完成，
/// 通知和推送按配置可以脱离请求异步执行。
pub struct Coordinator {
    pub(super) store: Arc<dyn ActivityStore>,
    users: Arc<dyn UserDirectory>,
    effects: EffectRunner,
    pub(super) clock: Arc<dyn Clock>,
    freeze_window: Duration,
    retry_limit: u32,
    detach_effects: bool,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        rooms: Arc<dyn RoomStore>,
        notifications: Arc<dyn NotificationStore>,
        users: Arc<dyn UserDirectory>,
        bus: Arc<dyn RealtimeBus>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let effects = EffectRunner::new(
            RoomSync::new(rooms, store.clone(), clock.clone()),
            FanOut::new(notifications, bus, clock.clone()),
        );

        Self {
            store,
            users,
            effects,
            clock,
            freeze_window: config.freeze_window(),
            retry_limit: config.conflict_retry_limit,
            detach_effects: config.detach_side_effects,
        }
    }

    /// 加载 -> 修改 -> 按版本写回，版本冲突时重试
    ///
    /// `op` 在每次尝试时都会基于最新加载的聚合重新执行，返回错误时不写入。
    pub(super) async fn mutate<T, F>(
        &self,
        activity_id: Uuid,
        mut op: F,
    ) -> Result<(Activity, T), ActivityError>
    where
        F: FnMut(&mut Activity, DateTime<Utc>) -> Result<T, ActivityError>,
    {
        let mut conflicts = 0;
        loop {
            let mut activity = self
                .store
                .load(activity_id)
                .await?
                .ok_or(ActivityError::NotFound("activity not found"))?;
            let expected = activity.version;
            let now = self.clock.now();

            let output = op(&mut activity, now)?;
            activity.updated_at = now;

            match self.store.save(&activity, expected).await {
                Ok(version) => {
                    activity.version = version;
                    return Ok((activity, output));
                }
                Err(StoreError::VersionConflict) => {
                    conflicts += 1;
                    if conflicts > self.retry_limit {
                        warn!(
                            %activity_id,
                            conflicts,
                            "giving up after repeated version conflicts"
                        );
                        return Err(ActivityError::Conflict);
                    }
                    debug!(%activity_id, version = expected, "version conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub(super) async fn load(&self, activity_id: Uuid) -> Result<Activity, ActivityError> {
        self.store
            .load(activity_id)
            .await?
            .ok_or(ActivityError::NotFound("activity not found"))
    }

    /// 副作用在临界区之外执行，失败不会影响已提交的修改
    ///
    /// 聊天室成员同步总是在返回前完成；通知和推送在 `detach_effects` 时交给后台任务。
    pub(super) async fn dispatch(&self, activity_id: Uuid, effects: Vec<SideEffect>) {
        let (room, fanout): (Vec<_>, Vec<_>) =
            effects.into_iter().partition(SideEffect::touches_room);

        if !room.is_empty() {
            self.effects.run(activity_id, room).await;
        }
        if fanout.is_empty() {
            return;
        }
        if self.detach_effects {
            let runner = self.effects.clone();
            tokio::spawn(async move { runner.run(activity_id, fanout).await });
        } else {
            self.effects.run(activity_id, fanout).await;
        }
    }

    async fn profile(&self, user_id: Uuid) -> Result<UserProfile, ActivityError> {
        Ok(self
            .users
            .get(user_id)
            .await?
            .unwrap_or_else(|| UserProfile::fallback(user_id)))
    }

    fn log_status_change(activity_id: Uuid, change: Option<(ActivityStatus, ActivityStatus)>) {
        if let Some((from, to)) = change {
            info!(%activity_id, from = from.as_str(), to = to.as_str(), "activity status changed");
        }
    }

    /// 申请加入活动，返回新的参与状态
    pub async fn request_join(
        &self,
        activity_id: Uuid,
        user_id: Uuid,
    ) -> Result<ParticipantStatus, ActivityError> {
        let requester = self.profile(user_id).await?;

        let (activity, _) = self
            .mutate(activity_id, |a, now| {
                // 草稿对非房主不可见
                if a.status == ActivityStatus::Draft {
                    return Err(ActivityError::NotFound("activity not found"));
                }
                a.ensure_open(now)?;
                if a.is_host(user_id) {
                    return Err(ActivityError::SelfJoin);
                }
                match a.participation_status(user_id) {
                    Some(ParticipantStatus::Confirmed) => {
                        return Err(ActivityError::AlreadyConfirmed);
                    }
                    Some(ParticipantStatus::Pending) => return Err(ActivityError::AlreadyPending),
                    _ => {}
                }
                if a.confirmed_count() >= a.max_participants {
                    return Err(ActivityError::Full);
                }
                a.upsert_pending(user_id, now)
            })
            .await?;

        info!(%activity_id, %user_id, "join request created");

        self.dispatch(
            activity_id,
            vec![SideEffect::Publish(DomainEvent::JoinRequest {
                activity_id,
                title: activity.title.clone(),
                host_id: activity.host_id,
                requester,
            })],
        )
        .await;

        Ok(ParticipantStatus::Pending)
    }

    /// 撤回待审核的申请，记录被删除
    pub async fn withdraw(&self, activity_id: Uuid, user_id: Uuid) -> Result<(), ActivityError> {
        self.mutate(activity_id, |a, now| {
            a.ensure_open(now)?;
            a.withdraw_pending(user_id).map(|_| ())
        })
        .await?;

        info!(%activity_id, %user_id, "join request withdrawn");
        Ok(())
    }

    /// 房主批准申请
    pub async fn approve(
        &self,
        activity_id: Uuid,
        host_id: Uuid,
        target_id: Uuid,
    ) -> Result<Activity, ActivityError> {
        let participant = self.profile(target_id).await?;
        let category = GenderCategory::from_profile(participant.gender.as_deref());

        let (activity, change) = self
            .mutate(activity_id, |a, now| {
                if !a.is_host(host_id) {
                    return Err(ActivityError::Forbidden("only the host can approve requests"));
                }
                a.ensure_open(now)?;
                if a.participation_status(target_id) != Some(ParticipantStatus::Pending) {
                    return Err(ActivityError::NotFound("no pending request found for this user"));
                }
                // 并发审批可能抢同一个名额，必须在写入时重新检查
                if a.confirmed_count() >= a.max_participants {
                    return Err(ActivityError::Full);
                }
                a.confirm(target_id, category, now)?;
                Ok(a.recompute_status())
            })
            .await?;

        info!(
            %activity_id,
            user_id = %target_id,
            confirmed = activity.confirmed_count(),
            "join request approved"
        );
        Self::log_status_change(activity_id, change);

        let effects = vec![
            SideEffect::SyncMember {
                room_id: activity.companion_room_id,
                user_id: target_id,
                display_name: participant.display_name.clone(),
            },
            SideEffect::Publish(DomainEvent::JoinApproved {
                activity_id,
                title: activity.title.clone(),
                user_id: target_id,
            }),
            SideEffect::Publish(DomainEvent::ParticipantJoined {
                activity_id,
                participant,
                participant_count: activity.confirmed_count(),
                gender_count: activity.gender_count,
            }),
        ];
        self.dispatch(activity_id, effects).await;

        Ok(activity)
    }

    /// 房主拒绝申请
    pub async fn reject(
        &self,
        activity_id: Uuid,
        host_id: Uuid,
        target_id: Uuid,
    ) -> Result<(), ActivityError> {
        let (activity, _) = self
            .mutate(activity_id, |a, now| {
                if !a.is_host(host_id) {
                    return Err(ActivityError::Forbidden("only the host can reject requests"));
                }
                a.ensure_open(now)?;
                if a.participation_status(target_id) != Some(ParticipantStatus::Pending) {
                    return Err(ActivityError::NotFound("no pending request found for this user"));
                }
                a.transition(target_id, ParticipantStatus::Rejected, now)
            })
            .await?;

        info!(%activity_id, user_id = %target_id, "join request rejected");

        self.dispatch(
            activity_id,
            vec![SideEffect::Publish(DomainEvent::JoinRejected {
                activity_id,
                title: activity.title.clone(),
                user_id: target_id,
            })],
        )
        .await;

        Ok(())
    }

    /// 房主移除已确认成员，活动开始前的冻结窗口内不允许
    pub async fn remove_participant(
        &self,
        activity_id: Uuid,
        host_id: Uuid,
        target_id: Uuid,
    ) -> Result<Activity, ActivityError> {
        let participant = self.profile(target_id).await?;
        let freeze_window = self.freeze_window;

        let (activity, change) = self
            .mutate(activity_id, |a, now| {
                if !a.is_host(host_id) {
                    return Err(ActivityError::Forbidden("only the host can remove participants"));
                }
                if target_id == host_id {
                    return Err(ActivityError::Forbidden("you cannot remove yourself"));
                }
                a.ensure_open(now)?;
                if a.within_freeze_window(now, freeze_window) {
                    return Err(ActivityError::TooLateToRemove {
                        hours: freeze_window.num_hours(),
                    });
                }
                if a.participation_status(target_id) != Some(ParticipantStatus::Confirmed) {
                    return Err(ActivityError::NotFound("user is not a confirmed participant"));
                }
                a.release(target_id, ParticipantStatus::Removed, now)?;
                Ok(a.recompute_status())
            })
            .await?;

        info!(
            %activity_id,
            user_id = %target_id,
            confirmed = activity.confirmed_count(),
            "participant removed"
        );
        Self::log_status_change(activity_id, change);

        let effects = vec![
            SideEffect::SyncMember {
                room_id: activity.companion_room_id,
                user_id: target_id,
                display_name: participant.display_name,
            },
            SideEffect::Publish(DomainEvent::MemberRemoved {
                activity_id,
                title: activity.title.clone(),
                user_id: target_id,
            }),
            SideEffect::Publish(DomainEvent::ParticipantLeft {
                activity_id,
                user_id: target_id,
                participant_count: activity.confirmed_count(),
                gender_count: activity.gender_count,
            }),
        ];
        self.dispatch(activity_id, effects).await;

        Ok(activity)
    }

    /// 成员主动退出。与房主移除不同，没有冻结窗口限制
    pub async fn leave(&self, activity_id: Uuid, user_id: Uuid) -> Result<Activity, ActivityError> {
        let participant = self.profile(user_id).await?;

        let (activity, change) = self
            .mutate(activity_id, |a, now| {
                if a.is_host(user_id) {
                    return Err(ActivityError::Forbidden(
                        "hosts cannot leave their own activity, cancel it instead",
                    ));
                }
                a.ensure_open(now)?;
                if a.participation_status(user_id) != Some(ParticipantStatus::Confirmed) {
                    return Err(ActivityError::NotFound("you are not a participant"));
                }
                a.release(user_id, ParticipantStatus::Left, now)?;
                Ok(a.recompute_status())
            })
            .await?;

        info!(%activity_id, %user_id, confirmed = activity.confirmed_count(), "participant left");
        Self::log_status_change(activity_id, change);

        let effects = vec![
            SideEffect::SyncMember {
                room_id: activity.companion_room_id,
                user_id,
                display_name: participant.display_name,
            },
            SideEffect::Publish(DomainEvent::ParticipantLeft {
                activity_id,
                user_id,
                participant_count: activity.confirmed_count(),
                gender_count: activity.gender_count,
            }),
        ];
        self.dispatch(activity_id, effects).await;

        Ok(activity)
    }

    /// 待审核申请列表，仅房主可见
    pub async fn pending_requests(
        &self,
        activity_id: Uuid,
        host_id: Uuid,
    ) -> Result<Vec<Participation>, ActivityError> {
        let activity = self.load(activity_id).await?;
        if !activity.is_host(host_id) {
            return Err(ActivityError::Forbidden("only the host can view join requests"));
        }
        Ok(activity.pending_requests())
    }

    /// 确认人数、性别统计和参与记录。草稿只对房主可见
    pub async fn participants_snapshot(
        &self,
        activity_id: Uuid,
        viewer: Uuid,
    ) -> Result<ParticipantsSnapshot, ActivityError> {
        let activity = self.load(activity_id).await?;
        if activity.status == ActivityStatus::Draft && !activity.is_host(viewer) {
            return Err(ActivityError::NotFound("activity not found"));
        }
        Ok(activity.snapshot())
    }
}
