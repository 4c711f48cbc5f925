// 参与记录账本
// 所有修改都是对内存中活动聚合的纯操作，持久化以整个聚合为单位

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::model::{Activity, GenderCategory, ParticipantStatus, Participation};
use crate::error::ActivityError;

impl ParticipantStatus {
    /// 参与状态转换表。`None` 表示尚无记录；撤回申请直接删除记录，不在此表中
    pub fn can_transition(from: Option<ParticipantStatus>, to: ParticipantStatus) -> bool {
        use ParticipantStatus::*;

        matches!(
            (from, to),
            (None, Pending)
                | (Some(Pending), Confirmed)
                | (Some(Pending), Rejected)
                | (Some(Confirmed), Removed)
                | (Some(Confirmed), Left)
                | (Some(Rejected), Pending)
                | (Some(Removed), Pending)
                | (Some(Left), Pending)
        )
    }
}

fn invalid(from: Option<ParticipantStatus>, to: ParticipantStatus) -> ActivityError {
    ActivityError::InvalidTransition {
        from: from.map_or("none", |s| s.as_str()),
        to: to.as_str(),
    }
}

impl Activity {
    pub fn find_participation(&self, user_id: Uuid) -> Option<&Participation> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    fn find_participation_mut(&mut self, user_id: Uuid) -> Option<&mut Participation> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    pub fn participation_status(&self, user_id: Uuid) -> Option<ParticipantStatus> {
        self.find_participation(user_id).map(|p| p.status)
    }

    pub fn confirmed_count(&self) -> i32 {
        self.participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Confirmed)
            .count() as i32
    }

    pub fn confirmed_user_ids(&self) -> Vec<Uuid> {
        self.participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Confirmed)
            .map(|p| p.user_id)
            .collect()
    }

    pub fn pending_requests(&self) -> Vec<Participation> {
        self.participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Pending)
            .cloned()
            .collect()
    }

    /// 新建待审核记录，或把被拒/被移除/已退出的旧记录重置为待审核
    ///
    /// 同一用户在同一活动中始终只有一条记录。
    pub fn upsert_pending(
        &mut self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), ActivityError> {
        if self.find_participation(user_id).is_some() {
            return self.transition(user_id, ParticipantStatus::Pending, now).map(|_| ());
        }

        self.participants.push(Participation {
            user_id,
            status: ParticipantStatus::Pending,
            requested_at: now,
            joined_at: None,
            gender: None,
        });
        Ok(())
    }

    /// 按转换表修改已有记录的状态，返回原状态
    pub fn transition(
        &mut self,
        user_id: Uuid,
        to: ParticipantStatus,
        now: DateTime<Utc>,
    ) -> Result<ParticipantStatus, ActivityError> {
        let participation = match self.find_participation_mut(user_id) {
            Some(p) => p,
            None => return Err(invalid(None, to)),
        };

        let from = participation.status;
        if !ParticipantStatus::can_transition(Some(from), to) {
            return Err(invalid(Some(from), to));
        }

        participation.status = to;
        match to {
            ParticipantStatus::Pending => {
                participation.requested_at = now;
                participation.joined_at = None;
                participation.gender = None;
            }
            ParticipantStatus::Confirmed => participation.joined_at = Some(now),
            _ => {}
        }

        Ok(from)
    }

    /// 撤回待审核申请：记录从账本中删除，而不是标记
    pub fn withdraw_pending(&mut self, user_id: Uuid) -> Result<Participation, ActivityError> {
        let index = self
            .participants
            .iter()
            .position(|p| p.user_id == user_id && p.status == ParticipantStatus::Pending)
            .ok_or(ActivityError::NotFound("no pending request found"))?;

        Ok(self.participants.remove(index))
    }

    /// 调整性别分桶计数，结果不会小于零
    pub fn adjust_gender_count(&mut self, delta: i32, category: GenderCategory) {
        let bucket = self.gender_count.bucket_mut(category);
        *bucket = (*bucket + delta).max(0);
    }

    /// pending -> confirmed，同时记下性别分桶并计数
    pub fn confirm(
        &mut self,
        user_id: Uuid,
        category: GenderCategory,
        now: DateTime<Utc>,
    ) -> Result<(), ActivityError> {
        self.transition(user_id, ParticipantStatus::Confirmed, now)?;
        if let Some(p) = self.find_participation_mut(user_id) {
            p.gender = Some(category);
        }
        self.adjust_gender_count(1, category);
        Ok(())
    }

    /// confirmed -> removed/left，按确认时的性别分桶回退计数
    pub fn release(
        &mut self,
        user_id: Uuid,
        to: ParticipantStatus,
        now: DateTime<Utc>,
    ) -> Result<GenderCategory, ActivityError> {
        if !matches!(to, ParticipantStatus::Removed | ParticipantStatus::Left) {
            return Err(invalid(self.participation_status(user_id), to));
        }

        self.transition(user_id, to, now)?;
        let category = self
            .find_participation(user_id)
            .and_then(|p| p.gender)
            .unwrap_or(GenderCategory::Other);
        self.adjust_gender_count(-1, category);
        Ok(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::model::{ActivityStatus, NewActivity};
    use chrono::Duration;

    fn activity(capacity: i32) -> Activity {
        let now = Utc::now();
        Activity::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            NewActivity {
                title: "Sunset trek".into(),
                description: None,
                emoji: None,
                categories: vec!["Adventure".into()],
                city: "Manali".into(),
                venue_name: None,
                venue_address: None,
                date_time: now + Duration::days(2),
                duration_minutes: Some(180),
                max_participants: capacity,
                mood: None,
                draft: false,
            },
            now,
        )
    }

    #[test]
    fn transition_table() {
        use ParticipantStatus::*;

        assert!(ParticipantStatus::can_transition(None, Pending));
        assert!(!ParticipantStatus::can_transition(None, Confirmed));
        assert!(ParticipantStatus::can_transition(Some(Pending), Confirmed));
        assert!(ParticipantStatus::can_transition(Some(Pending), Rejected));
        assert!(!ParticipantStatus::can_transition(Some(Pending), Left));
        assert!(!ParticipantStatus::can_transition(Some(Confirmed), Pending));
        assert!(!ParticipantStatus::can_transition(Some(Confirmed), Rejected));
        assert!(ParticipantStatus::can_transition(Some(Confirmed), Removed));
        assert!(ParticipantStatus::can_transition(Some(Confirmed), Left));
        for terminal in [Rejected, Removed, Left] {
            assert!(ParticipantStatus::can_transition(Some(terminal), Pending));
            assert!(!ParticipantStatus::can_transition(Some(terminal), Confirmed));
        }
    }

    #[test]
    fn re_request_reuses_the_same_record() {
        let mut a = activity(4);
        let user = Uuid::new_v4();
        let t0 = Utc::now();

        a.upsert_pending(user, t0).unwrap();
        a.transition(user, ParticipantStatus::Rejected, t0).unwrap();

        let t1 = t0 + Duration::minutes(10);
        a.upsert_pending(user, t1).unwrap();

        assert_eq!(a.participants.len(), 1);
        let p = a.find_participation(user).unwrap();
        assert_eq!(p.status, ParticipantStatus::Pending);
        assert_eq!(p.requested_at, t1);
        assert_eq!(p.joined_at, None);
    }

    #[test]
    fn upsert_refuses_live_records() {
        let mut a = activity(4);
        let user = Uuid::new_v4();
        let now = Utc::now();

        a.upsert_pending(user, now).unwrap();
        assert!(matches!(
            a.upsert_pending(user, now),
            Err(ActivityError::InvalidTransition { from: "pending", to: "pending" })
        ));

        a.confirm(user, GenderCategory::Male, now).unwrap();
        assert!(a.upsert_pending(user, now).is_err());
    }

    #[test]
    fn confirm_and_release_keep_gender_count_in_step() {
        let mut a = activity(4);
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        a.upsert_pending(x, now).unwrap();
        a.upsert_pending(y, now).unwrap();
        a.confirm(x, GenderCategory::Female, now).unwrap();
        a.confirm(y, GenderCategory::Other, now).unwrap();

        assert_eq!(a.confirmed_count(), 2);
        assert_eq!(a.gender_count.total(), 2);
        assert_eq!(a.find_participation(x).unwrap().joined_at, Some(now));

        let released = a.release(x, ParticipantStatus::Left, now).unwrap();
        assert_eq!(released, GenderCategory::Female);
        assert_eq!(a.gender_count.female, 0);
        assert_eq!(a.gender_count.total(), a.confirmed_count());
    }

    #[test]
    fn release_only_accepts_exit_states() {
        let mut a = activity(4);
        let user = Uuid::new_v4();
        let now = Utc::now();
        a.upsert_pending(user, now).unwrap();
        a.confirm(user, GenderCategory::Male, now).unwrap();

        assert!(a.release(user, ParticipantStatus::Rejected, now).is_err());
        assert_eq!(a.gender_count.male, 1);
    }

    #[test]
    fn gender_count_is_floored_at_zero() {
        let mut a = activity(4);
        a.adjust_gender_count(-1, GenderCategory::Male);
        assert_eq!(a.gender_count.male, 0);
    }

    #[test]
    fn withdraw_deletes_only_pending_records() {
        let mut a = activity(4);
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        a.upsert_pending(x, now).unwrap();
        a.upsert_pending(y, now).unwrap();
        a.confirm(y, GenderCategory::Male, now).unwrap();

        a.withdraw_pending(x).unwrap();
        assert!(a.find_participation(x).is_none());
        assert!(matches!(a.withdraw_pending(y), Err(ActivityError::NotFound(_))));
        assert_eq!(a.status, ActivityStatus::Active);
    }

    #[test]
    fn transition_without_record_is_invalid() {
        let mut a = activity(4);
        let err = a
            .transition(Uuid::new_v4(), ParticipantStatus::Confirmed, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            ActivityError::InvalidTransition { from: "none", to: "confirmed" }
        ));
    }
}
