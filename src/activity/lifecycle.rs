// 活动状态机
//
// active <-> full 由确认人数自动驱动；cancelled 由房主发起；
// completed 由时间驱动（读取时或定时清扫时重算）。cancelled/completed 为终态。

use chrono::{DateTime, Duration, Utc};

use super::model::{Activity, ActivityStatus};
use crate::error::ActivityError;

impl Activity {
    /// 活动预定时间已过
    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        now > self.date_time
    }

    /// 修改前的统一检查：终态或已过期的活动都不再接受修改
    pub fn ensure_open(&self, now: DateTime<Utc>) -> Result<(), ActivityError> {
        if self.status.is_terminal() || self.has_elapsed(now) {
            return Err(ActivityError::ActivityClosed);
        }
        Ok(())
    }

    /// 账本变化后重算 active/full，返回发生的状态变化
    pub fn recompute_status(&mut self) -> Option<(ActivityStatus, ActivityStatus)> {
        let target = match self.status {
            ActivityStatus::Active | ActivityStatus::Full => {
                if self.confirmed_count() >= self.max_participants {
                    ActivityStatus::Full
                } else {
                    ActivityStatus::Active
                }
            }
            _ => return None,
        };

        if target == self.status {
            return None;
        }
        let from = std::mem::replace(&mut self.status, target);
        Some((from, target))
    }

    /// active/full 且时间已过则转为 completed
    pub fn complete_if_elapsed(&mut self, now: DateTime<Utc>) -> bool {
        if matches!(self.status, ActivityStatus::Active | ActivityStatus::Full)
            && self.has_elapsed(now)
        {
            self.status = ActivityStatus::Completed;
            return true;
        }
        false
    }

    pub fn publish(&mut self) -> Result<(), ActivityError> {
        if self.status != ActivityStatus::Draft {
            return Err(ActivityError::InvalidTransition {
                from: self.status.as_str(),
                to: ActivityStatus::Active.as_str(),
            });
        }
        self.status = ActivityStatus::Active;
        self.recompute_status();
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<ActivityStatus, ActivityError> {
        if self.status.is_terminal() {
            return Err(ActivityError::ActivityClosed);
        }
        Ok(std::mem::replace(&mut self.status, ActivityStatus::Cancelled))
    }

    /// 是否处于开始前的冻结窗口内（房主不能再移除成员）
    pub fn within_freeze_window(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now > self.date_time - window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::model::{GenderCategory, NewActivity};
    use uuid::Uuid;

    fn activity_at(date_time: DateTime<Utc>, capacity: i32) -> Activity {
        Activity::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            NewActivity {
                title: "Old city food walk".into(),
                description: None,
                emoji: None,
                categories: vec![],
                city: "Jaipur".into(),
                venue_name: None,
                venue_address: None,
                date_time,
                duration_minutes: None,
                max_participants: capacity,
                mood: None,
                draft: false,
            },
            Utc::now(),
        )
    }

    fn confirm_n(a: &mut Activity, n: usize) -> Vec<Uuid> {
        let now = Utc::now();
        (0..n)
            .map(|_| {
                let id = Uuid::new_v4();
                a.upsert_pending(id, now).unwrap();
                a.confirm(id, GenderCategory::Male, now).unwrap();
                id
            })
            .collect()
    }

    #[test]
    fn flips_full_and_back() {
        let mut a = activity_at(Utc::now() + Duration::days(1), 2);
        let ids = confirm_n(&mut a, 2);
        assert_eq!(
            a.recompute_status(),
            Some((ActivityStatus::Active, ActivityStatus::Full))
        );
        assert_eq!(a.recompute_status(), None);

        a.release(ids[0], crate::activity::model::ParticipantStatus::Left, Utc::now())
            .unwrap();
        assert_eq!(
            a.recompute_status(),
            Some((ActivityStatus::Full, ActivityStatus::Active))
        );
    }

    #[test]
    fn terminal_states_are_never_recomputed() {
        let mut a = activity_at(Utc::now() + Duration::days(1), 2);
        confirm_n(&mut a, 2);
        a.cancel().unwrap();
        assert_eq!(a.recompute_status(), None);
        assert_eq!(a.status, ActivityStatus::Cancelled);
        assert!(matches!(a.cancel(), Err(ActivityError::ActivityClosed)));
        assert!(!a.complete_if_elapsed(Utc::now() + Duration::days(3)));
    }

    #[test]
    fn completes_only_after_start_time() {
        let start = Utc::now() + Duration::hours(1);
        let mut a = activity_at(start, 4);
        assert!(!a.complete_if_elapsed(start));
        assert!(a.ensure_open(start).is_ok());
        assert!(a.complete_if_elapsed(start + Duration::seconds(1)));
        assert_eq!(a.status, ActivityStatus::Completed);
        assert!(matches!(a.ensure_open(start), Err(ActivityError::ActivityClosed)));
    }

    #[test]
    fn freeze_window_boundaries() {
        let start = Utc::now() + Duration::days(1);
        let a = activity_at(start, 4);
        let window = Duration::hours(5);

        let late = start - (Duration::hours(4) + Duration::minutes(59));
        let early = start - (Duration::hours(5) + Duration::minutes(1));
        assert!(a.within_freeze_window(late, window));
        assert!(!a.within_freeze_window(early, window));
    }

    #[test]
    fn publish_only_from_draft() {
        let mut a = activity_at(Utc::now() + Duration::days(1), 4);
        assert!(a.publish().is_err());
        a.status = ActivityStatus::Draft;
        a.publish().unwrap();
        assert_eq!(a.status, ActivityStatus::Active);
    }
}
