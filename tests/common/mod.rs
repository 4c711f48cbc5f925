#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use companion_backend::{
    AppState,
    activity::{Activity, NewActivity},
    clock::{Clock, ManualClock},
    config::Config,
    participation::Coordinator,
    realtime::LocalBus,
    store::{MemoryStore, UserProfile},
};
use uuid::Uuid;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub bus: Arc<LocalBus>,
    pub clock: Arc<ManualClock>,
    pub state: AppState,
}

pub fn test_config() -> Config {
    Config {
        detach_side_effects: false,
        ..Config::default()
    }
}

pub fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(LocalBus::default());
        let clock = Arc::new(ManualClock::new(epoch()));
        let state = AppState::assemble(config, store.clone(), bus.clone(), clock.clone());
        Self {
            store,
            bus,
            clock,
            state,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.state.coordinator
    }

    pub async fn user(&self, name: &str, gender: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        self.store
            .put_user(UserProfile {
                user_id,
                display_name: name.to_string(),
                gender: Some(gender.to_string()),
            })
            .await;
        user_id
    }

    /// 在当前时间之后 `starts_in` 开始的活动
    pub async fn activity(&self, host: Uuid, capacity: i32, starts_in: Duration) -> Activity {
        self.coordinator()
            .create_activity(host, new_activity(epoch() + starts_in, capacity))
            .await
            .unwrap()
    }

    /// 申请并批准，返回批准后的活动
    pub async fn confirm(&self, activity: &Activity, user: Uuid) -> Activity {
        self.coordinator()
            .request_join(activity.id, user)
            .await
            .unwrap();
        self.coordinator()
            .approve(activity.id, activity.host_id, user)
            .await
            .unwrap()
    }
}

pub fn new_activity(date_time: DateTime<Utc>, capacity: i32) -> NewActivity {
    NewActivity {
        title: "Sunday cycling loop".into(),
        description: Some("Easy pace, coffee after".into()),
        emoji: Some("🚴".into()),
        categories: vec!["Sports".into()],
        city: "Pune".into(),
        venue_name: Some("Vetal Tekdi gate".into()),
        venue_address: None,
        date_time,
        duration_minutes: Some(120),
        max_participants: capacity,
        mood: None,
        draft: false,
    }
}
