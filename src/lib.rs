use std::sync::Arc;

use config::Config;

pub mod activity;
pub mod chat;
pub mod clock;
pub mod config;
pub mod error;
pub mod fanout;
pub mod feedback;
pub mod middleware;
pub mod notification;
pub mod participation;
pub mod realtime;
pub mod routes;
pub mod store;
pub mod utils;

use chat::ChatService;
use clock::Clock;
use feedback::FeedbackService;
use participation::Coordinator;
use realtime::RealtimeBus;
use store::{
    ActivityStore, NotificationStore, RatingStore, ReportStore, RoomStore, TrustScoreEngine,
    UserDirectory,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub coordinator: Arc<Coordinator>,
    pub feedback: Arc<FeedbackService>,
    pub chat: Arc<ChatService>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl AppState {
    /// 用同一个存储后端装配全部服务
    pub fn assemble<S>(
        config: Config,
        store: Arc<S>,
        bus: Arc<dyn RealtimeBus>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        S: ActivityStore
            + RoomStore
            + NotificationStore
            + UserDirectory
            + RatingStore
            + ReportStore
            + TrustScoreEngine
            + 'static,
    {
        let activities: Arc<dyn ActivityStore> = store.clone();
        let rooms: Arc<dyn RoomStore> = store.clone();
        let notifications: Arc<dyn NotificationStore> = store.clone();
        let users: Arc<dyn UserDirectory> = store.clone();

        let coordinator = Coordinator::new(
            activities.clone(),
            rooms.clone(),
            notifications.clone(),
            users.clone(),
            bus.clone(),
            clock.clone(),
            &config,
        );
        let chat = ChatService::new(rooms, users.clone(), bus, clock.clone());
        let feedback = FeedbackService::new(
            activities,
            store.clone(),
            store.clone(),
            users,
            store,
            clock,
            config.detach_side_effects,
        );

        Self {
            config,
            coordinator: Arc::new(coordinator),
            feedback: Arc::new(feedback),
            chat: Arc::new(chat),
            notifications,
        }
    }
}
