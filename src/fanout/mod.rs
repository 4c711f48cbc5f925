// 领域事件扇出
// 把账本/状态机的变化翻译成站内通知和实时推送。
// 投递是即发即忘的：最多一次，不重试，失败只记日志，不影响账本状态。

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::activity::GenderCount;
use crate::clock::Clock;
use crate::notification::{Notification, NotificationKind};
use crate::realtime::{RealtimeBus, activity_channel, user_channel};
use crate::store::{NotificationStore, UserProfile};

pub mod events {
    pub const JOIN_REQUEST: &str = "activity:join:request";
    pub const JOIN_APPROVED: &str = "activity:join:approved";
    pub const JOIN_REJECTED: &str = "activity:join:rejected";
    pub const PARTICIPANT_REMOVED: &str = "activity:participant:removed";
    pub const PARTICIPANT_JOINED: &str = "activity:participant:joined";
    pub const PARTICIPANT_LEFT: &str = "activity:participant:left";
    pub const ACTIVITY_CANCELLED: &str = "activity:cancelled";
    pub const NOTIFICATION_NEW: &str = "notification:new";
    pub const CHAT_MESSAGE_NEW: &str = "chat:message:new";
}

#[derive(Debug, Clone)]
pub enum DomainEvent {
    JoinRequest {
        activity_id: Uuid,
        title: String,
        host_id: Uuid,
        requester: UserProfile,
    },
    JoinApproved {
        activity_id: Uuid,
        title: String,
        user_id: Uuid,
    },
    JoinRejected {
        activity_id: Uuid,
        title: String,
        user_id: Uuid,
    },
    MemberRemoved {
        activity_id: Uuid,
        title: String,
        user_id: Uuid,
    },
    ParticipantJoined {
        activity_id: Uuid,
        participant: UserProfile,
        participant_count: i32,
        gender_count: GenderCount,
    },
    ParticipantLeft {
        activity_id: Uuid,
        user_id: Uuid,
        participant_count: i32,
        gender_count: GenderCount,
    },
    ActivityCancelled {
        activity_id: Uuid,
        title: String,
        participants: Vec<Uuid>,
    },
}

/// 单次投递：一条通知，或一次实时推送
#[derive(Debug, Clone)]
pub enum Delivery {
    Notify {
        user_id: Uuid,
        kind: NotificationKind,
        title: String,
        body: String,
        data: serde_json::Value,
    },
    Broadcast {
        channel: String,
        event: &'static str,
        payload: serde_json::Value,
    },
}

fn user_payload(profile: &UserProfile) -> serde_json::Value {
    json!({
        "id": profile.user_id,
        "name": profile.display_name,
        "gender": profile.gender,
    })
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::JoinRequest { .. } => "join_request",
            DomainEvent::JoinApproved { .. } => "join_approved",
            DomainEvent::JoinRejected { .. } => "join_rejected",
            DomainEvent::MemberRemoved { .. } => "member_removed",
            DomainEvent::ParticipantJoined { .. } => "participant_joined",
            DomainEvent::ParticipantLeft { .. } => "participant_left",
            DomainEvent::ActivityCancelled { .. } => "activity_cancelled",
        }
    }

    /// 事件对应的全部投递，纯函数
    pub fn deliveries(&self) -> Vec<Delivery> {
        match self {
            DomainEvent::JoinRequest {
                activity_id,
                title,
                host_id,
                requester,
            } => vec![
                Delivery::Notify {
                    user_id: *host_id,
                    kind: NotificationKind::JoinRequest,
                    title: "New Join Request".into(),
                    body: format!("{} wants to join \"{}\"", requester.display_name, title),
                    data: json!({ "activityId": activity_id, "userId": requester.user_id }),
                },
                Delivery::Broadcast {
                    channel: user_channel(*host_id),
                    event: events::JOIN_REQUEST,
                    payload: json!({ "activityId": activity_id, "user": user_payload(requester) }),
                },
            ],
            DomainEvent::JoinApproved {
                activity_id,
                title,
                user_id,
            } => vec![
                Delivery::Notify {
                    user_id: *user_id,
                    kind: NotificationKind::JoinApproved,
                    title: "Request Approved!".into(),
                    body: format!("Your request to join \"{}\" has been approved", title),
                    data: json!({ "activityId": activity_id }),
                },
                Delivery::Broadcast {
                    channel: user_channel(*user_id),
                    event: events::JOIN_APPROVED,
                    payload: json!({ "activityId": activity_id }),
                },
            ],
            DomainEvent::JoinRejected {
                activity_id,
                title,
                user_id,
            } => vec![
                Delivery::Notify {
                    user_id: *user_id,
                    kind: NotificationKind::JoinRejected,
                    title: "Request Declined".into(),
                    body: format!("Your request to join \"{}\" was declined", title),
                    data: json!({ "activityId": activity_id }),
                },
                Delivery::Broadcast {
                    channel: user_channel(*user_id),
                    event: events::JOIN_REJECTED,
                    payload: json!({ "activityId": activity_id }),
                },
            ],
            DomainEvent::MemberRemoved {
                activity_id,
                title,
                user_id,
            } => vec![
                Delivery::Notify {
                    user_id: *user_id,
                    kind: NotificationKind::MemberRemoved,
                    title: "Removed from Activity".into(),
                    body: format!("You have been removed from \"{}\"", title),
                    data: json!({ "activityId": activity_id }),
                },
                Delivery::Broadcast {
                    channel: user_channel(*user_id),
                    event: events::PARTICIPANT_REMOVED,
                    payload: json!({ "activityId": activity_id }),
                },
            ],
            DomainEvent::ParticipantJoined {
                activity_id,
                participant,
                participant_count,
                gender_count,
            } => vec![Delivery::Broadcast {
                channel: activity_channel(*activity_id),
                event: events::PARTICIPANT_JOINED,
                payload: json!({
                    "activityId": activity_id,
                    "user": user_payload(participant),
                    "participantCount": participant_count,
                    "genderCount": gender_count,
                }),
            }],
            DomainEvent::ParticipantLeft {
                activity_id,
                user_id,
                participant_count,
                gender_count,
            } => vec![Delivery::Broadcast {
                channel: activity_channel(*activity_id),
                event: events::PARTICIPANT_LEFT,
                payload: json!({
                    "activityId": activity_id,
                    "userId": user_id,
                    "participantCount": participant_count,
                    "genderCount": gender_count,
                }),
            }],
            DomainEvent::ActivityCancelled {
                activity_id,
                title,
                participants,
            } => {
                let mut deliveries = vec![Delivery::Broadcast {
                    channel: activity_channel(*activity_id),
                    event: events::ACTIVITY_CANCELLED,
                    payload: json!({ "activityId": activity_id }),
                }];
                deliveries.extend(participants.iter().map(|user_id| Delivery::Notify {
                    user_id: *user_id,
                    kind: NotificationKind::ActivityCancelled,
                    title: "Activity Cancelled".into(),
                    body: format!("\"{}\" has been cancelled by the host", title),
                    data: json!({ "activityId": activity_id }),
                }));
                deliveries
            }
        }
    }
}

/// 通知落库 + 实时推送
#[derive(Clone)]
pub struct FanOut {
    notifications: Arc<dyn NotificationStore>,
    bus: Arc<dyn RealtimeBus>,
    clock: Arc<dyn Clock>,
}

impl FanOut {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        bus: Arc<dyn RealtimeBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            notifications,
            bus,
            clock,
        }
    }

    /// 逐条投递，单条失败记录日志后继续
    pub async fn deliver(&self, event: &DomainEvent) {
        for delivery in event.deliveries() {
            match delivery {
                Delivery::Notify {
                    user_id,
                    kind,
                    title,
                    body,
                    data,
                } => {
                    let notification =
                        Notification::new(user_id, kind, title, body, data, self.clock.now());
                    if let Err(e) = self.notifications.create(&notification).await {
                        tracing::error!(
                            event = event.name(),
                            %user_id,
                            "failed to create notification: {}",
                            e
                        );
                        continue;
                    }
                    // 通知创建成功后推送给在线用户
                    if let Err(e) = self
                        .bus
                        .publish(
                            &user_channel(user_id),
                            events::NOTIFICATION_NEW,
                            json!({ "notification": notification }),
                        )
                        .await
                    {
                        tracing::warn!(
                            event = event.name(),
                            %user_id,
                            "failed to push notification: {}",
                            e
                        );
                    }
                }
                Delivery::Broadcast {
                    channel,
                    event: name,
                    payload,
                } => {
                    if let Err(e) = self.bus.publish(&channel, name, payload).await {
                        tracing::warn!(
                            event = event.name(),
                            channel = %channel,
                            "failed to publish realtime event: {}",
                            e
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> UserProfile {
        UserProfile {
            user_id: Uuid::new_v4(),
            display_name: name.into(),
            gender: Some("male".into()),
        }
    }

    #[test]
    fn join_request_goes_to_host_only() {
        let host = Uuid::new_v4();
        let requester = profile("Kabir");
        let event = DomainEvent::JoinRequest {
            activity_id: Uuid::new_v4(),
            title: "Beach cleanup".into(),
            host_id: host,
            requester,
        };

        let deliveries = event.deliveries();
        assert_eq!(deliveries.len(), 2);
        match &deliveries[0] {
            Delivery::Notify { user_id, kind, body, .. } => {
                assert_eq!(*user_id, host);
                assert_eq!(*kind, NotificationKind::JoinRequest);
                assert_eq!(body, "Kabir wants to join \"Beach cleanup\"");
            }
            other => panic!("unexpected delivery {:?}", other),
        }
        match &deliveries[1] {
            Delivery::Broadcast { channel, event, .. } => {
                assert_eq!(channel, &user_channel(host));
                assert_eq!(*event, events::JOIN_REQUEST);
            }
            other => panic!("unexpected delivery {:?}", other),
        }
    }

    #[test]
    fn participant_joined_broadcasts_counts_on_activity_channel() {
        let activity_id = Uuid::new_v4();
        let event = DomainEvent::ParticipantJoined {
            activity_id,
            participant: profile("Isha"),
            participant_count: 3,
            gender_count: GenderCount {
                male: 1,
                female: 2,
                other: 0,
            },
        };

        let deliveries = event.deliveries();
        assert_eq!(deliveries.len(), 1);
        match &deliveries[0] {
            Delivery::Broadcast { channel, payload, .. } => {
                assert_eq!(channel, &activity_channel(activity_id));
                assert_eq!(payload["participantCount"], 3);
                assert_eq!(payload["genderCount"]["female"], 2);
            }
            other => panic!("unexpected delivery {:?}", other),
        }
    }

    #[test]
    fn cancellation_notifies_every_participant() {
        let people = vec![Uuid::new_v4(), Uuid::new_v4()];
        let event = DomainEvent::ActivityCancelled {
            activity_id: Uuid::new_v4(),
            title: "Rooftop jam".into(),
            participants: people.clone(),
        };

        let notified: Vec<Uuid> = event
            .deliveries()
            .into_iter()
            .filter_map(|d| match d {
                Delivery::Notify { user_id, .. } => Some(user_id),
                Delivery::Broadcast { .. } => None,
            })
            .collect();
        assert_eq!(notified, people);
    }
}
