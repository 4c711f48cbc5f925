mod common;

use chrono::Duration;
use companion_backend::{
    activity::{ActivityPatch, ActivityStatus, ParticipantStatus},
    chat::MessageKind,
    error::ActivityError,
    fanout::events,
    notification::NotificationKind,
    realtime::{activity_channel, user_channel},
    store::RoomStore,
};
use common::{Harness, new_activity};
use uuid::Uuid;

#[tokio::test]
async fn capacity_two_fills_then_rejects_the_third_approval() {
    let h = Harness::new();
    let host = h.user("Host", "female").await;
    let a = h.user("Arjun", "male").await;
    let b = h.user("Bela", "female").await;
    let c = h.user("Chen", "other").await;
    let activity = h.activity(host, 2, Duration::days(2)).await;

    for user in [a, b, c] {
        let status = h.coordinator().request_join(activity.id, user).await.unwrap();
        assert_eq!(status, ParticipantStatus::Pending);
    }

    h.coordinator().approve(activity.id, host, a).await.unwrap();
    let after_b = h.coordinator().approve(activity.id, host, b).await.unwrap();
    assert_eq!(after_b.status, ActivityStatus::Full);
    assert_eq!(after_b.confirmed_count(), 2);
    assert_eq!(after_b.gender_count.male, 1);
    assert_eq!(after_b.gender_count.female, 1);

    let err = h.coordinator().approve(activity.id, host, c).await.unwrap_err();
    assert!(matches!(err, ActivityError::Full));

    let snapshot = h.coordinator().participants_snapshot(activity.id, host).await.unwrap();
    assert_eq!(snapshot.confirmed_count, 2);
    let c_record = snapshot.participants.iter().find(|p| p.user_id == c).unwrap();
    assert_eq!(c_record.status, ParticipantStatus::Pending);

    let room = h.store.find(activity.companion_room_id).await.unwrap().unwrap();
    assert_eq!(room.members, vec![host, a, b]);
}

#[tokio::test]
async fn request_join_guards() {
    let h = Harness::new();
    let host = h.user("Host", "male").await;
    let a = h.user("Asha", "female").await;
    let b = h.user("Bilal", "male").await;
    let late = h.user("Late", "male").await;
    let activity = h.activity(host, 2, Duration::days(1)).await;

    assert!(matches!(
        h.coordinator().request_join(activity.id, host).await,
        Err(ActivityError::SelfJoin)
    ));

    h.coordinator().request_join(activity.id, a).await.unwrap();
    assert!(matches!(
        h.coordinator().request_join(activity.id, a).await,
        Err(ActivityError::AlreadyPending)
    ));

    h.coordinator().approve(activity.id, host, a).await.unwrap();
    assert!(matches!(
        h.coordinator().request_join(activity.id, a).await,
        Err(ActivityError::AlreadyConfirmed)
    ));

    h.confirm(&activity, b).await;
    assert!(matches!(
        h.coordinator().request_join(activity.id, late).await,
        Err(ActivityError::Full)
    ));

    assert!(matches!(
        h.coordinator().request_join(Uuid::new_v4(), late).await,
        Err(ActivityError::NotFound("activity not found"))
    ));
}

#[tokio::test]
async fn only_the_host_moderates_requests() {
    let h = Harness::new();
    let host = h.user("Host", "male").await;
    let a = h.user("Asha", "female").await;
    let outsider = h.user("Omar", "male").await;
    let activity = h.activity(host, 4, Duration::days(1)).await;
    h.coordinator().request_join(activity.id, a).await.unwrap();

    assert!(matches!(
        h.coordinator().approve(activity.id, outsider, a).await,
        Err(ActivityError::Forbidden(_))
    ));
    assert!(matches!(
        h.coordinator().reject(activity.id, outsider, a).await,
        Err(ActivityError::Forbidden(_))
    ));
    assert!(matches!(
        h.coordinator().pending_requests(activity.id, outsider).await,
        Err(ActivityError::Forbidden(_))
    ));

    let pending = h.coordinator().pending_requests(activity.id, host).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].user_id, a);

    assert!(matches!(
        h.coordinator().approve(activity.id, host, outsider).await,
        Err(ActivityError::NotFound("no pending request found for this user"))
    ));
}

#[tokio::test]
async fn re_request_after_rejection_reuses_the_record() {
    let h = Harness::new();
    let host = h.user("Host", "male").await;
    let a = h.user("Asha", "female").await;
    let activity = h.activity(host, 4, Duration::days(1)).await;

    h.coordinator().request_join(activity.id, a).await.unwrap();
    h.coordinator().reject(activity.id, host, a).await.unwrap();

    h.clock.advance(Duration::minutes(30));
    h.coordinator().request_join(activity.id, a).await.unwrap();

    let snapshot = h.coordinator().participants_snapshot(activity.id, host).await.unwrap();
    let records: Vec<_> = snapshot.participants.iter().filter(|p| p.user_id == a).collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ParticipantStatus::Pending);
    assert_eq!(records[0].requested_at, h.now());

    let notes = h.store.notifications_for(a).await;
    assert!(notes.iter().any(|n| n.kind == NotificationKind::JoinRejected));
}

#[tokio::test]
async fn withdraw_deletes_the_pending_record() {
    let h = Harness::new();
    let host = h.user("Host", "male").await;
    let a = h.user("Asha", "female").await;
    let activity = h.activity(host, 4, Duration::days(1)).await;

    h.coordinator().request_join(activity.id, a).await.unwrap();
    h.coordinator().withdraw(activity.id, a).await.unwrap();

    let snapshot = h.coordinator().participants_snapshot(activity.id, host).await.unwrap();
    assert!(snapshot.participants.is_empty());
    assert!(matches!(
        h.coordinator().withdraw(activity.id, a).await,
        Err(ActivityError::NotFound(_))
    ));
}

#[tokio::test]
async fn removal_is_frozen_close_to_the_start() {
    let h = Harness::new();
    let host = h.user("Host", "male").await;
    let a = h.user("Asha", "female").await;
    let activity = h.activity(host, 4, Duration::days(1)).await;
    h.confirm(&activity, a).await;

    let start = activity.date_time;
    h.clock.set(start - (Duration::hours(4) + Duration::minutes(59)));
    let err = h
        .coordinator()
        .remove_participant(activity.id, host, a)
        .await
        .unwrap_err();
    assert!(matches!(err, ActivityError::TooLateToRemove { hours: 5 }));

    h.clock.set(start - (Duration::hours(5) + Duration::minutes(1)));
    let updated = h
        .coordinator()
        .remove_participant(activity.id, host, a)
        .await
        .unwrap();
    assert_eq!(updated.confirmed_count(), 0);
    assert_eq!(updated.gender_count.female, 0);
    assert_eq!(updated.participation_status(a), Some(ParticipantStatus::Removed));

    let room = h.store.find(activity.companion_room_id).await.unwrap().unwrap();
    assert!(!room.is_member(a));
    let messages = h.store.recent_messages(room.id, 10).await.unwrap();
    let last = messages.last().unwrap();
    assert_eq!(last.kind, MessageKind::System);
    assert_eq!(last.text, "Asha was removed from the activity");
    assert_eq!(last.sender_id, host);

    let notes = h.store.notifications_for(a).await;
    assert!(notes.iter().any(|n| n.kind == NotificationKind::MemberRemoved));
}

#[tokio::test]
async fn host_cannot_remove_themselves_or_leave() {
    let h = Harness::new();
    let host = h.user("Host", "male").await;
    let activity = h.activity(host, 4, Duration::days(1)).await;

    assert!(matches!(
        h.coordinator().remove_participant(activity.id, host, host).await,
        Err(ActivityError::Forbidden("you cannot remove yourself"))
    ));
    assert!(matches!(
        h.coordinator().leave(activity.id, host).await,
        Err(ActivityError::Forbidden(_))
    ));
}

#[tokio::test]
async fn leaving_inside_the_freeze_window_reopens_a_full_activity() {
    let h = Harness::new();
    let host = h.user("Host", "male").await;
    let a = h.user("Asha", "female").await;
    let b = h.user("Bilal", "male").await;
    let activity = h.activity(host, 2, Duration::days(1)).await;
    h.confirm(&activity, a).await;
    let full = h.confirm(&activity, b).await;
    assert_eq!(full.status, ActivityStatus::Full);

    h.clock.set(activity.date_time - Duration::minutes(10));
    let updated = h.coordinator().leave(activity.id, a).await.unwrap();
    assert_eq!(updated.status, ActivityStatus::Active);
    assert_eq!(updated.confirmed_count(), 1);
    assert_eq!(updated.gender_count.total(), 1);
    assert_eq!(updated.participation_status(a), Some(ParticipantStatus::Left));

    let left_events: Vec<_> = h
        .bus
        .published_on(&activity_channel(activity.id))
        .into_iter()
        .filter(|m| m.event == events::PARTICIPANT_LEFT)
        .collect();
    assert_eq!(left_events.len(), 1);
    assert_eq!(left_events[0].payload["participantCount"], 1);

    assert!(matches!(
        h.coordinator().leave(activity.id, a).await,
        Err(ActivityError::NotFound("you are not a participant"))
    ));
}

#[tokio::test]
async fn host_is_told_about_new_requests_in_real_time() {
    let h = Harness::new();
    let host = h.user("Host", "male").await;
    let a = h.user("Asha", "female").await;
    let activity = h.activity(host, 4, Duration::days(1)).await;

    h.coordinator().request_join(activity.id, a).await.unwrap();

    let on_host: Vec<String> = h
        .bus
        .published_on(&user_channel(host))
        .into_iter()
        .map(|m| m.event)
        .collect();
    assert!(on_host.contains(&events::NOTIFICATION_NEW.to_string()));
    assert!(on_host.contains(&events::JOIN_REQUEST.to_string()));

    let notes = h.store.notifications_for(host).await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].body, "Asha wants to join \"Sunday cycling loop\"");
}

#[tokio::test]
async fn cancelled_activity_rejects_every_mutation() {
    let h = Harness::new();
    let host = h.user("Host", "male").await;
    let a = h.user("Asha", "female").await;
    let b = h.user("Bilal", "male").await;
    let activity = h.activity(host, 4, Duration::days(1)).await;
    h.confirm(&activity, a).await;
    h.coordinator().request_join(activity.id, b).await.unwrap();

    let cancelled = h.coordinator().cancel_activity(activity.id, host).await.unwrap();
    assert_eq!(cancelled.status, ActivityStatus::Cancelled);

    assert!(matches!(
        h.coordinator().request_join(activity.id, Uuid::new_v4()).await,
        Err(ActivityError::ActivityClosed)
    ));
    assert!(matches!(
        h.coordinator().approve(activity.id, host, b).await,
        Err(ActivityError::ActivityClosed)
    ));
    assert!(matches!(
        h.coordinator().leave(activity.id, a).await,
        Err(ActivityError::ActivityClosed)
    ));
    assert!(matches!(
        h.coordinator().withdraw(activity.id, b).await,
        Err(ActivityError::ActivityClosed)
    ));
    assert!(matches!(
        h.coordinator().cancel_activity(activity.id, host).await,
        Err(ActivityError::ActivityClosed)
    ));

    let room = h.store.find(activity.companion_room_id).await.unwrap().unwrap();
    assert!(!room.is_active);
    let notes = h.store.notifications_for(a).await;
    assert!(notes.iter().any(|n| n.kind == NotificationKind::ActivityCancelled));
    assert!(
        !h.store
            .notifications_for(b)
            .await
            .iter()
            .any(|n| n.kind == NotificationKind::ActivityCancelled)
    );
}

#[tokio::test]
async fn elapsed_activities_complete_on_read_and_on_sweep() {
    let h = Harness::new();
    let host = h.user("Host", "male").await;
    let a = h.user("Asha", "female").await;
    let first = h.activity(host, 4, Duration::hours(6)).await;
    let second = h.activity(host, 4, Duration::hours(8)).await;
    h.confirm(&first, a).await;

    h.clock.advance(Duration::hours(7));

    let view = h.coordinator().get_activity(first.id, a).await.unwrap();
    assert_eq!(view.activity.status, ActivityStatus::Completed);
    assert!(view.is_participant);
    assert!(matches!(
        h.coordinator().leave(first.id, a).await,
        Err(ActivityError::ActivityClosed)
    ));

    // 第二个活动尚未开始
    assert_eq!(h.coordinator().complete_elapsed().await.unwrap(), 0);
    h.clock.advance(Duration::hours(2));
    assert_eq!(h.coordinator().complete_elapsed().await.unwrap(), 1);
    let view = h.coordinator().get_activity(second.id, host).await.unwrap();
    assert_eq!(view.activity.status, ActivityStatus::Completed);
    assert!(view.is_host);
}

#[tokio::test]
async fn drafts_are_hidden_until_published() {
    let h = Harness::new();
    let host = h.user("Host", "male").await;
    let a = h.user("Asha", "female").await;
    let mut req = new_activity(common::epoch() + Duration::days(3), 5);
    req.draft = true;
    let draft = h.coordinator().create_activity(host, req).await.unwrap();
    assert_eq!(draft.status, ActivityStatus::Draft);

    assert!(matches!(
        h.coordinator().get_activity(draft.id, a).await,
        Err(ActivityError::NotFound(_))
    ));
    assert!(matches!(
        h.coordinator().request_join(draft.id, a).await,
        Err(ActivityError::NotFound(_))
    ));
    assert!(matches!(
        h.coordinator().participants_snapshot(draft.id, a).await,
        Err(ActivityError::NotFound(_))
    ));
    let own = h.coordinator().participants_snapshot(draft.id, host).await.unwrap();
    assert_eq!(own.confirmed_count, 0);

    let published = h.coordinator().publish_activity(draft.id, host).await.unwrap();
    assert_eq!(published.status, ActivityStatus::Active);
    assert!(matches!(
        h.coordinator().publish_activity(draft.id, host).await,
        Err(ActivityError::InvalidTransition { from: "active", .. })
    ));
    h.coordinator().request_join(draft.id, a).await.unwrap();
}

#[tokio::test]
async fn create_validates_input() {
    let h = Harness::new();
    let host = h.user("Host", "male").await;

    for capacity in [1, 21] {
        let req = new_activity(common::epoch() + Duration::days(1), capacity);
        assert!(matches!(
            h.coordinator().create_activity(host, req).await,
            Err(ActivityError::Validation(_))
        ));
    }

    let mut blank = new_activity(common::epoch() + Duration::days(1), 4);
    blank.title = "   ".into();
    assert!(matches!(
        h.coordinator().create_activity(host, blank).await,
        Err(ActivityError::Validation(_))
    ));

    let past = new_activity(common::epoch() - Duration::hours(1), 4);
    assert!(matches!(
        h.coordinator().create_activity(host, past).await,
        Err(ActivityError::Validation(_))
    ));

    let activity = h.activity(host, 4, Duration::days(1)).await;
    let room = h.store.find(activity.companion_room_id).await.unwrap().unwrap();
    assert_eq!(room.activity_id, Some(activity.id));
    assert_eq!(room.members, vec![host]);
    assert_eq!(activity.version, 0);
}

#[tokio::test]
async fn capacity_changes_recompute_status() {
    let h = Harness::new();
    let host = h.user("Host", "male").await;
    let a = h.user("Asha", "female").await;
    let b = h.user("Bilal", "male").await;
    let activity = h.activity(host, 3, Duration::days(1)).await;
    h.confirm(&activity, a).await;
    h.confirm(&activity, b).await;

    let cut = ActivityPatch {
        max_participants: Some(2),
        ..ActivityPatch::default()
    };
    let updated = h.coordinator().update_activity(activity.id, host, cut).await.unwrap();
    assert_eq!(updated.status, ActivityStatus::Full);

    let too_low = ActivityPatch {
        max_participants: Some(1),
        ..ActivityPatch::default()
    };
    assert!(matches!(
        h.coordinator().update_activity(activity.id, host, too_low).await,
        Err(ActivityError::Validation(_))
    ));

    let raise = ActivityPatch {
        max_participants: Some(6),
        title: Some("Longer loop".into()),
        ..ActivityPatch::default()
    };
    let updated = h.coordinator().update_activity(activity.id, host, raise).await.unwrap();
    assert_eq!(updated.status, ActivityStatus::Active);
    assert_eq!(updated.title, "Longer loop");

    assert!(matches!(
        h.coordinator()
            .update_activity(activity.id, a, ActivityPatch::default())
            .await,
        Err(ActivityError::Forbidden(_))
    ));
}

#[tokio::test]
async fn waitlist_positions_are_one_based() {
    let h = Harness::new();
    let host = h.user("Host", "male").await;
    let a = h.user("Asha", "female").await;
    let b = h.user("Bilal", "male").await;
    let activity = h.activity(host, 2, Duration::days(1)).await;

    assert_eq!(h.coordinator().join_waitlist(activity.id, a).await.unwrap(), 1);
    assert_eq!(h.coordinator().join_waitlist(activity.id, b).await.unwrap(), 2);
    assert!(matches!(
        h.coordinator().join_waitlist(activity.id, a).await,
        Err(ActivityError::AlreadyWaitlisted)
    ));
    assert!(matches!(
        h.coordinator().join_waitlist(activity.id, host).await,
        Err(ActivityError::SelfJoin)
    ));

    let snapshot = h.coordinator().participants_snapshot(activity.id, host).await.unwrap();
    assert!(snapshot.participants.is_empty());
}

#[tokio::test]
async fn hosted_and_joined_listings() {
    let h = Harness::new();
    let host = h.user("Host", "male").await;
    let a = h.user("Asha", "female").await;
    let soon = h.activity(host, 4, Duration::days(1)).await;
    let later = h.activity(host, 4, Duration::days(5)).await;
    let dropped = h.activity(host, 4, Duration::days(3)).await;
    h.confirm(&soon, a).await;
    h.coordinator().request_join(later.id, a).await.unwrap();
    h.coordinator().cancel_activity(dropped.id, host).await.unwrap();

    let hosted = h.coordinator().list_hosted(host, None, 0, 20).await.unwrap();
    let ids: Vec<Uuid> = hosted.items.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![later.id, soon.id]);
    assert_eq!(hosted.total, 2);

    let cancelled = h
        .coordinator()
        .list_hosted(host, Some(ActivityStatus::Cancelled), 0, 20)
        .await
        .unwrap();
    assert_eq!(cancelled.items.len(), 1);

    let joined = h.coordinator().list_joined(a, None, 0, 20).await.unwrap();
    assert_eq!(joined.items.len(), 1);
    assert_eq!(joined.items[0].id, soon.id);
    assert!(h.coordinator().list_joined(host, None, 0, 20).await.unwrap().items.is_empty());
}

#[tokio::test]
async fn absurd_page_numbers_yield_empty_pages() {
    let h = Harness::new();
    let host = h.user("Host", "male").await;
    h.activity(host, 4, Duration::days(1)).await;

    let hosted = h
        .coordinator()
        .list_hosted(host, None, i64::MAX / 2, 20)
        .await
        .unwrap();
    assert!(hosted.items.is_empty());
    assert_eq!(hosted.total, 1);

    let joined = h
        .coordinator()
        .list_joined(host, None, i64::MAX, i64::MAX)
        .await
        .unwrap();
    assert!(joined.items.is_empty());
}
