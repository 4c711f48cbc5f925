mod handler;
mod model;

pub use handler::{
    approve_request, cancel_activity, create_activity, get_activity, join_waitlist, leave_activity,
    list_hosted, list_joined, participants, participants_to_rate, pending_ratings,
    pending_requests, publish_activity, reject_request, remove_participant, request_join,
    submit_ratings, update_activity, withdraw_request,
};
