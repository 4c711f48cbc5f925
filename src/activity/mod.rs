mod ledger;
mod lifecycle;
mod model;

pub use model::{
    Activity, ActivityPatch, ActivityStatus, GenderCategory, GenderCount, MAX_PARTICIPANTS,
    MIN_PARTICIPANTS, NewActivity, ParticipantStatus, Participation, ParticipantsSnapshot,
    WaitlistEntry, validate_capacity,
};
