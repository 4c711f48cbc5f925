mod model;
mod service;

pub use model::{NewReport, RateCandidate, Rating, RatingInput, Report, ReportReason};
pub use service::FeedbackService;
