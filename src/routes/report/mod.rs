mod handler;

pub use handler::submit_report;
