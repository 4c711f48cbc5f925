mod handler;
mod model;

pub use handler::{list_notifications, mark_all_read, mark_read};
