mod model;
mod service;
mod sync;

pub use model::{ChatMessage, ChatRoom, DepartureReason, MessageKind};
pub use service::{ChatService, DEFAULT_HISTORY_LIMIT, MESSAGE_MAX_CHARS};
pub use sync::RoomSync;
