mod handler;

pub use handler::{get_room_messages, list_my_rooms, post_message, room_participants};
