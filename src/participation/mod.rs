mod coordinator;
mod effects;
mod hosting;

pub use coordinator::Coordinator;
pub use effects::{EffectRunner, SideEffect};
pub use hosting::ActivityView;
