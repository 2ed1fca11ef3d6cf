pub mod controller;
pub mod state;

pub use controller::{BackgroundTimer, ExpireHandler, TimerSnapshot, TIMER_TASK_NAME};
pub use state::TimerRecord;
