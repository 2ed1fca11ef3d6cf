pub mod controller;
pub mod messages;

pub use controller::{NotificationStorm, StormConfig, StormSnapshot};
