pub mod commands;
pub mod orchestrator;

pub use orchestrator::{
    LaunchOutcome, SessionInfo, SessionKind, SessionOrchestrator, SessionPhase,
    StartStormOnExpire,
};
