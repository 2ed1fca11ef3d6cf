use serde::Serialize;

use crate::{storm::StormSnapshot, timer::TimerSnapshot};

use super::{SessionInfo, SessionKind, SessionOrchestrator, SessionPhase};

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session: SessionInfo,
    pub timer: TimerSnapshot,
    pub storm: StormSnapshot,
}

pub async fn launch_with_intent(
    orchestrator: &SessionOrchestrator,
    kind: SessionKind,
    duration_minutes: u32,
) -> Result<bool, String> {
    orchestrator
        .launch_with_intent(kind, duration_minutes)
        .await
        .map(|outcome| outcome.is_launched())
        .map_err(|e| e.to_string())
}

pub async fn stop_session(orchestrator: &SessionOrchestrator) -> Result<(), String> {
    orchestrator.stop_session().await;
    Ok(())
}

pub async fn get_session_info(orchestrator: &SessionOrchestrator) -> Result<SessionInfo, String> {
    Ok(orchestrator.session_info().await)
}

pub async fn get_remaining_ms(orchestrator: &SessionOrchestrator) -> Result<u64, String> {
    Ok(orchestrator.remaining_ms().await)
}

pub async fn has_active_session(orchestrator: &SessionOrchestrator) -> Result<bool, String> {
    Ok(orchestrator.has_active_session().await)
}

pub async fn is_nudge_active(orchestrator: &SessionOrchestrator) -> Result<bool, String> {
    Ok(orchestrator.is_nudge_active().await)
}

pub async fn get_session_snapshot(
    orchestrator: &SessionOrchestrator,
) -> Result<SessionSnapshot, String> {
    Ok(SessionSnapshot {
        phase: orchestrator.phase().await,
        session: orchestrator.session_info().await,
        timer: orchestrator.timer().snapshot().await,
        storm: orchestrator.storm().snapshot().await,
    })
}
