//! Sync trigger endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::info;

use casesync_graph::{SyncPhase, TriggerOutcome};

use crate::state::AppState;

pub async fn hello() -> &'static str {
    "Hello from casesync"
}

/// Start a sync in the background.
pub async fn start_sync(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.engine.trigger() {
        TriggerOutcome::Accepted => {
            info!("Sync started on request");
            (StatusCode::ACCEPTED, "started sync")
        }
        TriggerOutcome::AlreadyRunning => (StatusCode::CONFLICT, "sync already running"),
    }
}

#[derive(Serialize)]
pub struct SyncStatus {
    pub running: bool,
    pub phase: SyncPhase,
    pub pending_records: usize,
}

pub async fn status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(SyncStatus {
        running: state.engine.is_running(),
        phase: state.engine.phase(),
        pending_records: state.engine.pending_records().len(),
    })
}
