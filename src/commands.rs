//! IPC command surface, the UI shell's call contract.
//!
//! Commands are synchronous functions: Tauri runs them off the main thread,
//! which keeps the blocking HTTP client safe to use. Errors are surfaced as
//! readable strings for the page to display; none are retried here.

use std::sync::Arc;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tauri::State;

use crate::session::{SessionSnapshot, SessionState, UploadPhase};

/// Health check IPC command — verifies backend is running
#[tauri::command]
pub fn health_check() -> String {
    tracing::debug!("Health check called");
    "ok".to_string()
}

/// Accept the session API key.
///
/// No validation call is made here; a bad key surfaces on the first
/// analysis.
#[tauri::command]
pub fn set_api_key(
    state: State<'_, Arc<SessionState>>,
    api_key: String,
) -> Result<SessionSnapshot, String> {
    state
        .enter_credential(&api_key)
        .map_err(|e| e.to_string())?;
    state.snapshot().map_err(|e| e.to_string())
}

/// Discard the credential and all session progress.
#[tauri::command]
pub fn reset_api_key(state: State<'_, Arc<SessionState>>) -> Result<SessionSnapshot, String> {
    state.reset_credential().map_err(|e| e.to_string())?;
    state.snapshot().map_err(|e| e.to_string())
}

/// Inspect the session without changing it.
#[tauri::command]
pub fn get_session_status(state: State<'_, Arc<SessionState>>) -> Result<SessionSnapshot, String> {
    state.snapshot().map_err(|e| e.to_string())
}

/// Result of a successful upload, including the preview the page displays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSummary {
    pub snapshot: SessionSnapshot,
    /// Display-sized PNG, base64-encoded for an `<img>` data URL.
    pub preview_png: String,
}

/// Decode an uploaded file, resize it for display and score its sharpness.
#[tauri::command]
pub fn upload_image(
    state: State<'_, Arc<SessionState>>,
    file_name: String,
    bytes: Vec<u8>,
) -> Result<UploadSummary, String> {
    let snapshot = state
        .accept_upload(&file_name, &bytes)
        .map_err(|e| e.to_string())?;
    let preview = state.preview_png().map_err(|e| e.to_string())?;

    Ok(UploadSummary {
        snapshot,
        preview_png: base64::engine::general_purpose::STANDARD.encode(preview),
    })
}

/// Outcome of a completed analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    /// Markdown report, rendered verbatim by the page.
    pub report: String,
    /// RFC 3339 completion timestamp.
    pub analyzed_at: String,
}

/// Run the full analysis: memoized client + fixed instructions + the
/// current image. Blocks until the remote service answers or fails; the
/// page disables the trigger while the upload phase is `analyzing`.
#[tauri::command]
pub fn analyze_image(state: State<'_, Arc<SessionState>>) -> Result<AnalysisOutcome, String> {
    let credential = state.credential_value().map_err(|e| e.to_string())?;
    let agent = state
        .agents()
        .get_or_create(&credential)
        .map_err(|e| e.to_string())?;

    let snapshot = state
        .run_analysis(agent.as_ref())
        .map_err(|e| e.to_string())?;

    match snapshot.upload_phase {
        UploadPhase::Reported => Ok(AnalysisOutcome {
            report: snapshot.report.unwrap_or_default(),
            analyzed_at: snapshot.analyzed_at.unwrap_or_default(),
        }),
        _ => Err(snapshot
            .failure
            .map(|f| f.message)
            .unwrap_or_else(|| "Analysis produced no report".to_string())),
    }
}
