//! Transport-agnostic interactive session state.
//!
//! Two explicit state machines drive the UI, kept behind the IPC layer so
//! both stay inspectable in tests:
//!
//! - Credential machine: `NoCredential -> CredentialEntered -> Ready`.
//!   Entry never validates the key; validity is discovered lazily on the
//!   first remote call. Reset returns to `NoCredential`, zeroes the key
//!   and invalidates the client cache.
//! - Per-upload machine: `Idle -> Loaded -> Analyzing -> Reported | Failed`,
//!   with an advisory blur flag attached at `Loaded`. A second trigger
//!   while `Analyzing` is refused.
//!
//! Nothing here is persisted; the whole session lives and dies in memory.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::agent_cache::AgentCache;
use crate::config::AnalysisOptions;
use crate::pipeline::agent::{AgentError, AnalysisRequest, ReportAgent};
use crate::pipeline::loader::{load_medical_image, MedicalImage};
use crate::pipeline::preprocess::{assess_blur, encode_png, resize_for_display, QualityAssessment};
use crate::pipeline::prompt::REPORT_INSTRUCTIONS;
use crate::pipeline::{FailureKind, ImagingError};

// ═══════════════════════════════════════════════════════════
// Credential machine
// ═══════════════════════════════════════════════════════════

/// The user-supplied API key. Held only in memory for the session,
/// zeroed on drop, never logged or written to disk.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct SessionCredential {
    value: String,
}

impl SessionCredential {
    fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }

    /// Borrow the raw key for client construction.
    pub fn expose(&self) -> &str {
        &self.value
    }
}

/// Observable phase of the credential machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialPhase {
    /// Only credential entry is available; analysis actions are disabled.
    NoCredential,
    /// A key was just accepted. Transient: entry promotes straight to
    /// `Ready` because no validation call is made at entry time.
    CredentialEntered,
    /// Full pipeline available.
    Ready,
}

impl std::fmt::Display for CredentialPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCredential => write!(f, "no_credential"),
            Self::CredentialEntered => write!(f, "credential_entered"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

struct CredentialSlot {
    phase: CredentialPhase,
    credential: Option<SessionCredential>,
}

impl CredentialSlot {
    fn empty() -> Self {
        Self {
            phase: CredentialPhase::NoCredential,
            credential: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Upload machine
// ═══════════════════════════════════════════════════════════

/// Observable phase of the per-upload sub-flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    /// No image loaded yet.
    Idle,
    /// Decoded, resized and blur-scored; ready to analyze.
    Loaded,
    /// Remote call in flight; the trigger control must stay disabled.
    Analyzing,
    /// A report was produced and is shown verbatim.
    Reported,
    /// The last attempt failed; the user may correct input and retry.
    Failed,
}

impl std::fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loaded => write!(f, "loaded"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::Reported => write!(f, "reported"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A surfaced pipeline failure: category plus a readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub kind: FailureKind,
    pub message: String,
}

/// Everything known about the current upload.
struct UploadSlot {
    phase: UploadPhase,
    file_name: Option<String>,
    /// Display-sized copy superseding the original decode.
    image: Option<MedicalImage>,
    quality: Option<QualityAssessment>,
    report: Option<String>,
    analyzed_at: Option<String>,
    failure: Option<FailureInfo>,
}

impl UploadSlot {
    fn idle() -> Self {
        Self {
            phase: UploadPhase::Idle,
            file_name: None,
            image: None,
            quality: None,
            report: None,
            analyzed_at: None,
            failure: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

/// Errors from misusing the session state machine.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No API key configured. Enter a key before using the pipeline")]
    NoCredential,
    #[error("API key must not be empty")]
    EmptyCredential,
    #[error("No image loaded. Upload an image first")]
    NoImageLoaded,
    #[error("An analysis is already running")]
    AnalysisInFlight,
    #[error("Internal lock error")]
    LockPoisoned,
    #[error(transparent)]
    Imaging(#[from] ImagingError),
}

// ═══════════════════════════════════════════════════════════
// Snapshot
// ═══════════════════════════════════════════════════════════

/// Inspectable snapshot of the whole session, serialized to the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub credential_phase: CredentialPhase,
    pub upload_phase: UploadPhase,
    pub file_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub channels: Option<u8>,
    pub sharpness: Option<f64>,
    pub blurry: Option<bool>,
    pub report: Option<String>,
    pub analyzed_at: Option<String>,
    pub failure: Option<FailureInfo>,
}

// ═══════════════════════════════════════════════════════════
// SessionState
// ═══════════════════════════════════════════════════════════

/// Shared state for one interactive session.
///
/// Wrapped in `Arc` at startup and managed by the shell. `RwLock`s allow
/// concurrent status reads while entry/upload/analysis transitions take
/// short write locks; no lock is ever held across the remote call.
pub struct SessionState {
    credential: RwLock<CredentialSlot>,
    upload: RwLock<UploadSlot>,
    agents: AgentCache,
    options: AnalysisOptions,
}

impl SessionState {
    /// Create a session with default pipeline options.
    pub fn new() -> Self {
        Self::with_options(AnalysisOptions::default())
    }

    pub fn with_options(options: AnalysisOptions) -> Self {
        Self {
            credential: RwLock::new(CredentialSlot::empty()),
            upload: RwLock::new(UploadSlot::idle()),
            agents: AgentCache::new(),
            options,
        }
    }

    // ── Credential machine ──────────────────────────────────

    /// Accept a key: `NoCredential -> CredentialEntered -> Ready`.
    ///
    /// No validation call is made; a bad key surfaces on the first
    /// analysis. The key value itself is never logged.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EmptyCredential`] for an empty or
    /// whitespace-only key; the phase stays `NoCredential`.
    pub fn enter_credential(&self, key: &str) -> Result<CredentialPhase, SessionError> {
        if key.trim().is_empty() {
            return Err(SessionError::EmptyCredential);
        }

        let mut slot = self
            .credential
            .write()
            .map_err(|_| SessionError::LockPoisoned)?;
        slot.credential = Some(SessionCredential::new(key));
        slot.phase = CredentialPhase::CredentialEntered;
        // Acceptance is lazy: promote straight to Ready.
        slot.phase = CredentialPhase::Ready;

        tracing::info!("API key accepted for this session");
        Ok(slot.phase)
    }

    /// Discard the credential and all session progress: back to
    /// `NoCredential`. The key is zeroed on drop and cached clients are
    /// invalidated, forcing reconstruction on next use.
    pub fn reset_credential(&self) -> Result<(), SessionError> {
        {
            let mut slot = self
                .credential
                .write()
                .map_err(|_| SessionError::LockPoisoned)?;
            slot.credential = None;
            slot.phase = CredentialPhase::NoCredential;
        }
        self.agents.invalidate_all();

        let mut upload = self.upload.write().map_err(|_| SessionError::LockPoisoned)?;
        *upload = UploadSlot::idle();

        tracing::info!("Session reset, credential discarded");
        Ok(())
    }

    pub fn credential_phase(&self) -> CredentialPhase {
        self.credential
            .read()
            .map(|slot| slot.phase)
            .unwrap_or(CredentialPhase::NoCredential)
    }

    /// Owned copy of the credential value for client construction.
    pub(crate) fn credential_value(&self) -> Result<String, SessionError> {
        let slot = self
            .credential
            .read()
            .map_err(|_| SessionError::LockPoisoned)?;
        match (slot.phase, &slot.credential) {
            (CredentialPhase::Ready, Some(credential)) => Ok(credential.expose().to_string()),
            _ => Err(SessionError::NoCredential),
        }
    }

    /// The session's client cache.
    pub fn agents(&self) -> &AgentCache {
        &self.agents
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    // ── Upload machine ──────────────────────────────────────

    /// Ingest an uploaded file: decode, resize for display, score blur.
    /// Only reachable once the credential machine is `Ready`.
    ///
    /// On a decode failure the sub-flow lands on `Failed` with a decode
    /// category, and the error is also returned to the caller.
    pub fn accept_upload(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<SessionSnapshot, SessionError> {
        if self.credential_phase() != CredentialPhase::Ready {
            return Err(SessionError::NoCredential);
        }

        let processed = load_medical_image(file_name, bytes).and_then(|original| {
            let display = resize_for_display(&original, self.options.display_width)?;
            let quality = assess_blur(&display, self.options.blur_threshold);
            Ok((display, quality))
        });

        let mut upload = self.upload.write().map_err(|_| SessionError::LockPoisoned)?;
        match processed {
            Ok((display, quality)) => {
                *upload = UploadSlot {
                    phase: UploadPhase::Loaded,
                    file_name: Some(file_name.to_string()),
                    image: Some(display),
                    quality: Some(quality),
                    report: None,
                    analyzed_at: None,
                    failure: None,
                };
                tracing::info!(
                    file = %file_name,
                    sharpness = quality.sharpness,
                    blurry = quality.blurry,
                    "Image loaded"
                );
                drop(upload);
                self.snapshot()
            }
            Err(error) => {
                *upload = UploadSlot {
                    phase: UploadPhase::Failed,
                    file_name: Some(file_name.to_string()),
                    failure: Some(FailureInfo {
                        kind: error.kind(),
                        message: error.to_string(),
                    }),
                    ..UploadSlot::idle()
                };
                tracing::warn!(file = %file_name, error = %error, "Upload rejected");
                Err(error.into())
            }
        }
    }

    /// Guarded transition into `Analyzing`.
    ///
    /// Builds a fresh [`AnalysisRequest`] and returns it so the caller can
    /// run the remote call without any session lock held. Pair with
    /// [`Self::complete_analysis`].
    ///
    /// # Errors
    ///
    /// `NoCredential` before `Ready`, `NoImageLoaded` from `Idle`, and
    /// `AnalysisInFlight` while a run is already `Analyzing`.
    pub fn begin_analysis(&self) -> Result<AnalysisRequest, SessionError> {
        if self.credential_phase() != CredentialPhase::Ready {
            return Err(SessionError::NoCredential);
        }

        let mut upload = self.upload.write().map_err(|_| SessionError::LockPoisoned)?;
        match upload.phase {
            UploadPhase::Analyzing => return Err(SessionError::AnalysisInFlight),
            UploadPhase::Idle => return Err(SessionError::NoImageLoaded),
            UploadPhase::Loaded | UploadPhase::Reported | UploadPhase::Failed => {}
        }

        let image = upload.image.as_ref().ok_or(SessionError::NoImageLoaded)?;
        let image_png = encode_png(image)?;

        upload.phase = UploadPhase::Analyzing;
        upload.failure = None;

        Ok(AnalysisRequest {
            instructions: REPORT_INSTRUCTIONS.to_string(),
            image_png,
        })
    }

    /// Land the in-flight analysis on `Reported` or `Failed`.
    pub fn complete_analysis(
        &self,
        outcome: Result<String, AgentError>,
    ) -> Result<SessionSnapshot, SessionError> {
        {
            let mut upload = self.upload.write().map_err(|_| SessionError::LockPoisoned)?;
            match outcome {
                Ok(report) => {
                    upload.phase = UploadPhase::Reported;
                    upload.report = Some(report);
                    upload.analyzed_at = Some(chrono::Utc::now().to_rfc3339());
                    upload.failure = None;
                }
                Err(error) => {
                    upload.phase = UploadPhase::Failed;
                    upload.report = None;
                    upload.analyzed_at = None;
                    upload.failure = Some(FailureInfo {
                        kind: error.kind(),
                        message: error.to_string(),
                    });
                    tracing::warn!(kind = %error.kind(), "Analysis failed");
                }
            }
        }
        self.snapshot()
    }

    /// One guarded end-to-end run against any agent implementation.
    pub fn run_analysis(&self, agent: &dyn ReportAgent) -> Result<SessionSnapshot, SessionError> {
        let request = self.begin_analysis()?;
        let outcome = agent.run(&request);
        self.complete_analysis(outcome)
    }

    pub fn upload_phase(&self) -> UploadPhase {
        self.upload
            .read()
            .map(|upload| upload.phase)
            .unwrap_or(UploadPhase::Idle)
    }

    /// Encode the current display image for the UI preview.
    pub fn preview_png(&self) -> Result<Vec<u8>, SessionError> {
        let upload = self.upload.read().map_err(|_| SessionError::LockPoisoned)?;
        let image = upload.image.as_ref().ok_or(SessionError::NoImageLoaded)?;
        Ok(encode_png(image)?)
    }

    /// Snapshot the whole session for inspection and for the UI.
    pub fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let upload = self.upload.read().map_err(|_| SessionError::LockPoisoned)?;
        Ok(SessionSnapshot {
            credential_phase: self.credential_phase(),
            upload_phase: upload.phase,
            file_name: upload.file_name.clone(),
            width: upload.image.as_ref().map(MedicalImage::width),
            height: upload.image.as_ref().map(MedicalImage::height),
            channels: upload.image.as_ref().map(MedicalImage::channels),
            sharpness: upload.quality.map(|q| q.sharpness),
            blurry: upload.quality.map(|q| q.blurry),
            report: upload.report.clone(),
            analyzed_at: upload.analyzed_at.clone(),
            failure: upload.failure.clone(),
        })
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
