//! Remote analysis agent: a hosted multimodal model with web search.
//!
//! The entire remote orchestration (model inference plus any search calls
//! the model decides to make) sits behind the [`ReportAgent`] trait — one
//! synchronous call in, one markdown report out. Nothing else in the crate
//! depends on how the service works internally.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::FailureKind;
use crate::config;

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

/// Errors from the remote analysis service. None are retried.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("API key must not be empty")]
    EmptyCredential,
    #[error("The analysis service rejected the API key (HTTP {status}): {message}")]
    Auth { status: u16, message: String },
    #[error("Could not reach the analysis service: {0}")]
    Network(String),
    #[error("The analysis service failed (HTTP {status}): {message}")]
    Upstream { status: u16, message: String },
    #[error("The analysis service returned no readable report: {0}")]
    EmptyResponse(String),
}

impl AgentError {
    /// Failure category for user-facing routing.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::EmptyCredential | Self::Auth { .. } => FailureKind::Auth,
            Self::Network(_) => FailureKind::Network,
            Self::Upstream { .. } | Self::EmptyResponse(_) => FailureKind::Upstream,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Request / capability boundary
// ═══════════════════════════════════════════════════════════

/// One analysis request: the fixed instruction template paired with one
/// PNG-encoded image. Built fresh per trigger, never cached or reused.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub instructions: String,
    pub image_png: Vec<u8>,
}

/// The single capability the rest of the system depends on.
///
/// Implementations may invoke web search any number of times before
/// returning; callers observe only the final text.
pub trait ReportAgent: Send + Sync {
    fn run(&self, request: &AnalysisRequest) -> Result<String, AgentError>;
}

// ═══════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    tools: Vec<RequestTool>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

/// Switches on the service-side web search tool; the empty object is the
/// documented way to enable it.
#[derive(Debug, Serialize)]
struct RequestTool {
    google_search: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

// ═══════════════════════════════════════════════════════════
// GeminiAgent
// ═══════════════════════════════════════════════════════════

/// HTTP client for the hosted Gemini generateContent endpoint.
///
/// One instance per credential; construction is pure, credential validity
/// is only discovered when [`ReportAgent::run`] hits the service.
pub struct GeminiAgent {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiAgent {
    /// Create an agent for the given credential.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::EmptyCredential`] for an empty or
    /// whitespace-only key.
    pub fn new(api_key: &str) -> Result<Self, AgentError> {
        if api_key.trim().is_empty() {
            return Err(AgentError::EmptyCredential);
        }

        let client = reqwest::blocking::Client::builder()
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            client,
            base_url: config::ANALYSIS_BASE_URL.trim_end_matches('/').to_string(),
            model: config::ANALYSIS_MODEL.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Set a custom base URL (proxies, alternative endpoints).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Set the model name.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl ReportAgent for GeminiAgent {
    fn run(&self, request: &AnalysisRequest) -> Result<String, AgentError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let encoded = base64::engine::general_purpose::STANDARD.encode(&request.image_png);

        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![
                    RequestPart {
                        text: Some(&request.instructions),
                        inline_data: None,
                    },
                    RequestPart {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: "image/png",
                            data: encoded,
                        }),
                    },
                ],
            }],
            tools: vec![RequestTool {
                google_search: serde_json::json!({}),
            }],
        };

        tracing::debug!(
            model = %self.model,
            image_bytes = request.image_png.len(),
            "Dispatching analysis request"
        );
        let start = std::time::Instant::now();

        // The credential travels in a header, never in the URL, so transport
        // errors can be surfaced without leaking it.
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    AgentError::Network(format!("connection failed: {e}"))
                } else if e.is_timeout() {
                    AgentError::Network("request timed out".into())
                } else {
                    AgentError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(classify_http_failure(status.as_u16(), message));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .map_err(|e| AgentError::EmptyResponse(e.to_string()))?;

        let report = collect_report_text(&parsed);
        if report.trim().is_empty() {
            return Err(AgentError::EmptyResponse(
                "response contained no report text".into(),
            ));
        }

        tracing::info!(
            elapsed_ms = %start.elapsed().as_millis(),
            report_len = report.len(),
            "Analysis complete"
        );
        Ok(report)
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
///
/// The service reports an invalid key as 400 with an `API_KEY_INVALID`
/// reason rather than 401, so that case is treated as auth too.
fn classify_http_failure(status: u16, message: String) -> AgentError {
    match status {
        401 | 403 => AgentError::Auth { status, message },
        400 if message.contains("API_KEY_INVALID") || message.contains("API key") => {
            AgentError::Auth { status, message }
        }
        _ => AgentError::Upstream { status, message },
    }
}

/// Join the text parts of the first candidate. Empty when the response
/// carries no text.
fn collect_report_text(response: &GenerateContentResponse) -> String {
    response
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════
// MockReportAgent (testing)
// ═══════════════════════════════════════════════════════════

enum MockOutcome {
    Report(String),
    Auth,
    Network,
    Upstream,
}

/// Mock agent for tests — fixed report text or a scripted failure.
pub struct MockReportAgent {
    outcome: MockOutcome,
}

impl MockReportAgent {
    pub fn succeeding(report: &str) -> Self {
        Self {
            outcome: MockOutcome::Report(report.to_string()),
        }
    }

    pub fn failing_auth() -> Self {
        Self {
            outcome: MockOutcome::Auth,
        }
    }

    pub fn failing_network() -> Self {
        Self {
            outcome: MockOutcome::Network,
        }
    }

    pub fn failing_upstream() -> Self {
        Self {
            outcome: MockOutcome::Upstream,
        }
    }
}

impl ReportAgent for MockReportAgent {
    fn run(&self, _request: &AnalysisRequest) -> Result<String, AgentError> {
        match &self.outcome {
            MockOutcome::Report(text) => Ok(text.clone()),
            MockOutcome::Auth => Err(AgentError::Auth {
                status: 401,
                message: "mock credential rejection".into(),
            }),
            MockOutcome::Network => Err(AgentError::Network("mock transport failure".into())),
            MockOutcome::Upstream => Err(AgentError::Upstream {
                status: 500,
                message: "mock model failure".into(),
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
