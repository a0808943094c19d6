//! Application constants and tunable pipeline defaults.

/// Application-level constants
pub const APP_NAME: &str = "RadioLens";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is not set.
pub fn default_log_filter() -> &'static str {
    "info,radiolens_lib=debug"
}

/// Hosted analysis service endpoint.
pub const ANALYSIS_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Multimodal model used for report generation.
pub const ANALYSIS_MODEL: &str = "gemini-2.5-pro";

/// Display width for the uploaded image preview, in pixels.
pub const DEFAULT_DISPLAY_WIDTH: u32 = 500;

/// Laplacian variance below this is flagged as blurry.
pub const DEFAULT_BLUR_THRESHOLD: f64 = 100.0;

/// Tunable knobs for the upload pipeline.
///
/// The width and threshold values are inherited defaults, not validated
/// domain constants; override per instance where a different trade-off
/// is needed.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Width of the display-sized copy shown to the user and analyzed.
    pub display_width: u32,
    /// Sharpness threshold for the advisory blur flag.
    pub blur_threshold: f64,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            display_width: DEFAULT_DISPLAY_WIDTH,
            blur_threshold: DEFAULT_BLUR_THRESHOLD,
        }
    }
}
