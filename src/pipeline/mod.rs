//! Upload-to-report pipeline: image ingestion, display preprocessing, the
//! fixed report instructions and the remote analysis agent.

pub mod agent;
pub mod loader;
pub mod preprocess;
pub mod prompt;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// Failure categories
// ═══════════════════════════════════════════════════════════

/// Category of a pipeline failure, used by the UI to route messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Upload could not be decoded (or re-encoded) as an image.
    Decode,
    /// The remote service rejected the credential.
    Auth,
    /// The remote service could not be reached.
    Network,
    /// The remote service was reached but failed to produce a report.
    Upstream,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode => write!(f, "decode"),
            Self::Auth => write!(f, "auth"),
            Self::Network => write!(f, "network"),
            Self::Upstream => write!(f, "upstream"),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Local imaging errors
// ═══════════════════════════════════════════════════════════

/// Errors from local image handling (decode, geometry, encode).
#[derive(Debug, thiserror::Error)]
pub enum ImagingError {
    #[error("Could not decode image: {0}")]
    Decode(String),
    #[error("Cannot resize a {width}x{height} image to width {target_width}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        target_width: u32,
    },
    #[error("Could not encode image: {0}")]
    Encode(String),
}

impl ImagingError {
    /// All local imaging failures surface in the decode category.
    pub fn kind(&self) -> FailureKind {
        FailureKind::Decode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&FailureKind::Network).unwrap(),
            "\"network\""
        );
        assert_eq!(
            serde_json::to_string(&FailureKind::Upstream).unwrap(),
            "\"upstream\""
        );
    }

    #[test]
    fn failure_kind_display() {
        assert_eq!(FailureKind::Decode.to_string(), "decode");
        assert_eq!(FailureKind::Auth.to_string(), "auth");
    }

    #[test]
    fn imaging_errors_are_decode_category() {
        let err = ImagingError::Decode("bad bytes".into());
        assert_eq!(err.kind(), FailureKind::Decode);

        let err = ImagingError::InvalidDimensions {
            width: 0,
            height: 10,
            target_width: 500,
        };
        assert_eq!(err.kind(), FailureKind::Decode);
    }

    #[test]
    fn invalid_dimensions_message_names_geometry() {
        let err = ImagingError::InvalidDimensions {
            width: 0,
            height: 600,
            target_width: 500,
        };
        assert_eq!(err.to_string(), "Cannot resize a 0x600 image to width 500");
    }
}
