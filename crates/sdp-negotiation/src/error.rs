//! Error types for SDP negotiation
//!
//! Whole-session failures surface as [`NegotiationError`]. A single media
//! line that cannot be negotiated is not an error: it is rejected in the
//! local SDP and reported through [`crate::LineOutcome`] instead.

use rvoip_sdp_core::SdpError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collaborators::MediaControlError;

/// Result type for negotiation operations
pub type Result<T> = std::result::Result<T, NegotiationError>;

/// Negotiation failures
#[derive(Error, Debug)]
pub enum NegotiationError {
    /// No media line could be negotiated
    #[error("No usable media in the remote SDP")]
    NoMedia,

    /// Every candidate line failed codec intersection
    #[error("No common payload type with the remote SDP")]
    PayloadMismatch,

    /// The remote body did not parse
    #[error("Failed to parse SDP: {0}")]
    Parse(#[from] SdpError),

    /// An answer was expected but no body was supplied
    #[error("Missing SDP body")]
    MissingBody,

    /// The per-call media line limit was hit
    #[error("Too many media lines (max {max})")]
    TooManyLines {
        /// Configured maximum
        max: usize,
    },

    /// A local offer ended up without an audio line
    #[error("No audio capability available for the local SDP")]
    NoAudioCapability,

    /// A local offer ended up without any media line
    #[error("No media line could be added to the local SDP")]
    NoMediaLines,

    /// A media line level that is already in use was added again
    #[error("Media level {level} is already in use")]
    LevelInUse {
        /// The duplicate level
        level: u16,
    },

    /// The media layer could not serve a local line
    #[error(transparent)]
    MediaControl(#[from] MediaControlError),

    /// Configuration failed validation
    #[error("Invalid configuration: {details}")]
    InvalidConfig {
        /// What is wrong
        details: String,
    },

    /// Reading a configuration file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration document did not deserialize
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Call-control cause codes a negotiation maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cause {
    /// Negotiation succeeded
    Ok,
    /// No usable media
    NoMedia,
    /// No common codec
    PayloadMismatch,
    /// Unparseable body
    ParseError,
    /// Any other failure
    Error,
}

impl NegotiationError {
    /// Cause code reported to call control
    pub fn cause(&self) -> Cause {
        match self {
            NegotiationError::NoMedia => Cause::NoMedia,
            NegotiationError::PayloadMismatch => Cause::PayloadMismatch,
            NegotiationError::Parse(_) => Cause::ParseError,
            _ => Cause::Error,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(details: impl Into<String>) -> Self {
        NegotiationError::InvalidConfig {
            details: details.into(),
        }
    }
}
