//! Error types for SDP parsing and manipulation

use thiserror::Error;

/// Result type for SDP operations
pub type Result<T> = std::result::Result<T, SdpError>;

/// Errors produced while parsing or editing an SDP document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdpError {
    /// A line could not be parsed
    #[error("SDP parsing error: {0}")]
    SdpParsingError(String),

    /// A mandatory line (v=, o=, s=) is absent
    #[error("Missing required SDP line: {0}")]
    MissingField(&'static str),

    /// The body is not UTF-8 text
    #[error("SDP body is not valid UTF-8")]
    InvalidUtf8,

    /// A media level outside the document was addressed
    #[error("Media level {level} does not exist (document has {count} media lines)")]
    NoSuchLevel {
        /// Requested 1-based level
        level: u16,
        /// Number of media lines in the document
        count: usize,
    },
}

impl SdpError {
    /// Create a parsing error for the given line content
    pub fn parsing(details: impl Into<String>) -> Self {
        Self::SdpParsingError(details.into())
    }
}
