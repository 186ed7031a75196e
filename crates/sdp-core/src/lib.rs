//! # rvoip-sdp-core
//!
//! Session Description Protocol (RFC 4566) document model for the rvoip
//! negotiation stack.
//!
//! The crate offers three things:
//!
//! - **Types** ([`SessionDescription`], [`MediaDescription`], [`Origin`],
//!   [`ConnectionData`], [`ParsedAttribute`], ...) addressed by 1-based media
//!   level, the way offer/answer negotiation refers to m-lines.
//! - **Parsing** with `nom` combinators for each line type, tolerant of
//!   CRLF/LF endings and unknown attributes.
//! - **Serialization** through `Display`, producing CRLF-terminated lines in
//!   RFC 4566 order.
//!
//! ## Example
//!
//! ```rust
//! use rvoip_sdp_core::{MediaDirection, SessionDescription};
//!
//! let body = "v=0\r\n\
//!             o=- 1 0 IN IP4 192.0.2.1\r\n\
//!             s=-\r\n\
//!             c=IN IP4 192.0.2.1\r\n\
//!             t=0 0\r\n\
//!             m=audio 49170 RTP/AVP 0 101\r\n\
//!             a=rtpmap:101 telephone-event/8000\r\n\
//!             a=sendonly\r\n";
//!
//! let sdp: SessionDescription = body.parse()?;
//! let audio = sdp.media(1).unwrap();
//! assert_eq!(audio.port, 49170);
//! assert_eq!(audio.direction, Some(MediaDirection::SendOnly));
//! assert_eq!(sdp.to_string(), body);
//! # Ok::<(), rvoip_sdp_core::SdpError>(())
//! ```

pub mod error;
pub mod parser;
pub mod types;

pub use error::{Result, SdpError};
pub use parser::parse_sdp;
pub use types::{
    AddrType, Bandwidth, ConnectionData, FmtpAttribute, MediaDescription, MediaDirection, Origin,
    ParsedAttribute, RtpMapAttribute, SessionDescription, TimeDescription,
};
