//! # rvoip-sdp-negotiation
//!
//! RFC 3264 offer/answer negotiation for SIP user agents.
//!
//! The engine takes a remote SDP offer or answer, works out for every m=
//! line whether and how the local endpoint can take part, and maintains
//! the local SDP that goes back to the peer. It covers:
//!
//! - **Codecs**: master/slave intersection of local and remote payload
//!   lists, dynamic payload echo, RFC 4733 telephone events
//! - **Direction**: sendrecv/sendonly/recvonly/inactive resolution with
//!   local hold, RFC 2543 or RFC 3264 style
//! - **Addresses**: IPv4, IPv6 and dual-stack operation with RFC 4091 ANAT
//!   groups, IPv4 multicast echo
//! - **Transport**: RTP/AVP and RTP/SAVP with optional fallback
//! - **Capabilities**: a global media capability table, narrowed per call
//!   by a video policy, with live updates
//!
//! Ports, media streams, crypto keys, video parameters and name resolution
//! are reached through the traits in [`collaborators`].
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use rvoip_sdp_negotiation::{NegotiationConfig, NegotiationEngine};
//!
//! let config = NegotiationConfig::new().with_ipv4_address("192.0.2.10".parse().unwrap());
//! let engine = Arc::new(NegotiationEngine::new(config)?);
//!
//! // Outgoing call: build an offer, then negotiate the answer
//! let mut session = engine.new_session();
//! session.negotiate_offer_sdp(None, true)?;
//! let offer = session.encode_sdp_and_update_version();
//! assert!(offer.starts_with(b"v=0\r\n"));
//!
//! let answer = "v=0\r\no=- 9 9 IN IP4 192.0.2.20\r\ns=-\r\nc=IN IP4 192.0.2.20\r\nt=0 0\r\n\
//!               m=audio 7000 RTP/AVP 0\r\nm=video 0 RTP/AVP 126\r\n";
//! let report = session.negotiate_answer_sdp(Some(answer.as_bytes()))?;
//! assert_eq!(report.negotiated().count(), 1);
//! # Ok::<(), rvoip_sdp_negotiation::NegotiationError>(())
//! ```

pub mod address;
pub mod builder;
pub mod capability;
pub mod codec;
pub mod collaborators;
pub mod config;
pub mod direction;
pub mod engine;
pub mod error;
pub mod media;
pub mod session;
pub mod transport;
pub mod types;

pub use builder::LocalSdpBuilder;
pub use capability::{CapabilityTable, MediaCapabilityEntry, VideoPolicy, CAP_AUDIO, CAP_VIDEO};
pub use codec::{Codec, DtmfPolicy};
pub use collaborators::{
    AddressResolver, Collaborators, CryptoKeyProvider, DefaultVideoValidator, MediaControl,
    MediaControlError, NoCryptoProvider, PortPool, SystemResolver, VideoAttributeValidator,
    VideoAttributes,
};
pub use config::{IpMode, NegotiationConfig, NegotiationPreset};
pub use engine::NegotiationEngine;
pub use error::{Cause, NegotiationError, Result};
pub use media::{MediaLine, MediaLineRegistry, PreviousNegotiation, MAX_MEDIA_LINES};
pub use session::{LineOutcome, LineStatus, NegotiationReport, NegotiationSession, RejectReason};
pub use types::{AddressFamily, CapabilityIndex, HoldFlags, MediaRefId, MediaType, Transport};

// Document model types callers handle directly
pub use rvoip_sdp_core::{MediaDirection, SessionDescription};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
