//! Collaborator interfaces
//!
//! The engine decides *what* to negotiate; these traits are how it reaches
//! the parts of the user agent that own the resources: RTP ports and media
//! streams ([`MediaControl`]), SRTP keying ([`CryptoKeyProvider`]), video
//! codec parameters ([`VideoAttributeValidator`]) and name resolution
//! ([`AddressResolver`]).
//!
//! All collaborators are `Send + Sync` and shared through `Arc`, so one set
//! can serve every session of an engine.

use std::net::{IpAddr, ToSocketAddrs};
use std::sync::Arc;

use parking_lot::Mutex;
use rvoip_sdp_core::MediaDescription;
use thiserror::Error;
use tracing::{debug, warn};

use crate::codec::Codec;
use crate::types::{CapabilityIndex, MediaRefId, MediaType};

/// Media control failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaControlError {
    /// No receive port could be allocated
    #[error("No receive port available for {media_type} line {ref_id}")]
    PortUnavailable {
        /// Media type of the line
        media_type: MediaType,
        /// Line handle
        ref_id: MediaRefId,
    },

    /// The media layer refused the request
    #[error("Media control failure: {0}")]
    Failed(String),

    /// A port range holds no even RTP port
    #[error("Invalid RTP port range {start}..{end}")]
    InvalidPortRange {
        start: u16,
        end: u16,
    },
}

/// RTP port allocation and media stream control
pub trait MediaControl: Send + Sync {
    /// Allocate a local receive port for a line
    fn open_receive_port(
        &self,
        media_type: MediaType,
        ref_id: MediaRefId,
    ) -> Result<u16, MediaControlError>;

    /// Stop any running media of a line
    fn stop_media(&self, ref_id: MediaRefId);

    /// Return a port allocated by `open_receive_port`
    fn release_port(&self, cap_index: Option<CapabilityIndex>, ref_id: MediaRefId, port: u16);
}

/// SRTP crypto attribute selection
pub trait CryptoKeyProvider: Send + Sync {
    /// Pick one of the remote `a=crypto` values, returning its index
    fn select_remote_crypto(&self, ref_id: MediaRefId, remote_crypto: &[&str]) -> Option<u32>;

    /// Local `a=crypto` value for a line
    ///
    /// `crypto_index` is the remote attribute selected when answering, and
    /// `None` when the line is being offered.
    fn local_crypto(&self, ref_id: MediaRefId, crypto_index: Option<u32>) -> Option<String>;
}

/// Video attributes accepted for a negotiated video codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoAttributes {
    /// Profile level (H.264 profile-level-id)
    pub profile_level: Option<u32>,
    /// Transport independent bandwidth (b=TIAS) in bit/s
    pub tias_bandwidth: Option<u64>,
}

/// Video codec attribute policy
pub trait VideoAttributeValidator: Send + Sync {
    /// Accept or reject a candidate video codec of a remote m= line
    fn check(
        &self,
        codec: Codec,
        remote: &MediaDescription,
        remote_dynamic: Option<u8>,
    ) -> Option<VideoAttributes>;

    /// Add codec specific attributes to a local video m= line
    fn populate(&self, codec: Codec, payload_type: u8, local: &mut MediaDescription);
}

/// Host name resolution for remote connection addresses
pub trait AddressResolver: Send + Sync {
    /// Resolve a host name to one address
    fn resolve(&self, host: &str) -> Option<IpAddr>;
}

/// Crypto provider for deployments without SRTP keying
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCryptoProvider;

impl CryptoKeyProvider for NoCryptoProvider {
    fn select_remote_crypto(&self, _ref_id: MediaRefId, _remote_crypto: &[&str]) -> Option<u32> {
        None
    }

    fn local_crypto(&self, _ref_id: MediaRefId, _crypto_index: Option<u32>) -> Option<String> {
        None
    }
}

/// Video validator that accepts every candidate
///
/// It reports the remote `b=TIAS` bandwidth and the fmtp `profile-level-id`
/// (hexadecimal) of the candidate payload, and adds nothing to local lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultVideoValidator;

impl VideoAttributeValidator for DefaultVideoValidator {
    fn check(
        &self,
        codec: Codec,
        remote: &MediaDescription,
        remote_dynamic: Option<u8>,
    ) -> Option<VideoAttributes> {
        let payload_type = remote_dynamic.unwrap_or_else(|| codec.payload_number());
        let profile_level = remote
            .fmtp_for(payload_type)
            .and_then(|f| f.param("profile-level-id"))
            .and_then(|p| u32::from_str_radix(p.trim(), 16).ok());
        Some(VideoAttributes {
            profile_level,
            tias_bandwidth: remote.bandwidth("TIAS"),
        })
    }

    fn populate(&self, _codec: Codec, _payload_type: u8, _local: &mut MediaDescription) {}
}

/// Resolver backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl AddressResolver for SystemResolver {
    fn resolve(&self, host: &str) -> Option<IpAddr> {
        match (host, 0u16).to_socket_addrs() {
            Ok(mut addrs) => addrs.next().map(|a| a.ip()),
            Err(e) => {
                debug!(host, error = %e, "address resolution failed");
                None
            }
        }
    }
}

/// In-process RTP port allocator
///
/// Hands out even ports from a range, reusing released ones first. It is
/// the media control used when no real media layer is attached.
#[derive(Debug)]
pub struct PortPool {
    state: Mutex<PortPoolState>,
}

#[derive(Debug)]
struct PortPoolState {
    start: u16,
    next: u16,
    end: u16,
    free: Vec<u16>,
}

impl PortPool {
    /// Create a pool over `[start, end)`; odd starts are rounded up
    ///
    /// Fails when the rounded range is empty or starts at port 0.
    pub fn new(start: u16, end: u16) -> Result<Self, MediaControlError> {
        let first = start
            .checked_add(start % 2)
            .filter(|first| *first != 0 && *first < end)
            .ok_or(MediaControlError::InvalidPortRange { start, end })?;
        Ok(Self::over(first, end))
    }

    fn over(start: u16, end: u16) -> Self {
        Self {
            state: Mutex::new(PortPoolState {
                start,
                next: start,
                end,
                free: Vec::new(),
            }),
        }
    }

    /// Ports currently handed out
    pub fn in_use(&self) -> usize {
        let state = self.state.lock();
        let issued = usize::from(state.next.saturating_sub(state.start)).div_ceil(2);
        issued.saturating_sub(state.free.len())
    }
}

impl Default for PortPool {
    fn default() -> Self {
        Self::over(16384, 32768)
    }
}

impl MediaControl for PortPool {
    fn open_receive_port(
        &self,
        media_type: MediaType,
        ref_id: MediaRefId,
    ) -> Result<u16, MediaControlError> {
        let mut state = self.state.lock();
        if let Some(port) = state.free.pop() {
            return Ok(port);
        }
        if state.next >= state.end {
            warn!(%media_type, %ref_id, "port pool exhausted");
            return Err(MediaControlError::PortUnavailable { media_type, ref_id });
        }
        let port = state.next;
        state.next = state.next.checked_add(2).unwrap_or(state.end);
        Ok(port)
    }

    fn stop_media(&self, ref_id: MediaRefId) {
        debug!(%ref_id, "stop media");
    }

    fn release_port(&self, _cap_index: Option<CapabilityIndex>, _ref_id: MediaRefId, port: u16) {
        let mut state = self.state.lock();
        if !state.free.contains(&port) {
            state.free.push(port);
        }
    }
}

/// The set of collaborators an engine negotiates with
#[derive(Clone)]
pub struct Collaborators {
    /// Port allocation and media control
    pub media: Arc<dyn MediaControl>,
    /// SRTP crypto selection
    pub crypto: Arc<dyn CryptoKeyProvider>,
    /// Video attribute policy
    pub video: Arc<dyn VideoAttributeValidator>,
    /// Host name resolution
    pub resolver: Arc<dyn AddressResolver>,
}

impl Collaborators {
    /// Use `media` with the default crypto, video and resolver collaborators
    pub fn new(media: Arc<dyn MediaControl>) -> Self {
        Self {
            media,
            crypto: Arc::new(NoCryptoProvider),
            video: Arc::new(DefaultVideoValidator),
            resolver: Arc::new(SystemResolver),
        }
    }

    /// Replace the crypto provider
    pub fn with_crypto(mut self, crypto: Arc<dyn CryptoKeyProvider>) -> Self {
        self.crypto = crypto;
        self
    }

    /// Replace the video validator
    pub fn with_video(mut self, video: Arc<dyn VideoAttributeValidator>) -> Self {
        self.video = video;
        self
    }

    /// Replace the resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn AddressResolver>) -> Self {
        self.resolver = resolver;
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::new(Arc::new(PortPool::default()))
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rvoip_sdp_core::{Bandwidth, FmtpAttribute, ParsedAttribute};

    #[test]
    fn test_port_pool_allocates_even_ports_and_reuses() {
        let pool = PortPool::new(20001, 20006).unwrap();
        let a = pool.open_receive_port(MediaType::Audio, MediaRefId(1)).unwrap();
        let b = pool.open_receive_port(MediaType::Video, MediaRefId(2)).unwrap();
        assert_eq!((a, b), (20002, 20004));
        assert!(pool.open_receive_port(MediaType::Audio, MediaRefId(3)).is_err());

        assert_eq!(pool.in_use(), 2);
        pool.release_port(None, MediaRefId(1), a);
        assert_eq!(pool.in_use(), 1);
        assert_eq!(pool.open_receive_port(MediaType::Audio, MediaRefId(4)).unwrap(), a);
    }

    #[test]
    fn test_port_pool_range_edges() {
        assert!(matches!(
            PortPool::new(u16::MAX, u16::MAX),
            Err(MediaControlError::InvalidPortRange { start: u16::MAX, end: u16::MAX })
        ));
        assert!(PortPool::new(0, 100).is_err());
        assert!(PortPool::new(30001, 30002).is_err());

        let pool = PortPool::new(65533, u16::MAX).unwrap();
        assert_eq!(pool.open_receive_port(MediaType::Audio, MediaRefId(1)).unwrap(), 65534);
        assert!(matches!(
            pool.open_receive_port(MediaType::Audio, MediaRefId(2)),
            Err(MediaControlError::PortUnavailable { .. })
        ));
        assert_eq!(pool.in_use(), 1);
    }

    #[test]
    fn test_default_video_validator_reads_attributes() {
        let mut remote = MediaDescription::new("video", 5006, "RTP/AVP");
        remote.formats = vec!["97".to_string()];
        remote.bandwidths.push(Bandwidth { bw_type: "TIAS".to_string(), value: 384000 });
        remote.push_attribute(ParsedAttribute::Fmtp(FmtpAttribute {
            format: "97".to_string(),
            parameters: "profile-level-id=42e01f;packetization-mode=1".to_string(),
        }));

        let attrs = DefaultVideoValidator.check(Codec::H264, &remote, Some(97)).unwrap();
        assert_eq!(attrs.profile_level, Some(0x42e01f));
        assert_eq!(attrs.tias_bandwidth, Some(384000));
    }

    #[test]
    fn test_no_crypto_provider_selects_nothing() {
        assert_eq!(NoCryptoProvider.select_remote_crypto(MediaRefId(1), &["1 AES_CM_128_HMAC_SHA1_80 inline:x"]), None);
    }

    #[test]
    fn test_system_resolver_handles_literals() {
        assert_eq!(SystemResolver.resolve("127.0.0.1"), Some("127.0.0.1".parse().unwrap()));
    }
}
