//! Negotiation configuration and presets
//!
//! [`NegotiationConfig`] carries the platform settings the engine consults
//! while negotiating: local addresses and IP mode, codec preferences, DTMF
//! policy and SRTP behaviour. It is read-only during a negotiation.
//!
//! # Usage Examples
//!
//! ```rust
//! use rvoip_sdp_negotiation::{Codec, DtmfPolicy, IpMode, NegotiationConfig};
//!
//! let config = NegotiationConfig::new()
//!     .with_ipv4_address("192.0.2.10".parse().unwrap())
//!     .with_preferred_codec(Codec::G722)
//!     .with_dtmf_policy(DtmfPolicy::AvtAlways);
//!
//! assert_eq!(config.ip_mode, IpMode::Ipv4);
//! assert!(config.validate().is_ok());
//! ```
//!
//! Configuration can also be loaded from JSON; missing fields take their
//! defaults:
//!
//! ```rust
//! use rvoip_sdp_negotiation::{IpMode, NegotiationConfig};
//!
//! let config = NegotiationConfig::from_json_str(
//!     r#"{ "ip_mode": "dual", "ipv6_address": "2001:db8::10" }"#,
//! ).unwrap();
//! assert_eq!(config.ip_mode, IpMode::Dual);
//! assert_eq!(config.avt_payload, 101);
//! ```

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::{Codec, DtmfPolicy};
use crate::error::{NegotiationError, Result};
use crate::types::{AddressFamily, MediaType};

/// Default RFC 4733 telephone-event payload number
pub const DEFAULT_AVT_PAYLOAD: u8 = 101;

/// Default cap on remote payload entries considered per m= line
pub const DEFAULT_MAX_REMOTE_PAYLOADS: usize = 32;

/// Address families the platform offers media on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpMode {
    /// IPv4 only
    Ipv4,
    /// IPv6 only
    Ipv6,
    /// Both, with ANAT grouping
    Dual,
}

impl IpMode {
    /// Families offered, in offer order
    pub fn families(&self) -> &'static [AddressFamily] {
        match self {
            IpMode::Ipv4 => &[AddressFamily::Ipv4],
            IpMode::Ipv6 => &[AddressFamily::Ipv6],
            IpMode::Dual => &[AddressFamily::Ipv6, AddressFamily::Ipv4],
        }
    }

    /// Whether the o= line should advertise IPv6
    pub fn uses_ipv6(&self) -> bool {
        matches!(self, IpMode::Ipv6 | IpMode::Dual)
    }
}

/// Predefined configuration templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationPreset {
    /// Defaults: RTP offers, SRTP accepted with RTP fallback
    Default,
    /// Offer SRTP and refuse to fall back to RTP
    Secure,
    /// RFC 2543 hold and always-on telephone events for older peers
    Legacy,
}

/// Platform configuration consulted by the negotiation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Address families used for media
    pub ip_mode: IpMode,
    /// Device IPv4 address
    pub ipv4_address: Ipv4Addr,
    /// Device IPv6 address
    pub ipv6_address: Option<Ipv6Addr>,
    /// Advertise the NAT address instead of the device address
    pub nat_enabled: bool,
    /// Address advertised when NAT is enabled
    pub nat_address: Option<IpAddr>,
    /// Media address override; a change is applied to live lines by
    /// `update_local_sdp_media_capability`
    pub media_address: Option<IpAddr>,
    /// How telephone-event payloads are negotiated
    pub dtmf_policy: DtmfPolicy,
    /// Telephone-event payload number offered locally
    pub avt_payload: u8,
    /// Codec moved to the front of the local list
    pub preferred_codec: Option<Codec>,
    /// Local audio codecs in preference order
    pub audio_codecs: Vec<Codec>,
    /// Local video codecs in preference order
    pub video_codecs: Vec<Codec>,
    /// iLBC frame mode in milliseconds
    pub ilbc_mode: u32,
    /// Answer RTP/SAVP offers with RTP when the line cannot do SRTP
    pub srtp_fallback: bool,
    /// Offer RTP/SAVP on security capable lines
    pub offer_srtp: bool,
    /// Hold with `c=0.0.0.0` rather than a direction attribute only
    pub rfc2543_hold: bool,
    /// Keep the previous codec when a re-negotiation finds no match
    pub keep_previous_codec_on_empty_match: bool,
    /// s= line content
    pub session_name: String,
    /// o= username
    pub username: String,
    /// Remote payload entries considered per m= line
    pub max_remote_payloads: usize,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            ip_mode: IpMode::Ipv4,
            ipv4_address: Ipv4Addr::LOCALHOST,
            ipv6_address: None,
            nat_enabled: false,
            nat_address: None,
            media_address: None,
            dtmf_policy: DtmfPolicy::Avt,
            avt_payload: DEFAULT_AVT_PAYLOAD,
            preferred_codec: None,
            audio_codecs: vec![Codec::Pcmu, Codec::Pcma, Codec::G722, Codec::G729],
            video_codecs: vec![Codec::H264],
            ilbc_mode: 20,
            srtp_fallback: true,
            offer_srtp: false,
            rfc2543_hold: false,
            keep_previous_codec_on_empty_match: true,
            session_name: "SIP Call".to_string(),
            username: "-".to_string(),
            max_remote_payloads: DEFAULT_MAX_REMOTE_PAYLOADS,
        }
    }
}

impl NegotiationConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a preset on top of the current values
    pub fn with_preset(mut self, preset: NegotiationPreset) -> Self {
        match preset {
            NegotiationPreset::Default => {
                self.offer_srtp = false;
                self.srtp_fallback = true;
            }
            NegotiationPreset::Secure => {
                self.offer_srtp = true;
                self.srtp_fallback = false;
            }
            NegotiationPreset::Legacy => {
                self.rfc2543_hold = true;
                self.dtmf_policy = DtmfPolicy::AvtAlways;
            }
        }
        self
    }

    /// Set the IP mode
    pub fn with_ip_mode(mut self, ip_mode: IpMode) -> Self {
        self.ip_mode = ip_mode;
        self
    }

    /// Set the device IPv4 address
    pub fn with_ipv4_address(mut self, addr: Ipv4Addr) -> Self {
        self.ipv4_address = addr;
        self
    }

    /// Set the device IPv6 address
    pub fn with_ipv6_address(mut self, addr: Ipv6Addr) -> Self {
        self.ipv6_address = Some(addr);
        self
    }

    /// Advertise a NAT address
    pub fn with_nat_address(mut self, addr: IpAddr) -> Self {
        self.nat_enabled = true;
        self.nat_address = Some(addr);
        self
    }

    /// Override the media address
    pub fn with_media_address(mut self, addr: IpAddr) -> Self {
        self.media_address = Some(addr);
        self
    }

    /// Set the DTMF policy
    pub fn with_dtmf_policy(mut self, policy: DtmfPolicy) -> Self {
        self.dtmf_policy = policy;
        self
    }

    /// Set the local telephone-event payload number
    pub fn with_avt_payload(mut self, payload: u8) -> Self {
        self.avt_payload = payload;
        self
    }

    /// Set the preferred codec
    pub fn with_preferred_codec(mut self, codec: Codec) -> Self {
        self.preferred_codec = Some(codec);
        self
    }

    /// Replace the audio codec list
    pub fn with_audio_codecs(mut self, codecs: Vec<Codec>) -> Self {
        self.audio_codecs = codecs;
        self
    }

    /// Replace the video codec list
    pub fn with_video_codecs(mut self, codecs: Vec<Codec>) -> Self {
        self.video_codecs = codecs;
        self
    }

    /// Enable or disable SRTP to RTP fallback
    pub fn with_srtp_fallback(mut self, enabled: bool) -> Self {
        self.srtp_fallback = enabled;
        self
    }

    /// Enable or disable SRTP offers
    pub fn with_offer_srtp(mut self, enabled: bool) -> Self {
        self.offer_srtp = enabled;
        self
    }

    /// Enable or disable RFC 2543 hold
    pub fn with_rfc2543_hold(mut self, enabled: bool) -> Self {
        self.rfc2543_hold = enabled;
        self
    }

    /// Enable or disable keeping the previous codec on an empty match
    pub fn with_keep_previous_codec(mut self, enabled: bool) -> Self {
        self.keep_previous_codec_on_empty_match = enabled;
        self
    }

    /// Set the s= line
    pub fn with_session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = name.into();
        self
    }

    /// Set the o= username
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Check the configuration for values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.audio_codecs.is_empty() {
            return Err(NegotiationError::invalid_config("audio codec list is empty"));
        }
        if let Some(codec) = self.audio_codecs.iter().find(|c| c.media_type() != MediaType::Audio) {
            return Err(NegotiationError::invalid_config(format!(
                "{} is not an audio codec",
                codec
            )));
        }
        if let Some(codec) = self.video_codecs.iter().find(|c| c.media_type() != MediaType::Video) {
            return Err(NegotiationError::invalid_config(format!(
                "{} is not a video codec",
                codec
            )));
        }
        if !(96..=127).contains(&self.avt_payload) {
            return Err(NegotiationError::invalid_config(format!(
                "telephone-event payload {} is outside the dynamic range 96-127",
                self.avt_payload
            )));
        }
        if self.ip_mode.uses_ipv6() && self.ipv6_address.is_none() {
            return Err(NegotiationError::invalid_config(
                "IPv6 or dual mode requires an IPv6 address",
            ));
        }
        if self.nat_enabled && self.nat_address.is_none() {
            return Err(NegotiationError::invalid_config(
                "NAT is enabled without a NAT address",
            ));
        }
        if self.max_remote_payloads == 0 {
            return Err(NegotiationError::invalid_config(
                "max_remote_payloads must be at least 1",
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: NegotiationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Address advertised for media of the given family
    ///
    /// The NAT address wins when NAT is enabled, then a media address
    /// override of the same family, then the device address.
    pub fn local_address(&self, family: AddressFamily) -> Option<IpAddr> {
        if self.nat_enabled {
            if let Some(nat) = self.nat_address {
                return Some(nat);
            }
        }
        if let Some(media) = self.media_address {
            if AddressFamily::of(&media) == family {
                return Some(media);
            }
        }
        match family {
            AddressFamily::Ipv4 => Some(IpAddr::V4(self.ipv4_address)),
            AddressFamily::Ipv6 => self.ipv6_address.map(IpAddr::V6),
        }
    }

    /// Address written in the o= line
    pub fn origin_address(&self) -> Option<IpAddr> {
        let family = if self.ip_mode.uses_ipv6() {
            AddressFamily::Ipv6
        } else {
            AddressFamily::Ipv4
        };
        self.local_address(family)
    }
}
