// Shared identifiers and small enums used across the negotiation modules

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Opaque handle for a media line, unique within an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MediaRefId(pub u32);

impl fmt::Display for MediaRefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an entry in a capability table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapabilityIndex(pub usize);

impl fmt::Display for CapabilityIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Media type of an m= line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// m=audio
    Audio,
    /// m=video
    Video,
    /// Anything the engine does not negotiate
    Invalid,
}

impl MediaType {
    /// Classify the media field of an m= line
    pub fn from_sdp(media: &str) -> Self {
        if media.eq_ignore_ascii_case("audio") {
            MediaType::Audio
        } else if media.eq_ignore_ascii_case("video") {
            MediaType::Video
        } else {
            MediaType::Invalid
        }
    }

    /// Media field as written in an m= line
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::Invalid => "application",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Negotiated RTP transport profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transport {
    /// RTP/AVP
    Rtp,
    /// RTP/SAVP
    Srtp,
    /// Not negotiated, or not acceptable
    Invalid,
}

impl Transport {
    /// Classify the protocol field of an m= line
    pub fn from_protocol(protocol: &str) -> Self {
        match protocol.to_ascii_uppercase().as_str() {
            "RTP/AVP" => Transport::Rtp,
            "RTP/SAVP" => Transport::Srtp,
            _ => Transport::Invalid,
        }
    }

    /// Protocol field written for this transport
    pub fn protocol(&self) -> &'static str {
        match self {
            Transport::Srtp => "RTP/SAVP",
            Transport::Rtp | Transport::Invalid => "RTP/AVP",
        }
    }
}

/// Hold state bits of a media line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HoldFlags(u8);

impl HoldFlags {
    /// Not held
    pub const NONE: HoldFlags = HoldFlags(0);
    /// Held by the local side
    pub const LOCAL: HoldFlags = HoldFlags(1);

    /// Whether every bit of `other` is set
    pub fn contains(&self, other: HoldFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// Set the bits of `other`
    pub fn insert(&mut self, other: HoldFlags) {
        self.0 |= other.0;
    }

    /// Clear the bits of `other`
    pub fn remove(&mut self, other: HoldFlags) {
        self.0 &= !other.0;
    }

    /// No bit set
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// IP address family chosen for a media line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressFamily {
    /// IPv4
    Ipv4,
    /// IPv6
    Ipv6,
}

impl AddressFamily {
    /// Family of an address
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_from_sdp() {
        assert_eq!(MediaType::from_sdp("audio"), MediaType::Audio);
        assert_eq!(MediaType::from_sdp("VIDEO"), MediaType::Video);
        assert_eq!(MediaType::from_sdp("application"), MediaType::Invalid);
        assert_eq!(MediaType::from_sdp("image"), MediaType::Invalid);
    }

    #[test]
    fn test_transport_protocol() {
        assert_eq!(Transport::from_protocol("RTP/AVP"), Transport::Rtp);
        assert_eq!(Transport::from_protocol("rtp/savp"), Transport::Srtp);
        assert_eq!(Transport::from_protocol("UDP/TLS/RTP/SAVPF"), Transport::Invalid);
        assert_eq!(Transport::Srtp.protocol(), "RTP/SAVP");
    }

    #[test]
    fn test_hold_flags() {
        let mut hold = HoldFlags::NONE;
        assert!(!hold.contains(HoldFlags::LOCAL));
        hold.insert(HoldFlags::LOCAL);
        assert!(hold.contains(HoldFlags::LOCAL));
        hold.remove(HoldFlags::LOCAL);
        assert!(hold.is_empty());
    }
}
