//! SDP document types
//!
//! The structures in this module mirror the line layout of an RFC 4566
//! session description. Media descriptions are addressed by their 1-based
//! `level`, which is the convention used by offer/answer negotiation.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SdpError};

/// Media direction attribute (RFC 3264 Section 5.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaDirection {
    /// a=sendrecv
    SendRecv,
    /// a=sendonly
    SendOnly,
    /// a=recvonly
    RecvOnly,
    /// a=inactive
    Inactive,
}

impl MediaDirection {
    /// All directions, in declaration order
    pub const ALL: [MediaDirection; 4] = [
        MediaDirection::SendRecv,
        MediaDirection::SendOnly,
        MediaDirection::RecvOnly,
        MediaDirection::Inactive,
    ];

    /// The attribute name used in SDP
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaDirection::SendRecv => "sendrecv",
            MediaDirection::SendOnly => "sendonly",
            MediaDirection::RecvOnly => "recvonly",
            MediaDirection::Inactive => "inactive",
        }
    }

    /// Map a property attribute name to a direction
    pub fn from_attribute(name: &str) -> Option<Self> {
        match name {
            "sendrecv" => Some(MediaDirection::SendRecv),
            "sendonly" => Some(MediaDirection::SendOnly),
            "recvonly" => Some(MediaDirection::RecvOnly),
            "inactive" => Some(MediaDirection::Inactive),
            _ => None,
        }
    }

    /// Whether this direction allows receiving media
    pub fn can_receive(&self) -> bool {
        matches!(self, MediaDirection::SendRecv | MediaDirection::RecvOnly)
    }

    /// Whether this direction allows sending media
    pub fn can_send(&self) -> bool {
        matches!(self, MediaDirection::SendRecv | MediaDirection::SendOnly)
    }
}

impl fmt::Display for MediaDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address type of an origin or connection line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddrType {
    /// IP4
    Ip4,
    /// IP6
    Ip6,
}

impl AddrType {
    /// Address type matching an IP address
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddrType::Ip4,
            IpAddr::V6(_) => AddrType::Ip6,
        }
    }
}

impl fmt::Display for AddrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrType::Ip4 => f.write_str("IP4"),
            AddrType::Ip6 => f.write_str("IP6"),
        }
    }
}

impl FromStr for AddrType {
    type Err = SdpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "IP4" => Ok(AddrType::Ip4),
            "IP6" => Ok(AddrType::Ip6),
            other => Err(SdpError::parsing(format!("Unsupported address type: {}", other))),
        }
    }
}

/// Origin line (o=)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// Username, "-" when none
    pub username: String,
    /// Numeric session id
    pub sess_id: String,
    /// Numeric session version
    pub sess_version: String,
    /// Network type, always "IN"
    pub net_type: String,
    /// Address type
    pub addr_type: AddrType,
    /// Address or FQDN of the originator
    pub unicast_address: String,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.username,
            self.sess_id,
            self.sess_version,
            self.net_type,
            self.addr_type,
            self.unicast_address
        )
    }
}

/// Connection data (c=)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionData {
    /// Network type, always "IN"
    pub net_type: String,
    /// Address type
    pub addr_type: AddrType,
    /// Unicast/multicast address or FQDN, without TTL or count
    pub connection_address: String,
    /// Multicast TTL (IPv4 only)
    pub ttl: Option<u8>,
    /// Number of multicast addresses
    pub multicast_count: Option<u32>,
}

impl ConnectionData {
    /// Connection line for an IP address
    pub fn for_ip(addr: IpAddr) -> Self {
        Self {
            net_type: "IN".to_string(),
            addr_type: AddrType::of(&addr),
            connection_address: addr.to_string(),
            ttl: None,
            multicast_count: None,
        }
    }

    /// The `IN IP4 0.0.0.0` connection used by rejected and held streams
    pub fn unspecified_ipv4() -> Self {
        Self::for_ip(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))
    }

    /// Connection address as an IP literal, when it is one
    pub fn ip_addr(&self) -> Option<IpAddr> {
        self.connection_address.parse().ok()
    }
}

impl fmt::Display for ConnectionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.net_type, self.addr_type, self.connection_address)?;
        if let Some(ttl) = self.ttl {
            write!(f, "/{}", ttl)?;
        }
        if let Some(count) = self.multicast_count {
            write!(f, "/{}", count)?;
        }
        Ok(())
    }
}

/// Bandwidth line (b=)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bandwidth {
    /// Modifier such as AS, CT or TIAS
    pub bw_type: String,
    /// Value (kbps for AS/CT, bps for TIAS)
    pub value: u64,
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bw_type, self.value)
    }
}

/// Timing line (t=)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeDescription {
    /// Start time as written
    pub start_time: String,
    /// Stop time as written
    pub stop_time: String,
}

impl TimeDescription {
    /// `t=0 0`, an unbounded session
    pub fn unbounded() -> Self {
        Self {
            start_time: "0".to_string(),
            stop_time: "0".to_string(),
        }
    }

    /// Both values are decimal NTP times
    pub fn is_valid(&self) -> bool {
        self.start_time.parse::<u64>().is_ok() && self.stop_time.parse::<u64>().is_ok()
    }
}

impl fmt::Display for TimeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.start_time, self.stop_time)
    }
}

/// a=rtpmap:<payload type> <encoding name>/<clock rate>[/<encoding parameters>]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpMapAttribute {
    /// RTP payload type number
    pub payload_type: u8,
    /// Encoding name, e.g. "PCMU" or "telephone-event"
    pub encoding_name: String,
    /// Clock rate in Hz
    pub clock_rate: u32,
    /// Encoding parameters (channel count for audio)
    pub encoding_params: Option<String>,
}

impl fmt::Display for RtpMapAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.payload_type, self.encoding_name, self.clock_rate)?;
        if let Some(params) = &self.encoding_params {
            write!(f, "/{}", params)?;
        }
        Ok(())
    }
}

/// a=fmtp:<format> <format specific parameters>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FmtpAttribute {
    /// Format (payload number) the parameters apply to
    pub format: String,
    /// Raw parameter string
    pub parameters: String,
}

impl FmtpAttribute {
    /// Look up a `key=value` parameter, case-insensitively on the key
    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters.split(';').find_map(|p| {
            let (k, v) = p.trim().split_once('=')?;
            k.trim().eq_ignore_ascii_case(key).then(|| v.trim())
        })
    }
}

impl fmt::Display for FmtpAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.format, self.parameters)
    }
}

/// A parsed `a=` line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParsedAttribute {
    /// a=rtpmap
    RtpMap(RtpMapAttribute),
    /// a=fmtp
    Fmtp(FmtpAttribute),
    /// a=mid (RFC 5888)
    Mid(String),
    /// a=group (RFC 5888), e.g. `group:ANAT 1 2`
    Group {
        /// Grouping semantics
        semantics: String,
        /// Identification tags
        ids: Vec<String>,
    },
    /// Any other `name:value` attribute
    Value(String, String),
    /// Any other property attribute
    Flag(String),
}

impl ParsedAttribute {
    /// Attribute name as written after `a=`
    pub fn name(&self) -> &str {
        match self {
            ParsedAttribute::RtpMap(_) => "rtpmap",
            ParsedAttribute::Fmtp(_) => "fmtp",
            ParsedAttribute::Mid(_) => "mid",
            ParsedAttribute::Group { .. } => "group",
            ParsedAttribute::Value(name, _) => name,
            ParsedAttribute::Flag(name) => name,
        }
    }
}

impl fmt::Display for ParsedAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedAttribute::RtpMap(rtpmap) => write!(f, "rtpmap:{}", rtpmap),
            ParsedAttribute::Fmtp(fmtp) => write!(f, "fmtp:{}", fmtp),
            ParsedAttribute::Mid(mid) => write!(f, "mid:{}", mid),
            ParsedAttribute::Group { semantics, ids } => {
                write!(f, "group:{}", semantics)?;
                for id in ids {
                    write!(f, " {}", id)?;
                }
                Ok(())
            }
            ParsedAttribute::Value(name, value) => write!(f, "{}:{}", name, value),
            ParsedAttribute::Flag(name) => f.write_str(name),
        }
    }
}

/// Media description (m= line and the lines that follow it)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescription {
    /// Media type token (audio, video, application, ...)
    pub media: String,
    /// Transport port, 0 for a rejected or disabled stream
    pub port: u16,
    /// Optional port count (m=audio 49170/2 ...)
    pub port_count: Option<u16>,
    /// Transport protocol (RTP/AVP, RTP/SAVP, ...)
    pub protocol: String,
    /// Media formats in preference order
    pub formats: Vec<String>,
    /// Media-level connection data
    pub connection_info: Option<ConnectionData>,
    /// Media-level bandwidth lines
    pub bandwidths: Vec<Bandwidth>,
    /// a=ptime
    pub ptime: Option<u32>,
    /// Media-level direction attribute
    pub direction: Option<MediaDirection>,
    /// Remaining attributes in document order
    pub generic_attributes: Vec<ParsedAttribute>,
}

impl MediaDescription {
    /// Bare media line with no formats or attributes
    pub fn new(media: impl Into<String>, port: u16, protocol: impl Into<String>) -> Self {
        Self {
            media: media.into(),
            port,
            port_count: None,
            protocol: protocol.into(),
            formats: Vec::new(),
            connection_info: None,
            bandwidths: Vec::new(),
            ptime: None,
            direction: None,
            generic_attributes: Vec::new(),
        }
    }

    /// Formats that are numeric RTP payload types, in order
    pub fn payload_types(&self) -> impl Iterator<Item = u8> + '_ {
        self.formats.iter().filter_map(|f| f.parse::<u8>().ok())
    }

    /// All rtpmap attributes
    pub fn rtpmaps(&self) -> impl Iterator<Item = &RtpMapAttribute> {
        self.generic_attributes.iter().filter_map(|a| match a {
            ParsedAttribute::RtpMap(rtpmap) => Some(rtpmap),
            _ => None,
        })
    }

    /// The rtpmap for a payload type
    pub fn rtpmap_for(&self, payload_type: u8) -> Option<&RtpMapAttribute> {
        self.rtpmaps().find(|r| r.payload_type == payload_type)
    }

    /// The fmtp for a payload type
    pub fn fmtp_for(&self, payload_type: u8) -> Option<&FmtpAttribute> {
        let format = payload_type.to_string();
        self.generic_attributes.iter().find_map(|a| match a {
            ParsedAttribute::Fmtp(fmtp) if fmtp.format == format => Some(fmtp),
            _ => None,
        })
    }

    /// The a=mid value
    pub fn mid(&self) -> Option<&str> {
        self.generic_attributes.iter().find_map(|a| match a {
            ParsedAttribute::Mid(mid) => Some(mid.as_str()),
            _ => None,
        })
    }

    /// Values of every `a=<name>:<value>` attribute with this name
    pub fn values_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.generic_attributes.iter().filter_map(move |a| match a {
            ParsedAttribute::Value(n, v) if n == name => Some(v.as_str()),
            _ => None,
        })
    }

    /// Value of a bandwidth modifier
    pub fn bandwidth(&self, bw_type: &str) -> Option<u64> {
        self.bandwidths
            .iter()
            .find(|b| b.bw_type.eq_ignore_ascii_case(bw_type))
            .map(|b| b.value)
    }

    /// Append an attribute
    pub fn push_attribute(&mut self, attribute: ParsedAttribute) {
        self.generic_attributes.push(attribute);
    }

    /// Remove every attribute with this name, returning how many were removed
    pub fn remove_attributes(&mut self, name: &str) -> usize {
        let before = self.generic_attributes.len();
        self.generic_attributes.retain(|a| a.name() != name);
        before - self.generic_attributes.len()
    }
}

impl fmt::Display for MediaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m={} {}", self.media, self.port)?;
        if let Some(count) = self.port_count {
            write!(f, "/{}", count)?;
        }
        write!(f, " {}", self.protocol)?;
        for format in &self.formats {
            write!(f, " {}", format)?;
        }
        f.write_str("\r\n")?;
        if let Some(conn) = &self.connection_info {
            write!(f, "c={}\r\n", conn)?;
        }
        for bw in &self.bandwidths {
            write!(f, "b={}\r\n", bw)?;
        }
        for attr in &self.generic_attributes {
            write!(f, "a={}\r\n", attr)?;
        }
        if let Some(ptime) = self.ptime {
            write!(f, "a=ptime:{}\r\n", ptime)?;
        }
        if let Some(direction) = self.direction {
            write!(f, "a={}\r\n", direction)?;
        }
        Ok(())
    }
}

/// A complete session description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Protocol version (v=)
    pub version: String,
    /// Origin (o=)
    pub origin: Origin,
    /// Session name (s=)
    pub session_name: String,
    /// Session-level connection data
    pub connection_info: Option<ConnectionData>,
    /// Session-level bandwidth lines
    pub bandwidths: Vec<Bandwidth>,
    /// Timing lines
    pub time_descriptions: Vec<TimeDescription>,
    /// Session-level direction attribute
    pub direction: Option<MediaDirection>,
    /// Remaining session-level attributes
    pub generic_attributes: Vec<ParsedAttribute>,
    /// Media descriptions in level order
    pub media_descriptions: Vec<MediaDescription>,
}

impl SessionDescription {
    /// Create a session with the mandatory lines and no media
    pub fn new(origin: Origin, session_name: impl Into<String>) -> Self {
        Self {
            version: "0".to_string(),
            origin,
            session_name: session_name.into(),
            connection_info: None,
            bandwidths: Vec::new(),
            time_descriptions: vec![TimeDescription::unbounded()],
            direction: None,
            generic_attributes: Vec::new(),
            media_descriptions: Vec::new(),
        }
    }

    /// Number of m= lines
    pub fn num_media_lines(&self) -> usize {
        self.media_descriptions.len()
    }

    /// Media description at a 1-based level
    pub fn media(&self, level: u16) -> Option<&MediaDescription> {
        let index = usize::from(level).checked_sub(1)?;
        self.media_descriptions.get(index)
    }

    /// Mutable media description at a 1-based level
    pub fn media_mut(&mut self, level: u16) -> Option<&mut MediaDescription> {
        let index = usize::from(level).checked_sub(1)?;
        self.media_descriptions.get_mut(index)
    }

    /// Replace the media line at `level`, or append it when `level` is one
    /// past the last line
    pub fn replace_media(&mut self, level: u16, media: MediaDescription) -> Result<()> {
        let count = self.media_descriptions.len();
        match usize::from(level) {
            0 => Err(SdpError::NoSuchLevel { level, count }),
            l if l <= count => {
                self.media_descriptions[l - 1] = media;
                Ok(())
            }
            l if l == count + 1 => {
                self.media_descriptions.push(media);
                Ok(())
            }
            _ => Err(SdpError::NoSuchLevel { level, count }),
        }
    }

    /// Set the port of the media line at `level`
    pub fn set_port(&mut self, level: u16, port: u16) -> Result<()> {
        let count = self.media_descriptions.len();
        let media = self.media_mut(level).ok_or(SdpError::NoSuchLevel { level, count })?;
        media.port = port;
        Ok(())
    }

    /// Connection data for a level: media-level first, then session-level
    pub fn connection_for(&self, level: u16) -> Option<&ConnectionData> {
        self.media(level)
            .and_then(|m| m.connection_info.as_ref())
            .or(self.connection_info.as_ref())
    }

    /// Session-level groups with the given semantics (case-insensitive)
    pub fn groups<'a>(&'a self, semantics: &'a str) -> impl Iterator<Item = &'a [String]> + 'a {
        self.generic_attributes.iter().filter_map(move |a| match a {
            ParsedAttribute::Group { semantics: s, ids } if s.eq_ignore_ascii_case(semantics) => {
                Some(ids.as_slice())
            }
            _ => None,
        })
    }

    /// Add a session-level group
    pub fn add_group(&mut self, semantics: impl Into<String>, ids: Vec<String>) {
        self.generic_attributes.push(ParsedAttribute::Group {
            semantics: semantics.into(),
            ids,
        });
    }

    /// Serialize to a message body
    pub fn to_bytes(&self) -> bytes::Bytes {
        bytes::Bytes::from(self.to_string())
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v={}\r\n", self.version)?;
        write!(f, "o={}\r\n", self.origin)?;
        write!(f, "s={}\r\n", self.session_name)?;
        if let Some(conn) = &self.connection_info {
            write!(f, "c={}\r\n", conn)?;
        }
        for bw in &self.bandwidths {
            write!(f, "b={}\r\n", bw)?;
        }
        for time in &self.time_descriptions {
            write!(f, "t={}\r\n", time)?;
        }
        for attr in &self.generic_attributes {
            write!(f, "a={}\r\n", attr)?;
        }
        if let Some(direction) = self.direction {
            write!(f, "a={}\r\n", direction)?;
        }
        for media in &self.media_descriptions {
            write!(f, "{}", media)?;
        }
        Ok(())
    }
}
