//! SDP parsing
//!
//! [`parse_sdp`] turns a message body into a [`SessionDescription`]. Lines
//! before the first `m=` are session-level; every line after an `m=` line
//! belongs to that media description until the next one.

pub mod attributes;
pub mod line_parser;
pub mod media;
pub mod origin;
pub mod session;
pub mod validation;

use std::str::FromStr;

use tracing::trace;

use crate::error::{Result, SdpError};
use crate::types::{MediaDescription, ParsedAttribute, SessionDescription};

pub use attributes::{parse_attribute_line, AttributeLine};
pub use line_parser::{parse_bandwidth_line, parse_sdp_line, parse_sdp_lines};
pub use media::parse_media_description_line;
pub use origin::parse_origin_line;
pub use session::{parse_bandwidth, parse_connection_line, parse_time_line};

/// Parse an SDP body
///
/// `v=`, `o=` and `s=` are mandatory. A missing `t=` line is tolerated and
/// yields an empty timing list.
pub fn parse_sdp(input: &str) -> Result<SessionDescription> {
    let lines = parse_sdp_lines(input).map_err(SdpError::SdpParsingError)?;

    let mut version = None;
    let mut origin = None;
    let mut session_name = None;
    let mut current_media: Option<MediaDescription> = None;
    let mut media_descriptions = Vec::new();

    // Session-level fields are collected before the session struct exists
    let mut connection_info = None;
    let mut bandwidths = Vec::new();
    let mut time_descriptions = Vec::new();
    let mut direction = None;
    let mut generic_attributes = Vec::new();

    for (key, value) in lines {
        if let Some(media) = current_media.as_mut() {
            match key {
                'm' => {
                    media_descriptions.extend(current_media.take());
                    current_media = Some(parse_media_description_line(value)?);
                }
                'c' => media.connection_info = Some(parse_connection_line(value)?),
                'b' => media.bandwidths.push(parse_bandwidth(value)?),
                'a' => match parse_attribute_line(value) {
                    AttributeLine::Direction(d) => media.direction = Some(d),
                    AttributeLine::Ptime(p) => media.ptime = Some(p),
                    AttributeLine::Other(attr) => media.generic_attributes.push(attr),
                },
                other => trace!(line_type = %other, "skipping media-level line"),
            }
            continue;
        }

        match key {
            'v' => version = Some(value.to_string()),
            'o' => origin = Some(parse_origin_line(value)?),
            's' => session_name = Some(value.to_string()),
            'c' => connection_info = Some(parse_connection_line(value)?),
            'b' => bandwidths.push(parse_bandwidth(value)?),
            't' => time_descriptions.push(parse_time_line(value)?),
            'a' => match parse_attribute_line(value) {
                AttributeLine::Direction(d) => direction = Some(d),
                AttributeLine::Ptime(p) => {
                    generic_attributes.push(ParsedAttribute::Value(
                        "ptime".to_string(),
                        p.to_string(),
                    ));
                }
                AttributeLine::Other(attr) => generic_attributes.push(attr),
            },
            'm' => current_media = Some(parse_media_description_line(value)?),
            other => trace!(line_type = %other, "skipping session-level line"),
        }
    }
    media_descriptions.extend(current_media.take());

    let version = version.ok_or(SdpError::MissingField("v="))?;
    if version != "0" {
        return Err(SdpError::parsing(format!("Unsupported SDP version: {}", version)));
    }
    let origin = origin.ok_or(SdpError::MissingField("o="))?;
    let session_name = session_name.ok_or(SdpError::MissingField("s="))?;

    let mut sdp = SessionDescription::new(origin, session_name);
    sdp.connection_info = connection_info;
    sdp.bandwidths = bandwidths;
    sdp.time_descriptions = time_descriptions;
    sdp.direction = direction;
    sdp.generic_attributes = generic_attributes;
    sdp.media_descriptions = media_descriptions;
    Ok(sdp)
}

impl FromStr for SessionDescription {
    type Err = SdpError;

    fn from_str(s: &str) -> Result<Self> {
        parse_sdp(s)
    }
}

impl SessionDescription {
    /// Parse a raw message body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(body).map_err(|_| SdpError::InvalidUtf8)?;
        parse_sdp(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaDirection;

    const OFFER: &str = "v=0\r\n\
        o=alice 2890844526 2890844526 IN IP4 192.0.2.10\r\n\
        s=-\r\n\
        c=IN IP4 192.0.2.10\r\n\
        t=0 0\r\n\
        a=group:ANAT 1 2\r\n\
        a=sendonly\r\n\
        m=audio 49170 RTP/AVP 0 8 101\r\n\
        a=rtpmap:0 PCMU/8000\r\n\
        a=rtpmap:101 telephone-event/8000\r\n\
        a=fmtp:101 0-15\r\n\
        a=ptime:30\r\n\
        a=mid:1\r\n\
        m=video 51372 RTP/AVP 97\r\n\
        c=IN IP4 192.0.2.11\r\n\
        b=TIAS:384000\r\n\
        a=rtpmap:97 H264/90000\r\n\
        a=recvonly\r\n";

    #[test]
    fn test_parse_complete_offer() {
        let sdp = parse_sdp(OFFER).unwrap();
        assert_eq!(sdp.origin.username, "alice");
        assert_eq!(sdp.direction, Some(MediaDirection::SendOnly));
        assert_eq!(sdp.groups("anat").count(), 1);
        assert_eq!(sdp.num_media_lines(), 2);

        let audio = sdp.media(1).unwrap();
        assert_eq!(audio.ptime, Some(30));
        assert_eq!(audio.direction, None);
        assert_eq!(audio.mid(), Some("1"));
        assert_eq!(audio.rtpmap_for(101).unwrap().encoding_name, "telephone-event");
        assert_eq!(audio.fmtp_for(101).unwrap().parameters, "0-15");

        let video = sdp.media(2).unwrap();
        assert_eq!(video.direction, Some(MediaDirection::RecvOnly));
        assert_eq!(video.bandwidth("tias"), Some(384000));
        assert_eq!(sdp.connection_for(2).unwrap().connection_address, "192.0.2.11");
        assert_eq!(sdp.connection_for(1).unwrap().connection_address, "192.0.2.10");
    }

    #[test]
    fn test_serialize_then_parse_is_stable() {
        let sdp = parse_sdp(OFFER).unwrap();
        let text = sdp.to_string();
        let again: SessionDescription = text.parse().unwrap();
        assert_eq!(sdp, again);
    }

    #[test]
    fn test_missing_mandatory_lines() {
        assert_eq!(parse_sdp("o=- 1 0 IN IP4 1.1.1.1\r\ns=-\r\n"), Err(SdpError::MissingField("v=")));
        assert_eq!(parse_sdp("v=0\r\ns=-\r\n"), Err(SdpError::MissingField("o=")));
        assert!(parse_sdp("v=1\r\no=- 1 0 IN IP4 1.1.1.1\r\ns=-\r\n").is_err());
    }

    #[test]
    fn test_no_media_and_no_timing() {
        let sdp = parse_sdp("v=0\r\no=- 1 0 IN IP4 1.1.1.1\r\ns=-\r\n").unwrap();
        assert_eq!(sdp.num_media_lines(), 0);
        assert!(sdp.time_descriptions.is_empty());
    }

    #[test]
    fn test_invalid_utf8_body() {
        assert_eq!(SessionDescription::parse(&[0x76, 0x3d, 0xff]), Err(SdpError::InvalidUtf8));
    }

    #[test]
    fn test_unknown_attributes_survive() {
        let sdp = parse_sdp("v=0\r\no=- 1 0 IN IP4 1.1.1.1\r\ns=-\r\nt=0 0\r\nm=audio 1 RTP/AVP 0\r\na=rtcp-mux\r\na=x-foo:bar baz\r\n").unwrap();
        let audio = sdp.media(1).unwrap();
        assert_eq!(audio.generic_attributes[0], ParsedAttribute::Flag("rtcp-mux".to_string()));
        assert_eq!(audio.values_of("x-foo").collect::<Vec<_>>(), vec!["bar baz"]);
    }
}
