//! Codec negotiation
//!
//! Intersects the local codec list with the payload types of a remote m=
//! line. The side whose list drives the outer loop is the *master*: the
//! local list when a preferred codec is configured and available, the
//! remote list otherwise. The first codec present in both lists wins.
//!
//! Payload numbers are resolved the usual RTP/AVP way: numbers below 96 are
//! static assignments; 96-127 are dynamic and are identified through the
//! `a=rtpmap` encoding name. The dynamic number the remote used is kept so
//! it can be echoed back.
//!
//! Telephone events (RFC 4733) are negotiated separately, before the codec
//! scan, according to [`DtmfPolicy`].

use std::fmt;

use rvoip_sdp_core::MediaDescription;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::collaborators::VideoAttributeValidator;
use crate::config::NegotiationConfig;
use crate::media::MediaLine;
use crate::types::MediaType;

/// Encoding name of RFC 4733 telephone events
pub const TELEPHONE_EVENT: &str = "telephone-event";

/// Clock rate of telephone events
pub const TELEPHONE_EVENT_CLOCK_RATE: u32 = 8000;

/// Event range advertised in the telephone-event fmtp
pub const TELEPHONE_EVENT_RANGE: &str = "0-15";

/// Whether a payload number is in the dynamic range
pub fn is_dynamic_payload(payload_type: u8) -> bool {
    (96..=127).contains(&payload_type)
}

/// Codecs the engine negotiates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Codec {
    /// G.711 mu-law
    Pcmu,
    /// G.711 A-law
    Pcma,
    /// G.722
    G722,
    /// G.729
    G729,
    /// iLBC
    Ilbc,
    /// Linear 16-bit PCM
    L16,
    /// iSAC
    Isac,
    /// H.263 (1998 payload format)
    H263,
    /// H.264
    H264,
}

impl Codec {
    /// Media type the codec belongs to
    pub fn media_type(&self) -> MediaType {
        match self {
            Codec::H263 | Codec::H264 => MediaType::Video,
            _ => MediaType::Audio,
        }
    }

    /// rtpmap encoding name
    pub fn encoding_name(&self) -> &'static str {
        match self {
            Codec::Pcmu => "PCMU",
            Codec::Pcma => "PCMA",
            Codec::G722 => "G722",
            Codec::G729 => "G729",
            Codec::Ilbc => "iLBC",
            Codec::L16 => "L16",
            Codec::Isac => "ISAC",
            Codec::H263 => "H263-1998",
            Codec::H264 => "H264",
        }
    }

    /// rtpmap clock rate
    pub fn clock_rate(&self) -> u32 {
        match self {
            Codec::L16 | Codec::Isac => 16000,
            Codec::H263 | Codec::H264 => 90000,
            _ => 8000,
        }
    }

    /// Canonical payload number used when offering the codec
    pub fn payload_number(&self) -> u8 {
        match self {
            Codec::Pcmu => 0,
            Codec::Pcma => 8,
            Codec::G722 => 9,
            Codec::G729 => 18,
            Codec::H263 => 98,
            Codec::Ilbc => 102,
            Codec::Isac => 103,
            Codec::L16 => 104,
            Codec::H264 => 126,
        }
    }

    /// Codec for a static payload number
    pub fn from_static_payload(payload_type: u8) -> Option<Self> {
        match payload_type {
            0 => Some(Codec::Pcmu),
            8 => Some(Codec::Pcma),
            9 => Some(Codec::G722),
            18 => Some(Codec::G729),
            _ => None,
        }
    }

    /// Codec for an rtpmap encoding name (case-insensitive)
    pub fn from_encoding_name(name: &str) -> Option<Self> {
        const ALL: [Codec; 9] = [
            Codec::Pcmu,
            Codec::Pcma,
            Codec::G722,
            Codec::G729,
            Codec::Ilbc,
            Codec::L16,
            Codec::Isac,
            Codec::H263,
            Codec::H264,
        ];
        ALL.into_iter().find(|c| c.encoding_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encoding_name())
    }
}

/// DTMF transport policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtmfPolicy {
    /// No telephone-event payload
    None,
    /// Telephone events only when the remote offers them
    Avt,
    /// Telephone events always, with the local number as fallback
    AvtAlways,
}

/// A remote payload entry resolved to a codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadEntry {
    /// Resolved codec
    pub codec: Codec,
    /// Payload number used by the remote
    pub payload_type: u8,
}

impl PayloadEntry {
    /// Remote number when it is dynamic
    pub fn dynamic(&self) -> Option<u8> {
        is_dynamic_payload(self.payload_type).then_some(self.payload_type)
    }
}

/// Resolve the payload list of a remote m= line, in order
///
/// Only the first `cap` formats are considered. Formats that map to no
/// known codec (telephone events included) are skipped.
pub fn remote_payload_entries(remote: &MediaDescription, cap: usize) -> Vec<PayloadEntry> {
    remote
        .payload_types()
        .take(cap)
        .filter_map(|payload_type| {
            let codec = if is_dynamic_payload(payload_type) {
                remote
                    .rtpmap_for(payload_type)
                    .and_then(|r| Codec::from_encoding_name(&r.encoding_name))
            } else {
                Codec::from_static_payload(payload_type)
            };
            codec.map(|codec| PayloadEntry { codec, payload_type })
        })
        .collect()
}

/// Local codec list for a media type, with the preferred codec first
///
/// The flag tells whether the preferred codec was found in the list.
pub fn local_codecs(config: &NegotiationConfig, media_type: MediaType) -> (Vec<Codec>, bool) {
    let mut codecs = match media_type {
        MediaType::Audio => config.audio_codecs.clone(),
        MediaType::Video => config.video_codecs.clone(),
        MediaType::Invalid => Vec::new(),
    };
    let preferred = config
        .preferred_codec
        .and_then(|p| codecs.iter().position(|c| *c == p));
    if let Some(position) = preferred {
        let codec = codecs.remove(position);
        codecs.insert(0, codec);
    }
    (codecs, preferred.is_some())
}

/// Telephone-event payload number of a remote m= line
///
/// When the remote lists several, the last dynamic one wins.
pub fn remote_avt_payload(remote: &MediaDescription) -> Option<u8> {
    remote
        .rtpmaps()
        .filter(|r| is_dynamic_payload(r.payload_type))
        .filter(|r| r.encoding_name.eq_ignore_ascii_case(TELEPHONE_EVENT))
        .map(|r| r.payload_type)
        .last()
}

/// Decide the telephone-event payload of a line
fn negotiate_avt(line: &mut MediaLine, remote: &MediaDescription, config: &NegotiationConfig) {
    line.previous.avt_payload = line.avt_payload;
    if line.media_type != MediaType::Audio {
        line.avt_payload = None;
        return;
    }
    let remote_avt = remote_avt_payload(remote);
    line.avt_payload = match config.dtmf_policy {
        DtmfPolicy::None => None,
        DtmfPolicy::Avt => remote_avt,
        DtmfPolicy::AvtAlways => remote_avt.or(Some(config.avt_payload)),
    };
}

/// Negotiate the codec of one media line
///
/// On success the line's payload, dynamic numbers and codec parameters are
/// updated and the chosen codec is returned. `None` means no common codec.
pub fn negotiate_codec(
    line: &mut MediaLine,
    remote: &MediaDescription,
    is_offer: bool,
    is_initial_offer: bool,
    config: &NegotiationConfig,
    video: &dyn VideoAttributeValidator,
) -> Option<Codec> {
    negotiate_avt(line, remote, config);
    line.previous.payload = line.payload;
    line.previous.local_payload = line.local_dynamic_payload;
    line.previous.packetization_period = line.packetization_period;
    line.previous.tias_bandwidth = line.tias_bandwidth;
    line.previous.profile_level = line.video_profile_level;

    let remote_entries = remote_payload_entries(remote, config.max_remote_payloads);
    let (local, local_is_master) = local_codecs(config, line.media_type);

    // Candidate remote entries in master-outer, slave-inner order
    let candidates: Vec<&PayloadEntry> = if local_is_master {
        local
            .iter()
            .flat_map(|codec| remote_entries.iter().filter(move |e| e.codec == *codec))
            .collect()
    } else {
        remote_entries
            .iter()
            .filter(|e| local.contains(&e.codec))
            .collect()
    };

    let mut explicit_reject = false;
    for entry in candidates {
        if line.media_type == MediaType::Video {
            match video.check(entry.codec, remote, entry.dynamic()) {
                Some(attributes) => {
                    line.video_profile_level = attributes.profile_level;
                    line.tias_bandwidth = attributes.tias_bandwidth;
                }
                None => {
                    debug!(level = line.level, codec = %entry.codec, "video attributes rejected");
                    explicit_reject = true;
                    continue;
                }
            }
        }

        apply_match(line, entry, remote, is_offer);
        debug!(
            level = line.level,
            ref_id = %line.ref_id,
            codec = %entry.codec,
            remote_payload = entry.payload_type,
            local_master = local_is_master,
            "codec negotiated"
        );
        return Some(entry.codec);
    }

    if !is_initial_offer && !explicit_reject && config.keep_previous_codec_on_empty_match {
        if let Some(previous) = line.previous.payload {
            if let Some(entry) = remote_entries.iter().find(|e| e.codec == previous) {
                debug!(
                    level = line.level,
                    codec = %previous,
                    remote_payload = entry.payload_type,
                    "keeping previous codec"
                );
                apply_match(line, entry, remote, is_offer);
                return Some(previous);
            }
        }
    }

    trace!(level = line.level, "no common codec");
    None
}

fn apply_match(line: &mut MediaLine, entry: &PayloadEntry, remote: &MediaDescription, is_offer: bool) {
    let codec = entry.codec;
    if is_offer {
        line.remote_dynamic_payload = entry.dynamic();
        line.local_dynamic_payload = entry.dynamic();
    } else {
        if line.local_dynamic_payload.is_none() || line.previous.payload != Some(codec) {
            line.local_dynamic_payload = Some(codec.payload_number());
        }
        line.remote_dynamic_payload = entry.dynamic();
    }
    line.payload = Some(codec);

    if line.media_type == MediaType::Audio {
        if let Some(ptime) = remote.ptime.filter(|p| *p != 0) {
            line.packetization_period = ptime;
        }
        if codec == Codec::Ilbc {
            line.ilbc_mode = remote
                .fmtp_for(entry.payload_type)
                .and_then(|f| f.param("mode"))
                .and_then(|m| m.trim().parse().ok());
        }
    }
}
