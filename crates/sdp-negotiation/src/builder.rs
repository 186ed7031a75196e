//! Local SDP construction
//!
//! [`LocalSdpBuilder`] writes the outgoing document of a session: the
//! origin and timing lines, one m= line per [`MediaLine`], rejected-stream
//! stubs, ANAT grouping and `a=mid` labels, hold rendering and OPTIONS
//! capability bodies.
//!
//! Media lines are always rewritten whole: rather than patching attributes
//! of an existing m= line, [`LocalSdpBuilder::rebuild_line`] produces a new
//! description from the line state and replaces the old one at its level.

use rand::Rng;
use rvoip_sdp_core::{
    AddrType, ConnectionData, FmtpAttribute, MediaDescription, MediaDirection, Origin,
    ParsedAttribute, RtpMapAttribute, SessionDescription, TimeDescription,
};
use tracing::{trace, warn};

use crate::address::ANAT;
use crate::capability::CapabilityTable;
use crate::codec::{
    local_codecs, Codec, DtmfPolicy, TELEPHONE_EVENT, TELEPHONE_EVENT_CLOCK_RATE,
    TELEPHONE_EVENT_RANGE,
};
use crate::collaborators::Collaborators;
use crate::config::{IpMode, NegotiationConfig};
use crate::media::{MediaLine, DEFAULT_PACKETIZATION_MS};
use crate::transport::initial_transport;
use crate::types::{AddressFamily, MediaType, Transport};

/// Upper bound (exclusive) of the random o= session id
const SESSION_ID_RANGE: u32 = 28457;

/// Writes the local SDP of a session
pub struct LocalSdpBuilder<'a> {
    config: &'a NegotiationConfig,
    collaborators: &'a Collaborators,
}

impl<'a> LocalSdpBuilder<'a> {
    /// Create a builder over a configuration and collaborator set
    pub fn new(config: &'a NegotiationConfig, collaborators: &'a Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    /// A fresh document with origin, session name and `t=0 0`
    pub fn init_local_sdp(&self) -> SessionDescription {
        let session_id = rand::thread_rng().gen_range(0..SESSION_ID_RANGE);
        let (addr_type, fallback) = if self.config.ip_mode.uses_ipv6() {
            (AddrType::Ip6, "::")
        } else {
            (AddrType::Ip4, "0.0.0.0")
        };
        let unicast_address = self
            .config
            .origin_address()
            .map(|a| a.to_string())
            .unwrap_or_else(|| fallback.to_string());

        let origin = Origin {
            username: self.config.username.clone(),
            sess_id: session_id.to_string(),
            sess_version: "0".to_string(),
            net_type: "IN".to_string(),
            addr_type,
            unicast_address,
        };
        SessionDescription::new(origin, self.config.session_name.clone())
    }

    /// Replace the line at `level` with a rejection of a remote m= line
    ///
    /// The stub echoes the remote media type, protocol and first format with
    /// port 0 and an unspecified connection address.
    pub fn reject_line(&self, local: &mut SessionDescription, remote: &MediaDescription, level: u16) {
        let mut media = MediaDescription::new(remote.media.clone(), 0, remote.protocol.clone());
        media.formats = remote.formats.first().cloned().into_iter().collect();
        media.connection_info = Some(ConnectionData::unspecified_ipv4());
        place_media(local, level, media);
        self.set_mid_attr(local, level);
        trace!(level, "local line rejected");
    }

    /// Turn the local line at `level` into an unused stub, keeping its type
    pub fn disable_line(&self, local: &mut SessionDescription, level: u16) {
        if let Some(existing) = local.media(level).cloned() {
            self.reject_line(local, &existing, level);
        }
    }

    /// Rebuild the m= line of a media line
    ///
    /// With `all_formats` every local codec is listed, otherwise only the
    /// negotiated one. `remote` is the offer being answered, if any, and
    /// `pair_level` the level of the line's ANAT partner.
    pub fn rebuild_line(
        &self,
        local: &mut SessionDescription,
        line: &MediaLine,
        all_formats: bool,
        remote: Option<&SessionDescription>,
        pair_level: Option<u16>,
    ) {
        let transport = match line.transport {
            Transport::Invalid => initial_transport(self.config, line.supports_security),
            negotiated => negotiated,
        };
        let mut media =
            MediaDescription::new(line.media_type.as_str(), line.source_port, transport.protocol());
        media.connection_info = line.source_address.map(ConnectionData::for_ip);

        if transport == Transport::Srtp {
            match self.collaborators.crypto.local_crypto(line.ref_id, line.crypto_index) {
                Some(crypto) => media.push_attribute(ParsedAttribute::Value("crypto".to_string(), crypto)),
                None => warn!(level = line.level, ref_id = %line.ref_id, "no local crypto for SRTP line"),
            }
        }

        let ilbc_mode = line.ilbc_mode.unwrap_or(self.config.ilbc_mode);
        if all_formats {
            let (codecs, _) = local_codecs(self.config, line.media_type);
            for codec in codecs {
                self.push_codec(&mut media, codec, codec.payload_number(), ilbc_mode);
            }
            if line.media_type == MediaType::Audio && self.config.dtmf_policy != DtmfPolicy::None {
                push_telephone_event(&mut media, self.config.avt_payload);
            }
        } else {
            if let Some(codec) = line.payload {
                let payload_type = line
                    .remote_dynamic_payload
                    .or(line.local_dynamic_payload)
                    .unwrap_or_else(|| codec.payload_number());
                self.push_codec(&mut media, codec, payload_type, ilbc_mode);
            }
            if let Some(avt) = line.avt_payload {
                push_telephone_event(&mut media, avt);
            }
        }

        if line.media_type == MediaType::Audio && line.packetization_period != DEFAULT_PACKETIZATION_MS {
            media.ptime = Some(line.packetization_period);
        }
        if line.direction_set {
            media.direction = Some(line.direction);
        }

        place_media(local, line.level, media);
        self.set_anat_attr(local, line, remote, pair_level);
        trace!(level = line.level, all_formats, "local line rebuilt");
    }

    fn push_codec(&self, media: &mut MediaDescription, codec: Codec, payload_type: u8, ilbc_mode: u32) {
        media.formats.push(payload_type.to_string());
        media.push_attribute(ParsedAttribute::RtpMap(RtpMapAttribute {
            payload_type,
            encoding_name: codec.encoding_name().to_string(),
            clock_rate: codec.clock_rate(),
            encoding_params: None,
        }));
        match codec {
            Codec::G729 => push_fmtp(media, payload_type, "annexb=no".to_string()),
            Codec::Ilbc => push_fmtp(media, payload_type, format!("mode={}", ilbc_mode)),
            Codec::H263 | Codec::H264 => self.collaborators.video.populate(codec, payload_type, media),
            _ => {}
        }
    }

    /// Label the line at `level` with `a=mid:<level>` in dual mode
    pub fn set_mid_attr(&self, local: &mut SessionDescription, level: u16) {
        if self.config.ip_mode != IpMode::Dual {
            return;
        }
        if let Some(media) = local.media_mut(level) {
            media.remove_attributes("mid");
            media.push_attribute(ParsedAttribute::Mid(level.to_string()));
        }
    }

    fn set_anat_attr(
        &self,
        local: &mut SessionDescription,
        line: &MediaLine,
        remote: Option<&SessionDescription>,
        pair_level: Option<u16>,
    ) {
        let level = line.level.to_string();
        match remote {
            None => {
                if let (Some(AddressFamily::Ipv4), Some(pair)) = (line.address_family, pair_level) {
                    ensure_group(local, vec![pair.to_string(), level]);
                }
            }
            Some(remote) => {
                let mirrored = remote.groups(ANAT).any(|ids| ids.contains(&level));
                if mirrored {
                    let ids = match pair_level {
                        Some(pair) => vec![pair.to_string(), level],
                        None => vec![level],
                    };
                    ensure_group(local, ids);
                }
            }
        }
        self.set_mid_attr(local, line.level);
    }

    /// Write the direction of a line, replacing any previous one
    pub fn set_local_direction(
        &self,
        local: &mut SessionDescription,
        line: &mut MediaLine,
        direction: MediaDirection,
    ) {
        if line.direction_set {
            line.previous.direction = line.direction;
        }
        if let Some(media) = local.media_mut(line.level) {
            media.direction = Some(direction);
        }
        line.direction = direction;
        line.direction_set = true;
        trace!(level = line.level, %direction, "local direction set");
    }

    /// RFC 2543 hold: an unspecified IPv4 connection address
    pub fn set_2543_hold(&self, local: &mut SessionDescription, level: u16) {
        if let Some(media) = local.media_mut(level) {
            media.connection_info = Some(ConnectionData::unspecified_ipv4());
        }
    }

    /// Capability body for an OPTIONS response
    pub fn options_sdp(&self, table: &CapabilityTable) -> SessionDescription {
        let mut sdp = self.init_local_sdp();
        for media_type in [MediaType::Audio, MediaType::Video] {
            let Some((_, entry)) = table
                .iter()
                .find(|(_, e)| e.media_type == media_type && (e.enabled || media_type == MediaType::Audio))
            else {
                continue;
            };
            let transport = initial_transport(self.config, entry.supports_security);
            let mut media = MediaDescription::new(media_type.as_str(), 0, transport.protocol());
            let (codecs, _) = local_codecs(self.config, media_type);
            for codec in codecs {
                self.push_codec(&mut media, codec, codec.payload_number(), self.config.ilbc_mode);
            }
            if media_type == MediaType::Audio && self.config.dtmf_policy != DtmfPolicy::None {
                push_telephone_event(&mut media, self.config.avt_payload);
            }
            sdp.media_descriptions.push(media);
        }
        sdp
    }
}

/// Copy the remote timing into the local document
///
/// Answers to an initial offer mirror the offer's `t=` line. Later offers
/// are mirrored too unless their timing is not numeric, which resets the
/// local line to `0 0`.
pub fn update_time_stamp(
    local: &mut SessionDescription,
    remote: &SessionDescription,
    is_offer: bool,
    is_initial_offer: bool,
) {
    let remote_time = remote.time_descriptions.first();
    if is_initial_offer {
        if let Some(time) = remote_time {
            local.time_descriptions = vec![time.clone()];
        }
    } else if is_offer {
        local.time_descriptions = match remote_time {
            Some(time) if time.is_valid() => vec![time.clone()],
            _ => vec![TimeDescription::unbounded()],
        };
    }
}

/// Set port 0 on every local line after the first `count`
pub fn zero_ports_beyond(local: &mut SessionDescription, count: usize) {
    for media in local.media_descriptions.iter_mut().skip(count) {
        media.port = 0;
    }
}

/// Drop the local ANAT groups that name `level`
pub fn remove_anat_level(local: &mut SessionDescription, level: u16) {
    let id = level.to_string();
    local.generic_attributes.retain(|a| match a {
        ParsedAttribute::Group { semantics, ids } if semantics.eq_ignore_ascii_case(ANAT) => !ids.contains(&id),
        _ => true,
    });
}

fn push_fmtp(media: &mut MediaDescription, payload_type: u8, parameters: String) {
    media.push_attribute(ParsedAttribute::Fmtp(FmtpAttribute {
        format: payload_type.to_string(),
        parameters,
    }));
}

fn push_telephone_event(media: &mut MediaDescription, payload_type: u8) {
    media.formats.push(payload_type.to_string());
    media.push_attribute(ParsedAttribute::RtpMap(RtpMapAttribute {
        payload_type,
        encoding_name: TELEPHONE_EVENT.to_string(),
        clock_rate: TELEPHONE_EVENT_CLOCK_RATE,
        encoding_params: None,
    }));
    push_fmtp(media, payload_type, TELEPHONE_EVENT_RANGE.to_string());
}

fn ensure_group(local: &mut SessionDescription, ids: Vec<String>) {
    if !local.groups(ANAT).any(|existing| existing == ids.as_slice()) {
        local.add_group(ANAT, ids);
    }
}

/// Put a media description at `level`, padding any gap with port-0 stubs
fn place_media(local: &mut SessionDescription, level: u16, media: MediaDescription) {
    while local.num_media_lines() + 1 < usize::from(level) {
        let mut stub = MediaDescription::new(media.media.clone(), 0, media.protocol.clone());
        stub.formats = media.formats.first().cloned().into_iter().collect();
        local.media_descriptions.push(stub);
    }
    if let Err(e) = local.replace_media(level, media) {
        warn!(level, error = %e, "cannot place local media line");
    }
}
