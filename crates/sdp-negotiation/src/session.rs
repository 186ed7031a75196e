//! Per-call offer/answer negotiation
//!
//! A [`NegotiationSession`] owns the media lines and the local SDP of one
//! call. Call control hands it remote bodies through
//! [`NegotiationSession::negotiate_offer_sdp`] and
//! [`NegotiationSession::negotiate_answer_sdp`] and reads the local SDP back
//! with [`NegotiationSession::encode_sdp_and_update_version`].
//!
//! # Negotiation walk
//!
//! Each remote m= line goes through the same steps, in level order:
//!
//! 1. media type and remote address checks
//! 2. line creation or removal
//! 3. capability assignment
//! 4. address family, transport and codec
//! 5. multicast echo or unicast direction negotiation
//!
//! A line failing any step is rejected on its own: the local SDP gets a
//! port-0 stub at that level and the media line is released. The call only
//! fails when no line at all could be negotiated, when the remote document
//! is malformed, or when its ANAT structure is invalid.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rvoip_sdp_negotiation::{NegotiationConfig, NegotiationEngine, LineStatus};
//!
//! let engine = Arc::new(NegotiationEngine::new(NegotiationConfig::default())?);
//! let mut session = engine.new_session();
//!
//! let offer = "v=0\r\no=- 1 1 IN IP4 192.0.2.1\r\ns=-\r\nc=IN IP4 192.0.2.1\r\nt=0 0\r\n\
//!              m=audio 5004 RTP/AVP 8 0\r\n";
//! let report = session.negotiate_offer_sdp(Some(offer.as_bytes()), true)?;
//! assert_eq!(report.lines[0].status, LineStatus::Negotiated);
//!
//! let answer = session.encode_sdp_and_update_version();
//! assert!(std::str::from_utf8(&answer).unwrap().contains("m=audio"));
//! # Ok::<(), rvoip_sdp_negotiation::NegotiationError>(())
//! ```

use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;
use rvoip_sdp_core::{ConnectionData, MediaDirection, SessionDescription};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::address::{
    anat_partner_level, decide_address_family, is_multicast, resolve_remote_address,
    validate_anat, validate_mid, AddressDecision,
};
use crate::builder::{remove_anat_level, update_time_stamp, zero_ports_beyond};
use crate::capability::{
    derive_session_capability, find_best_match, CapabilityTable, MatchRequest,
    MediaCapabilityEntry, VideoPolicy,
};
use crate::codec::{negotiate_codec, Codec};
use crate::direction::{negotiate_direction, remote_direction};
use crate::engine::NegotiationEngine;
use crate::error::{NegotiationError, Result};
use crate::media::{MediaLine, MediaLineRegistry};
use crate::transport::{commit_transport, initial_transport, negotiate_transport};
use crate::types::{AddressFamily, CapabilityIndex, HoldFlags, MediaRefId, MediaType, Transport};

/// Why a remote m= line was not used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Neither audio nor video
    UnsupportedMediaType,
    /// The connection address did not resolve
    AddressUnresolvable,
    /// An answer carried a line the offer did not have
    RemoteAddedInAnswer,
    /// The per-call line limit was reached
    TooManyLines,
    /// The level already holds a line of another type
    TypeMismatch,
    /// Port 0 removed the line
    Removed,
    /// No capability entry fits the line
    NoCapability,
    /// The address family is not acceptable
    AddressFamily,
    /// No acceptable RTP profile
    Transport,
    /// No common codec
    PayloadMismatch,
    /// Multicast with a direction other than recvonly or inactive
    MulticastDirection,
    /// No receive port could be opened
    PortUnavailable,
}

/// Result for one remote level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum LineStatus {
    /// The line is active
    Negotiated,
    /// A new line offered with port 0
    Unused,
    /// The line was rejected
    Rejected(RejectReason),
}

/// Outcome of one remote m= line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineOutcome {
    pub level: u16,
    /// Media token of the remote line
    pub media: String,
    pub status: LineStatus,
    pub ref_id: Option<MediaRefId>,
    pub codec: Option<Codec>,
    pub direction: Option<MediaDirection>,
}

impl LineOutcome {
    fn new(level: u16, media: &str) -> Self {
        Self {
            level,
            media: media.to_string(),
            status: LineStatus::Unused,
            ref_id: None,
            codec: None,
            direction: None,
        }
    }
}

/// Summary of a negotiation round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NegotiationReport {
    /// One entry per remote level, in level order
    pub lines: Vec<LineOutcome>,
    /// Direction of the last negotiated video line, inactive without one
    pub video_available: MediaDirection,
    /// Set when the remote offered video this call could run with a
    /// different video policy
    pub video_offered: Option<MediaDirection>,
}

impl NegotiationReport {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            video_available: MediaDirection::Inactive,
            video_offered: None,
        }
    }

    /// Outcome of a level
    pub fn outcome(&self, level: u16) -> Option<&LineOutcome> {
        self.lines.iter().find(|l| l.level == level)
    }

    /// Lines that were negotiated
    pub fn negotiated(&self) -> impl Iterator<Item = &LineOutcome> {
        self.lines.iter().filter(|l| l.status == LineStatus::Negotiated)
    }

    fn mark_rejected(&mut self, level: u16, reason: RejectReason) {
        if let Some(outcome) = self.lines.iter_mut().find(|l| l.level == level) {
            outcome.status = LineStatus::Rejected(reason);
            outcome.codec = None;
            outcome.direction = None;
        }
    }
}

type LineResult<T> = std::result::Result<T, LineStatus>;

fn line_at(registry: &mut MediaLineRegistry, level: u16) -> LineResult<&mut MediaLine> {
    registry
        .find_by_level_mut(level)
        .ok_or(LineStatus::Rejected(RejectReason::Removed))
}

fn apply_capability(line: &mut MediaLine, entry: &MediaCapabilityEntry) {
    line.support_direction = entry.support_direction;
    line.direction = entry.support_direction;
    line.supports_security = entry.supports_security;
}

/// Whole-document checks run before any line is touched
fn validate_structure(remote: &SessionDescription) -> Result<()> {
    if remote.num_media_lines() == 0 {
        debug!("remote SDP has no media lines");
        return Err(NegotiationError::NoMedia);
    }
    if !validate_anat(remote) {
        warn!("remote SDP failed ANAT validation");
        return Err(NegotiationError::NoMedia);
    }
    Ok(())
}

/// Negotiation state of one call
#[derive(Debug)]
pub struct NegotiationSession {
    engine: Arc<NegotiationEngine>,
    registry: MediaLineRegistry,
    local: SessionDescription,
    remote: Option<SessionDescription>,
    capability: CapabilityTable,
    video_policy: VideoPolicy,
    src_sdp_version: u32,
    remote_answer_pending: bool,
    video_available: MediaDirection,
    call_on_hold: bool,
}

impl NegotiationSession {
    pub(crate) fn new(engine: Arc<NegotiationEngine>) -> Self {
        let video_policy = VideoPolicy::default();
        let capability = derive_session_capability(&engine.capability_table(), video_policy);
        let local = engine.builder().init_local_sdp();
        Self {
            engine,
            registry: MediaLineRegistry::new(),
            local,
            remote: None,
            capability,
            video_policy,
            src_sdp_version: 0,
            remote_answer_pending: false,
            video_available: MediaDirection::Inactive,
            call_on_hold: false,
        }
    }

    /// The local SDP as currently built
    pub fn local_sdp(&self) -> &SessionDescription {
        &self.local
    }

    /// The last remote SDP negotiated
    pub fn remote_sdp(&self) -> Option<&SessionDescription> {
        self.remote.as_ref()
    }

    /// Media lines of the call
    pub fn media_lines(&self) -> &MediaLineRegistry {
        &self.registry
    }

    /// Media lines of the call, for call control to record channel state
    pub fn media_lines_mut(&mut self) -> &mut MediaLineRegistry {
        &mut self.registry
    }

    /// The per-call capability table
    pub fn capability(&self) -> &CapabilityTable {
        &self.capability
    }

    /// Version the next encoded local SDP will carry
    pub fn src_sdp_version(&self) -> u32 {
        self.src_sdp_version
    }

    /// Whether a local offer went out without a remote answer yet
    pub fn remote_answer_pending(&self) -> bool {
        self.remote_answer_pending
    }

    /// Direction of the last negotiated video line
    pub fn video_available(&self) -> MediaDirection {
        self.video_available
    }

    /// Whether the whole call is locally held
    pub fn is_on_hold(&self) -> bool {
        self.call_on_hold
    }

    /// Negotiate a remote offer, or prepare a local offer when there is none
    ///
    /// Without a body the session builds a fresh offer (`init`) or refreshes
    /// the current one with every local capability, and then waits for the
    /// answer.
    pub fn negotiate_offer_sdp(&mut self, body: Option<&[u8]>, init: bool) -> Result<NegotiationReport> {
        let Some(body) = body else {
            if init {
                self.create_local_sdp()?;
            } else {
                let hold = self.call_on_hold;
                self.update_local_sdp_media_capability(true, hold);
            }
            self.remote_answer_pending = true;
            debug!(init, "local offer prepared, answer pending");
            return Ok(NegotiationReport::new());
        };

        let remote = SessionDescription::parse(body)?;
        validate_structure(&remote)?;
        if init {
            self.reset_call_state();
        }
        self.negotiate_media_lines(remote, true, init)
    }

    /// Negotiate a remote answer to a local offer
    pub fn negotiate_answer_sdp(&mut self, body: Option<&[u8]>) -> Result<NegotiationReport> {
        let body = body.ok_or(NegotiationError::MissingBody)?;
        let remote = SessionDescription::parse(body)?;
        validate_structure(&remote)?;
        self.negotiate_media_lines(remote, false, false)
    }

    fn negotiate_media_lines(
        &mut self,
        remote: SessionDescription,
        is_offer: bool,
        is_initial_offer: bool,
    ) -> Result<NegotiationReport> {
        trace!(state = "refreshing_capability", is_offer, is_initial_offer);
        self.refresh_capability();

        trace!(state = "per_line_negotiation", lines = remote.num_media_lines());
        let engine = Arc::clone(&self.engine);
        let builder = engine.builder();
        let mut report = NegotiationReport::new();
        let mut mid_failure = false;

        for index in 0..remote.num_media_lines() {
            let Ok(level) = u16::try_from(index + 1) else {
                break;
            };
            let Some(remote_media) = remote.media(level) else {
                break;
            };
            let mut outcome = LineOutcome::new(level, &remote_media.media);

            match self.negotiate_line(&remote, level, is_offer, is_initial_offer, &mut report) {
                Ok((codec, direction)) => {
                    outcome.status = LineStatus::Negotiated;
                    outcome.codec = Some(codec);
                    outcome.direction = Some(direction);
                    outcome.ref_id = self.registry.find_by_level(level).map(|l| l.ref_id);
                    if MediaType::from_sdp(&remote_media.media) == MediaType::Video {
                        report.video_available = direction;
                    }
                }
                Err(status) => {
                    debug!(level, ?status, "remote line not used");
                    outcome.status = status;
                    builder.reject_line(&mut self.local, remote_media, level);
                    self.registry
                        .remove(level, engine.collaborators().media.as_ref());
                }
            }

            if !validate_mid(&remote, &self.local, level) {
                warn!(level, "mid validation failed");
                mid_failure = true;
            }
            report.lines.push(outcome);
        }

        trace!(state = "aggregating");
        self.remote_answer_pending = false;
        self.video_available = report.video_available;

        let negotiated = report.negotiated().count();
        let result = if negotiated == 0 {
            let codec_failure = report
                .lines
                .iter()
                .any(|l| l.status == LineStatus::Rejected(RejectReason::PayloadMismatch));
            if codec_failure {
                Err(NegotiationError::PayloadMismatch)
            } else {
                Err(NegotiationError::NoMedia)
            }
        } else {
            update_time_stamp(&mut self.local, &remote, is_offer, is_initial_offer);
            zero_ports_beyond(&mut self.local, remote.num_media_lines());
            if mid_failure {
                Err(NegotiationError::NoMedia)
            } else {
                Ok(report)
            }
        };

        self.remote = Some(remote);
        trace!(state = "done");
        match &result {
            Ok(report) => info!(
                negotiated,
                lines = report.lines.len(),
                video = %report.video_available,
                "negotiation succeeded"
            ),
            Err(e) => info!(error = %e, "negotiation failed"),
        }
        result
    }

    /// Negotiate one remote level, returning the codec and direction used
    fn negotiate_line(
        &mut self,
        remote: &SessionDescription,
        level: u16,
        is_offer: bool,
        is_initial_offer: bool,
        report: &mut NegotiationReport,
    ) -> LineResult<(Codec, MediaDirection)> {
        let engine = Arc::clone(&self.engine);
        let config = engine.config();
        let collaborators = engine.collaborators();
        let builder = engine.builder();
        let remote_media = remote
            .media(level)
            .ok_or(LineStatus::Rejected(RejectReason::UnsupportedMediaType))?;
        let media_type = MediaType::from_sdp(&remote_media.media);
        let port = remote_media.port;

        if media_type == MediaType::Invalid {
            return Err(LineStatus::Rejected(RejectReason::UnsupportedMediaType));
        }

        let dest = resolve_remote_address(remote, level, collaborators.resolver.as_ref())
            .ok_or(LineStatus::Rejected(RejectReason::AddressUnresolvable))?;

        match self.registry.find_by_level(level).map(|l| (l.media_type, l.source_port)) {
            None => {
                if port == 0 {
                    return Err(LineStatus::Unused);
                }
                if !is_offer {
                    warn!(level, "remote tried to add a media line in an answer");
                    return Err(LineStatus::Rejected(RejectReason::RemoteAddedInAnswer));
                }
                let ref_id = engine.next_ref_id();
                let held = self.call_on_hold;
                match self.registry.add_line(media_type, level, ref_id) {
                    Ok(line) => {
                        if held {
                            line.hold.insert(HoldFlags::LOCAL);
                        }
                    }
                    Err(e) => {
                        warn!(level, error = %e, "cannot add media line");
                        return Err(LineStatus::Rejected(RejectReason::TooManyLines));
                    }
                }
            }
            Some((existing, _)) if existing != media_type => {
                warn!(level, %existing, remote = %media_type, "media type changed at level");
                return Err(LineStatus::Rejected(RejectReason::TypeMismatch));
            }
            Some((_, local_port)) => {
                let remove = if is_offer {
                    port == 0
                } else {
                    local_port == 0 || port == 0
                };
                if remove {
                    if !is_offer && local_port == 0 && port != 0 {
                        warn!(level, "remote insists on keeping a removed media line");
                    }
                    return Err(LineStatus::Rejected(RejectReason::Removed));
                }
            }
        }

        let line = line_at(&mut self.registry, level)?;
        line.is_multicast = false;
        line.multicast_port = 0;
        line.previous.dest_address = line.dest_address;
        line.dest_address = Some(dest);

        let unbound = line.cap_index.is_none();

        let remote_dir = remote_direction(remote, level, Some(dest));
        if unbound && !self.assign_capability(remote, level, media_type, remote_dir) {
            if is_offer && media_type == MediaType::Video && remote_dir != MediaDirection::Inactive {
                let global = engine.capability_table();
                let request = MatchRequest {
                    media_type,
                    remote_transport: Transport::from_protocol(&remote_media.protocol),
                    remote_direction: remote_dir,
                    srtp_fallback: config.srtp_fallback,
                };
                if find_best_match(&global, &self.registry, &request).is_some() {
                    debug!(level, direction = %remote_dir, "video offered beyond the call policy");
                    report.video_offered = Some(remote_dir);
                }
            }
            return Err(LineStatus::Rejected(RejectReason::NoCapability));
        }

        // Address family, with ANAT pair eviction
        let family = AddressFamily::of(&dest);
        let pair = self
            .registry
            .find_anat_pair(level)
            .map(|p| (p.level, p.address_family));
        let supports_security = line_at(&mut self.registry, level)?.supports_security;
        match decide_address_family(config.ip_mode, supports_security, family, pair.and_then(|p| p.1)) {
            AddressDecision::Reject => return Err(LineStatus::Rejected(RejectReason::AddressFamily)),
            AddressDecision::AcceptEvictingPair => {
                if let Some((pair_level, _)) = pair {
                    debug!(level, pair_level, "IPv6 line replaces its IPv4 ANAT pair");
                    if let Some(pair_media) = remote.media(pair_level) {
                        builder.reject_line(&mut self.local, pair_media, pair_level);
                    }
                    remove_anat_level(&mut self.local, pair_level);
                    self.registry.remove(pair_level, collaborators.media.as_ref());
                    report.mark_rejected(pair_level, RejectReason::AddressFamily);
                }
            }
            AddressDecision::Accept => {}
        }
        let pair_level = self.registry.find_anat_pair(level).map(|p| p.level);

        let line = line_at(&mut self.registry, level)?;
        line.address_family = Some(family);
        line.source_address = config.local_address(family);

        let selection = negotiate_transport(remote_media, line, config.srtp_fallback, collaborators.crypto.as_ref());
        if selection.transport == Transport::Invalid {
            return Err(LineStatus::Rejected(RejectReason::Transport));
        }

        let codec = negotiate_codec(
            line,
            remote_media,
            is_offer,
            is_initial_offer,
            config,
            collaborators.video.as_ref(),
        )
        .ok_or(LineStatus::Rejected(RejectReason::PayloadMismatch))?;
        commit_transport(line, selection);

        if is_multicast(&dest) {
            line.is_multicast = true;
            line.multicast_port = port;
            let direction = match remote_dir {
                MediaDirection::RecvOnly | MediaDirection::Inactive => {
                    if matches!(line.support_direction, MediaDirection::SendRecv | MediaDirection::RecvOnly) {
                        remote_dir
                    } else {
                        debug!(level, "line cannot receive multicast");
                        MediaDirection::Inactive
                    }
                }
                _ => return Err(LineStatus::Rejected(RejectReason::MulticastDirection)),
            };
            builder.rebuild_line(&mut self.local, line, false, Some(remote), pair_level);
            builder.set_local_direction(&mut self.local, line, direction);
            if let Some(local_media) = self.local.media_mut(level) {
                local_media.port = port;
                local_media.connection_info = Some(ConnectionData::for_ip(dest));
            }
            debug!(level, group = %dest, port, "multicast stream echoed");
        } else {
            if line.source_port == 0 {
                match collaborators.media.open_receive_port(media_type, line.ref_id) {
                    Ok(source_port) => {
                        line.source_port = source_port;
                        line.receive_channel_open = false;
                    }
                    Err(e) => {
                        warn!(level, error = %e, "receive port allocation failed");
                        return Err(LineStatus::Rejected(RejectReason::PortUnavailable));
                    }
                }
            }
            let direction = negotiate_direction(remote_dir, line.support_direction, line.is_locally_held());
            if is_offer {
                builder.rebuild_line(&mut self.local, line, false, Some(remote), pair_level);
            }
            if !line.direction_set || line.direction != direction {
                builder.set_local_direction(&mut self.local, line, direction);
            }
        }

        line.previous.dest_port = line.dest_port;
        line.dest_port = port;
        debug!(
            level,
            ref_id = %line.ref_id,
            %codec,
            direction = %line.direction,
            "media line negotiated"
        );
        Ok((codec, line.direction))
    }

    /// Bind an incoming line to a capability entry
    ///
    /// A line whose ANAT partner is already negotiated shares the partner's
    /// entry. Otherwise the best match of the per-call table is used, unless
    /// its support direction is inactive.
    fn assign_capability(
        &mut self,
        remote: &SessionDescription,
        level: u16,
        media_type: MediaType,
        remote_dir: MediaDirection,
    ) -> bool {
        let partner_cap = anat_partner_level(remote, level)
            .and_then(|partner| self.registry.find_by_level(partner))
            .and_then(|partner| partner.cap_index);

        let cap_index = match partner_cap {
            Some(index) => index,
            None => {
                let protocol = remote.media(level).map(|m| m.protocol.as_str()).unwrap_or_default();
                let request = MatchRequest {
                    media_type,
                    remote_transport: Transport::from_protocol(protocol),
                    remote_direction: remote_dir,
                    srtp_fallback: self.engine.config().srtp_fallback,
                };
                match find_best_match(&self.capability, &self.registry, &request) {
                    Some(index) => index,
                    None => {
                        debug!(level, %media_type, "no capability entry fits");
                        return false;
                    }
                }
            }
        };

        let Some(entry) = self.capability.get(cap_index).cloned() else {
            return false;
        };
        let Some(line) = self.registry.find_by_level_mut(level) else {
            return false;
        };
        apply_capability(line, &entry);
        if partner_cap.is_none() && entry.support_direction == MediaDirection::Inactive {
            debug!(level, "capability direction is inactive, not assigned");
            return false;
        }
        line.cap_index = Some(cap_index);
        debug!(level, %cap_index, "capability assigned");
        true
    }

    fn refresh_capability(&mut self) {
        let id = self.engine.capability_id();
        if id != self.capability.id {
            debug!(old = self.capability.id, new = id, "session capability refreshed");
            self.capability = derive_session_capability(&self.engine.capability_table(), self.video_policy);
        }
    }

    /// Build the initial local offer from the per-call capability table
    ///
    /// Every enabled entry gets one line per configured address family:
    /// IPv6 then IPv4 at consecutive levels in dual mode.
    pub fn create_local_sdp(&mut self) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        self.reset_call_state();
        self.capability = derive_session_capability(&engine.capability_table(), self.video_policy);

        let entries: Vec<(CapabilityIndex, MediaCapabilityEntry)> = self
            .capability
            .iter()
            .filter(|(_, e)| e.enabled)
            .map(|(i, e)| (i, e.clone()))
            .collect();

        let mut level = 0u16;
        for (cap_index, entry) in &entries {
            for family in engine.config().ip_mode.families() {
                match self.add_local_line(entry, *cap_index, level + 1, *family) {
                    Ok(true) => level += 1,
                    Ok(false) => {}
                    Err(e) => warn!(level = level + 1, error = %e, "local media line not added"),
                }
            }
        }

        if level == 0 {
            return Err(NegotiationError::NoMediaLines);
        }
        if self.registry.first_audio().is_none() {
            return Err(NegotiationError::NoAudioCapability);
        }
        info!(lines = level, "local offer created");
        Ok(())
    }

    /// Add a locally offered line at `level`
    ///
    /// Returns `false` when the entry's direction leaves nothing to offer.
    fn add_local_line(
        &mut self,
        entry: &MediaCapabilityEntry,
        cap_index: CapabilityIndex,
        level: u16,
        family: AddressFamily,
    ) -> Result<bool> {
        if entry.support_direction == MediaDirection::Inactive {
            debug!(level, %cap_index, "inactive capability not offered");
            return Ok(false);
        }
        let engine = Arc::clone(&self.engine);
        let config = engine.config();
        let media = engine.collaborators().media.as_ref();
        let builder = engine.builder();

        let ref_id = engine.next_ref_id();
        let line = self.registry.add_line(entry.media_type, level, ref_id)?;
        line.cap_index = Some(cap_index);
        apply_capability(line, entry);

        match media.open_receive_port(entry.media_type, ref_id) {
            Ok(port) => line.source_port = port,
            Err(e) => {
                self.registry.remove(level, media);
                return Err(e.into());
            }
        }
        line.address_family = Some(family);
        line.source_address = config.local_address(family);
        line.transport = initial_transport(config, line.supports_security);

        let pair_level = self.registry.find_anat_pair(level).map(|p| p.level);
        let line = self
            .registry
            .find_by_level_mut(level)
            .ok_or(NegotiationError::NoMediaLines)?;
        builder.rebuild_line(&mut self.local, line, true, None, pair_level);
        let direction = line.direction;
        builder.set_local_direction(&mut self.local, line, direction);

        line.previous.avt_payload = line.avt_payload;
        line.previous.direction = line.direction;
        line.previous.packetization_period = line.packetization_period;
        line.previous.payload = line.payload;
        line.previous.local_payload = line.local_dynamic_payload;
        debug!(level, %ref_id, ?family, port = line.source_port, "local media line added");
        Ok(true)
    }

    /// Capability body for an OPTIONS response, from the global table
    pub fn create_options_sdp(&self) -> SessionDescription {
        self.engine.builder().options_sdp(&self.engine.capability_table())
    }

    /// Bring the local SDP in line with configuration and capability changes
    ///
    /// Applies a changed media address override, then, when the global
    /// table changed or `reset` is set, removes lines whose capability was
    /// disabled, propagates support direction changes and adds lines for
    /// newly enabled capabilities. `reset` also rebuilds every line with all
    /// formats and applies `hold` or resume. Returns whether anything
    /// changed.
    pub fn update_local_sdp_media_capability(&mut self, reset: bool, hold: bool) -> bool {
        let mut changed = self.apply_media_address();

        let check = reset || self.engine.capability_id() != self.capability.id;
        if check {
            self.capability = derive_session_capability(&self.engine.capability_table(), self.video_policy);
            changed |= self.remove_disabled_lines();
            changed |= self.propagate_direction_changes(reset);
        }
        if reset {
            for level in self.registry.levels() {
                self.reset_line(level, hold);
            }
        }
        if check {
            changed |= self.add_enabled_lines(hold);
        }
        debug!(reset, hold, changed, "local media capability updated");
        changed
    }

    fn apply_media_address(&mut self) -> bool {
        let Some(addr) = self.engine.config().media_address else {
            return false;
        };
        let media = self.engine.collaborators().media.as_ref();
        let mut changed = false;
        for line in self.registry.iter_mut() {
            let Some(current) = line.source_address else {
                continue;
            };
            if current == addr || AddressFamily::of(&current) != AddressFamily::of(&addr) {
                continue;
            }
            warn!(level = line.level, old = %current, new = %addr, "media address changed");
            media.stop_media(line.ref_id);
            line.source_address = Some(addr);
            if let Some(local_media) = self.local.media_mut(line.level) {
                local_media.connection_info = Some(ConnectionData::for_ip(addr));
            }
            changed = true;
        }
        changed
    }

    fn remove_disabled_lines(&mut self) -> bool {
        let disabled: Vec<u16> = self
            .registry
            .iter()
            .filter(|l| {
                l.cap_index
                    .and_then(|i| self.capability.get(i))
                    .is_some_and(|e| !e.enabled)
            })
            .map(|l| l.level)
            .collect();

        let engine = Arc::clone(&self.engine);
        let builder = engine.builder();
        for level in &disabled {
            debug!(level, "capability disabled, removing line");
            builder.disable_line(&mut self.local, *level);
            self.registry.remove(*level, engine.collaborators().media.as_ref());
        }
        !disabled.is_empty()
    }

    fn propagate_direction_changes(&mut self, no_sdp_update: bool) -> bool {
        let engine = Arc::clone(&self.engine);
        let builder = engine.builder();
        let mut changed = false;
        for line in self.registry.iter_mut() {
            let Some(entry) = line.cap_index.and_then(|i| self.capability.get(i)) else {
                continue;
            };
            if line.support_direction == entry.support_direction {
                continue;
            }
            debug!(
                level = line.level,
                from = %line.support_direction,
                to = %entry.support_direction,
                "support direction changed"
            );
            line.support_direction = entry.support_direction;
            if no_sdp_update {
                line.direction = entry.support_direction;
            } else {
                let direction = line.support_direction;
                builder.set_local_direction(&mut self.local, line, direction);
            }
            changed = true;
        }
        changed
    }

    fn reset_line(&mut self, level: u16, hold: bool) {
        let engine = Arc::clone(&self.engine);
        let config = engine.config();
        let builder = engine.builder();
        let pair_level = self.registry.find_anat_pair(level).map(|p| p.level);
        let Some(line) = self.registry.find_by_level_mut(level) else {
            return;
        };
        if line.source_port == 0 {
            return;
        }
        line.transport = initial_transport(config, line.supports_security);
        line.crypto_index = None;
        builder.rebuild_line(&mut self.local, line, true, None, pair_level);
        if hold {
            self.set_local_hold_sdp(Some(level));
        } else {
            self.set_local_resume_sdp(Some(level));
        }
    }

    fn add_enabled_lines(&mut self, hold: bool) -> bool {
        let engine = Arc::clone(&self.engine);
        let unbound: Vec<(CapabilityIndex, MediaCapabilityEntry)> = self
            .capability
            .iter()
            .filter(|(i, e)| e.enabled && self.registry.find_by_cap_index(*i).is_none())
            .map(|(i, e)| (i, e.clone()))
            .collect();

        let mut added = false;
        for (cap_index, entry) in unbound {
            for family in engine.config().ip_mode.families() {
                let level = self.unused_level(entry.media_type);
                match self.add_local_line(&entry, cap_index, level, *family) {
                    Ok(true) => {
                        if hold {
                            self.set_local_hold_sdp(Some(level));
                        }
                        added = true;
                    }
                    Ok(false) => {}
                    Err(e) => warn!(level, error = %e, "unable to add a new media line"),
                }
            }
        }
        added
    }

    /// A port-0 local m= line of this type that no media line owns, else the
    /// level after the last line
    fn unused_level(&self, media_type: MediaType) -> u16 {
        let reusable = self
            .local
            .media_descriptions
            .iter()
            .enumerate()
            .filter_map(|(i, m)| u16::try_from(i + 1).ok().map(|level| (level, m)))
            .find(|(level, m)| {
                m.port == 0
                    && MediaType::from_sdp(&m.media) == media_type
                    && self.registry.find_by_level(*level).is_none()
            })
            .map(|(level, _)| level);
        reusable.unwrap_or_else(|| u16::try_from(self.local.num_media_lines() + 1).unwrap_or(u16::MAX))
    }

    /// Put one line, or every line, on hold
    ///
    /// With RFC 2543 hold configured the connection address becomes
    /// `0.0.0.0` and the line inactive. Otherwise a sending line becomes
    /// sendonly and any other line inactive.
    pub fn set_local_hold_sdp(&mut self, level: Option<u16>) {
        let engine = Arc::clone(&self.engine);
        let builder = engine.builder();
        let rfc2543 = engine.config().rfc2543_hold;
        if level.is_none() {
            self.call_on_hold = true;
        }
        for l in level.map_or_else(|| self.registry.levels(), |l| vec![l]) {
            let Some(line) = self.registry.find_by_level_mut(l) else {
                continue;
            };
            if line.source_port == 0 {
                continue;
            }
            line.hold.insert(HoldFlags::LOCAL);
            let direction = if rfc2543 {
                builder.set_2543_hold(&mut self.local, l);
                MediaDirection::Inactive
            } else if matches!(line.direction, MediaDirection::SendRecv | MediaDirection::SendOnly) {
                MediaDirection::SendOnly
            } else {
                MediaDirection::Inactive
            };
            builder.set_local_direction(&mut self.local, line, direction);
            debug!(level = l, %direction, rfc2543, "line held");
        }
    }

    /// Resume one line, or every line, with its support direction
    pub fn set_local_resume_sdp(&mut self, level: Option<u16>) {
        let engine = Arc::clone(&self.engine);
        let builder = engine.builder();
        if level.is_none() {
            self.call_on_hold = false;
        }
        for l in level.map_or_else(|| self.registry.levels(), |l| vec![l]) {
            let Some(line) = self.registry.find_by_level_mut(l) else {
                continue;
            };
            if line.source_port == 0 {
                continue;
            }
            line.hold.remove(HoldFlags::LOCAL);
            if !line.is_multicast {
                if let Some(local_media) = self.local.media_mut(l) {
                    local_media.connection_info = line.source_address.map(ConnectionData::for_ip);
                }
            }
            let direction = line.support_direction;
            builder.set_local_direction(&mut self.local, line, direction);
            debug!(level = l, %direction, "line resumed");
        }
    }

    /// Serialize the local SDP for sending
    ///
    /// The o= version is set to the session's counter, which then advances.
    pub fn encode_sdp_and_update_version(&mut self) -> Bytes {
        self.local.origin.sess_version = self.src_sdp_version.to_string();
        let body = self.local.to_bytes();
        trace!(version = self.src_sdp_version, bytes = body.len(), "local SDP encoded");
        self.src_sdp_version = self.src_sdp_version.wrapping_add(1);
        body
    }

    /// Whether the last negotiation changed anything that needs the media
    /// stream of `level` restarted
    ///
    /// With `receive_only` the destination checks are skipped.
    pub fn sdp_differs_from_previous(&self, receive_only: bool, level: u16) -> bool {
        let Some(line) = self.registry.find_by_level(level) else {
            return false;
        };
        let previous = &line.previous;
        if previous.avt_payload != line.avt_payload || previous.payload != line.payload {
            debug!(level, "payload changed");
            return true;
        }
        if previous.local_payload != line.local_dynamic_payload {
            debug!(level, "local dynamic payload changed");
            return true;
        }
        if previous.dest_port != 0 && !receive_only {
            let destination_changed: bool = previous.dest_address != line.dest_address
                || previous.dest_port != line.dest_port;
            if destination_changed
                || previous.tias_bandwidth != line.tias_bandwidth
                || previous.profile_level != line.video_profile_level
            {
                debug!(level, "destination or video parameters changed");
                return true;
            }
        }
        previous.crypto_changed
    }

    /// Change the call's video policy and re-derive its capability table
    pub fn set_video_policy(&mut self, policy: VideoPolicy) {
        self.video_policy = policy;
        self.capability = derive_session_capability(&self.engine.capability_table(), policy);
        debug!(?policy, "video policy set");
    }

    /// Release every media line of the call
    pub fn release(&mut self) {
        self.reset_call_state();
        self.remote = None;
        self.remote_answer_pending = false;
        debug!("session released");
    }

    /// Drop every media line and start from an empty local SDP
    fn reset_call_state(&mut self) {
        let engine = Arc::clone(&self.engine);
        self.registry.clear(engine.collaborators().media.as_ref());
        self.local = engine.builder().init_local_sdp();
        self.src_sdp_version = 0;
        self.video_available = MediaDirection::Inactive;
        self.call_on_hold = false;
    }

    /// Remote address of a negotiated line
    pub fn remote_address(&self, level: u16) -> Option<(IpAddr, u16)> {
        self.registry
            .find_by_level(level)
            .and_then(|l| l.dest_address.map(|a| (a, l.dest_port)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NegotiationConfig;
    use pretty_assertions::assert_eq;

    const OFFER: &str = "v=0\r\no=- 7 1 IN IP4 192.0.2.1\r\ns=-\r\nc=IN IP4 192.0.2.1\r\nt=0 0\r\n\
        m=audio 5004 RTP/AVP 0 101\r\na=rtpmap:101 telephone-event/8000\r\n";

    fn session() -> NegotiationSession {
        let config = NegotiationConfig::new().with_ipv4_address("192.0.2.10".parse().unwrap());
        Arc::new(NegotiationEngine::new(config).unwrap()).new_session()
    }

    #[test]
    fn test_answer_without_body_is_an_error() {
        let mut s = session();
        assert!(matches!(s.negotiate_answer_sdp(None), Err(NegotiationError::MissingBody)));
    }

    #[test]
    fn test_offer_without_body_prepares_local_offer() {
        let mut s = session();
        let report = s.negotiate_offer_sdp(None, true).unwrap();
        assert!(report.lines.is_empty());
        assert!(s.remote_answer_pending());
        assert_eq!(s.local_sdp().num_media_lines(), 2);
        assert_eq!(s.media_lines().len(), 2);
    }

    #[test]
    fn test_offer_negotiation_and_version() {
        let mut s = session();
        let report = s.negotiate_offer_sdp(Some(OFFER.as_bytes()), true).unwrap();
        let outcome = report.outcome(1).unwrap();
        assert_eq!(outcome.status, LineStatus::Negotiated);
        assert_eq!(outcome.codec, Some(Codec::Pcmu));
        assert_eq!(outcome.direction, Some(MediaDirection::SendRecv));
        assert_eq!(s.remote_address(1), Some(("192.0.2.1".parse().unwrap(), 5004)));

        let first = s.encode_sdp_and_update_version();
        let second = s.encode_sdp_and_update_version();
        assert!(std::str::from_utf8(&first).unwrap().contains(" 0 IN IP4 192.0.2.10"));
        assert!(std::str::from_utf8(&second).unwrap().contains(" 1 IN IP4 192.0.2.10"));
        assert_eq!(s.src_sdp_version(), 2);
    }

    #[test]
    fn test_hold_and_resume() {
        let mut s = session();
        s.negotiate_offer_sdp(Some(OFFER.as_bytes()), true).unwrap();
        s.set_local_hold_sdp(None);
        assert!(s.is_on_hold());
        assert_eq!(s.local_sdp().media(1).unwrap().direction, Some(MediaDirection::SendOnly));
        assert!(s.media_lines().find_by_level(1).unwrap().is_locally_held());

        s.set_local_resume_sdp(None);
        assert!(!s.is_on_hold());
        assert_eq!(s.local_sdp().media(1).unwrap().direction, Some(MediaDirection::SendRecv));
    }

    #[test]
    fn test_rfc2543_hold() {
        let config = NegotiationConfig::new().with_rfc2543_hold(true);
        let mut s = Arc::new(NegotiationEngine::new(config).unwrap()).new_session();
        s.negotiate_offer_sdp(Some(OFFER.as_bytes()), true).unwrap();
        s.set_local_hold_sdp(Some(1));
        let media = s.local_sdp().media(1).unwrap();
        assert_eq!(media.direction, Some(MediaDirection::Inactive));
        assert_eq!(media.connection_info, Some(ConnectionData::unspecified_ipv4()));
    }

    #[test]
    fn test_differs_from_previous() {
        let mut s = session();
        s.negotiate_offer_sdp(Some(OFFER.as_bytes()), true).unwrap();
        assert!(s.sdp_differs_from_previous(false, 1), "first round changes the payload");

        s.negotiate_offer_sdp(Some(OFFER.as_bytes()), false).unwrap();
        assert!(!s.sdp_differs_from_previous(false, 1));

        let moved = OFFER.replace("m=audio 5004", "m=audio 6000");
        s.negotiate_offer_sdp(Some(moved.as_bytes()), false).unwrap();
        assert!(s.sdp_differs_from_previous(false, 1));
        assert!(!s.sdp_differs_from_previous(true, 1));
    }

    #[test]
    fn test_capability_update_removes_and_readds_video() {
        let mut s = session();
        s.create_local_sdp().unwrap();
        assert_eq!(s.media_lines().len(), 2);

        s.engine.update_capability_table(|t| t.entries[1].enabled = false);
        assert!(s.update_local_sdp_media_capability(false, false));
        assert_eq!(s.media_lines().len(), 1);
        assert_eq!(s.local_sdp().media(2).unwrap().port, 0);

        s.engine.update_capability_table(|t| t.entries[1].enabled = true);
        assert!(s.update_local_sdp_media_capability(false, false));
        assert_eq!(s.media_lines().len(), 2);
        assert_eq!(s.local_sdp().num_media_lines(), 2, "unused video slot is reused");
        assert_ne!(s.local_sdp().media(2).unwrap().port, 0);
    }

    #[test]
    fn test_release_returns_ports() {
        let mut s = session();
        s.create_local_sdp().unwrap();
        s.release();
        assert!(s.media_lines().is_empty());
    }

    #[test]
    fn test_release_forgets_hold_and_local_sdp() {
        let mut s = session();
        s.negotiate_offer_sdp(Some(OFFER.as_bytes()), true).unwrap();
        s.set_local_hold_sdp(None);
        s.encode_sdp_and_update_version();
        s.release();

        assert!(!s.is_on_hold());
        assert_eq!(s.local_sdp().num_media_lines(), 0);
        assert_eq!(s.src_sdp_version(), 0);
        assert_eq!(s.video_available(), MediaDirection::Inactive);

        s.negotiate_offer_sdp(None, false).unwrap();
        let audio = s.local_sdp().media(1).unwrap();
        assert_eq!(audio.direction, Some(MediaDirection::SendRecv));
    }
}
