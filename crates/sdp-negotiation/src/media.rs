//! Media line state and the per-call registry
//!
//! A [`MediaLine`] records everything negotiated for one m= line of a call:
//! addresses, ports, transport, codec, direction and hold state. The
//! [`MediaLineRegistry`] owns the lines of one session in insertion order
//! and indexes them by level.

use std::collections::HashMap;
use std::net::IpAddr;

use rvoip_sdp_core::MediaDirection;
use tracing::debug;

use crate::codec::Codec;
use crate::collaborators::MediaControl;
use crate::error::{NegotiationError, Result};
use crate::types::{AddressFamily, CapabilityIndex, HoldFlags, MediaRefId, MediaType, Transport};

/// Maximum media lines per call
pub const MAX_MEDIA_LINES: usize = 8;

/// Default packetization period in milliseconds
pub const DEFAULT_PACKETIZATION_MS: u32 = 20;

/// Values of the previous negotiation round
///
/// Used to detect whether a re-negotiation changed anything that requires
/// the media stream to be restarted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousNegotiation {
    pub avt_payload: Option<u8>,
    pub payload: Option<Codec>,
    pub local_payload: Option<u8>,
    pub packetization_period: u32,
    pub direction: MediaDirection,
    pub dest_address: Option<IpAddr>,
    pub dest_port: u16,
    pub tias_bandwidth: Option<u64>,
    pub profile_level: Option<u32>,
    pub crypto_changed: bool,
}

impl Default for PreviousNegotiation {
    fn default() -> Self {
        Self {
            avt_payload: None,
            payload: None,
            local_payload: None,
            packetization_period: DEFAULT_PACKETIZATION_MS,
            direction: MediaDirection::Inactive,
            dest_address: None,
            dest_port: 0,
            tias_bandwidth: None,
            profile_level: None,
            crypto_changed: false,
        }
    }
}

/// One m= line bound to a call
#[derive(Debug, Clone, PartialEq)]
pub struct MediaLine {
    /// Engine-unique handle
    pub ref_id: MediaRefId,
    /// 1-based m= line position
    pub level: u16,
    /// Media type, fixed at creation
    pub media_type: MediaType,
    /// Capability table entry the line is bound to
    pub cap_index: Option<CapabilityIndex>,
    /// Family negotiated for the line
    pub address_family: Option<AddressFamily>,
    pub source_address: Option<IpAddr>,
    pub source_port: u16,
    pub dest_address: Option<IpAddr>,
    pub dest_port: u16,
    pub transport: Transport,
    /// Remote crypto attribute selected for SRTP
    pub crypto_index: Option<u32>,
    /// Direction currently written in the local SDP
    pub direction: MediaDirection,
    /// Direction the capability entry allows
    pub support_direction: MediaDirection,
    /// Whether a direction attribute is written for the line
    pub direction_set: bool,
    pub payload: Option<Codec>,
    pub local_dynamic_payload: Option<u8>,
    pub remote_dynamic_payload: Option<u8>,
    pub avt_payload: Option<u8>,
    pub packetization_period: u32,
    pub ilbc_mode: Option<u32>,
    pub video_profile_level: Option<u32>,
    pub tias_bandwidth: Option<u64>,
    pub is_multicast: bool,
    pub multicast_port: u16,
    pub hold: HoldFlags,
    pub supports_security: bool,
    /// Set by call control while media is received
    pub receive_channel_open: bool,
    /// Set by call control while media is sent
    pub transmit_channel_open: bool,
    pub previous: PreviousNegotiation,
}

impl MediaLine {
    /// Create a default-initialized line
    pub fn new(ref_id: MediaRefId, media_type: MediaType, level: u16) -> Self {
        Self {
            ref_id,
            level,
            media_type,
            cap_index: None,
            address_family: None,
            source_address: None,
            source_port: 0,
            dest_address: None,
            dest_port: 0,
            transport: Transport::Invalid,
            crypto_index: None,
            direction: MediaDirection::Inactive,
            support_direction: MediaDirection::Inactive,
            direction_set: false,
            payload: None,
            local_dynamic_payload: None,
            remote_dynamic_payload: None,
            avt_payload: None,
            packetization_period: DEFAULT_PACKETIZATION_MS,
            ilbc_mode: None,
            video_profile_level: None,
            tias_bandwidth: None,
            is_multicast: false,
            multicast_port: 0,
            hold: HoldFlags::NONE,
            supports_security: false,
            receive_channel_open: false,
            transmit_channel_open: false,
            previous: PreviousNegotiation::default(),
        }
    }

    /// Whether the local side holds the line
    pub fn is_locally_held(&self) -> bool {
        self.hold.contains(HoldFlags::LOCAL)
    }
}

/// The media lines of one call
#[derive(Debug, Default)]
pub struct MediaLineRegistry {
    lines: Vec<MediaLine>,
    by_level: HashMap<u16, usize>,
}

impl MediaLineRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// No line registered
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &MediaLine> {
        self.lines.iter()
    }

    /// Mutable lines in insertion order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MediaLine> {
        self.lines.iter_mut()
    }

    /// Levels in insertion order
    pub fn levels(&self) -> Vec<u16> {
        self.lines.iter().map(|l| l.level).collect()
    }

    /// Add a line at `level`
    pub fn add_line(
        &mut self,
        media_type: MediaType,
        level: u16,
        ref_id: MediaRefId,
    ) -> Result<&mut MediaLine> {
        if self.lines.len() >= MAX_MEDIA_LINES {
            return Err(NegotiationError::TooManyLines { max: MAX_MEDIA_LINES });
        }
        if self.by_level.contains_key(&level) {
            return Err(NegotiationError::LevelInUse { level });
        }
        debug!(level, %ref_id, %media_type, "media line added");
        let slot = self.lines.len();
        self.lines.push(MediaLine::new(ref_id, media_type, level));
        self.by_level.insert(level, slot);
        Ok(&mut self.lines[slot])
    }

    /// Line at a level
    pub fn find_by_level(&self, level: u16) -> Option<&MediaLine> {
        self.by_level.get(&level).map(|slot| &self.lines[*slot])
    }

    /// Mutable line at a level
    pub fn find_by_level_mut(&mut self, level: u16) -> Option<&mut MediaLine> {
        match self.by_level.get(&level) {
            Some(slot) => self.lines.get_mut(*slot),
            None => None,
        }
    }

    /// Line with a handle
    pub fn find_by_ref_id(&self, ref_id: MediaRefId) -> Option<&MediaLine> {
        self.lines.iter().find(|l| l.ref_id == ref_id)
    }

    /// First line bound to a capability entry
    pub fn find_by_cap_index(&self, cap_index: CapabilityIndex) -> Option<&MediaLine> {
        self.lines.iter().find(|l| l.cap_index == Some(cap_index))
    }

    /// First audio line
    pub fn first_audio(&self) -> Option<&MediaLine> {
        self.lines.iter().find(|l| l.media_type == MediaType::Audio)
    }

    /// The other line of an ANAT pair: a different line bound to the same
    /// capability entry
    pub fn find_anat_pair(&self, level: u16) -> Option<&MediaLine> {
        let cap_index = self.find_by_level(level)?.cap_index?;
        self.lines
            .iter()
            .find(|l| l.level != level && l.cap_index == Some(cap_index))
    }

    /// Remove the line at `level`
    ///
    /// Running media is stopped first, then a held port is returned.
    pub fn remove(&mut self, level: u16, media: &dyn MediaControl) -> Option<MediaLine> {
        let slot = self.by_level.remove(&level)?;
        let line = self.lines.remove(slot);
        self.reindex();

        if line.receive_channel_open || line.transmit_channel_open {
            media.stop_media(line.ref_id);
        }
        if line.source_port != 0 {
            media.release_port(line.cap_index, line.ref_id, line.source_port);
        }
        debug!(level, ref_id = %line.ref_id, "media line removed");
        Some(line)
    }

    /// Remove every line
    pub fn clear(&mut self, media: &dyn MediaControl) {
        for level in self.levels() {
            self.remove(level, media);
        }
    }

    fn reindex(&mut self) {
        self.by_level = self
            .lines
            .iter()
            .enumerate()
            .map(|(slot, line)| (line.level, slot))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MediaControlError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingMedia {
        calls: Mutex<Vec<String>>,
    }

    impl MediaControl for RecordingMedia {
        fn open_receive_port(&self, _t: MediaType, _r: MediaRefId) -> std::result::Result<u16, MediaControlError> {
            Ok(4000)
        }

        fn stop_media(&self, ref_id: MediaRefId) {
            self.calls.lock().push(format!("stop {}", ref_id));
        }

        fn release_port(&self, _c: Option<CapabilityIndex>, ref_id: MediaRefId, port: u16) {
            self.calls.lock().push(format!("release {} {}", ref_id, port));
        }
    }

    #[test]
    fn test_new_line_defaults() {
        let line = MediaLine::new(MediaRefId(3), MediaType::Audio, 1);
        assert_eq!(line.payload, None);
        assert_eq!(line.direction, MediaDirection::Inactive);
        assert_eq!(line.transport, Transport::Invalid);
        assert_eq!(line.hold, HoldFlags::NONE);
        assert_eq!(line.cap_index, None);
        assert_eq!(line.packetization_period, 20);
        assert_eq!(line.previous, PreviousNegotiation::default());
    }

    #[test]
    fn test_add_and_lookup() {
        let mut registry = MediaLineRegistry::new();
        registry.add_line(MediaType::Audio, 1, MediaRefId(1)).unwrap().cap_index = Some(CapabilityIndex(0));
        registry.add_line(MediaType::Video, 2, MediaRefId(2)).unwrap();
        registry.add_line(MediaType::Audio, 3, MediaRefId(3)).unwrap().cap_index = Some(CapabilityIndex(0));

        assert_eq!(registry.find_by_level(2).unwrap().media_type, MediaType::Video);
        assert_eq!(registry.find_by_ref_id(MediaRefId(3)).unwrap().level, 3);
        assert_eq!(registry.find_by_cap_index(CapabilityIndex(0)).unwrap().level, 1);
        assert_eq!(registry.first_audio().unwrap().level, 1);
        assert_eq!(registry.find_anat_pair(1).unwrap().level, 3);
        assert_eq!(registry.find_anat_pair(3).unwrap().level, 1);
        assert!(registry.find_anat_pair(2).is_none());
        assert!(matches!(
            registry.add_line(MediaType::Audio, 3, MediaRefId(4)),
            Err(NegotiationError::LevelInUse { level: 3 })
        ));
    }

    #[test]
    fn test_line_limit() {
        let mut registry = MediaLineRegistry::new();
        for level in 1..=8u16 {
            registry.add_line(MediaType::Audio, level, MediaRefId(level as u32)).unwrap();
        }
        assert!(matches!(
            registry.add_line(MediaType::Audio, 9, MediaRefId(9)),
            Err(NegotiationError::TooManyLines { max: 8 })
        ));
    }

    #[test]
    fn test_remove_stops_media_then_releases_port() {
        let media = RecordingMedia::default();
        let mut registry = MediaLineRegistry::new();
        let line = registry.add_line(MediaType::Audio, 1, MediaRefId(7)).unwrap();
        line.source_port = 4000;
        line.receive_channel_open = true;
        registry.add_line(MediaType::Video, 2, MediaRefId(8)).unwrap();

        let removed = registry.remove(1, &media).unwrap();
        assert_eq!(removed.ref_id, MediaRefId(7));
        assert_eq!(*media.calls.lock(), vec!["stop 7".to_string(), "release 7 4000".to_string()]);
        assert_eq!(registry.find_by_level(2).unwrap().ref_id, MediaRefId(8));
        assert!(registry.remove(1, &media).is_none());

        registry.clear(&media);
        assert!(registry.is_empty());
        assert_eq!(media.calls.lock().len(), 2, "line without port or channels needs no calls");
    }
}
