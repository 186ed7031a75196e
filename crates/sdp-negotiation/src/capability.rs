//! Media capability tables
//!
//! A [`CapabilityTable`] lists the media streams the platform can run, in
//! preference order. The engine keeps a global table; each session works on
//! a copy derived from it with [`derive_session_capability`], narrowed by
//! the session's [`VideoPolicy`].
//!
//! Incoming m= lines are bound to table entries with [`find_best_match`].

use rvoip_sdp_core::MediaDirection;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::media::MediaLineRegistry;
use crate::types::{CapabilityIndex, MediaType, Transport};

/// Index of the audio entry in the default table
pub const CAP_AUDIO: CapabilityIndex = CapabilityIndex(0);

/// Index of the video entry in the default table
pub const CAP_VIDEO: CapabilityIndex = CapabilityIndex(1);

/// One stream the platform can run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaCapabilityEntry {
    pub media_type: MediaType,
    pub enabled: bool,
    pub support_direction: MediaDirection,
    pub supports_security: bool,
}

impl MediaCapabilityEntry {
    /// An enabled sendrecv entry with security support
    pub fn new(media_type: MediaType) -> Self {
        Self {
            media_type,
            enabled: true,
            support_direction: MediaDirection::SendRecv,
            supports_security: true,
        }
    }
}

/// Ordered capability entries with a change identifier
///
/// The identifier changes whenever the global table is replaced, which is
/// how sessions notice they must refresh their copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityTable {
    pub id: u32,
    pub entries: Vec<MediaCapabilityEntry>,
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self {
            id: 1,
            entries: vec![
                MediaCapabilityEntry::new(MediaType::Audio),
                MediaCapabilityEntry::new(MediaType::Video),
            ],
        }
    }
}

impl CapabilityTable {
    /// Entry at an index
    pub fn get(&self, index: CapabilityIndex) -> Option<&MediaCapabilityEntry> {
        self.entries.get(index.0)
    }

    /// Mutable entry at an index
    pub fn get_mut(&mut self, index: CapabilityIndex) -> Option<&mut MediaCapabilityEntry> {
        self.entries.get_mut(index.0)
    }

    /// Entries with their indices
    pub fn iter(&self) -> impl Iterator<Item = (CapabilityIndex, &MediaCapabilityEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (CapabilityIndex(i), e))
    }

    /// Whether any enabled entry has this media type
    pub fn has_enabled(&self, media_type: MediaType) -> bool {
        self.entries
            .iter()
            .any(|e| e.enabled && e.media_type == media_type)
    }
}

/// Per-call video policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoPolicy {
    /// Video as the global table allows
    #[default]
    SendRecv,
    /// Receive video only
    RecvOnly,
    /// Send video only
    SendOnly,
    /// No video
    Disabled,
}

/// Derive a session's capability table from the global one
pub fn derive_session_capability(global: &CapabilityTable, policy: VideoPolicy) -> CapabilityTable {
    let mut table = global.clone();
    for entry in table
        .entries
        .iter_mut()
        .filter(|e| e.media_type == MediaType::Video)
    {
        match policy {
            VideoPolicy::SendRecv => {}
            VideoPolicy::Disabled => entry.enabled = false,
            VideoPolicy::RecvOnly => {
                entry.support_direction = match entry.support_direction {
                    MediaDirection::SendRecv => MediaDirection::RecvOnly,
                    MediaDirection::SendOnly => MediaDirection::Inactive,
                    other => other,
                }
            }
            VideoPolicy::SendOnly => {
                entry.support_direction = match entry.support_direction {
                    MediaDirection::SendRecv => MediaDirection::SendOnly,
                    MediaDirection::RecvOnly => MediaDirection::Inactive,
                    other => other,
                }
            }
        }
    }
    table
}

/// How well a support direction serves a remote direction, lower is better
///
/// A half-direction remote is best served by the exact complement, with
/// sendrecv as the fallback. Any other remote prefers sendrecv.
fn direction_fit(remote: MediaDirection, support: MediaDirection) -> Option<u8> {
    use MediaDirection::*;
    match (remote, support) {
        (RecvOnly, SendOnly) | (SendOnly, RecvOnly) => Some(0),
        (RecvOnly | SendOnly, SendRecv) => Some(1),
        (RecvOnly | SendOnly, _) => None,
        (_, SendRecv) => Some(0),
        _ => Some(1),
    }
}

/// What an incoming line asks of a capability entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRequest {
    pub media_type: MediaType,
    pub remote_transport: Transport,
    pub remote_direction: MediaDirection,
    pub srtp_fallback: bool,
}

/// Pick the capability entry for an incoming line
///
/// Disabled entries, entries of another type and entries already bound to
/// a line are skipped. For an SRTP remote, entries without security support
/// are only usable through fallback. Candidates are ranked by security
/// first and direction fit second; the table order breaks ties.
pub fn find_best_match(
    table: &CapabilityTable,
    registry: &MediaLineRegistry,
    request: &MatchRequest,
) -> Option<CapabilityIndex> {
    let best = table
        .iter()
        .filter(|(_, e)| e.enabled && e.media_type == request.media_type)
        .filter(|(index, _)| registry.find_by_cap_index(*index).is_none())
        .filter_map(|(index, entry)| {
            let security_rank = match request.remote_transport {
                Transport::Srtp if entry.supports_security => 0,
                Transport::Srtp if request.srtp_fallback => 1,
                Transport::Srtp => return None,
                _ => 0,
            };
            let fit = direction_fit(request.remote_direction, entry.support_direction)?;
            Some(((security_rank, fit), index))
        })
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, index)| index);

    trace!(media_type = %request.media_type, ?best, "capability match");
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaRefId;

    fn request(direction: MediaDirection, transport: Transport) -> MatchRequest {
        MatchRequest {
            media_type: MediaType::Audio,
            remote_transport: transport,
            remote_direction: direction,
            srtp_fallback: false,
        }
    }

    fn audio_entry(direction: MediaDirection, security: bool) -> MediaCapabilityEntry {
        MediaCapabilityEntry {
            media_type: MediaType::Audio,
            enabled: true,
            support_direction: direction,
            supports_security: security,
        }
    }

    #[test]
    fn test_default_table() {
        let table = CapabilityTable::default();
        assert_eq!(table.get(CAP_AUDIO).unwrap().media_type, MediaType::Audio);
        assert_eq!(table.get(CAP_VIDEO).unwrap().media_type, MediaType::Video);
        assert!(table.entries.iter().all(|e| e.supports_security && e.enabled));
    }

    #[test]
    fn test_video_policy_narrowing() {
        let global = CapabilityTable::default();
        let table = derive_session_capability(&global, VideoPolicy::RecvOnly);
        assert_eq!(table.get(CAP_VIDEO).unwrap().support_direction, MediaDirection::RecvOnly);
        assert_eq!(table.get(CAP_AUDIO).unwrap().support_direction, MediaDirection::SendRecv);

        let table = derive_session_capability(&global, VideoPolicy::SendOnly);
        assert_eq!(table.get(CAP_VIDEO).unwrap().support_direction, MediaDirection::SendOnly);

        let table = derive_session_capability(&global, VideoPolicy::Disabled);
        assert!(!table.get(CAP_VIDEO).unwrap().enabled);
        assert_eq!(table.id, global.id);

        let mut sendonly = global.clone();
        sendonly.get_mut(CAP_VIDEO).unwrap().support_direction = MediaDirection::SendOnly;
        let table = derive_session_capability(&sendonly, VideoPolicy::RecvOnly);
        assert_eq!(table.get(CAP_VIDEO).unwrap().support_direction, MediaDirection::Inactive);
    }

    #[test]
    fn test_best_match_prefers_exact_direction_then_table_order() {
        let table = CapabilityTable {
            id: 1,
            entries: vec![
                audio_entry(MediaDirection::RecvOnly, true),
                audio_entry(MediaDirection::SendRecv, true),
                audio_entry(MediaDirection::SendOnly, true),
            ],
        };
        let registry = MediaLineRegistry::new();
        let pick = |d| find_best_match(&table, &registry, &request(d, Transport::Rtp));
        assert_eq!(pick(MediaDirection::SendRecv), Some(CapabilityIndex(1)));
        assert_eq!(pick(MediaDirection::Inactive), Some(CapabilityIndex(1)));
        assert_eq!(pick(MediaDirection::RecvOnly), Some(CapabilityIndex(2)));
        assert_eq!(pick(MediaDirection::SendOnly), Some(CapabilityIndex(0)));

        let sendrecv_fallback = CapabilityTable {
            id: 1,
            entries: vec![
                audio_entry(MediaDirection::RecvOnly, true),
                audio_entry(MediaDirection::SendRecv, true),
            ],
        };
        let pick = |d| find_best_match(&sendrecv_fallback, &registry, &request(d, Transport::Rtp));
        assert_eq!(pick(MediaDirection::RecvOnly), Some(CapabilityIndex(1)));
        assert_eq!(pick(MediaDirection::SendOnly), Some(CapabilityIndex(0)));

        let no_sendrecv = CapabilityTable {
            id: 1,
            entries: vec![
                audio_entry(MediaDirection::RecvOnly, true),
                audio_entry(MediaDirection::SendOnly, true),
            ],
        };
        let pick = |d| find_best_match(&no_sendrecv, &registry, &request(d, Transport::Rtp));
        assert_eq!(pick(MediaDirection::RecvOnly), Some(CapabilityIndex(1)));
        assert_eq!(pick(MediaDirection::SendOnly), Some(CapabilityIndex(0)));
        assert_eq!(pick(MediaDirection::Inactive), Some(CapabilityIndex(0)));
    }

    #[test]
    fn test_best_match_rejects_unfit_directions() {
        let table = CapabilityTable {
            id: 1,
            entries: vec![audio_entry(MediaDirection::RecvOnly, true)],
        };
        let registry = MediaLineRegistry::new();
        assert_eq!(
            find_best_match(&table, &registry, &request(MediaDirection::RecvOnly, Transport::Rtp)),
            None
        );
    }

    #[test]
    fn test_best_match_security_ranking() {
        let table = CapabilityTable {
            id: 1,
            entries: vec![
                audio_entry(MediaDirection::SendRecv, false),
                audio_entry(MediaDirection::SendOnly, true),
            ],
        };
        let registry = MediaLineRegistry::new();
        let mut req = request(MediaDirection::SendRecv, Transport::Srtp);
        assert_eq!(find_best_match(&table, &registry, &req), Some(CapabilityIndex(1)));

        let insecure = CapabilityTable {
            id: 1,
            entries: vec![audio_entry(MediaDirection::SendRecv, false)],
        };
        assert_eq!(find_best_match(&insecure, &registry, &req), None);
        req.srtp_fallback = true;
        assert_eq!(find_best_match(&insecure, &registry, &req), Some(CapabilityIndex(0)));
    }

    #[test]
    fn test_best_match_skips_assigned_and_disabled() {
        let mut table = CapabilityTable::default();
        let mut registry = MediaLineRegistry::new();
        registry.add_line(MediaType::Audio, 1, MediaRefId(1)).unwrap().cap_index = Some(CAP_AUDIO);
        let req = request(MediaDirection::SendRecv, Transport::Rtp);
        assert_eq!(find_best_match(&table, &registry, &req), None);

        let registry = MediaLineRegistry::new();
        table.get_mut(CAP_AUDIO).unwrap().enabled = false;
        assert_eq!(find_best_match(&table, &registry, &req), None);
    }
}
