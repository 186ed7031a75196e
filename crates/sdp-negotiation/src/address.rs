//! Address family and ANAT negotiation
//!
//! Chooses whether a media line runs over IPv4 or IPv6. With dual-stack
//! configuration the local offer carries each stream twice, grouped with
//! `a=group:ANAT` (RFC 4091) and labelled with `a=mid`; an answerer keeps at
//! most one line of each pair.

use std::net::IpAddr;

use rvoip_sdp_core::SessionDescription;
use tracing::trace;

use crate::collaborators::AddressResolver;
use crate::config::IpMode;
use crate::types::{AddressFamily, MediaType};

/// ANAT grouping semantics token
pub const ANAT: &str = "ANAT";

/// Outcome of the address family decision for one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressDecision {
    /// Keep the line
    Accept,
    /// Reject the line
    Reject,
    /// Keep the line and drop its ANAT partner
    AcceptEvictingPair,
}

/// Decide whether a line may use the remote address family
///
/// `pair_family` is the family already negotiated for the line's ANAT
/// partner, if it has one. A line without security support runs on an
/// offboard device that only speaks IPv4 and never takes part in ANAT.
pub fn decide_address_family(
    ip_mode: IpMode,
    supports_security: bool,
    remote_family: AddressFamily,
    pair_family: Option<AddressFamily>,
) -> AddressDecision {
    use AddressDecision::*;
    use AddressFamily::*;

    let decision = if !supports_security {
        match (ip_mode, remote_family, pair_family) {
            (IpMode::Ipv6, _, _) | (_, Ipv6, _) | (_, _, Some(_)) => Reject,
            _ => Accept,
        }
    } else {
        match (ip_mode, remote_family, pair_family) {
            (IpMode::Dual, _, None) => Accept,
            (IpMode::Dual, Ipv6, Some(Ipv4)) => AcceptEvictingPair,
            (IpMode::Dual, _, Some(_)) => Reject,
            (IpMode::Ipv4, Ipv4, None) | (IpMode::Ipv6, Ipv6, None) => Accept,
            _ => Reject,
        }
    };
    trace!(?ip_mode, supports_security, ?remote_family, ?pair_family, ?decision, "address family");
    decision
}

/// Whether an address is an IPv4 multicast group this engine handles
pub fn is_multicast(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => (225..=239).contains(&v4.octets()[0]),
        IpAddr::V6(_) => false,
    }
}

/// Remote connection address of a level
///
/// The media-level `c=` line wins over the session-level one. Host names
/// go through the resolver.
pub fn resolve_remote_address(
    remote: &SessionDescription,
    level: u16,
    resolver: &dyn AddressResolver,
) -> Option<IpAddr> {
    let connection = remote.connection_for(level)?;
    connection
        .ip_addr()
        .or_else(|| resolver.resolve(&connection.connection_address))
}

/// Numeric value of an `a=mid` or group identifier; `0` is no identifier
fn mid_number(value: &str) -> Option<u32> {
    value.trim().parse().ok().filter(|n| *n != 0)
}

fn media_mid(sdp: &SessionDescription, level: u16) -> Option<u32> {
    sdp.media(level)?.mid().and_then(mid_number)
}

/// Whether a document carries any ANAT group
pub fn has_anat_group(sdp: &SessionDescription) -> bool {
    sdp.groups(ANAT).next().is_some()
}

/// Check the ANAT structure of a remote document
///
/// Every ANAT group lists one or two identifiers. With two, both refer to
/// existing lines of the same media type whose `a=mid` equals the
/// identifier. Identifiers and mids compare as numbers.
pub fn validate_anat(remote: &SessionDescription) -> bool {
    remote.groups(ANAT).all(|ids| match ids {
        [_] => true,
        [first, second] => {
            let resolve = |id: &String| {
                let id = mid_number(id)?;
                let level = u16::try_from(id).ok()?;
                let media = remote.media(level)?;
                (media_mid(remote, level) == Some(id)).then(|| MediaType::from_sdp(&media.media))
            };
            match (resolve(first), resolve(second)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => false,
    })
}

/// Check the `a=mid` of a remote line against the local document
///
/// Only applies when the remote uses ANAT: the remote line needs a mid,
/// and when the local document groups with ANAT the local line's mid must
/// be the same.
pub fn validate_mid(remote: &SessionDescription, local: &SessionDescription, level: u16) -> bool {
    if !has_anat_group(remote) {
        return true;
    }
    let Some(remote_mid) = media_mid(remote, level) else {
        return false;
    };
    if has_anat_group(local) {
        return media_mid(local, level) == Some(remote_mid);
    }
    true
}

/// Level of the line grouped with `level` in the remote ANAT groups
pub fn anat_partner_level(remote: &SessionDescription, level: u16) -> Option<u16> {
    let mid = media_mid(remote, level)?;
    remote.groups(ANAT).find_map(|ids| match ids {
        [first, second] if mid_number(first) == Some(mid) => mid_number(second)?.try_into().ok(),
        [first, second] if mid_number(second) == Some(mid) => mid_number(first)?.try_into().ok(),
        _ => None,
    })
}
