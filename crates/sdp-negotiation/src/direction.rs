// Direction negotiation (RFC 3264 section 6.1)
//
// The answer direction is a pure function of the remote direction, the
// local hold state and what the line supports, kept as a lookup table.

use std::net::{IpAddr, Ipv4Addr};

use rvoip_sdp_core::{MediaDirection, SessionDescription};

use rvoip_sdp_core::MediaDirection::{Inactive as IN, RecvOnly as RO, SendOnly as SO, SendRecv as SR};

const fn index(direction: MediaDirection) -> usize {
    match direction {
        SR => 0,
        SO => 1,
        RO => 2,
        IN => 3,
    }
}

/// `TABLE[remote][held][support]`
const TABLE: [[[MediaDirection; 4]; 2]; 4] = [
    // remote sendrecv
    [[SR, SO, RO, IN], [SO, SO, IN, IN]],
    // remote sendonly
    [[RO, IN, RO, IN], [IN, IN, IN, IN]],
    // remote recvonly
    [[SO, SO, IN, IN], [SO, SO, IN, IN]],
    // remote inactive
    [[IN, IN, IN, IN], [IN, IN, IN, IN]],
];

/// Local direction answering `remote`
pub fn negotiate_direction(
    remote: MediaDirection,
    support: MediaDirection,
    local_hold: bool,
) -> MediaDirection {
    TABLE[index(remote)][usize::from(local_hold)][index(support)]
}

/// Effective direction of a remote m= line
///
/// The media-level attribute wins over the session-level one; without
/// either the line is sendrecv. A `0.0.0.0` connection address is the
/// RFC 2543 way of putting a call on hold and forces inactive.
pub fn remote_direction(
    remote: &SessionDescription,
    level: u16,
    dest_address: Option<IpAddr>,
) -> MediaDirection {
    if dest_address == Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)) {
        return IN;
    }
    remote
        .media(level)
        .and_then(|m| m.direction)
        .or(remote.direction)
        .unwrap_or(SR)
}
