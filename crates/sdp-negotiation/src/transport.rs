// RTP/SRTP transport negotiation for one media line

use rvoip_sdp_core::MediaDescription;
use tracing::debug;

use crate::collaborators::CryptoKeyProvider;
use crate::config::NegotiationConfig;
use crate::media::MediaLine;
use crate::types::Transport;

/// Transport chosen for a remote m= line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSelection {
    pub transport: Transport,
    /// Selected remote crypto attribute, SRTP only
    pub crypto_index: Option<u32>,
}

impl TransportSelection {
    fn of(transport: Transport) -> Self {
        Self { transport, crypto_index: None }
    }
}

/// Choose the transport for a remote m= line
///
/// RTP/AVP is always acceptable. RTP/SAVP needs a security capable line
/// and a usable remote `a=crypto`; a line without security may answer it
/// with plain RTP when fallback is enabled. Other profiles are refused.
pub fn negotiate_transport(
    remote: &MediaDescription,
    line: &MediaLine,
    srtp_fallback: bool,
    crypto: &dyn CryptoKeyProvider,
) -> TransportSelection {
    let selection = match Transport::from_protocol(&remote.protocol) {
        Transport::Rtp => TransportSelection::of(Transport::Rtp),
        Transport::Srtp if line.supports_security => {
            let offered: Vec<&str> = remote.values_of("crypto").collect();
            match crypto.select_remote_crypto(line.ref_id, &offered) {
                Some(index) => TransportSelection {
                    transport: Transport::Srtp,
                    crypto_index: Some(index),
                },
                None => TransportSelection::of(Transport::Invalid),
            }
        }
        Transport::Srtp if srtp_fallback => TransportSelection::of(Transport::Rtp),
        _ => TransportSelection::of(Transport::Invalid),
    };
    debug!(
        level = line.level,
        protocol = %remote.protocol,
        transport = ?selection.transport,
        "transport negotiated"
    );
    selection
}

/// Record a negotiated transport on the line
pub fn commit_transport(line: &mut MediaLine, selection: TransportSelection) {
    line.previous.crypto_changed =
        line.transport != selection.transport || line.crypto_index != selection.crypto_index;
    line.transport = selection.transport;
    line.crypto_index = selection.crypto_index;
}

/// Transport a locally offered line starts with
pub fn initial_transport(config: &NegotiationConfig, supports_security: bool) -> Transport {
    if config.offer_srtp && supports_security {
        Transport::Srtp
    } else {
        Transport::Rtp
    }
}
