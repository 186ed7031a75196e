// Document-level tests for the SDP parser and writer

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use rvoip_sdp_core::{
    parse_sdp, AddrType, ConnectionData, MediaDescription, MediaDirection, Origin, ParsedAttribute,
    RtpMapAttribute, SessionDescription,
};

fn origin() -> Origin {
    Origin {
        username: "-".to_string(),
        sess_id: "4242".to_string(),
        sess_version: "7".to_string(),
        net_type: "IN".to_string(),
        addr_type: AddrType::Ip4,
        unicast_address: "198.51.100.7".to_string(),
    }
}

#[test]
fn test_builds_expected_text() {
    let mut sdp = SessionDescription::new(origin(), "SIP Call");
    let mut audio = MediaDescription::new("audio", 16384, "RTP/AVP");
    audio.connection_info = Some(ConnectionData::for_ip("198.51.100.7".parse().unwrap()));
    audio.formats = vec!["0".to_string(), "101".to_string()];
    audio.push_attribute(ParsedAttribute::RtpMap(RtpMapAttribute {
        payload_type: 0,
        encoding_name: "PCMU".to_string(),
        clock_rate: 8000,
        encoding_params: None,
    }));
    audio.direction = Some(MediaDirection::SendRecv);
    sdp.replace_media(1, audio).unwrap();

    assert_eq!(
        sdp.to_string(),
        "v=0\r\n\
         o=- 4242 7 IN IP4 198.51.100.7\r\n\
         s=SIP Call\r\n\
         t=0 0\r\n\
         m=audio 16384 RTP/AVP 0 101\r\n\
         c=IN IP4 198.51.100.7\r\n\
         a=rtpmap:0 PCMU/8000\r\n\
         a=sendrecv\r\n"
    );
}

#[test]
fn test_parses_lf_only_body_from_bytes() {
    let body = b"v=0\no=- 1 1 IN IP6 2001:db8::5\ns=-\nt=0 0\nm=audio 5004 RTP/SAVP 8\nc=IN IP6 2001:db8::5\na=crypto:1 AES_CM_128_HMAC_SHA1_80 inline:abcd\n";
    let sdp = SessionDescription::parse(body).unwrap();
    let audio = sdp.media(1).unwrap();
    assert_eq!(audio.protocol, "RTP/SAVP");
    assert_eq!(audio.connection_info.as_ref().unwrap().addr_type, AddrType::Ip6);
    assert_eq!(
        audio.values_of("crypto").collect::<Vec<_>>(),
        vec!["1 AES_CM_128_HMAC_SHA1_80 inline:abcd"]
    );
}

#[test]
fn test_document_survives_json() {
    let body = "v=0\r\no=- 1 1 IN IP4 192.0.2.1\r\ns=-\r\nt=0 0\r\nm=audio 5004 RTP/AVP 0\r\na=recvonly\r\n";
    let sdp = parse_sdp(body).unwrap();
    let json = serde_json::to_value(&sdp).unwrap();
    assert_eq!(json["media_descriptions"][0]["direction"], "recvonly");
    let back: SessionDescription = serde_json::from_value(json).unwrap();
    assert_eq!(back, sdp);
}

#[test]
fn test_rejects_malformed_media_line() {
    let result = parse_sdp("v=0\r\no=- 1 0 IN IP4 1.1.1.1\r\ns=-\r\nm=audio RTP/AVP 0\r\n");
    assert!(result.is_err(), "port is missing from the m= line");
}

fn arb_direction() -> impl Strategy<Value = Option<MediaDirection>> {
    prop_oneof![
        Just(None),
        Just(Some(MediaDirection::SendRecv)),
        Just(Some(MediaDirection::SendOnly)),
        Just(Some(MediaDirection::RecvOnly)),
        Just(Some(MediaDirection::Inactive)),
    ]
}

fn arb_media() -> impl Strategy<Value = MediaDescription> {
    (
        prop_oneof![Just("audio"), Just("video"), Just("application")],
        any::<u16>(),
        prop_oneof![Just("RTP/AVP"), Just("RTP/SAVP")],
        prop::collection::vec(0u8..128, 1..6),
        arb_direction(),
        prop::option::of(10u32..120),
    )
        .prop_map(|(media, port, protocol, payloads, direction, ptime)| {
            let mut description = MediaDescription::new(media, port, protocol);
            description.formats = payloads.iter().map(|p| p.to_string()).collect();
            for payload in payloads.iter().filter(|p| **p >= 96) {
                description.push_attribute(ParsedAttribute::RtpMap(RtpMapAttribute {
                    payload_type: *payload,
                    encoding_name: "telephone-event".to_string(),
                    clock_rate: 8000,
                    encoding_params: None,
                }));
            }
            description.direction = direction;
            description.ptime = ptime;
            description
        })
}

proptest! {
    #[test]
    fn prop_serialize_parse_roundtrip(media in prop::collection::vec(arb_media(), 0..5), direction in arb_direction()) {
        let mut sdp = SessionDescription::new(origin(), "-");
        sdp.direction = direction;
        sdp.media_descriptions = media;
        let reparsed = parse_sdp(&sdp.to_string()).unwrap();
        prop_assert_eq!(reparsed, sdp);
    }
}
