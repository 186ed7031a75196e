//! SDP attribute (a=) parsing
//!
//! Attributes the negotiation layer inspects get structured variants:
//! `rtpmap` (RFC 4566 §6), `fmtp`, `mid` and `group` (RFC 5888). Direction
//! and `ptime` attributes are lifted into dedicated fields by the document
//! parser. Everything else is preserved as [`ParsedAttribute::Value`] or
//! [`ParsedAttribute::Flag`] so a document survives a parse/serialize cycle.

use nom::{
    IResult,
    bytes::complete::take_till1,
    character::complete::{char, digit1, space1},
    combinator::{map_res, opt, rest},
    sequence::{preceded, tuple},
};

use crate::types::{FmtpAttribute, MediaDirection, ParsedAttribute, RtpMapAttribute};

/// An attribute line after classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeLine {
    /// a=sendrecv / sendonly / recvonly / inactive
    Direction(MediaDirection),
    /// a=ptime:<ms>
    Ptime(u32),
    /// Any other attribute
    Other(ParsedAttribute),
}

fn parse_rtpmap_nom(input: &str) -> IResult<&str, RtpMapAttribute> {
    let (input, (payload_type, _, encoding_name, _, clock_rate, params)) = tuple((
        map_res(digit1, |s: &str| s.parse::<u8>()),
        space1,
        take_till1(|c| c == '/'),
        char('/'),
        map_res(digit1, |s: &str| s.parse::<u32>()),
        opt(preceded(char('/'), rest)),
    ))(input)?;

    Ok((
        input,
        RtpMapAttribute {
            payload_type,
            encoding_name: encoding_name.to_string(),
            clock_rate,
            encoding_params: params.map(|p: &str| p.trim().to_string()),
        },
    ))
}

/// Parse an rtpmap value (`96 telephone-event/8000`)
pub fn parse_rtpmap(value: &str) -> Option<RtpMapAttribute> {
    match parse_rtpmap_nom(value.trim()) {
        Ok((remaining, rtpmap)) if remaining.trim().is_empty() => Some(rtpmap),
        _ => None,
    }
}

/// Parse an fmtp value (`18 annexb=no`)
pub fn parse_fmtp(value: &str) -> Option<FmtpAttribute> {
    let (format, parameters) = value.trim().split_once(' ')?;
    if format.is_empty() {
        return None;
    }
    Some(FmtpAttribute {
        format: format.to_string(),
        parameters: parameters.trim().to_string(),
    })
}

/// Parse a group value (`ANAT 1 2`)
pub fn parse_group(value: &str) -> Option<ParsedAttribute> {
    let mut parts = value.split_whitespace();
    let semantics = parts.next()?.to_string();
    Some(ParsedAttribute::Group {
        semantics,
        ids: parts.map(str::to_string).collect(),
    })
}

/// Classify the value of an `a=` line
///
/// Structured attributes whose value does not parse are kept verbatim
/// rather than failing the whole document.
pub fn parse_attribute_line(value: &str) -> AttributeLine {
    let Some((name, attr_value)) = value.split_once(':') else {
        return match MediaDirection::from_attribute(value) {
            Some(direction) => AttributeLine::Direction(direction),
            None => AttributeLine::Other(ParsedAttribute::Flag(value.to_string())),
        };
    };

    let parsed = match name {
        "rtpmap" => parse_rtpmap(attr_value).map(ParsedAttribute::RtpMap),
        "fmtp" => parse_fmtp(attr_value).map(ParsedAttribute::Fmtp),
        "mid" => Some(ParsedAttribute::Mid(attr_value.trim().to_string())),
        "group" => parse_group(attr_value),
        "ptime" => {
            if let Ok(ptime) = attr_value.trim().parse::<u32>() {
                return AttributeLine::Ptime(ptime);
            }
            None
        }
        _ => None,
    };

    AttributeLine::Other(parsed.unwrap_or_else(|| {
        tracing::trace!(attribute = name, "keeping attribute unparsed");
        ParsedAttribute::Value(name.to_string(), attr_value.to_string())
    }))
}
