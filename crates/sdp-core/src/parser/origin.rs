// SDP Origin (o=) line parsing
//
// o=<username> <sess-id> <sess-version> <nettype> <addrtype> <unicast-address>

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till1},
    character::complete::{digit1, space1},
    combinator::opt,
    sequence::tuple,
};

use crate::error::{Result, SdpError};
use crate::types::{AddrType, Origin};

fn parse_origin_nom(input: &str) -> IResult<&str, Origin> {
    let (input, _) = opt(tag("o="))(input)?;

    let (remainder, (username, _, sess_id, _, sess_version, _, net_type, _, addr_type, _, addr)) =
        tuple((
            take_till1(|c| c == ' '),
            space1,
            digit1,
            space1,
            digit1,
            space1,
            tag("IN"),
            space1,
            alt((tag("IP4"), tag("IP6"))),
            space1,
            take_till1(|c| c == ' ' || c == '\r' || c == '\n'),
        ))(input)?;

    let addr_type = if addr_type == "IP6" { AddrType::Ip6 } else { AddrType::Ip4 };

    Ok((
        remainder,
        Origin {
            username: username.to_string(),
            sess_id: sess_id.to_string(),
            sess_version: sess_version.to_string(),
            net_type: net_type.to_string(),
            addr_type,
            unicast_address: addr.to_string(),
        },
    ))
}

/// Parse the value of an o= line
pub fn parse_origin_line(value: &str) -> Result<Origin> {
    match parse_origin_nom(value) {
        Ok((remainder, origin)) if remainder.trim().is_empty() => Ok(origin),
        Ok(_) => Err(SdpError::parsing(format!(
            "Invalid o= line format (extra content): {}",
            value
        ))),
        Err(_) => Err(SdpError::parsing(format!("Invalid o= line format: {}", value))),
    }
}
