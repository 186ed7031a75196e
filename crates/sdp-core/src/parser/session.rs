// Session-level line parsing: c=, b=, t=

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till1},
    character::complete::{char, digit1, space1},
    combinator::{map_res, opt},
    sequence::{preceded, tuple},
};

use crate::error::{Result, SdpError};
use crate::parser::line_parser::parse_bandwidth_line;
use crate::parser::validation::is_valid_address;
use crate::types::{AddrType, Bandwidth, ConnectionData, TimeDescription};

fn parse_connection_nom(input: &str) -> IResult<&str, ConnectionData> {
    let (input, (net_type, _, addr_type, _, address)) = tuple((
        tag("IN"),
        space1,
        alt((tag("IP4"), tag("IP6"))),
        space1,
        take_till1(|c| c == '/' || c == ' '),
    ))(input)?;
    let (input, first) = opt(preceded(char('/'), map_res(digit1, |s: &str| s.parse::<u32>())))(input)?;
    let (input, second) = opt(preceded(char('/'), map_res(digit1, |s: &str| s.parse::<u32>())))(input)?;

    let addr_type = if addr_type == "IP6" { AddrType::Ip6 } else { AddrType::Ip4 };

    // IPv4 multicast carries TTL then count; IPv6 only a count
    let (ttl, multicast_count) = match (addr_type, first, second) {
        (AddrType::Ip4, Some(ttl), count) => (u8::try_from(ttl).ok(), count),
        (AddrType::Ip6, Some(count), _) => (None, Some(count)),
        _ => (None, None),
    };

    Ok((
        input,
        ConnectionData {
            net_type: net_type.to_string(),
            addr_type,
            connection_address: address.to_string(),
            ttl,
            multicast_count,
        },
    ))
}

/// Parse the value of a c= line
pub fn parse_connection_line(value: &str) -> Result<ConnectionData> {
    let (remainder, conn) = parse_connection_nom(value)
        .map_err(|_| SdpError::parsing(format!("Invalid c= line format: {}", value)))?;
    if !remainder.trim().is_empty() {
        return Err(SdpError::parsing(format!("Invalid c= line format: {}", value)));
    }
    if !is_valid_address(&conn.connection_address) {
        return Err(SdpError::parsing(format!(
            "Invalid connection address: {}",
            conn.connection_address
        )));
    }
    Ok(conn)
}

/// Parse the value of a b= line
pub fn parse_bandwidth(value: &str) -> Result<Bandwidth> {
    match parse_bandwidth_line(value) {
        Ok((rest, (bw_type, value))) if rest.trim().is_empty() && !bw_type.is_empty() => {
            Ok(Bandwidth { bw_type: bw_type.to_string(), value })
        }
        _ => Err(SdpError::parsing(format!("Invalid b= line format: {}", value))),
    }
}

/// Parse the value of a t= line
///
/// Values are kept verbatim so that a peer's timing can be echoed back
/// even when it is not numeric.
pub fn parse_time_line(value: &str) -> Result<TimeDescription> {
    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(start), Some(stop), None) => Ok(TimeDescription {
            start_time: start.to_string(),
            stop_time: stop.to_string(),
        }),
        _ => Err(SdpError::parsing(format!("Invalid t= line format: {}", value))),
    }
}
