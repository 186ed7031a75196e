// Media description parsing for SDP
//
// m=<media> <port>[/<port-count>] <proto> <fmt> [<fmt>]*

use nom::{
    IResult,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1, space0, space1},
    combinator::{map_res, opt},
    multi::separated_list0,
    sequence::{preceded, tuple},
};

use crate::error::{Result, SdpError};
use crate::parser::validation::is_valid_token;
use crate::types::MediaDescription;

fn parse_port_and_count(input: &str) -> IResult<&str, (u16, Option<u16>)> {
    let (input, port) = map_res(digit1, |s: &str| s.parse::<u16>())(input)?;
    let (input, count) = opt(preceded(char('/'), map_res(digit1, |s: &str| s.parse::<u16>())))(input)?;
    Ok((input, (port, count)))
}

fn parse_token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace())(input)
}

fn parse_media_description_nom(input: &str) -> IResult<&str, MediaDescription> {
    let (input, _) = opt(tag("m="))(input)?;
    let (input, (media, _, (port, port_count), _, protocol, _, formats)) = tuple((
        parse_token,
        space1,
        parse_port_and_count,
        space1,
        parse_token,
        space0,
        separated_list0(space1, parse_token),
    ))(input)?;

    let mut description = MediaDescription::new(media, port, protocol);
    description.port_count = port_count;
    description.formats = formats.into_iter().map(str::to_string).collect();
    Ok((input, description))
}

/// Parse the value of an m= line
///
/// The media type is any RFC 4566 token; deciding whether the type is
/// usable is left to the consumer.
pub fn parse_media_description_line(value: &str) -> Result<MediaDescription> {
    let (remainder, media) = parse_media_description_nom(value)
        .map_err(|_| SdpError::parsing(format!("Invalid m= line format: {}", value)))?;

    if !remainder.trim().is_empty() {
        return Err(SdpError::parsing(format!("Invalid m= line format: {}", value)));
    }
    if !is_valid_token(&media.media) {
        return Err(SdpError::parsing(format!("Invalid media type: {}", media.media)));
    }
    Ok(media)
}
