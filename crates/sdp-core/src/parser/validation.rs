// Session validation utilities
//
// Functions for validating tokens, hostnames and IP addresses in SDP fields.

use std::net::IpAddr;

use nom::{
    IResult,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{all_consuming, recognize, verify},
    multi::separated_list1,
};

/// Validates if a string is a valid token per RFC 4566
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token.chars().all(|c| {
            matches!(c,
                'a'..='z' | 'A'..='Z' | '0'..='9' |
                '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '.' |
                '^' | '_' | '`' | '{' | '|' | '}' | '~'
            )
        })
}

fn parse_label(input: &str) -> IResult<&str, &str> {
    verify(take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-'), |s: &str| {
        s.len() <= 63 && !s.starts_with('-') && !s.ends_with('-')
    })(input)
}

fn parse_hostname(input: &str) -> IResult<&str, &str> {
    verify(recognize(separated_list1(char('.'), parse_label)), |s: &str| s.len() <= 255)(input)
}

/// Validates if a string is a valid hostname (FQDN)
pub fn is_valid_hostname(hostname: &str) -> bool {
    all_consuming(parse_hostname)(hostname).is_ok()
}

/// Validates a connection or origin address: an IP literal or a hostname
pub fn is_valid_address(address: &str) -> bool {
    address.parse::<IpAddr>().is_ok() || is_valid_hostname(address)
}
