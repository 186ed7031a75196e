//! SDP line parsing utilities
//!
//! An SDP body is a sequence of `<type>=<value>` lines where the type is a
//! single character (RFC 4566 Section 5). The parsers here split a body into
//! those lines; field-level parsing lives in the sibling modules.
//!
//! Line types understood by this crate:
//! - v= (Protocol Version)
//! - o= (Origin)
//! - s= (Session Name)
//! - c= (Connection Information)
//! - b= (Bandwidth Information)
//! - t= (Timing)
//! - a= (Attributes, session or media level)
//! - m= (Media Descriptions)
//!
//! Other line types (i=, u=, e=, p=, r=, z=, k=) are accepted and skipped.

use nom::{
    IResult,
    bytes::complete::{tag, take_until},
    character::complete::{anychar, char, digit1, not_line_ending},
    combinator::map_res,
};

/// Parse one SDP line into its type character and trimmed value
///
/// CRLF and bare LF line endings are both accepted.
///
/// # Examples
///
/// ```
/// use rvoip_sdp_core::parser::parse_sdp_line;
///
/// let (_, (key, value)) = parse_sdp_line("a=rtpmap:101 telephone-event/8000").unwrap();
/// assert_eq!(key, 'a');
/// assert_eq!(value, "rtpmap:101 telephone-event/8000");
/// ```
pub fn parse_sdp_line(input: &str) -> IResult<&str, (char, &str)> {
    let (input, key) = anychar(input)?;
    let (input, _) = char('=')(input)?;
    let (input, value) = not_line_ending(input)?;

    let input = input.trim_start_matches(['\r', '\n']);

    Ok((input, (key, value.trim())))
}

/// Split a whole body into `(type, value)` pairs, skipping blank lines
pub fn parse_sdp_lines(input: &str) -> Result<Vec<(char, &str)>, String> {
    let mut lines = Vec::new();
    let mut rest = input.trim_start_matches(['\r', '\n']);
    while !rest.is_empty() {
        match parse_sdp_line(rest) {
            Ok((remaining, line)) => {
                lines.push(line);
                rest = remaining.trim_start_matches(['\r', '\n', ' ', '\t']);
            }
            Err(_) => {
                let bad = rest.lines().next().unwrap_or(rest);
                return Err(format!("Malformed SDP line: {}", bad));
            }
        }
    }
    Ok(lines)
}

/// Parse the value of a bandwidth line (`<bwtype>:<bandwidth>`)
///
/// # Examples
///
/// ```
/// use rvoip_sdp_core::parser::parse_bandwidth_line;
///
/// let (_, (bw_type, value)) = parse_bandwidth_line("TIAS:384000").unwrap();
/// assert_eq!(bw_type, "TIAS");
/// assert_eq!(value, 384000);
/// ```
pub fn parse_bandwidth_line(input: &str) -> IResult<&str, (&str, u64)> {
    let (input, bw_type) = take_until(":")(input)?;
    let (input, _) = tag(":")(input)?;
    let (input, value) = map_res(digit1, |s: &str| s.parse::<u64>())(input)?;
    Ok((input, (bw_type, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sdp_line() {
        let (_, (key, value)) = parse_sdp_line("v=0").unwrap();
        assert_eq!(key, 'v');
        assert_eq!(value, "0");

        let (_, (key, value)) = parse_sdp_line("s=My Session Name").unwrap();
        assert_eq!(key, 's');
        assert_eq!(value, "My Session Name");

        // Only the first '=' separates type from value
        let (_, (key, value)) = parse_sdp_line("a=fmtp:101 0-15;x=y").unwrap();
        assert_eq!(key, 'a');
        assert_eq!(value, "fmtp:101 0-15;x=y");
    }

    #[test]
    fn test_parse_sdp_lines_mixed_endings() {
        let lines = parse_sdp_lines("v=0\r\no=- 1 0 IN IP4 1.2.3.4\ns=-\r\n\r\nt=0 0\r\n").unwrap();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], ('o', "- 1 0 IN IP4 1.2.3.4"));
        assert_eq!(lines[3], ('t', "0 0"));
    }

    #[test]
    fn test_parse_sdp_lines_rejects_garbage() {
        let err = parse_sdp_lines("v=0\r\nthis is not sdp\r\n").unwrap_err();
        assert!(err.contains("this is not sdp"), "unexpected message: {}", err);
    }

    #[test]
    fn test_parse_bandwidth_line() {
        let (_, (bw_type, bw_value)) = parse_bandwidth_line("AS:128").unwrap();
        assert_eq!(bw_type, "AS");
        assert_eq!(bw_value, 128);
        assert!(parse_bandwidth_line("AS:").is_err());
    }
}
