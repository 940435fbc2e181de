//! Incremental HTTP/1.1 request parser.
//!
//! # Responsibilities
//! - Decide whether the accumulation buffer holds a complete request
//! - Tokenize the request line and header block
//! - Honor a declared `Content-Length` body
//!
//! # Design Decisions
//! - Pure function over `&[u8]`: every call rescans from the buffer start, so
//!   feeding bytes one at a time converges on the same result as one batch
//! - Over-long request line fields are rejected, never truncated
//! - A body that can never fit the accumulation buffer is rejected as soon as
//!   its declared length is known

use thiserror::Error;

use crate::http::request::{Header, HttpRequest, RequestLimits};

const CRLF: &[u8] = b"\r\n";

/// Why a request was classified as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("request line has {0} fields, expected 3")]
    RequestLine(usize),

    #[error("method is {0} bytes, limit exceeded")]
    MethodTooLong(usize),

    #[error("path is {0} bytes, limit exceeded")]
    PathTooLong(usize),

    #[error("version is {0} bytes, limit exceeded")]
    VersionTooLong(usize),

    #[error("header line has no colon separator")]
    MissingColon,

    #[error("header line has an empty name")]
    EmptyHeaderName,

    #[error("more than {0} headers")]
    TooManyHeaders(usize),

    #[error("invalid Content-Length value {0:?}")]
    InvalidContentLength(String),

    #[error("declared body of {0} bytes cannot fit the request buffer")]
    BodyTooLarge(usize),

    #[error("request exceeds the {0} byte buffer")]
    BufferOverflow(usize),

    #[error("request line or header name is not valid UTF-8")]
    NonUtf8,
}

/// Result of one parse attempt over the accumulated bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// A whole request is buffered. `consumed` is the offset of the first byte
    /// past the request.
    Complete { request: HttpRequest, consumed: usize },
    /// More bytes are needed; retry from the start of the same buffer.
    Incomplete,
    Malformed(ParseError),
}

/// Attempt to parse one request from `buf`.
pub fn parse_request(buf: &[u8], limits: &RequestLimits) -> ParseOutcome {
    match try_parse(buf, limits) {
        Ok(Some((request, consumed))) => ParseOutcome::Complete { request, consumed },
        Ok(None) => ParseOutcome::Incomplete,
        Err(e) => ParseOutcome::Malformed(e),
    }
}

fn try_parse(buf: &[u8], limits: &RequestLimits) -> Result<Option<(HttpRequest, usize)>, ParseError> {
    let Some(line_end) = find_crlf(buf, 0) else {
        return Ok(None);
    };
    let (method, path, version) = parse_request_line(&buf[..line_end], limits)?;

    let mut headers = Vec::new();
    let mut pos = line_end + CRLF.len();
    loop {
        let Some(line_end) = find_crlf(buf, pos) else {
            return Ok(None);
        };
        if line_end == pos {
            pos += CRLF.len();
            break;
        }
        if headers.len() == limits.max_headers {
            return Err(ParseError::TooManyHeaders(limits.max_headers));
        }
        headers.push(parse_header_line(&buf[pos..line_end])?);
        pos = line_end + CRLF.len();
    }
    let header_end = pos;

    let declared = headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("content-length"))
        .map(|h| parse_content_length(&h.value))
        .transpose()?;

    let body = match declared {
        None => None,
        Some(len) => {
            let fits = header_end
                .checked_add(len)
                .is_some_and(|total| total <= limits.buffer_capacity);
            if !fits {
                return Err(ParseError::BodyTooLarge(len));
            }
            if buf.len() - header_end < len {
                return Ok(None);
            }
            Some(buf[header_end..header_end + len].to_vec())
        }
    };

    let consumed = header_end + body.as_ref().map_or(0, Vec::len);
    let request = HttpRequest {
        method,
        path,
        version,
        headers,
        body,
    };
    Ok(Some((request, consumed)))
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(CRLF.len())
        .position(|w| w == CRLF)
        .map(|p| from + p)
}

fn parse_request_line(
    line: &[u8],
    limits: &RequestLimits,
) -> Result<(String, String, String), ParseError> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::NonUtf8)?;
    let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
    let &[method, path, version] = tokens.as_slice() else {
        return Err(ParseError::RequestLine(tokens.len()));
    };

    if method.len() > limits.max_method_len {
        return Err(ParseError::MethodTooLong(method.len()));
    }
    if path.len() > limits.max_path_len {
        return Err(ParseError::PathTooLong(path.len()));
    }
    if version.len() > limits.max_version_len {
        return Err(ParseError::VersionTooLong(version.len()));
    }

    Ok((method.to_string(), path.to_string(), version.to_string()))
}

fn parse_header_line(line: &[u8]) -> Result<Header, ParseError> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or(ParseError::MissingColon)?;
    if colon == 0 {
        return Err(ParseError::EmptyHeaderName);
    }

    let name = std::str::from_utf8(&line[..colon]).map_err(|_| ParseError::NonUtf8)?;
    let raw_value = &line[colon + 1..];
    // Exactly one optional space follows the colon on the wire.
    let raw_value = raw_value.strip_prefix(b" ").unwrap_or(raw_value);
    let value = String::from_utf8_lossy(raw_value);

    Ok(Header::new(name, value))
}

fn parse_content_length(value: &str) -> Result<usize, ParseError> {
    let digits = value.trim();
    let invalid = || ParseError::InvalidContentLength(value.to_string());
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    digits.parse::<usize>().map_err(|_| invalid())
}
