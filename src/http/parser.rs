use crate::http::request::{Method, RequestHead};

#[derive(Debug)]
pub enum ParseError {
    InvalidRequest,
    InvalidMethod,
    InvalidHeader,
    InvalidContentLength,
    Incomplete,
}

/// Parses the request line and headers from the front of `buf`.
///
/// Returns the parsed head and the number of bytes consumed (up to and
/// including the blank line). Body bytes after the head are left in the
/// buffer untouched; forwarding streams them from there and from the
/// socket.
///
/// Headers are collected in order, duplicates included, so the upstream
/// leg sees exactly what the client sent. A Content-Length that does not
/// parse is rejected here rather than defaulted, since both legs frame
/// the body off that value.
pub fn parse_request_head(buf: &[u8]) -> Result<(RequestHead, usize), ParseError> {
    let headers_end = find_headers_end(buf).ok_or(ParseError::Incomplete)?;
    let header_bytes = &buf[..headers_end];

    let headers_str = std::str::from_utf8(header_bytes)
        .map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    // Headers
    let mut headers = Vec::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or(ParseError::InvalidHeader)?;

        headers.push((
            key.trim().to_string(),
            value.trim().to_string(),
        ));
    }

    let head = RequestHead {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
    };

    if let Some(v) = head.header("Content-Length") {
        if v.parse::<usize>().is_err() {
            return Err(ParseError::InvalidContentLength);
        }
    }

    Ok((head, headers_end + 4))
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
}
