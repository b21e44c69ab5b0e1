//! HTTP/1.1 request parsing: `parse_request(span) -> Option<(consumed, Request)>`,
//! called with each incremental receive payload against a caller-owned
//! accumulation buffer.

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Parse one request out of `buf`. Returns the number of bytes consumed
/// through the blank line terminating the headers, and the parsed
/// request, or `None` if the headers aren't fully buffered yet.
///
/// The caller (`hio-pool::worker`) owns the accumulation buffer and
/// decides what to do with the tail bytes past what was consumed.
pub fn parse_request(buf: &[u8]) -> Option<(usize, Request)> {
    let header_end = find_header_terminator(buf)?;
    let head = std::str::from_utf8(&buf[..header_end]).ok()?;
    let mut lines = head.split("\r\n");

    let request_line = lines.next()?;
    let mut parts = request_line.split(' ');
    let method = parts.next()?.to_string();
    let url = parts.next()?.to_string();
    let version = parts.next().unwrap_or("HTTP/1.1").to_string();

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':')?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Some((header_end + 4, Request { method, url, version, headers }))
}

fn find_header_terminator(buf: &[u8]) -> Option<usize> {
    if buf.len() < 4 {
        return None;
    }
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_request_returns_none() {
        assert!(parse_request(b"GET / HTTP/1.1\r\nHost: x\r\n").is_none());
    }

    #[test]
    fn parses_method_url_version_and_headers() {
        let raw = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nConnection: keep-alive\r\n\r\nTRAILING";
        let (consumed, req) = parse_request(raw).unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.url, "/index.html");
        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(req.header("host"), Some("example.com"));
        assert_eq!(req.header("Connection"), Some("keep-alive"));
        assert_eq!(&raw[consumed..], b"TRAILING");
    }

    #[test]
    fn rejects_malformed_header_line() {
        let raw = b"GET / HTTP/1.1\r\nNotAHeader\r\n\r\n";
        assert!(parse_request(raw).is_none());
    }
}
