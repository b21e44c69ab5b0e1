//! HTTP response contract: a record with version, status,
//! and headers, plus serialization to bytes.

pub struct Response {
    pub version: &'static str,
    pub status_code: u16,
    pub status_text: &'static str,
    pub headers: Vec<(String, String)>,
}

impl Response {
    pub fn ok(content_type: &str, body_len: usize) -> Self {
        Self {
            version: "HTTP/1.1",
            status_code: 200,
            status_text: "OK",
            headers: vec![
                ("Content-Type".to_string(), content_type.to_string()),
                ("Content-Length".to_string(), body_len.to_string()),
                ("Connection".to_string(), "keep-alive".to_string()),
                ("Server".to_string(), "hio".to_string()),
            ],
        }
    }

    pub fn not_found(body_len: usize) -> Self {
        Self {
            version: "HTTP/1.1",
            status_code: 404,
            status_text: "Not Found",
            headers: vec![
                ("Content-Type".to_string(), "text/plain".to_string()),
                ("Content-Length".to_string(), body_len.to_string()),
                ("Connection".to_string(), "keep-alive".to_string()),
            ],
        }
    }

    /// Serialize the status line, headers, blank line, and `body` into
    /// one contiguous buffer ready for `ClientSocket::send`.
    pub fn serialize(&self, body: &[u8]) -> Vec<u8> {
        let mut out = format!("{} {} {}\r\n", self.version, self.status_code, self.status_text).into_bytes();
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_status_line_headers_and_body() {
        let body = b"hi";
        let resp = Response::ok("text/plain", body.len());
        let bytes = resp.serialize(body);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.ends_with("\r\n\r\nhi"));
    }
}
