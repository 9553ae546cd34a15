//! HTTP requests and responses as plain data.
//!
//! # Design
//! Request builders in `request` produce an `HttpRequest`; a `Transport`
//! executes it and hands back an `HttpResponse`. Neither type does network
//! I/O, so building and decoding stay deterministic and testable without a
//! server. A body with file parts is a reader over the open files, pulled by
//! the transport as it sends.

use std::fmt;
use std::io::{self, Read};

/// HTTP method for a request. The Elpis API only uses these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The exact byte sequence to send.
pub enum HttpBody {
    Bytes(Vec<u8>),
    /// Read once, front to back, while sending. Owns any files it reads
    /// from; dropping it closes them.
    Stream(Box<dyn Read + Send>),
}

impl HttpBody {
    /// In-memory bytes, or `None` for a body not yet read.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            HttpBody::Bytes(bytes) => Some(bytes),
            HttpBody::Stream(_) => None,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, HttpBody::Stream(_))
    }

    /// Read the whole body into memory.
    pub fn into_bytes(self) -> io::Result<Vec<u8>> {
        match self {
            HttpBody::Bytes(bytes) => Ok(bytes),
            HttpBody::Stream(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }
}

impl fmt::Debug for HttpBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            HttpBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// A finished HTTP request.
///
/// Headers are complete by the time this value exists.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<HttpBody>,
}

impl HttpRequest {
    /// First header with the given name (exact match).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Read a streamed body into memory, for inspection.
    pub fn buffered(mut self) -> io::Result<Self> {
        if let Some(body) = self.body.take() {
            self.body = Some(HttpBody::Bytes(body.into_bytes()?));
        }
        Ok(self)
    }

    /// The body as UTF-8 text, lossily. Empty when there is no body or it is
    /// still a stream; see `buffered`.
    pub fn body_text(&self) -> String {
        self.body
            .as_ref()
            .and_then(HttpBody::as_bytes)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }
}

/// A completed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Convenience constructor for a response with a text body and no headers.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into().into_bytes(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header lookup, ignoring ASCII case as HTTP does for response headers.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Reason phrase for the status codes the service is likely to return.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unexpected Status",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_header_lookup_ignores_case() {
        let resp = HttpResponse {
            status: 200,
            headers: vec![("content-type".into(), "text/plain".into())],
            body: Vec::new(),
        };
        assert_eq!(resp.header("Content-Type"), Some("text/plain"));
        assert!(resp.is_success());
    }

    #[test]
    fn request_header_lookup_is_exact() {
        let req = HttpRequest {
            method: HttpMethod::Get,
            url: "http://localhost:5000/api/model/status".into(),
            headers: vec![("Accept".into(), "application/json".into())],
            body: None,
        };
        assert_eq!(req.header("Accept"), Some("application/json"));
        assert_eq!(req.header("accept"), None);
        assert_eq!(req.body_text(), "");
    }

    #[test]
    fn buffered_reads_stream_body() {
        let req = HttpRequest {
            method: HttpMethod::Post,
            url: "http://localhost:5000/api/dataset/files".into(),
            headers: Vec::new(),
            body: Some(HttpBody::Stream(Box::new(io::Cursor::new(b"RIFF".to_vec())))),
        };
        assert_eq!(req.body_text(), "");
        let req = req.buffered().unwrap();
        assert_eq!(req.body_text(), "RIFF");
        assert!(!req.body.unwrap().is_stream());
    }

    #[test]
    fn reason_phrases() {
        assert_eq!(reason_phrase(404), "Not Found");
        assert_eq!(reason_phrase(599), "Unexpected Status");
    }
}
