// Boundary contract with the host HTTP server.
//
// The host owns the connection and the request lifecycle; it hands the
// interceptor an owned request view and a shared handle to the outbound
// response, then continues its handler chain through the interceptor's
// continuation argument.

use hyper::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::tap::ResponseTap;

/// Result type handlers and the interceptor return to the host server.
pub type HandlerResult = Result<(), anyhow::Error>;

/// Inbound request view supplied by the host server.
///
/// The body is a readable stream; the interceptor may consume a bounded
/// prefix and replace it before the downstream handler runs.
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Box<dyn Read + Send>,
    pub client_ip: String,
}

impl Request {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Box<dyn Read + Send>) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
            client_ip: String::new(),
        }
    }

    /// Client address as resolved by the host (peer address or forwarded-for).
    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = ip.into();
        self
    }

    /// First value of `name`, or "" when absent or not valid UTF-8.
    pub fn header_str(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    pub fn user_agent(&self) -> &str {
        self.headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// Content type with parameters stripped, e.g. "multipart/form-data".
    pub fn base_content_type(&self) -> &str {
        let content_type = self
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        content_type.split(';').next().unwrap_or(content_type).trim()
    }
}

struct OutboundState {
    status: StatusCode,
    headers: HeaderMap,
    writer: Box<dyn Write + Send>,
}

/// Shared, mutable view of the outbound response owned by the host connection.
///
/// Handlers set the status, add headers and write body bytes through this
/// handle; the interceptor reads the final state after the chain returns.
#[derive(Clone)]
pub struct ResponseHandle {
    state: Arc<Mutex<OutboundState>>,
}

impl ResponseHandle {
    /// Bind a handle to the connection's outbound byte channel. Status starts at 200.
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            state: Arc::new(Mutex::new(OutboundState {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                writer,
            })),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.state.lock().status
    }

    pub fn set_status(&self, status: StatusCode) {
        self.state.lock().status = status;
    }

    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        self.state.lock().headers.insert(name, value);
    }

    /// Snapshot of the response headers as they stand.
    pub fn headers(&self) -> HeaderMap {
        self.state.lock().headers.clone()
    }

    /// Write body bytes to the outbound channel, preserving its return value.
    pub fn write_body(&self, buf: &[u8]) -> io::Result<usize> {
        self.state.lock().writer.write(buf)
    }

    pub fn write_all_body(&self, buf: &[u8]) -> io::Result<()> {
        self.state.lock().writer.write_all(buf)
    }

    pub fn flush_body(&self) -> io::Result<()> {
        self.state.lock().writer.flush()
    }

    /// Swap the outbound channel for a [`ResponseTap`] over it, returning the
    /// shared capture buffer. Writes made after this point are mirrored.
    pub(crate) fn install_tap(&self, cap: usize) -> Arc<Mutex<Vec<u8>>> {
        let mut state = self.state.lock();
        let writer = std::mem::replace(&mut state.writer, Box::new(io::sink()));
        let (tap, captured) = ResponseTap::new(writer, cap);
        state.writer = Box::new(tap);
        captured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_response_handle_defaults_to_200() {
        let res = ResponseHandle::new(Box::new(io::sink()));
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[test]
    fn test_response_handle_shares_state_across_clones() {
        let res = ResponseHandle::new(Box::new(io::sink()));
        let clone = res.clone();
        clone.set_status(StatusCode::CREATED);
        clone.insert_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_install_tap_mirrors_later_writes() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let res = ResponseHandle::new(Box::new(SharedBuf(Arc::clone(&out))));

        res.write_all_body(b"before ").unwrap();
        let captured = res.install_tap(1024);
        res.write_all_body(b"after").unwrap();

        assert_eq!(out.lock().as_slice(), b"before after");
        assert_eq!(captured.lock().as_slice(), b"after");
    }

    #[test]
    fn test_request_header_helpers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=xyz"),
        );
        headers.insert("x-request-id", HeaderValue::from_static("abc-123"));

        let req = Request::new(
            Method::POST,
            "/upload".parse().unwrap(),
            headers,
            Box::new(io::empty()),
        )
        .with_client_ip("10.0.0.1");

        assert_eq!(req.user_agent(), "curl/8.0");
        assert_eq!(req.base_content_type(), "multipart/form-data");
        assert_eq!(req.header_str("X-Request-ID"), "abc-123");
        assert_eq!(req.header_str("x-missing"), "");
        assert_eq!(req.client_ip, "10.0.0.1");
    }
}
