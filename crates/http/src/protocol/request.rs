//! Inbound request types.
//!
//! [`RequestHeader`] is what the decoder produces once the request head is parsed.
//! [`RawRequest`] is the transport's request handle passed to a [`Handler`](crate::handler::Handler):
//! the head, the body bytes the connection read, and the peer address.

use std::net::SocketAddr;

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version, header};

/// The parsed head of an HTTP request.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl RequestHeader {
    /// Consumes the header and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether the client asked to keep the connection open after this exchange.
    ///
    /// HTTP/1.1 defaults to persistent connections unless `Connection: close` is sent,
    /// HTTP/1.0 only persists with an explicit `Connection: keep-alive`.
    pub fn is_keep_alive(&self) -> bool {
        let connection = self.headers().get(header::CONNECTION).and_then(|value| value.to_str().ok());
        let has_token = |token: &str| {
            connection.is_some_and(|value| value.split(',').any(|item| item.trim().eq_ignore_ascii_case(token)))
        };

        match self.version() {
            Version::HTTP_10 => has_token("keep-alive"),
            _ => !has_token("close"),
        }
    }

    /// Whether the client sent `Expect: 100-continue` and waits before sending its body.
    pub fn expects_continue(&self) -> bool {
        self.headers()
            .get(header::EXPECT)
            .is_some_and(|value| value.as_bytes().len() >= 4 && value.as_bytes()[..4].eq_ignore_ascii_case(b"100-"))
    }
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

/// The transport's readable request handle.
#[derive(Debug)]
pub struct RawRequest {
    header: RequestHeader,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
}

impl RawRequest {
    pub fn new(header: impl Into<RequestHeader>, body: Bytes, remote_addr: Option<SocketAddr>) -> Self {
        Self { header: header.into(), body, remote_addr }
    }

    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn method(&self) -> &Method {
        self.header.method()
    }

    /// The request target exactly as the client sent it.
    pub fn uri(&self) -> &Uri {
        self.header.uri()
    }

    pub fn version(&self) -> Version {
        self.header.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.header.headers()
    }

    /// The request body as read by the connection; empty for bodiless requests.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Address of the peer socket, when the transport knows it.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn is_keep_alive(&self) -> bool {
        self.header.is_keep_alive()
    }
}
