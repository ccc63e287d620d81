//! In-memory helpers for exercising responses without a socket.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Version};
use parking_lot::Mutex;
use tokio::io::AsyncWrite;

use crate::protocol::{RawRequest, RawResponse, SharedWriter};

/// An [`AsyncWrite`] collecting everything written to it; clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemoryWriter {
    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().clone()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }

    pub fn shared(&self) -> SharedWriter {
        Arc::new(tokio::sync::Mutex::new(Box::new(self.clone())))
    }
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.buf.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// An [`AsyncWrite`] whose peer is gone.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrokenWriter;

impl AsyncWrite for BrokenWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// A response for a request with `method` and `version`, writing into memory.
pub fn response_for(method: Method, version: Version) -> (Arc<RawResponse>, MemoryWriter) {
    let writer = MemoryWriter::default();
    let response = Arc::new(RawResponse::new(writer.shared(), method, version));
    (response, writer)
}

/// A request with the given head fields and body, as the connection would hand it over.
pub fn request(method: Method, uri: &str, headers: &[(&str, &str)], body: impl Into<Bytes>) -> RawRequest {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let head = builder.body(()).unwrap_or_else(|e| panic!("invalid test request: {e}"));
    RawRequest::new(head, body.into(), Some(([127, 0, 0, 1], 40000).into()))
}

/// A response read back from raw bytes, with any chunked framing removed.
#[derive(Debug)]
pub struct ParsedResponse {
    pub status: StatusCode,
    pub reason: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ParsedResponse {
    /// Parses the first response in `raw`, skipping interim `1xx` responses.
    ///
    /// Panics on malformed input.
    pub fn parse(raw: &[u8]) -> Self {
        let mut offset = 0;
        loop {
            let mut headers = [httparse::EMPTY_HEADER; 64];
            let mut response = httparse::Response::new(&mut headers);
            let head_len = match response.parse(&raw[offset..]) {
                Ok(httparse::Status::Complete(len)) => len,
                other => panic!("incomplete response head: {other:?}"),
            };

            let code = response.code.unwrap_or_default();
            let status = StatusCode::from_u16(code).unwrap_or_else(|e| panic!("bad status {code}: {e}"));
            if status.is_informational() {
                offset += head_len;
                continue;
            }

            let mut map = HeaderMap::new();
            for header in response.headers.iter() {
                let name = HeaderName::from_bytes(header.name.as_bytes()).unwrap_or_else(|e| panic!("{e}"));
                let value = HeaderValue::from_bytes(header.value).unwrap_or_else(|e| panic!("{e}"));
                map.append(name, value);
            }
            let reason = response.reason.unwrap_or_default().to_string();

            let rest = &raw[offset + head_len..];
            let chunked = map
                .get(http::header::TRANSFER_ENCODING)
                .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"chunked"));
            let body = match map.get(http::header::CONTENT_LENGTH) {
                _ if chunked => decode_chunked(rest),
                Some(length) => {
                    let length: usize = length.to_str().ok().and_then(|v| v.parse().ok()).unwrap_or_default();
                    rest[..length.min(rest.len())].to_vec()
                }
                None => rest.to_vec(),
            };

            return Self { status, reason, headers: map, body };
        }
    }
}

fn decode_chunked(mut rest: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    loop {
        let Some(line_end) = rest.windows(2).position(|w| w == b"\r\n") else {
            return body;
        };
        let size = std::str::from_utf8(&rest[..line_end])
            .ok()
            .and_then(|line| usize::from_str_radix(line.trim(), 16).ok())
            .unwrap_or_default();
        rest = &rest[line_end + 2..];
        if size == 0 || rest.len() < size {
            return body;
        }
        body.extend_from_slice(&rest[..size]);
        rest = &rest[(size + 2).min(rest.len())..];
    }
}
