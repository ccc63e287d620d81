//! Serializes a response head and decides how its payload is framed.

use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::{HeaderValue, Method, StatusCode, Version, header};
use tracing::trace;

use crate::codec::body::PayloadEncoder;
use crate::date::DateCache;
use crate::protocol::{ResponseHead, SendError, is_valid_reason};
use crate::utils::FastWrite;

const INIT_HEADER_SIZE: usize = 1024;

/// What the writer knows about the body when the head goes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLength {
    /// the whole body is at hand, `end()` was called before any `write()`
    Known(u64),
    /// more writes may follow
    Streaming,
}

/// Writes response heads for one request: framing depends on the request method and version.
#[derive(Debug, Clone)]
pub struct HeadEncoder {
    method: Method,
    version: Version,
}

impl HeadEncoder {
    pub fn new(method: Method, version: Version) -> Self {
        Self { method, version }
    }

    /// Completes the headers of `head`, writes it to `dst` and returns the payload framing.
    ///
    /// `keep_alive` may be turned off here: by a `Connection: close` set by the caller, or
    /// when a streamed HTTP/1.0 body can only be delimited by closing the connection.
    pub fn encode(
        &self,
        head: &mut ResponseHead,
        length: BodyLength,
        keep_alive: &mut bool,
        dst: &mut BytesMut,
    ) -> Result<PayloadEncoder, SendError> {
        let status = head.status;
        if let Some(reason) = head.reason.as_deref().filter(|reason| !is_valid_reason(reason)) {
            return Err(SendError::invalid_reason(reason));
        }
        let headers = &mut head.headers;

        let encoder = if is_bodiless_status(status) {
            headers.remove(header::CONTENT_LENGTH);
            headers.remove(header::TRANSFER_ENCODING);
            PayloadEncoder::NoBody
        } else if self.method == Method::HEAD {
            // whatever content-length the caller declared describes the GET representation
            PayloadEncoder::NoBody
        } else {
            match length {
                BodyLength::Known(n) => {
                    headers.remove(header::TRANSFER_ENCODING);
                    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(n));
                    PayloadEncoder::Length
                }
                BodyLength::Streaming if headers.contains_key(header::CONTENT_LENGTH) => PayloadEncoder::Length,
                BodyLength::Streaming if self.version == Version::HTTP_11 => {
                    headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
                    PayloadEncoder::chunked()
                }
                BodyLength::Streaming => {
                    *keep_alive = false;
                    PayloadEncoder::Close
                }
            }
        };

        let close_requested = headers
            .get(header::CONNECTION)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.split(',').any(|token| token.trim().eq_ignore_ascii_case("close")));
        if close_requested {
            *keep_alive = false;
        }

        if !*keep_alive {
            headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        } else if self.version == Version::HTTP_10 {
            headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        }

        if !headers.contains_key(header::DATE) {
            headers.insert(header::DATE, DateCache::http_date());
        }

        dst.reserve(INIT_HEADER_SIZE);
        let reason = head.reason.as_deref().or_else(|| status.canonical_reason()).unwrap_or("");
        write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", status.as_str(), reason)?;

        for (name, value) in head.headers.iter() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");

        trace!(status = status.as_u16(), framing = ?encoder, "encoded response head");
        Ok(encoder)
    }
}

/// Statuses that never carry a payload ([RFC 9110 Section 6.4.1](https://www.rfc-editor.org/rfc/rfc9110#section-6.4.1)).
pub fn is_bodiless_status(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(method: Method, version: Version, head: &mut ResponseHead, length: BodyLength) -> (String, PayloadEncoder, bool) {
        let mut keep_alive = true;
        let mut dst = BytesMut::new();
        let encoder = HeadEncoder::new(method, version).encode(head, length, &mut keep_alive, &mut dst).unwrap();
        (String::from_utf8(dst.to_vec()).unwrap(), encoder, keep_alive)
    }

    #[test]
    fn known_length() {
        let mut head = ResponseHead::new(StatusCode::OK);
        head.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(99));
        let (text, encoder, keep_alive) = encode(Method::GET, Version::HTTP_11, &mut head, BodyLength::Known(5));

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-length: 5\r\n"));
        assert!(text.contains("date: "));
        assert!(text.ends_with("\r\n\r\n"));
        assert_eq!(encoder, PayloadEncoder::Length);
        assert!(keep_alive);
    }

    #[test]
    fn streaming_framing_depends_on_version() {
        let (text, encoder, _) =
            encode(Method::GET, Version::HTTP_11, &mut ResponseHead::new(StatusCode::OK), BodyLength::Streaming);
        assert!(text.contains("transfer-encoding: chunked\r\n"));
        assert!(encoder.is_chunked());

        let (text, encoder, keep_alive) =
            encode(Method::GET, Version::HTTP_10, &mut ResponseHead::new(StatusCode::OK), BodyLength::Streaming);
        assert!(!text.contains("transfer-encoding"));
        assert!(text.contains("connection: close\r\n"));
        assert_eq!(encoder, PayloadEncoder::Close);
        assert!(!keep_alive);
    }

    #[test]
    fn bodiless_responses() {
        let mut head = ResponseHead::new(StatusCode::NOT_MODIFIED);
        head.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(10));
        let (text, encoder, _) = encode(Method::GET, Version::HTTP_11, &mut head, BodyLength::Known(0));
        assert!(!text.contains("content-length"));
        assert_eq!(encoder, PayloadEncoder::NoBody);

        let mut head = ResponseHead::new(StatusCode::OK);
        head.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(10));
        let (text, encoder, _) = encode(Method::HEAD, Version::HTTP_11, &mut head, BodyLength::Known(0));
        assert!(text.contains("content-length: 10\r\n"));
        assert_eq!(encoder, PayloadEncoder::NoBody);

        let (text, _, _) = encode(Method::HEAD, Version::HTTP_11, &mut ResponseHead::new(StatusCode::OK), BodyLength::Known(0));
        assert!(!text.contains("content-length"));
    }

    #[test]
    fn custom_reason_and_connection() {
        let mut head = ResponseHead::new(StatusCode::from_u16(599).unwrap());
        head.reason = Some("Gone Fishing".to_string());
        head.headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        let (text, _, keep_alive) = encode(Method::GET, Version::HTTP_11, &mut head, BodyLength::Known(0));

        assert!(text.starts_with("HTTP/1.1 599 Gone Fishing\r\n"));
        assert!(!keep_alive);

        let (text, _, _) =
            encode(Method::GET, Version::HTTP_10, &mut ResponseHead::new(StatusCode::OK), BodyLength::Known(0));
        assert!(text.contains("connection: keep-alive\r\n"));
    }

    #[test]
    fn reason_with_line_break_is_refused() {
        let mut head = ResponseHead::new(StatusCode::OK);
        head.reason = Some("OK\r\nSet-Cookie: s=evil".to_string());
        let mut dst = BytesMut::new();
        let mut keep_alive = true;

        let result = HeadEncoder::new(Method::GET, Version::HTTP_11).encode(&mut head, BodyLength::Known(0), &mut keep_alive, &mut dst);
        assert!(matches!(result, Err(SendError::InvalidReason { .. })));
        assert!(dst.is_empty());
    }
}
