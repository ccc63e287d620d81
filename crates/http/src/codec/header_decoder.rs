//! Request head decoding.
//!
//! The head is parsed with `httparse`, then the byte ranges of every header name and value
//! are recorded so the final [`HeaderMap`](http::HeaderMap) can share the split-off buffer
//! instead of copying each field.
//!
//! Limits: 64 header fields and 8 KiB for the whole head. HTTP/1.0 and HTTP/1.1 only.

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Method, Request, Uri, Version, header};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, RequestHeader};

/// Maximum number of headers allowed in a request
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decodes a request head into a [`RequestHeader`] and the [`PayloadSize`] its framing headers announce.
pub struct HeaderDecoder;

/// Byte ranges of a header's name and value inside the head buffer.
#[derive(Clone, Copy, Default)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

impl HeaderIndex {
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let base = bytes.as_ptr() as usize;
        for (header, index) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - base;
            index.name = (name_start, name_start + header.name.len());
            let value_start = header.value.as_ptr() as usize - base;
            index.value = (value_start, value_start + header.value.len());
        }
    }
}

struct ParsedHead {
    method: Method,
    uri: Uri,
    version: Version,
    body_offset: usize,
    header_count: usize,
    indices: [HeaderIndex; MAX_HEADER_NUM],
}

fn parse_head(src: &[u8]) -> Result<Option<ParsedHead>, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
    let mut req = httparse::Request::new(&mut headers);

    let status = req.parse(src).map_err(|e| match e {
        Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
        Error::Version => ParseError::InvalidVersion(None),
        e => ParseError::invalid_header(e),
    })?;

    let body_offset = match status {
        Status::Complete(body_offset) => body_offset,
        Status::Partial => {
            ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
            return Ok(None);
        }
    };

    trace!(head_size = body_offset, "parsed request head");
    ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

    let version = match req.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        other => return Err(ParseError::InvalidVersion(other)),
    };

    let method = req
        .method
        .and_then(|method| Method::from_bytes(method.as_bytes()).ok())
        .ok_or(ParseError::InvalidMethod)?;
    let uri = req.path.and_then(|path| path.parse::<Uri>().ok()).ok_or(ParseError::InvalidUri)?;

    let mut indices = [HeaderIndex::default(); MAX_HEADER_NUM];
    HeaderIndex::record(src, req.headers, &mut indices);

    Ok(Some(ParsedHead { method, uri, version, body_offset, header_count: req.headers.len(), indices }))
}

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(head) = parse_head(src)? else {
            return Ok(None);
        };

        let mut request = Request::new(());
        *request.method_mut() = head.method;
        *request.uri_mut() = head.uri;
        *request.version_mut() = head.version;

        let header_bytes = src.split_to(head.body_offset).freeze();
        let headers = request.headers_mut();
        headers.reserve(head.header_count);
        for index in &head.indices[..head.header_count] {
            let name = HeaderName::from_bytes(&header_bytes[index.name.0..index.name.1]).map_err(ParseError::invalid_header)?;
            let value = HeaderValue::from_maybe_shared(header_bytes.slice(index.value.0..index.value.1))
                .map_err(ParseError::invalid_header)?;
            headers.append(name, value);
        }

        let header = RequestHeader::from(request);
        let payload_size = parse_payload(&header)?;
        Ok(Some((header, payload_size)))
    }
}

/// Picks the request body framing from `Transfer-Encoding` and `Content-Length`
/// ([RFC 9112 Section 6](https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body)).
fn parse_payload(head: &RequestHeader) -> Result<PayloadSize, ParseError> {
    let headers = head.headers();
    let te = headers.get(header::TRANSFER_ENCODING);
    let has_length = headers.contains_key(header::CONTENT_LENGTH);

    match (te, has_length) {
        (None, false) => Ok(PayloadSize::Empty),
        (Some(_), true) => Err(ParseError::invalid_content_length("transfer-encoding and content-length both present")),
        (Some(value), false) => {
            let last = value.as_bytes().rsplit(|b| *b == b',').next().unwrap_or_default().trim_ascii();
            if last.eq_ignore_ascii_case(b"chunked") {
                Ok(PayloadSize::Chunked)
            } else {
                Err(ParseError::unsupported_transfer_encoding(String::from_utf8_lossy(last)))
            }
        }
        (None, true) => {
            let mut length = None;
            for value in headers.get_all(header::CONTENT_LENGTH) {
                let text = value.to_str().map_err(ParseError::invalid_content_length)?;
                for item in text.split(',') {
                    let parsed = item
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| ParseError::invalid_content_length(format!("value {item} is not u64")))?;
                    match length {
                        Some(previous) if previous != parsed => {
                            return Err(ParseError::invalid_content_length("conflicting content-length values"));
                        }
                        _ => length = Some(parsed),
                    }
                }
            }

            match length {
                Some(0) | None => Ok(PayloadSize::Empty),
                Some(n) => Ok(PayloadSize::Length(n)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use indoc::indoc;

    fn decode(raw: &str) -> Result<Option<(RequestHeader, PayloadSize)>, ParseError> {
        HeaderDecoder.decode(&mut BytesMut::from(raw))
    }

    #[test]
    fn leaves_body_in_buffer() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        123"##};

        let mut bytes = BytesMut::from(str);
        let result = HeaderDecoder.decode(&mut bytes).unwrap();

        assert!(result.is_some());
        assert_eq!(&bytes[..], &b"123"[..]);
    }

    #[test]
    fn from_curl() {
        let str = indoc! {r##"
        GET /index.html?a=1 HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##};

        let (header, payload_size) = decode(str).unwrap().unwrap();

        assert!(payload_size.is_empty());
        assert_eq!(header.method(), &Method::GET);
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.uri().path(), "/index.html");
        assert_eq!(header.uri().query(), Some("a=1"));
        assert_eq!(header.headers().len(), 3);
        assert_eq!(header.headers().get(header::HOST).unwrap(), "127.0.0.1:8080");
        assert_eq!(header.headers().get(header::USER_AGENT).unwrap(), "curl/7.79.1");
    }

    #[test]
    fn partial_head_waits() {
        assert!(decode("GET / HTTP/1.1\r\nHost: a").unwrap().is_none());
    }

    #[test]
    fn payload_framing() {
        let (_, size) = decode("POST / HTTP/1.1\r\nContent-Length: 12\r\n\r\n").unwrap().unwrap();
        assert_eq!(size, PayloadSize::Length(12));

        let (_, size) = decode("POST / HTTP/1.1\r\nContent-Length: 0\r\n\r\n").unwrap().unwrap();
        assert_eq!(size, PayloadSize::Empty);

        let (_, size) = decode("POST / HTTP/1.1\r\nTransfer-Encoding: gzip, chunked\r\n\r\n").unwrap().unwrap();
        assert_eq!(size, PayloadSize::Chunked);

        let (_, size) = decode("POST / HTTP/1.1\r\nContent-Length: 4\r\nContent-Length: 4\r\n\r\n").unwrap().unwrap();
        assert_eq!(size, PayloadSize::Length(4));
    }

    #[test]
    fn rejects_bad_framing() {
        let err = decode("POST / HTTP/1.1\r\nTransfer-Encoding: chunked, gzip\r\n\r\n").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedTransferEncoding { .. }));

        let err = decode("POST / HTTP/1.1\r\nContent-Length: 3\r\nContent-Length: 4\r\n\r\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidContentLength { .. }));

        let err = decode("POST / HTTP/1.1\r\nContent-Length: 3\r\nTransfer-Encoding: chunked\r\n\r\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidContentLength { .. }));

        let err = decode("POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidContentLength { .. }));
    }

    #[test]
    fn rejects_oversized_head() {
        let mut raw = String::from("GET / HTTP/1.1\r\nX-Big: ");
        raw.push_str(&"a".repeat(MAX_HEADER_BYTES));
        let err = decode(&raw).unwrap_err();
        assert!(matches!(err, ParseError::TooLargeHeader { .. }));
    }

    #[test]
    fn rejects_too_many_headers() {
        let mut raw = String::from("GET / HTTP/1.1\r\n");
        for i in 0..=MAX_HEADER_NUM {
            raw.push_str(&format!("X-{i}: v\r\n"));
        }
        raw.push_str("\r\n");
        assert!(matches!(decode(&raw).unwrap_err(), ParseError::TooManyHeaders { .. }));
    }
}
