//! Decoder for `Transfer-Encoding: chunked` request bodies
//! ([RFC 7230 Section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1)).
//!
//! Chunk extensions and trailer fields are accepted and discarded.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, PayloadItem};

/// Longest accepted chunk-size line, extensions included.
const MAX_SIZE_LINE: usize = 1024;

/// Longest accepted trailer field line.
const MAX_TRAILER_LINE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// expecting `<hex-size>[;ext]\r\n`
    Size,
    /// inside chunk data, with the bytes left in the current chunk
    Data(u64),
    /// expecting the `\r\n` closing a chunk
    DataEnd,
    /// after the last chunk, skipping trailer lines until an empty one
    Trailer,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits the next CRLF terminated line off `src`, without the terminator.
fn take_line(src: &mut BytesMut, limit: usize) -> Result<Option<BytesMut>, ParseError> {
    match src.iter().position(|b| *b == b'\n') {
        Some(lf) => {
            ensure!(lf > 0 && src[lf - 1] == b'\r', ParseError::invalid_body("chunk line must end with CRLF"));
            let mut line = src.split_to(lf + 1);
            line.truncate(lf - 1);
            Ok(Some(line))
        }
        None => {
            ensure!(src.len() <= limit, ParseError::invalid_body("chunk line too long"));
            Ok(None)
        }
    }
}

fn parse_size(line: &[u8]) -> Result<u64, ParseError> {
    let digits = line.split(|b| *b == b';').next().unwrap_or_default();
    let digits = digits.trim_ascii();
    ensure!(!digits.is_empty(), ParseError::invalid_body("missing chunk size"));

    digits.iter().try_fold(0u64, |size, b| {
        let digit = (*b as char).to_digit(16).ok_or_else(|| ParseError::invalid_body("invalid chunk size"))?;
        size.checked_mul(16)
            .and_then(|size| size.checked_add(u64::from(digit)))
            .ok_or_else(|| ParseError::invalid_body("chunk size overflow"))
    })
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Size => {
                    let Some(line) = take_line(src, MAX_SIZE_LINE)? else {
                        return Ok(None);
                    };
                    let size = parse_size(&line)?;
                    trace!(size, "read chunk size");
                    self.state = if size == 0 { State::Trailer } else { State::Data(size) };
                }
                State::Data(remaining) => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let len = usize::try_from(remaining).unwrap_or(usize::MAX).min(src.len());
                    let bytes = src.split_to(len).freeze();
                    let remaining = remaining - len as u64;
                    self.state = if remaining == 0 { State::DataEnd } else { State::Data(remaining) };
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }
                State::DataEnd => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    ensure!(&src[..2] == b"\r\n", ParseError::invalid_body("chunk data must end with CRLF"));
                    src.advance(2);
                    self.state = State::Size;
                }
                State::Trailer => {
                    let Some(line) = take_line(src, MAX_TRAILER_LINE)? else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        trace!("finished reading chunked data");
                        self.state = State::Done;
                    }
                }
                State::Done => return Ok(Some(PayloadItem::Eof)),
            }
        }
    }
}
