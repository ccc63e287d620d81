use bytes::{Bytes, BytesMut};
use std::io::Write;

use crate::protocol::SendError;
use crate::utils::FastWrite;

/// How the payload of an outgoing response is framed, decided when its head is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoder {
    /// `Content-Length` delimited, bytes are copied as they are
    Length,

    /// `Transfer-Encoding: chunked`
    Chunked { eof: bool },

    /// delimited by closing the connection (HTTP/1.0 without a length)
    Close,

    /// the response carries no payload (HEAD, 1xx, 204, 304)
    NoBody,
}

impl PayloadEncoder {
    pub fn chunked() -> Self {
        Self::Chunked { eof: false }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self, Self::Chunked { .. })
    }

    pub fn has_body(&self) -> bool {
        !matches!(self, Self::NoBody)
    }

    pub fn encode_chunk(&mut self, bytes: &Bytes, dst: &mut BytesMut) -> Result<(), SendError> {
        match self {
            Self::Length | Self::Close => {
                dst.extend_from_slice(bytes);
                Ok(())
            }
            Self::Chunked { eof: false } => {
                // a zero sized chunk would terminate the body
                if bytes.is_empty() {
                    return Ok(());
                }
                write!(FastWrite(dst), "{:X}\r\n", bytes.len())?;
                dst.reserve(bytes.len() + 2);
                dst.extend_from_slice(bytes);
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
            Self::Chunked { eof: true } => Err(SendError::invalid_body("chunk written after the last chunk")),
            Self::NoBody => Ok(()),
        }
    }

    pub fn encode_eof(&mut self, dst: &mut BytesMut) {
        if let Self::Chunked { eof } = self {
            if !*eof {
                *eof = true;
                dst.extend_from_slice(b"0\r\n\r\n");
            }
        }
    }
}
