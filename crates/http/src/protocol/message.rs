use bytes::Bytes;

/// One decoded unit of an inbound HTTP message.
///
/// The decoder first yields a [`Message::Header`] carrying the parsed head and its
/// framing, then zero or more [`Message::Payload`] items ending with [`PayloadItem::Eof`].
#[derive(Debug)]
pub enum Message<T> {
    /// Contains the header information of type `T`
    Header(T),
    /// Contains a chunk of payload data or EOF marker
    Payload(PayloadItem),
}

/// Represents an item in the HTTP message payload stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    /// A chunk of payload data
    Chunk(Bytes),
    /// Marks the end of the payload stream
    Eof,
}

/// How the payload of a message is delimited on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload using chunked transfer encoding
    Chunked,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

impl PayloadItem {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    /// Returns a reference to the contained bytes if this is a Chunk
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}
