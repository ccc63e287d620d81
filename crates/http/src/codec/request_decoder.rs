//! Streaming request decoding: a head, then the payload items of its body.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header_decoder::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader};

/// Alternates between [`HeaderDecoder`] and a [`PayloadDecoder`] for each request on a connection.
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { header_decoder: HeaderDecoder, payload_decoder: None }
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHeader, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some((header, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((header, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn pipelined_requests() {
        let raw = indoc! {"
            POST /upload HTTP/1.1
            Content-Length: 5

            helloGET /next HTTP/1.1

        "};
        let mut src = BytesMut::from(raw);
        let mut decoder = RequestDecoder::new();

        let Some(Message::Header((header, size))) = decoder.decode(&mut src).unwrap() else {
            panic!("expected a head");
        };
        assert_eq!(header.uri().path(), "/upload");
        assert_eq!(size, PayloadSize::Length(5));

        let Some(Message::Payload(PayloadItem::Chunk(bytes))) = decoder.decode(&mut src).unwrap() else {
            panic!("expected a chunk");
        };
        assert_eq!(&bytes[..], b"hello");
        assert!(matches!(decoder.decode(&mut src).unwrap(), Some(Message::Payload(PayloadItem::Eof))));

        let Some(Message::Header((header, size))) = decoder.decode(&mut src).unwrap() else {
            panic!("expected the second head");
        };
        assert_eq!(header.uri().path(), "/next");
        assert!(size.is_empty());
        assert!(matches!(decoder.decode(&mut src).unwrap(), Some(Message::Payload(PayloadItem::Eof))));
        assert!(decoder.decode(&mut src).unwrap().is_none());
    }
}
