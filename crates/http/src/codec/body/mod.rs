//! Payload framing for both directions.
//!
//! Inbound bodies go through [`PayloadDecoder`], which dispatches to the length or chunked
//! decoder picked from the request head. Outbound bodies are framed by [`PayloadEncoder`].

mod chunked_decoder;
mod length_decoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
