//! Wire format of HTTP/1.x messages.
//!
//! - [`RequestDecoder`] turns the inbound byte stream into a head followed by payload items.
//! - [`HeadEncoder`] serializes a response head and picks a [`PayloadEncoder`] framing for its body.

mod body;
mod head_encoder;
mod header_decoder;
mod request_decoder;

pub use body::{PayloadDecoder, PayloadEncoder};
pub use head_encoder::{BodyLength, HeadEncoder, is_bodiless_status};
pub use header_decoder::HeaderDecoder;
pub use request_decoder::RequestDecoder;
