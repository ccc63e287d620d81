//! Connection lifecycle: request decoding, handler dispatch and keep-alive.

mod http_connection;

pub use http_connection::{HttpConnection, MAX_BODY_SIZE};
