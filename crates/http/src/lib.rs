//! A small HTTP/1.1 transport built on tokio.
//!
//! The crate reads requests off a connection, buffers their bodies, and hands each one to a
//! [`handler::Handler`] together with a shared [`protocol::RawResponse`]. The response is
//! written the way a streaming server writes it: head fields are mutable until the first
//! byte goes out, then chunks follow until `end`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use onion_http::connection::HttpConnection;
//! use onion_http::handler::make_handler;
//! use onion_http::protocol::{RawRequest, RawResponse};
//! use tokio::net::TcpListener;
//!
//! async fn hello(_req: RawRequest, res: Arc<RawResponse>) {
//!     let _ = res.end(Some(Bytes::from_static(b"Hello World!"))).await;
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     let handler = Arc::new(make_handler(hello));
//!     loop {
//!         let (stream, remote_addr) = listener.accept().await?;
//!         let handler = handler.clone();
//!         tokio::spawn(async move {
//!             let (reader, writer) = stream.into_split();
//!             let _ = HttpConnection::new(reader, writer).with_remote_addr(remote_addr).process(handler).await;
//!         });
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! - [`connection`]: connection lifecycle, keep-alive and abort detection
//! - [`protocol`]: request and response handles, errors
//! - [`codec`]: request decoding and response head encoding
//! - [`handler`]: the handler trait
//! - [`testing`]: in-memory writers and a response parser for tests
//!
//! # Limits
//!
//! - HTTP/1.0 and HTTP/1.1 only, no TLS
//! - request heads up to 8 KiB and 64 header fields
//! - request bodies up to [`connection::MAX_BODY_SIZE`]

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod testing;

mod date;
mod utils;
pub(crate) use utils::ensure;
