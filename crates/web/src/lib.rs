//! A middleware-pipeline web framework on top of `onion-http`.
//!
//! An [`Application`] holds an ordered list of middleware. Every request gets a fresh
//! [`Context`] and runs through the list onion style: each middleware does its inbound
//! work, awaits [`Next::run`] to let the rest of the chain run, then does its outbound work.
//! Once the chain settles the context's status, headers and body are written out; a failed
//! chain becomes an error response instead, and the error goes to the [`ErrorSink`].
//!
//! ```no_run
//! use onion_web::{Application, Context, Error, Next};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let mut app = Application::new();
//!
//!     app.use_middleware(|ctx: Context, next: Next| async move {
//!         next.run().await?;
//!         ctx.set("x-powered-by", "onion")?;
//!         Ok::<(), Error>(())
//!     })
//!     .use_middleware(|ctx: Context, _next: Next| async move {
//!         let name = ctx.request().query().get("name").cloned().unwrap_or_else(|| "World".to_owned());
//!         ctx.set_body(format!("Hello {name}!"));
//!         Ok::<(), Error>(())
//!     });
//!
//!     app.listen("127.0.0.1:3000").await?.join().await
//! }
//! ```
//!
//! What a context ends up as on the wire:
//!
//! | body                 | written as                                        |
//! |----------------------|---------------------------------------------------|
//! | empty                | the status message as `text/plain`                |
//! | bytes / text         | as is, with `Content-Length`                      |
//! | stream               | chunk by chunk, without `Content-Length`          |
//! | JSON                 | serialized, with `Content-Length`                 |
//!
//! Statuses 204, 205 and 304 never carry a body, and a HEAD response never does either.

mod accepts;
mod application;
mod body;
mod compose;
mod config;
mod context;
mod error;
mod handler;
mod middleware;
mod request;
mod respond;
mod response;
mod server;
mod sink;

pub mod status;

#[cfg(test)]
mod testing;

pub use accepts::Accepts;
pub use application::Application;
pub use body::{Body, BodyStream};
pub use compose::{Composed, Next, compose};
pub use config::{AppConfig, AppConfigBuilder, AppSummary, ENV_VAR};
pub use context::Context;
pub use error::{BoxError, Error, Result};
pub use handler::RequestHandler;
pub use middleware::{BoxedMiddleware, Flow, Legacy, LegacyMiddleware, Middleware, convert};
pub use request::Request;
pub use response::Response;
pub use server::Server;
pub use sink::{DefaultErrorSink, ErrorSink};
