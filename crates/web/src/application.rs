//! The application: registered middleware, configuration and the error sink.

use std::fmt;
use std::io;
use std::sync::Arc;

use onion_http::protocol::{RawRequest, RawResponse};
use serde_json::Value;
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{debug, warn};

use crate::compose::compose;
use crate::config::{AppConfig, AppSummary};
use crate::context::Context;
use crate::error::Error;
use crate::handler::RequestHandler;
use crate::middleware::{BoxedMiddleware, LegacyMiddleware, Middleware, convert};
use crate::server::Server;
use crate::sink::{DefaultErrorSink, ErrorSink};

/// What a running request sees of its application.
pub(crate) struct AppCore {
    config: AppConfig,
    error_sink: Arc<dyn ErrorSink>,
}

impl AppCore {
    pub(crate) fn new(config: AppConfig, error_sink: Arc<dyn ErrorSink>) -> Self {
        Self { config, error_sink }
    }

    pub(crate) fn config(&self) -> &AppConfig {
        &self.config
    }

    pub(crate) fn emit_error(&self, err: &Error) {
        self.error_sink.on_error(err);
    }

    pub(crate) fn to_json(&self) -> Value {
        summary_json(&self.config.summary())
    }

    pub(crate) fn create_context(app: &Arc<Self>, req: RawRequest, res: Arc<RawResponse>) -> Context {
        Context::new(Arc::clone(app), req, res)
    }
}

impl fmt::Debug for AppCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.config.summary(), f)
    }
}

/// Collects middleware and serves them.
///
/// ```no_run
/// use onion_web::{Application, Context, Error, Next};
///
/// #[tokio::main]
/// async fn main() -> std::io::Result<()> {
///     let mut app = Application::new();
///     app.use_middleware(|ctx: Context, _next: Next| async move {
///         ctx.set_body("Hello World!");
///         Ok::<(), Error>(())
///     });
///
///     let server = app.listen("127.0.0.1:3000").await?;
///     server.join().await
/// }
/// ```
pub struct Application {
    config: AppConfig,
    error_sink: Arc<dyn ErrorSink>,
    middleware: Vec<BoxedMiddleware>,
}

impl Application {
    /// An application configured from the environment.
    pub fn new() -> Self {
        Self::with_config(AppConfig::from_env())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let error_sink = Arc::new(DefaultErrorSink::new(config.silent()));
        Self { config, error_sink, middleware: Vec::new() }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Replaces the error sink, which defaults to [`DefaultErrorSink`].
    pub fn on_error<S: ErrorSink + 'static>(&mut self, sink: S) -> &mut Self {
        self.error_sink = Arc::new(sink);
        self
    }

    /// Appends a middleware; it runs after everything registered before it.
    pub fn use_middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        debug!(name = middleware.name(), "use middleware");
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends a middleware written against the legacy convention.
    pub fn use_legacy<L: LegacyMiddleware>(&mut self, middleware: L) -> &mut Self {
        let middleware = convert(middleware);
        warn!(
            name = middleware.name(),
            "legacy middleware is deprecated, implement `Middleware` with an async `handle` instead"
        );
        self.middleware.push(middleware);
        self
    }

    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    /// Composes the current middleware into a handler for the transport.
    ///
    /// Middleware registered afterwards does not affect the returned handler.
    pub fn callback(&self) -> RequestHandler {
        let core = AppCore::new(self.config.clone(), Arc::clone(&self.error_sink));
        RequestHandler::new(Arc::new(core), compose(self.middleware.iter().map(Arc::clone)))
    }

    /// Binds `addr` and serves [`callback`](Self::callback) on it until the server is shut down.
    pub async fn listen<A: ToSocketAddrs>(&self, addr: A) -> io::Result<Server> {
        let listener = TcpListener::bind(addr).await?;
        Server::start(listener, Arc::new(self.callback()))
    }

    /// Creates the context for one request, without running any middleware.
    pub fn create_context(&self, req: RawRequest, res: Arc<RawResponse>) -> Context {
        let core = AppCore::new(self.config.clone(), Arc::clone(&self.error_sink));
        AppCore::create_context(&Arc::new(core), req, res)
    }

    /// The public settings: `subdomainOffset`, `proxy` and `env`.
    pub fn summary(&self) -> AppSummary {
        self.config.summary()
    }

    pub fn to_json(&self) -> Value {
        summary_json(&self.summary())
    }
}

fn summary_json(summary: &AppSummary) -> Value {
    serde_json::to_value(summary).unwrap_or(Value::Null)
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.summary(), f)
    }
}
