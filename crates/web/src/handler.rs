//! The per-request orchestration served to the transport.

use std::sync::Arc;

use async_trait::async_trait;
use onion_http::handler::Handler;
use onion_http::protocol::{RawRequest, RawResponse};
use tracing::{Instrument, debug, debug_span};

use crate::application::AppCore;
use crate::compose::Composed;
use crate::error::Error;
use crate::respond::respond;

/// A composed middleware stage bound to its application, as returned by
/// [`Application::callback`](crate::Application::callback).
///
/// For every request it creates the context, runs the stage, then either finalizes the
/// response or takes the error path. Failures of the connection itself reach the error
/// sink through the response's finished hook.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    app: Arc<AppCore>,
    stage: Composed,
}

impl RequestHandler {
    pub(crate) fn new(app: Arc<AppCore>, stage: Composed) -> Self {
        Self { app, stage }
    }
}

#[async_trait]
impl Handler for RequestHandler {
    async fn call(&self, req: RawRequest, res: Arc<RawResponse>) {
        let span = debug_span!("request", method = %req.method(), uri = %req.uri());

        async {
            let ctx = AppCore::create_context(&self.app, req, Arc::clone(&res));

            let app = Arc::clone(&self.app);
            res.on_finished(move |failure| {
                if let Some(cause) = failure {
                    app.emit_error(&Error::from_err(cause));
                }
            });

            match self.stage.call(ctx.clone()).await {
                Ok(()) => {
                    if let Err(err) = respond(&ctx).await {
                        ctx.on_error(err).await;
                    }
                }
                Err(err) => {
                    debug!(cause = %err, "middleware failed");
                    ctx.on_error(err).await;
                }
            }
        }
        .instrument(span)
        .await;
    }
}
