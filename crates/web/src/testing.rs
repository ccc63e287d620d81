//! Contexts over an in-memory transport.

use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Version};
use onion_http::testing::{MemoryWriter, request, response_for};

use crate::application::AppCore;
use crate::config::AppConfig;
use crate::context::Context;
use crate::sink::{DefaultErrorSink, ErrorSink};

pub(crate) fn app_with(config: AppConfig, sink: impl ErrorSink + 'static) -> Arc<AppCore> {
    Arc::new(AppCore::new(config, Arc::new(sink)))
}

pub(crate) fn context_in(
    app: &Arc<AppCore>,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
) -> (Context, MemoryWriter) {
    let (res, output) = response_for(method.clone(), Version::HTTP_11);
    let ctx = AppCore::create_context(app, request(method, uri, headers, Bytes::new()), res);
    (ctx, output)
}

pub(crate) fn context_for(
    config: AppConfig,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
) -> (Context, MemoryWriter) {
    context_in(&app_with(config, DefaultErrorSink::new(true)), method, uri, headers)
}

/// `GET /` with default settings.
pub(crate) fn context() -> Context {
    context_for(AppConfig::builder().build(), Method::GET, "/", &[]).0
}
