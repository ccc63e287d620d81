//! The seam between a connection and the code answering its requests.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::{RawRequest, RawResponse};

/// Answers one request by writing to the shared [`RawResponse`].
///
/// The connection waits for `call` to return. A handler that returns without ending the
/// response leaves the connection to close it.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, req: RawRequest, res: Arc<RawResponse>);
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(RawRequest, Arc<RawResponse>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn call(&self, req: RawRequest, res: Arc<RawResponse>) {
        (self.f)(req, res).await
    }
}

/// Wraps an async function into a [`Handler`].
pub fn make_handler<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(RawRequest, Arc<RawResponse>) -> Fut,
    Fut: Future<Output = ()>,
{
    HandlerFn { f }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn call(&self, req: RawRequest, res: Arc<RawResponse>) {
        (**self).call(req, res).await
    }
}
