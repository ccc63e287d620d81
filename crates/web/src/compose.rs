//! Composition of middleware into one onion-shaped stage.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::trace;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::middleware::BoxedMiddleware;

/// An immutable snapshot of a middleware chain, ready to run contexts through.
#[derive(Clone)]
pub struct Composed {
    chain: Arc<[BoxedMiddleware]>,
}

pub fn compose<I>(middleware: I) -> Composed
where
    I: IntoIterator<Item = BoxedMiddleware>,
{
    Composed { chain: middleware.into_iter().collect() }
}

impl Composed {
    /// Runs `ctx` through the chain; resolves once the outermost middleware returns.
    pub async fn call(&self, ctx: Context) -> Result<()> {
        dispatch(Arc::clone(&self.chain), 0, ctx).await
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

impl fmt::Debug for Composed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.chain.iter().map(|m| m.name())).finish()
    }
}

/// The continuation handed to a middleware: runs the rest of the chain.
pub struct Next {
    chain: Arc<[BoxedMiddleware]>,
    index: usize,
    ctx: Context,
    called: AtomicBool,
}

impl Next {
    /// Runs downstream middleware.
    ///
    /// Allowed once per activation; a second call fails with `next() called multiple times`.
    pub async fn run(&self) -> Result<()> {
        if self.called.swap(true, Ordering::AcqRel) {
            return Err(Error::next_called_multiple_times());
        }
        dispatch(Arc::clone(&self.chain), self.index + 1, self.ctx.clone()).await
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("called", &self.called.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

fn dispatch(chain: Arc<[BoxedMiddleware]>, index: usize, ctx: Context) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let Some(middleware) = chain.get(index).map(Arc::clone) else {
            return Ok(());
        };

        trace!(index, middleware = middleware.name(), "dispatch middleware");
        let next = Next { chain, index, ctx: ctx.clone(), called: AtomicBool::new(false) };

        AssertUnwindSafe(middleware.handle(ctx, next))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(Error::from_panic(payload)))
    })
}
