//! Middleware: the unit the pipeline is composed of.
//!
//! A middleware receives the request [`Context`] and a [`Next`] continuation. Code before
//! `next.run().await` runs on the way in, code after it runs on the way out.
//!
//! ```
//! use onion_web::{Context, Next, Result};
//!
//! async fn timing(ctx: Context, next: Next) -> Result<()> {
//!     let started = std::time::Instant::now();
//!     next.run().await?;
//!     ctx.response().set("x-response-time", &format!("{}ms", started.elapsed().as_millis()))?;
//!     Ok(())
//! }
//! ```

use std::any::type_name;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::compose::Next;
use crate::context::Context;
use crate::error::Result;

#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, ctx: Context, next: Next) -> Result<()>;

    /// Name used in logs.
    fn name(&self) -> &str {
        type_name::<Self>()
    }
}

pub type BoxedMiddleware = Arc<dyn Middleware>;

#[async_trait]
impl<F, Fut> Middleware for F
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, ctx: Context, next: Next) -> Result<()> {
        (self)(ctx, next).await
    }
}

/// Whether a legacy middleware lets the request continue downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Next,
    Halt,
}

/// The older, synchronous calling convention: a hook before downstream and one after.
///
/// Register it with [`Application::use_legacy`](crate::Application::use_legacy); it is
/// wrapped into a [`Middleware`] at registration.
pub trait LegacyMiddleware: Send + Sync + 'static {
    fn before(&self, ctx: &Context) -> Result<Flow>;

    /// Runs after downstream succeeded. Skipped when `before` halted.
    fn after(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

/// Adapts a [`LegacyMiddleware`] to the [`Middleware`] convention.
#[derive(Debug)]
pub struct Legacy<L> {
    inner: L,
}

impl<L: LegacyMiddleware> Legacy<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<L: LegacyMiddleware> Middleware for Legacy<L> {
    async fn handle(&self, ctx: Context, next: Next) -> Result<()> {
        match self.inner.before(&ctx)? {
            Flow::Next => {
                next.run().await?;
                self.inner.after(&ctx)
            }
            Flow::Halt => Ok(()),
        }
    }

    fn name(&self) -> &str {
        type_name::<L>()
    }
}

pub fn convert<L: LegacyMiddleware>(legacy: L) -> BoxedMiddleware {
    Arc::new(Legacy::new(legacy))
}
