//! Logging, timing, error handling and a JSON endpoint, each as its own middleware.
//!
//! ```sh
//! curl -i 'http://127.0.0.1:3000/greet?name=onion'
//! curl -i 'http://127.0.0.1:3000/greet'
//! curl -i 'http://127.0.0.1:3000/old'
//! ```

use std::time::Instant;

use http::StatusCode;
use onion_web::{AppConfig, Application, Context, Flow, LegacyMiddleware, Next, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

async fn logger(ctx: Context, next: Next) -> Result<()> {
    let result = next.run().await;
    info!(method = %ctx.method(), url = %ctx.url(), status = ctx.status().as_u16(), "request");
    result
}

async fn response_time(ctx: Context, next: Next) -> Result<()> {
    let started = Instant::now();
    next.run().await?;
    ctx.set("x-response-time", &format!("{}ms", started.elapsed().as_millis()))
}

#[derive(Deserialize)]
struct Greet {
    name: Option<String>,
}

async fn greet(ctx: Context, next: Next) -> Result<()> {
    if ctx.path() != "/greet" {
        return next.run().await;
    }

    let query = ctx.request().query_as::<Greet>()?;
    let Some(name) = query.name else {
        return ctx.throw(StatusCode::BAD_REQUEST, "query parameter `name` is required");
    };
    ctx.set_body(json!({ "greeting": format!("Hello {name}!"), "from": ctx.ip() }));
    Ok(())
}

/// Still written against the synchronous before/after hooks.
struct MovedPaths;

impl LegacyMiddleware for MovedPaths {
    fn before(&self, ctx: &Context) -> Result<Flow> {
        if ctx.path() == "/old" {
            ctx.response().redirect("/greet?name=old")?;
            return Ok(Flow::Halt);
        }
        Ok(Flow::Next)
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut app = Application::with_config(AppConfig::builder().env("demo").proxy(true).build());
    app.use_middleware(logger).use_middleware(response_time).use_legacy(MovedPaths).use_middleware(greet);

    let server = app.listen("127.0.0.1:3000").await?;
    info!(summary = %app.to_json(), "serving on {}", server.local_addr());

    tokio::signal::ctrl_c().await?;
    server.shutdown();
    server.join().await
}
