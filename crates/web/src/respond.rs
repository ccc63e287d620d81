//! Writes the context's outcome to the transport once the pipeline has succeeded.

use std::mem;

use bytes::Bytes;
use futures::StreamExt;
use http::header::{self, HeaderValue};
use http::Method;
use tracing::trace;

use crate::body::Body;
use crate::context::Context;
use crate::error::Result;
use crate::status;

/// Sends status, headers and body.
///
/// Does nothing in manual mode or when the response can no longer be written, so running
/// it a second time is harmless. HEAD responses only get a computed length for JSON bodies.
pub(crate) async fn respond(ctx: &Context) -> Result<()> {
    if !ctx.respond_enabled() {
        trace!("respond disabled, leaving the response to middleware");
        return Ok(());
    }

    let res = ctx.raw_response();
    if !res.writable() {
        return Ok(());
    }

    let code = res.status();
    if status::is_empty(code) {
        ctx.response().set_body(Body::Empty);
        res.end(None).await?;
        return Ok(());
    }

    let body = mem::take(&mut ctx.outgoing().body);

    if *ctx.method() == Method::HEAD {
        if !res.headers_sent() {
            if let Body::Json(value) = &body {
                let len = serde_json::to_vec(value)?.len();
                res.headers().insert(header::CONTENT_LENGTH, HeaderValue::from(len));
            }
        }
        res.end(None).await?;
        return Ok(());
    }

    match body {
        Body::Empty => {
            let message = ctx.response().message();
            if !res.headers_sent() {
                let mut headers = res.headers();
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(message.len()));
            }
            res.end(Some(Bytes::from(message))).await?;
        }
        Body::Bytes(bytes) => res.end(Some(bytes)).await?,
        Body::Text(text) => res.end(Some(Bytes::from(text))).await?,
        Body::Stream(mut stream) => {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                if !chunk.is_empty() {
                    res.write(chunk).await?;
                }
            }
            res.end(None).await?;
        }
        Body::Json(value) => {
            let json = serde_json::to_vec(&value)?;
            if !res.headers_sent() {
                res.headers().insert(header::CONTENT_LENGTH, HeaderValue::from(json.len()));
            }
            res.end(Some(Bytes::from(json))).await?;
        }
    }
    Ok(())
}
