//! The per-request handle passed through the middleware chain.
//!
//! A [`Context`] is a cheap clone of one shared request state. The [`Request`] and
//! [`Response`] views are facades over that same state, so a status set through the
//! response view is what [`Context::status`] reports, and the other way around.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use onion_http::protocol::{RawRequest, RawResponse};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::accepts::Accepts;
use crate::application::AppCore;
use crate::body::Body;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::request::{Request, forwarded_ips};
use crate::response::Response;
use crate::status;

#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    app: Arc<AppCore>,
    req: RawRequest,
    res: Arc<RawResponse>,
    url: Mutex<Uri>,
    original_url: String,
    ip: String,
    accept: Accepts,
    state: Mutex<Map<String, Value>>,
    outgoing: Mutex<Outgoing>,
}

/// What middleware decided about the response so far.
#[derive(Debug)]
pub(crate) struct Outgoing {
    pub(crate) body: Body,
    pub(crate) explicit_status: bool,
    pub(crate) respond: bool,
}

impl Context {
    pub(crate) fn new(app: Arc<AppCore>, req: RawRequest, res: Arc<RawResponse>) -> Self {
        res.set_status(StatusCode::NOT_FOUND);

        let config = app.config();
        let ip = forwarded_ips(config, req.headers())
            .into_iter()
            .next()
            .or_else(|| req.remote_addr().map(|addr| normalize_ip(addr.ip())))
            .unwrap_or_default();
        let accept = Accepts::from_headers(req.headers());
        let original_url = req.uri().to_string();

        Self {
            inner: Arc::new(Inner {
                url: Mutex::new(req.uri().clone()),
                original_url,
                ip,
                accept,
                state: Mutex::new(Map::new()),
                outgoing: Mutex::new(Outgoing { body: Body::Empty, explicit_status: false, respond: true }),
                app,
                req,
                res,
            }),
        }
    }

    pub fn request(&self) -> Request {
        Request::new(self.clone())
    }

    pub fn response(&self) -> Response {
        Response::new(self.clone())
    }

    pub fn config(&self) -> &AppConfig {
        self.inner.app.config()
    }

    pub fn raw_request(&self) -> &RawRequest {
        &self.inner.req
    }

    pub fn raw_response(&self) -> &Arc<RawResponse> {
        &self.inner.res
    }

    /// Request-scoped values shared between middleware. Do not hold the guard across an `.await`.
    pub fn state(&self) -> MappedMutexGuard<'_, Map<String, Value>> {
        MutexGuard::map(self.inner.state.lock(), |state| state)
    }

    pub fn set_state(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.state.lock().insert(key.into(), value.into());
    }

    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.inner.state.lock().get(key).cloned()
    }

    pub fn method(&self) -> &Method {
        self.inner.req.method()
    }

    /// The request target, possibly rewritten by middleware.
    pub fn url(&self) -> Uri {
        self.inner.url.lock().clone()
    }

    pub(crate) fn set_url(&self, url: Uri) {
        *self.inner.url.lock() = url;
    }

    /// The request target as received, unaffected by rewrites.
    pub fn original_url(&self) -> &str {
        &self.inner.original_url
    }

    pub fn path(&self) -> String {
        self.inner.url.lock().path().to_owned()
    }

    /// Client address: the first forwarded address when proxies are trusted, else the peer.
    pub fn ip(&self) -> &str {
        &self.inner.ip
    }

    pub fn accepts(&self) -> &Accepts {
        &self.inner.accept
    }

    pub fn status(&self) -> StatusCode {
        self.inner.res.status()
    }

    pub fn set_status(&self, status: StatusCode) {
        self.response().set_status(status);
    }

    pub fn set_body(&self, body: impl Into<Body>) {
        self.response().set_body(body);
    }

    /// Sets a response header.
    pub fn set(&self, name: &str, value: &str) -> Result<()> {
        self.response().set(name, value)
    }

    /// Reads a request header.
    pub fn get(&self, name: &str) -> Option<String> {
        self.request().header(name).map(str::to_owned)
    }

    /// Always fails with an HTTP error, for `return ctx.throw(..)` or `ctx.throw(..)?`.
    pub fn throw<T>(&self, status: StatusCode, message: impl Into<String>) -> Result<T> {
        Err(Error::new(status, message))
    }

    /// Fails with an HTTP error unless `condition` holds.
    pub fn assert(&self, condition: bool, status: StatusCode, message: impl Into<String>) -> Result<()> {
        if condition { Ok(()) } else { self.throw(status, message) }
    }

    /// Turns the finalizer off: the response is left entirely to middleware.
    pub fn set_respond(&self, respond: bool) {
        self.inner.outgoing.lock().respond = respond;
    }

    pub fn respond_enabled(&self) -> bool {
        self.inner.outgoing.lock().respond
    }

    pub(crate) fn outgoing(&self) -> MutexGuard<'_, Outgoing> {
        self.inner.outgoing.lock()
    }

    /// A JSON description of the request, the response and the application.
    pub fn to_json(&self) -> Value {
        let res = &self.inner.res;
        let message = self.response().message();
        let response_headers = headers_json(&res.headers());
        json!({
            "request": {
                "method": self.method().as_str(),
                "url": self.url().to_string(),
                "header": headers_json(self.inner.req.headers()),
            },
            "response": {
                "status": res.status().as_u16(),
                "message": message,
                "header": response_headers,
            },
            "app": self.inner.app.to_json(),
            "originalUrl": self.original_url(),
        })
    }

    /// Turns a failed pipeline into an error response, then reports the error to the sink.
    ///
    /// Nothing is written when the response has already started or can no longer be written;
    /// a half-written response is destroyed instead.
    pub async fn on_error(&self, err: Error) {
        let res = self.raw_response();

        if res.headers_sent() || !res.writable() {
            if res.writable() {
                debug!("error after the response started, destroying it");
                res.destroy();
            }
        } else {
            let status = err.response_status();
            let message = if err.expose() { err.message().to_owned() } else { status::message(status) };

            {
                let mut headers = res.headers();
                headers.clear();
                for (name, value) in err.headers() {
                    headers.append(name.clone(), value.clone());
                }
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(message.len()));
            }
            res.set_status(status);
            self.outgoing().body = Body::Empty;

            if let Err(e) = res.end(Some(Bytes::from(message))).await {
                debug!(cause = %e, "can't send error response");
            }
        }

        self.inner.app.emit_error(&err);
    }
}

fn normalize_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or_else(|| v6.to_string(), |v4| v4.to_string()),
        IpAddr::V4(v4) => v4.to_string(),
    }
}

fn headers_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        map.insert(name.as_str().to_owned(), Value::String(joined));
    }
    Value::Object(map)
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", self.method())
            .field("url", &self.url())
            .field("status", &self.status())
            .field("ip", &self.ip())
            .finish_non_exhaustive()
    }
}
