//! The response view of a [`Context`].
//!
//! Status and headers live on the raw transport response, the body on the context until
//! the finalizer writes it.

use http::header::{self, HeaderName, HeaderValue};
use http::StatusCode;

use crate::accepts::mime_for;
use crate::body::Body;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::status;

#[derive(Debug, Clone)]
pub struct Response {
    ctx: Context,
}

impl Response {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// The owning context.
    pub fn ctx(&self) -> &Context {
        &self.ctx
    }

    pub fn request(&self) -> Request {
        self.ctx.request()
    }

    pub fn status(&self) -> StatusCode {
        self.ctx.raw_response().status()
    }

    /// Sets the status explicitly. Ignored once headers are sent.
    ///
    /// An empty status (204, 205, 304) drops any body assigned so far.
    pub fn set_status(&self, status: StatusCode) {
        let res = self.ctx.raw_response();
        if res.headers_sent() {
            return;
        }

        res.set_status(status);
        self.ctx.outgoing().explicit_status = true;

        let has_body = !self.ctx.outgoing().body.is_empty();
        if has_body && status::is_empty(status) {
            self.set_body(Body::Empty);
        }
    }

    /// The reason phrase: custom when set, canonical otherwise.
    pub fn message(&self) -> String {
        self.ctx.raw_response().reason().unwrap_or_else(|| status::message(self.status()))
    }

    /// Sets a custom reason phrase; line breaks and other control characters are refused.
    pub fn set_message(&self, message: impl Into<String>) -> Result<()> {
        self.ctx.raw_response().set_reason(message)?;
        Ok(())
    }

    /// Runs `f` on the current body.
    pub fn with_body<R>(&self, f: impl FnOnce(&Body) -> R) -> R {
        f(&self.ctx.outgoing().body)
    }

    pub fn has_body(&self) -> bool {
        self.with_body(|body| !body.is_empty())
    }

    /// Assigns the body and derives the headers that go with it.
    ///
    /// A non-empty body turns a status that was never set explicitly into 200 and defaults
    /// the content type. The empty body strips the content headers and keeps the status.
    pub fn set_body(&self, body: impl Into<Body>) {
        let body = body.into();
        let res = self.ctx.raw_response();
        let mut outgoing = self.ctx.outgoing();

        if body.is_empty() {
            outgoing.body = Body::Empty;
            drop(outgoing);
            let mut headers = res.headers();
            headers.remove(header::CONTENT_TYPE);
            headers.remove(header::CONTENT_LENGTH);
            headers.remove(header::TRANSFER_ENCODING);
            return;
        }

        if !outgoing.explicit_status {
            res.set_status(StatusCode::OK);
        }

        {
            let mut headers = res.headers();
            let set_type = !headers.contains_key(header::CONTENT_TYPE);
            let default_type = match &body {
                Body::Text(text) if text.trim_start().starts_with('<') => "text/html; charset=utf-8",
                Body::Text(_) => "text/plain; charset=utf-8",
                Body::Json(_) => "application/json; charset=utf-8",
                Body::Empty | Body::Bytes(_) | Body::Stream(_) => "application/octet-stream",
            };
            if set_type || matches!(body, Body::Json(_)) {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(default_type));
            }

            match body.len_hint() {
                Some(len) if !body.is_stream() && !matches!(body, Body::Json(_)) => {
                    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
                }
                _ => {
                    headers.remove(header::CONTENT_LENGTH);
                }
            }
        }

        outgoing.body = body;
    }

    /// `Content-Length` when set, otherwise the length of a bytes, text or JSON body.
    pub fn length(&self) -> Option<u64> {
        if let Some(len) = self.get(header::CONTENT_LENGTH.as_str()) {
            return len.trim().parse().ok();
        }
        self.with_body(|body| match body {
            Body::Empty | Body::Stream(_) => None,
            Body::Json(value) => serde_json::to_vec(value).ok().map(|json| json.len() as u64),
            Body::Bytes(_) | Body::Text(_) => body.len_hint(),
        })
    }

    pub fn set_length(&self, len: u64) {
        self.ctx.raw_response().headers().insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    /// The response media type without parameters.
    pub fn content_type(&self) -> Option<String> {
        self.get(header::CONTENT_TYPE.as_str())
            .and_then(|value| value.parse::<mime::Mime>().ok())
            .map(|mime| mime.essence_str().to_owned())
    }

    /// Sets `Content-Type` from a short name (`json`, `html`, ...) or a full media type.
    ///
    /// Textual types get `charset=utf-8`; an unknown name removes the header.
    pub fn set_type(&self, name: &str) {
        let mut headers = self.ctx.raw_response().headers();
        match content_type_for(name) {
            Some(value) => {
                headers.insert(header::CONTENT_TYPE, value);
            }
            None => {
                headers.remove(header::CONTENT_TYPE);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        let headers = self.ctx.raw_response().headers();
        headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_owned)
    }

    pub fn has(&self, name: &str) -> bool {
        self.ctx.raw_response().headers().contains_key(name)
    }

    /// Sets a header, replacing earlier values.
    pub fn set(&self, name: &str, value: &str) -> Result<()> {
        let (name, value) = header_pair(name, value)?;
        self.ctx.raw_response().headers().insert(name, value);
        Ok(())
    }

    /// Adds a header value next to the existing ones.
    pub fn append(&self, name: &str, value: &str) -> Result<()> {
        let (name, value) = header_pair(name, value)?;
        self.ctx.raw_response().headers().append(name, value);
        Ok(())
    }

    pub fn remove(&self, name: &str) {
        self.ctx.raw_response().headers().remove(name);
    }

    pub fn headers_sent(&self) -> bool {
        self.ctx.raw_response().headers_sent()
    }

    pub fn writable(&self) -> bool {
        self.ctx.raw_response().writable()
    }

    /// Redirects to `url`: `Location`, a 302 unless a redirect status is already set, and a
    /// short html or text body depending on what the client accepts.
    pub fn redirect(&self, url: &str) -> Result<()> {
        self.set(header::LOCATION.as_str(), url)?;
        if !status::is_redirect(self.status()) {
            self.set_status(StatusCode::FOUND);
        }

        if self.ctx.accepts().accepts_type(&["html"]).is_some() {
            let url = escape_html(url);
            self.set_type("html");
            self.set_body(format!("Redirecting to <a href=\"{url}\">{url}</a>."));
        } else {
            self.set_type("text");
            self.set_body(format!("Redirecting to {url}."));
        }
        Ok(())
    }
}

fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes()).map_err(Error::from_err)?;
    let value = HeaderValue::from_str(value).map_err(Error::from_err)?;
    Ok((name, value))
}

fn content_type_for(name: &str) -> Option<HeaderValue> {
    let mime = mime_for(name)?;
    let textual = mime.type_() == mime::TEXT || mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON);
    if textual && mime.get_param(mime::CHARSET).is_none() {
        HeaderValue::from_str(&format!("{mime}; charset=utf-8")).ok()
    } else {
        HeaderValue::from_str(mime.as_ref()).ok()
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::testing::{context, context_for};
    use bytes::Bytes;
    use futures::stream;
    use http::Method;
    use serde_json::json;

    #[test]
    fn body_switches_status_to_ok() {
        let res = context().response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        res.set_body("hello");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.get("content-type").as_deref(), Some("text/plain; charset=utf-8"));
        assert_eq!(res.length(), Some(5));
    }

    #[test]
    fn explicit_status_is_kept() {
        let res = context().response();
        res.set_status(StatusCode::CREATED);
        res.set_body(Bytes::from_static(b"\x00\x01"));

        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.content_type().as_deref(), Some("application/octet-stream"));
        assert_eq!(res.get("content-length").as_deref(), Some("2"));
    }

    #[test]
    fn default_types() {
        let res = context().response();

        res.set_body("<p>hi</p>");
        assert_eq!(res.content_type().as_deref(), Some("text/html"));

        res.set_type("xml");
        res.set_body("<note/>");
        assert_eq!(res.content_type().as_deref(), Some("application/xml"));

        res.set_body(json!({"a": 1}));
        assert_eq!(res.content_type().as_deref(), Some("application/json"));
        assert!(!res.has("content-length"));
        assert_eq!(res.length(), Some(7));

        res.set_body(Body::stream(stream::iter([Ok::<_, std::io::Error>(Bytes::from_static(b"x"))])));
        assert!(!res.has("content-length"));
        assert_eq!(res.length(), None);
    }

    #[test]
    fn empty_body_strips_headers_keeps_status() {
        let res = context().response();
        res.set_body("text");
        res.set_status(StatusCode::ACCEPTED);
        res.set_body(Body::Empty);

        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert!(!res.has("content-type"));
        assert!(!res.has("content-length"));
        assert!(!res.has_body());
    }

    #[test]
    fn empty_status_clears_body() {
        let res = context().response();
        res.set_body("gone");
        res.set_status(StatusCode::NO_CONTENT);

        assert!(!res.has_body());
        assert!(!res.has("content-type"));
    }

    #[test]
    fn message_and_headers() {
        let res = context().response();
        assert_eq!(res.message(), "Not Found");
        res.set_message("Nothing").unwrap();
        assert_eq!(res.message(), "Nothing");
        assert!(res.set_message("Nothing\r\nx-injected: 1").is_err());
        assert_eq!(res.message(), "Nothing");

        res.set("x-a", "1").unwrap();
        res.append("x-a", "2").unwrap();
        assert!(res.has("x-a"));
        assert_eq!(res.get("x-a").as_deref(), Some("1"));
        res.remove("x-a");
        assert!(!res.has("x-a"));

        assert!(res.set("bad header", "1").is_err());
        assert!(res.set("x-b", "line\nbreak").is_err());
    }

    #[test]
    fn set_type_short_names() {
        let res = context().response();
        res.set_type("json");
        assert_eq!(res.get("content-type").as_deref(), Some("application/json; charset=utf-8"));
        res.set_type("png");
        assert_eq!(res.get("content-type").as_deref(), Some("image/png"));
        res.set_type("no-such-type");
        assert!(!res.has("content-type"));
    }

    #[test]
    fn redirect_html_by_default() {
        let res = context().response();
        res.redirect("/login?next=<x>").unwrap();

        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(res.get("location").as_deref(), Some("/login?next=<x>"));
        assert_eq!(res.content_type().as_deref(), Some("text/html"));
        res.with_body(|body| match body {
            Body::Text(text) => assert_eq!(text, "Redirecting to <a href=\"/login?next=&lt;x&gt;\">/login?next=&lt;x&gt;</a>."),
            other => panic!("unexpected body {other:?}"),
        });
    }

    #[test]
    fn redirect_text_keeps_redirect_status() {
        let (ctx, _) = context_for(AppConfig::builder().build(), Method::GET, "/", &[("accept", "text/plain")]);
        let res = ctx.response();
        res.set_status(StatusCode::MOVED_PERMANENTLY);
        res.redirect("/new").unwrap();

        assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(res.content_type().as_deref(), Some("text/plain"));
        res.with_body(|body| assert!(matches!(body, Body::Text(text) if text == "Redirecting to /new.")));
    }
}
