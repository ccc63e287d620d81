//! The request view of a [`Context`].
//!
//! Derived fields (host, protocol, forwarded addresses, subdomains) are computed on access
//! from the raw request headers and the application config.

use std::collections::HashMap;
use std::net::IpAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri, Version, header};
use serde::de::DeserializeOwned;

use crate::accepts::Accepts;
use crate::config::AppConfig;
use crate::context::Context;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Request {
    ctx: Context,
}

impl Request {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// The owning context.
    pub fn ctx(&self) -> &Context {
        &self.ctx
    }

    pub fn method(&self) -> &Method {
        self.ctx.raw_request().method()
    }

    pub fn version(&self) -> Version {
        self.ctx.raw_request().version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.ctx.raw_request().headers()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|value| value.to_str().ok())
    }

    pub fn url(&self) -> Uri {
        self.ctx.url()
    }

    /// Rewrites the request target seen by downstream middleware. The original url is kept.
    pub fn set_url(&self, url: &str) -> Result<()> {
        let url = url.parse::<Uri>().map_err(|e| Error::from_err(e).with_status(StatusCode::BAD_REQUEST))?;
        self.ctx.set_url(url);
        Ok(())
    }

    pub fn original_url(&self) -> &str {
        self.ctx.original_url()
    }

    pub fn path(&self) -> String {
        self.ctx.path()
    }

    /// The raw query string, without the leading `?`. Empty when absent.
    pub fn query_string(&self) -> String {
        self.ctx.url().query().unwrap_or_default().to_owned()
    }

    /// Decoded query parameters. A repeated key keeps its last value.
    pub fn query(&self) -> HashMap<String, String> {
        serde_urlencoded::from_str::<Vec<(String, String)>>(&self.query_string())
            .map(|pairs| pairs.into_iter().collect())
            .unwrap_or_default()
    }

    /// Deserializes the query string, failing with 400 when it does not fit `T`.
    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_urlencoded::from_str(&self.query_string())
            .map_err(|e| Error::new(StatusCode::BAD_REQUEST, format!("invalid query string: {e}")))
    }

    /// `Host`, or `X-Forwarded-Host` when proxies are trusted. Includes the port.
    pub fn host(&self) -> Option<String> {
        let forwarded = self
            .config()
            .proxy()
            .then(|| self.header("x-forwarded-host"))
            .flatten()
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        forwarded
            .or_else(|| self.header(header::HOST.as_str()))
            .or_else(|| self.ctx.raw_request().uri().authority().map(|a| a.as_str()))
            .map(str::to_owned)
    }

    /// The host without its port.
    pub fn hostname(&self) -> Option<String> {
        let host = self.host()?;
        if host.starts_with('[') {
            // bracketed IPv6 literal
            return host.find(']').map(|end| host[1..end].to_owned());
        }
        Some(host.split(':').next().unwrap_or_default().to_owned())
    }

    /// `https` when a trusted proxy says so, `http` otherwise.
    pub fn protocol(&self) -> String {
        if self.config().proxy() {
            if let Some(proto) = self.header("x-forwarded-proto").and_then(|value| value.split(',').next()) {
                let proto = proto.trim();
                if !proto.is_empty() {
                    return proto.to_ascii_lowercase();
                }
            }
        }
        "http".to_owned()
    }

    pub fn secure(&self) -> bool {
        self.protocol() == "https"
    }

    /// Forwarded client addresses, empty unless proxies are trusted.
    pub fn ips(&self) -> Vec<String> {
        forwarded_ips(self.config(), self.headers())
    }

    pub fn ip(&self) -> &str {
        self.ctx.ip()
    }

    /// Host labels left of the root domain, closest to the root first.
    ///
    /// For `tobi.ferrets.example.com` with the default offset this is `["ferrets", "tobi"]`.
    pub fn subdomains(&self) -> Vec<String> {
        let Some(hostname) = self.hostname() else {
            return Vec::new();
        };
        if hostname.parse::<IpAddr>().is_ok() {
            return Vec::new();
        }

        hostname.split('.').rev().skip(self.config().subdomain_offset()).map(str::to_owned).collect()
    }

    /// The declared `Content-Length`.
    pub fn length(&self) -> Option<u64> {
        self.header(header::CONTENT_LENGTH.as_str()).and_then(|value| value.trim().parse().ok())
    }

    /// The request `Content-Type` without parameters.
    pub fn content_type(&self) -> Option<String> {
        self.header(header::CONTENT_TYPE.as_str())
            .and_then(|value| value.parse::<mime::Mime>().ok())
            .map(|mime| mime.essence_str().to_owned())
    }

    pub fn idempotent(&self) -> bool {
        matches!(*self.method(), Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE)
    }

    pub fn accepts(&self) -> &Accepts {
        self.ctx.accepts()
    }

    /// The buffered request body.
    pub fn body(&self) -> &Bytes {
        self.ctx.raw_request().body()
    }

    /// Parses the body as JSON, failing with 400 on malformed input.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(self.body()).map_err(|e| Error::from(e).with_status(StatusCode::BAD_REQUEST))
    }

    fn config(&self) -> &AppConfig {
        self.ctx.config()
    }
}

/// Addresses listed in the configured proxy header, when proxies are trusted.
///
/// With a positive `max_ips_count` only that many entries are kept, counted from the right.
pub(crate) fn forwarded_ips(config: &AppConfig, headers: &HeaderMap) -> Vec<String> {
    if !config.proxy() {
        return Vec::new();
    }

    let mut ips: Vec<String> = headers
        .get_all(config.proxy_ip_header())
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_owned)
        .collect();

    let max = config.max_ips_count();
    if max > 0 && ips.len() > max {
        ips.drain(..ips.len() - max);
    }
    ips
}
