//! Application-wide settings, fixed once the application is built.

use std::env;

use serde::Serialize;

/// Environment variable read by [`AppConfig::from_env`].
pub const ENV_VAR: &str = "ONION_ENV";

const DEFAULT_ENV: &str = "development";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    env: String,
    proxy: bool,
    subdomain_offset: usize,
    proxy_ip_header: String,
    max_ips_count: usize,
    silent: bool,
}

impl AppConfig {
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Default settings, with `env` taken from `ONION_ENV` when it is set.
    pub fn from_env() -> Self {
        Self::builder().build()
    }

    /// Environment tag, `"development"` unless configured.
    pub fn env(&self) -> &str {
        &self.env
    }

    /// Whether proxy headers (`X-Forwarded-*`) are trusted.
    pub fn proxy(&self) -> bool {
        self.proxy
    }

    /// How many trailing labels of the host make up the root domain.
    pub fn subdomain_offset(&self) -> usize {
        self.subdomain_offset
    }

    pub fn proxy_ip_header(&self) -> &str {
        &self.proxy_ip_header
    }

    /// Maximum entries read from the proxy ip header, counted from the right. Zero means all.
    pub fn max_ips_count(&self) -> usize {
        self.max_ips_count
    }

    /// Whether the default error sink stays quiet.
    pub fn silent(&self) -> bool {
        self.silent
    }

    /// The public view of the configuration.
    pub fn summary(&self) -> AppSummary {
        AppSummary { subdomain_offset: self.subdomain_offset, proxy: self.proxy, env: self.env.clone() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// What [`Application::to_json`](crate::Application::to_json) exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSummary {
    pub subdomain_offset: usize,
    pub proxy: bool,
    pub env: String,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfigBuilder {
    env: Option<String>,
    proxy: bool,
    subdomain_offset: Option<usize>,
    proxy_ip_header: Option<String>,
    max_ips_count: usize,
    silent: bool,
}

impl AppConfigBuilder {
    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    pub fn proxy(mut self, proxy: bool) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn subdomain_offset(mut self, offset: usize) -> Self {
        self.subdomain_offset = Some(offset);
        self
    }

    pub fn proxy_ip_header(mut self, header: impl Into<String>) -> Self {
        self.proxy_ip_header = Some(header.into());
        self
    }

    pub fn max_ips_count(mut self, count: usize) -> Self {
        self.max_ips_count = count;
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn build(self) -> AppConfig {
        let env = self
            .env
            .or_else(|| env::var(ENV_VAR).ok().filter(|value| !value.is_empty()))
            .unwrap_or_else(|| DEFAULT_ENV.to_owned());

        AppConfig {
            env,
            proxy: self.proxy,
            subdomain_offset: self.subdomain_offset.unwrap_or(2),
            proxy_ip_header: self.proxy_ip_header.map_or_else(|| "x-forwarded-for".to_owned(), |h| h.to_ascii_lowercase()),
            max_ips_count: self.max_ips_count,
            silent: self.silent,
        }
    }
}
