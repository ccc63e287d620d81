//! The error type flowing through middleware.
//!
//! An [`Error`] carries what the response needs to report it: an optional status, whether
//! its message may be shown to the client (`expose`), and extra headers. Everything else
//! (the source chain and a backtrace) is only for the error sink.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fmt::{self, Write};
use std::io;

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use onion_http::protocol::{HttpError, SendError};

pub type BoxError = Box<dyn StdError + Send + Sync>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error)]
#[error("{message}")]
pub struct Error {
    status: Option<StatusCode>,
    expose: bool,
    message: String,
    headers: HeaderMap,
    #[source]
    source: Option<BoxError>,
    trace: Box<Backtrace>,
}

impl Error {
    /// An HTTP error: the message is exposed to clients for statuses below 500.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status: Some(status), expose: status.as_u16() < 500, ..Self::msg(message) }
    }

    /// An internal error without a status; it surfaces as a 500.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            status: None,
            expose: false,
            message: message.into(),
            headers: HeaderMap::new(),
            source: None,
            trace: Box::new(Backtrace::capture()),
        }
    }

    /// Wraps any error as an internal error, keeping it as the source.
    pub fn from_err<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::from_boxed(Box::new(err))
    }

    fn from_boxed(err: BoxError) -> Self {
        Self { source: Some(err), ..Self::msg(String::new()) }.with_message_from_source()
    }

    fn with_message_from_source(mut self) -> Self {
        if let Some(source) = &self.source {
            self.message = source.to_string();
        }
        self
    }

    /// Converts a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_owned());
        Self::msg(format!("middleware panicked: {reason}"))
    }

    pub(crate) fn next_called_multiple_times() -> Self {
        Self::msg("next() called multiple times")
    }

    /// Sets the status, and with it whether the message is exposed.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self.expose = status.as_u16() < 500;
        self
    }

    #[must_use]
    pub fn with_expose(mut self, expose: bool) -> Self {
        self.expose = expose;
        self
    }

    /// Adds a header to the error response.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn expose(&self) -> bool {
        self.expose
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether this wraps an I/O "not found" error.
    pub fn is_not_found(&self) -> bool {
        self.source
            .as_deref()
            .and_then(|source| source.downcast_ref::<io::Error>())
            .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
    }

    /// The status used when this error becomes the response: 404 for missing files,
    /// 500 when the status is missing or unknown.
    pub fn response_status(&self) -> StatusCode {
        if self.is_not_found() {
            return StatusCode::NOT_FOUND;
        }
        match self.status {
            Some(status) if status.canonical_reason().is_some() => status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Multi-line description: the message, its causes, and the backtrace when one was captured.
    pub fn report(&self) -> String {
        let mut out = self.message.clone();

        let mut cause = StdError::source(self);
        while let Some(err) = cause {
            let text = err.to_string();
            if text != self.message {
                let _ = write!(out, "\ncaused by: {text}");
            }
            cause = err.source();
        }

        if self.trace.status() == BacktraceStatus::Captured {
            let _ = write!(out, "\n\nstack backtrace:\n{}", self.trace);
        }
        out
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("status", &self.status)
            .field("expose", &self.expose)
            .field("message", &self.message)
            .field("headers", &self.headers)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::from_err(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::from_err(err)
    }
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Self::from_err(err)
    }
}

impl From<SendError> for Error {
    fn from(err: SendError) -> Self {
        Self::from_err(err)
    }
}

impl From<HttpError> for Error {
    fn from(err: HttpError) -> Self {
        Self::from_err(err)
    }
}

impl From<BoxError> for Error {
    fn from(err: BoxError) -> Self {
        Self::from_boxed(err)
    }
}

impl From<StatusCode> for Error {
    fn from(status: StatusCode) -> Self {
        Self::new(status, status.canonical_reason().unwrap_or_else(|| status.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_errors_expose_client_statuses() {
        let err = Error::new(StatusCode::FORBIDDEN, "no entry");
        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
        assert!(err.expose());
        assert_eq!(err.to_string(), "no entry");

        let err = Error::new(StatusCode::BAD_GATEWAY, "upstream");
        assert!(!err.expose());

        let err = Error::msg("boom");
        assert_eq!(err.status(), None);
        assert_eq!(err.response_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn not_found_io_errors_map_to_404() {
        let err: Error = io::Error::new(io::ErrorKind::NotFound, "missing.txt").into();
        assert!(err.is_not_found());
        assert_eq!(err.response_status(), StatusCode::NOT_FOUND);
        assert_eq!(err.status(), None);
    }

    #[test]
    fn unknown_statuses_become_500() {
        let err = Error::msg("odd").with_status(StatusCode::from_u16(299).unwrap());
        assert_eq!(err.response_status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = Error::new(StatusCode::FOUND, "moved");
        assert_eq!(err.response_status(), StatusCode::FOUND);
        assert_eq!(Error::from(StatusCode::NOT_MODIFIED).response_status(), StatusCode::NOT_MODIFIED);
    }

    #[test]
    fn report_lists_causes() {
        let inner = io::Error::other("disk on fire");
        let err = Error::from_err(inner).with_status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.message(), "disk on fire");
        assert!(err.report().starts_with("disk on fire"));
        assert_eq!(StdError::source(&err).map(ToString::to_string).as_deref(), Some("disk on fire"));

        let boxed: BoxError = Box::new(Error::msg("outer").with_header(HeaderName::from_static("x-a"), HeaderValue::from_static("1")));
        let err = Error::from(boxed);
        assert_eq!(err.message(), "outer");
    }

    #[test]
    fn panic_payloads() {
        let err = Error::from_panic(Box::new("bad state"));
        assert_eq!(err.message(), "middleware panicked: bad state");

        let err = Error::from_panic(Box::new(String::from("owned")));
        assert_eq!(err.message(), "middleware panicked: owned");
    }
}
