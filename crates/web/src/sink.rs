//! Where errors end up after the response has been dealt with.

use std::io::{self, Write};

use http::StatusCode;
use parking_lot::Mutex;

use crate::error::Error;

/// Receives every error raised by the pipeline or by the connection.
///
/// The sink is a diagnostic channel only, it never writes to the HTTP response.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorSink: Send + Sync {
    fn on_error(&self, err: &Error);
}

/// Prints unexpected errors to a diagnostic stream, stderr unless configured otherwise.
///
/// Errors that are part of normal operation stay quiet: a 404 status, an exposed client
/// error, or any error when the sink is silent.
pub struct DefaultErrorSink {
    silent: bool,
    out: Mutex<Box<dyn Write + Send>>,
}

impl DefaultErrorSink {
    pub fn new(silent: bool) -> Self {
        Self::with_writer(silent, io::stderr())
    }

    pub fn with_writer(silent: bool, out: impl Write + Send + 'static) -> Self {
        Self { silent, out: Mutex::new(Box::new(out)) }
    }

    fn is_benign(&self, err: &Error) -> bool {
        self.silent || err.expose() || err.status() == Some(StatusCode::NOT_FOUND)
    }
}

impl ErrorSink for DefaultErrorSink {
    fn on_error(&self, err: &Error) {
        if self.is_benign(err) {
            return;
        }

        let report = err.report();
        let mut text = String::with_capacity(report.len() + 16);
        text.push('\n');
        for line in report.lines() {
            text.push_str("  ");
            text.push_str(line);
            text.push('\n');
        }
        text.push('\n');

        let mut out = self.out.lock();
        if out.write_all(text.as_bytes()).and_then(|()| out.flush()).is_err() {
            tracing::warn!(error = %err, "can't write error report");
        }
    }
}

impl std::fmt::Debug for DefaultErrorSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultErrorSink").field("silent", &self.silent).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    #[test]
    fn prints_indented_report() {
        let out = Captured::default();
        let sink = DefaultErrorSink::with_writer(false, out.clone());

        sink.on_error(&Error::msg("database unavailable"));

        assert!(out.text().starts_with("\n  database unavailable\n"));
        assert!(out.text().ends_with("\n\n"));
    }

    #[test]
    fn benign_errors_are_quiet() {
        let out = Captured::default();
        let sink = DefaultErrorSink::with_writer(false, out.clone());

        sink.on_error(&Error::new(StatusCode::NOT_FOUND, "nothing here"));
        sink.on_error(&Error::new(StatusCode::BAD_REQUEST, "bad input"));
        sink.on_error(&Error::msg("internal").with_status(StatusCode::NOT_FOUND).with_expose(false));
        assert!(out.text().is_empty());

        let silent = DefaultErrorSink::with_writer(true, out.clone());
        silent.on_error(&Error::msg("boom"));
        assert!(out.text().is_empty());
    }
}
