//! The transport's writable response handle.
//!
//! A [`RawResponse`] is shared between the connection and the handler. Head fields can be
//! mutated until the first byte is written; the head is serialized on the first
//! [`write`](RawResponse::write) or on [`end`](RawResponse::end), whichever comes first.
//! Listeners registered with [`on_finished`](RawResponse::on_finished) run exactly once,
//! when the response completes or the connection gives up on it.

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Method, StatusCode, Version};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::codec::{BodyLength, HeadEncoder, PayloadEncoder};
use crate::protocol::SendError;

pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The connection's write half, shared by every response written on it.
pub type SharedWriter = Arc<tokio::sync::Mutex<BoxedWriter>>;

/// Called once with `None` when the response completed or was destroyed, with the error otherwise.
pub type FinishListener = Box<dyn FnOnce(Option<Arc<SendError>>) + Send>;

/// Status line and header fields of a response that is not sent yet.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub reason: Option<String>,
    pub headers: HeaderMap,
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self { status, reason: None, headers: HeaderMap::new() }
    }
}

struct Output {
    writer: SharedWriter,
    encoder: Option<PayloadEncoder>,
}

enum Listeners {
    Pending(Vec<FinishListener>),
    Done(Option<Arc<SendError>>),
}

pub struct RawResponse {
    head: Mutex<ResponseHead>,
    output: tokio::sync::Mutex<Output>,
    head_encoder: HeadEncoder,
    headers_sent: AtomicBool,
    finished: AtomicBool,
    destroyed: AtomicBool,
    keep_alive: AtomicBool,
    listeners: Mutex<Listeners>,
}

impl RawResponse {
    /// Creates a response answering a request with `method` and `version`, starting as `200 OK`.
    pub fn new(writer: SharedWriter, method: Method, version: Version) -> Self {
        Self {
            head: Mutex::new(ResponseHead::new(StatusCode::OK)),
            output: tokio::sync::Mutex::new(Output { writer, encoder: None }),
            head_encoder: HeadEncoder::new(method, version),
            headers_sent: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            keep_alive: AtomicBool::new(true),
            listeners: Mutex::new(Listeners::Pending(Vec::new())),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.head.lock().status
    }

    /// Sets the status and drops any custom reason phrase. No effect once the head is sent.
    pub fn set_status(&self, status: StatusCode) {
        let mut head = self.head.lock();
        if self.headers_sent() {
            return;
        }
        head.status = status;
        head.reason = None;
    }

    pub fn reason(&self) -> Option<String> {
        self.head.lock().reason.clone()
    }

    /// Sets a custom reason phrase. No effect once the head is sent.
    ///
    /// Fails for phrases that could break the status line: only tabs, spaces and visible
    /// characters are allowed.
    pub fn set_reason(&self, reason: impl Into<String>) -> Result<(), SendError> {
        let reason = reason.into();
        if !is_valid_reason(&reason) {
            return Err(SendError::invalid_reason(reason));
        }

        let mut head = self.head.lock();
        if !self.headers_sent() {
            head.reason = Some(reason);
        }
        Ok(())
    }

    /// Locks the header map. Do not hold the guard across an `.await`.
    pub fn headers(&self) -> MappedMutexGuard<'_, HeaderMap> {
        MutexGuard::map(self.head.lock(), |head| &mut head.headers)
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent.load(Ordering::Acquire)
    }

    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Whether more bytes can still be written.
    pub fn writable(&self) -> bool {
        !self.finished() && !self.destroyed()
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive.load(Ordering::Acquire)
    }

    pub fn set_keep_alive(&self, keep_alive: bool) {
        self.keep_alive.store(keep_alive, Ordering::Release);
    }

    /// Registers `listener`; it runs immediately when the response already completed.
    pub fn on_finished<F>(&self, listener: F)
    where
        F: FnOnce(Option<Arc<SendError>>) + Send + 'static,
    {
        let mut listeners = self.listeners.lock();
        match &mut *listeners {
            Listeners::Pending(pending) => pending.push(Box::new(listener)),
            Listeners::Done(err) => {
                let err = err.clone();
                drop(listeners);
                listener(err);
            }
        }
    }

    /// Writes a body chunk, sending the head first if needed.
    pub async fn write(&self, chunk: Bytes) -> Result<(), SendError> {
        if !self.writable() {
            return Err(SendError::Closed);
        }

        let mut output = self.output.lock().await;
        if !self.writable() {
            return Err(SendError::Closed);
        }

        let mut buf = BytesMut::new();
        let mut encoder = match output.encoder {
            Some(encoder) => encoder,
            None => self.encode_head(BodyLength::Streaming, &mut buf)?,
        };
        encoder.encode_chunk(&chunk, &mut buf)?;
        output.encoder = Some(encoder);

        self.flush(&output.writer, buf).await
    }

    /// Finishes the response with an optional last chunk.
    ///
    /// Calling it again after completion is a no-op; calling it after [`destroy`](Self::destroy)
    /// fails with [`SendError::Closed`].
    pub async fn end(&self, last: Option<Bytes>) -> Result<(), SendError> {
        if self.finished() {
            return Ok(());
        }
        if self.destroyed() {
            return Err(SendError::Closed);
        }

        let mut output = self.output.lock().await;
        if self.finished() {
            return Ok(());
        }
        if self.destroyed() {
            return Err(SendError::Closed);
        }

        let mut buf = BytesMut::new();
        let mut encoder = match output.encoder {
            Some(encoder) => encoder,
            None => {
                let length = last.as_ref().map_or(0, |bytes| bytes.len() as u64);
                self.encode_head(BodyLength::Known(length), &mut buf)?
            }
        };
        if let Some(bytes) = &last {
            encoder.encode_chunk(bytes, &mut buf)?;
        }
        encoder.encode_eof(&mut buf);
        output.encoder = Some(encoder);

        self.flush(&output.writer, buf).await?;
        self.finished.store(true, Ordering::Release);
        trace!("response finished");
        self.notify(None);
        Ok(())
    }

    /// Gives up on the response without an error, the connection will be closed.
    pub fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            debug!("response destroyed");
            self.keep_alive.store(false, Ordering::Release);
            self.notify(None);
        }
    }

    /// Marks the response as aborted because the client went away.
    pub fn abort(&self) {
        if !self.finished() && !self.destroyed.swap(true, Ordering::AcqRel) {
            debug!("request aborted by the client");
            self.keep_alive.store(false, Ordering::Release);
            self.notify(Some(Arc::new(SendError::Aborted)));
        }
    }

    fn encode_head(&self, length: BodyLength, dst: &mut BytesMut) -> Result<PayloadEncoder, SendError> {
        let mut head = self.head.lock();
        let mut keep_alive = self.keep_alive();
        let encoder = self.head_encoder.encode(&mut head, length, &mut keep_alive, dst)?;
        self.set_keep_alive(keep_alive);
        self.headers_sent.store(true, Ordering::Release);
        Ok(encoder)
    }

    async fn flush(&self, writer: &SharedWriter, buf: BytesMut) -> Result<(), SendError> {
        if buf.is_empty() {
            return Ok(());
        }

        let mut writer = writer.lock().await;
        let result = match writer.write_all(&buf).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        result.map_err(|e| {
            let reason = e.to_string();
            if !self.destroyed.swap(true, Ordering::AcqRel) {
                self.keep_alive.store(false, Ordering::Release);
                self.notify(Some(Arc::new(SendError::broken(&reason))));
            }
            SendError::io(e)
        })
    }

    fn notify(&self, err: Option<Arc<SendError>>) {
        let pending = {
            let mut listeners = self.listeners.lock();
            match mem::replace(&mut *listeners, Listeners::Done(err.clone())) {
                Listeners::Pending(pending) => pending,
                done @ Listeners::Done(_) => {
                    *listeners = done;
                    return;
                }
            }
        };

        for listener in pending {
            listener(err.clone());
        }
    }
}

/// `reason-phrase = *( HTAB / SP / VCHAR / obs-text )`, see RFC 9112 section 4.
pub(crate) fn is_valid_reason(reason: &str) -> bool {
    reason.bytes().all(|b| b == b'\t' || b == b' ' || b.is_ascii_graphic() || b >= 0x80)
}

impl std::fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status())
            .field("headers_sent", &self.headers_sent())
            .field("finished", &self.finished())
            .field("destroyed", &self.destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BrokenWriter, ParsedResponse, response_for};
    use http::{HeaderValue, header};
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn end_with_body_sets_length() {
        let (response, output) = response_for(Method::GET, Version::HTTP_11);
        response.set_status(StatusCode::CREATED);
        response.headers().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        response.end(Some(Bytes::from_static(b"hello"))).await.unwrap();

        let parsed = ParsedResponse::parse(&output.contents());
        assert_eq!(parsed.status, StatusCode::CREATED);
        assert_eq!(parsed.headers[header::CONTENT_LENGTH], "5");
        assert_eq!(parsed.headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(parsed.body, b"hello");
        assert!(response.finished());
        assert!(response.headers_sent());
        assert!(!response.writable());
    }

    #[tokio::test]
    async fn streamed_writes_are_chunked() {
        let (response, output) = response_for(Method::GET, Version::HTTP_11);
        response.write(Bytes::from_static(b"hello ")).await.unwrap();
        assert!(response.headers_sent());
        response.write(Bytes::from_static(b"onion")).await.unwrap();
        response.end(None).await.unwrap();

        let parsed = ParsedResponse::parse(&output.contents());
        assert_eq!(parsed.headers[header::TRANSFER_ENCODING], "chunked");
        assert_eq!(parsed.body, b"hello onion");
    }

    #[tokio::test]
    async fn head_request_has_no_body() {
        let (response, output) = response_for(Method::HEAD, Version::HTTP_11);
        response.end(Some(Bytes::from_static(b"hidden"))).await.unwrap();

        let text = output.to_string_lossy();
        assert!(!text.contains("hidden"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn end_twice_and_write_after_end() {
        let (response, _output) = response_for(Method::GET, Version::HTTP_11);
        response.end(None).await.unwrap();
        response.end(Some(Bytes::from_static(b"ignored"))).await.unwrap();
        assert!(matches!(response.write(Bytes::from_static(b"late")).await, Err(SendError::Closed)));
    }

    #[tokio::test]
    async fn listeners_run_once() {
        let (response, _output) = response_for(Method::GET, Version::HTTP_11);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        response.on_finished(move |err| {
            assert!(err.is_none());
            counter.fetch_add(1, Ordering::SeqCst);
        });
        response.end(None).await.unwrap();
        response.destroy();

        let counter = calls.clone();
        response.on_finished(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn abort_reports_error() {
        let (response, _output) = response_for(Method::GET, Version::HTTP_11);
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        response.on_finished(move |err| *slot.lock() = err.map(|e| e.to_string()));

        response.abort();

        assert_eq!(seen.lock().as_deref(), Some("request aborted by the client"));
        assert!(!response.writable());
        assert!(!response.keep_alive());
        assert!(matches!(response.end(None).await, Err(SendError::Closed)));
    }

    #[tokio::test]
    async fn broken_writer_destroys_response() {
        let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(Box::new(BrokenWriter)));
        let response = RawResponse::new(writer, Method::GET, Version::HTTP_11);
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        response.on_finished(move |err| *slot.lock() = err.map(|e| e.to_string()));

        assert!(response.end(Some(Bytes::from_static(b"x"))).await.is_err());
        assert!(response.destroyed());
        assert!(seen.lock().as_deref().is_some_and(|reason| reason.starts_with("connection broken")));
    }

    #[tokio::test]
    async fn http10_stream_closes_connection() {
        let (response, output) = response_for(Method::GET, Version::HTTP_10);
        response.write(Bytes::from_static(b"raw")).await.unwrap();
        response.end(None).await.unwrap();

        assert!(!response.keep_alive());
        assert!(output.to_string_lossy().ends_with("\r\n\r\nraw"));
    }

    #[tokio::test]
    async fn reason_cannot_split_the_status_line() {
        let (response, output) = response_for(Method::GET, Version::HTTP_11);

        let err = response.set_reason("OK\r\nSet-Cookie: s=evil").unwrap_err();
        assert!(matches!(err, SendError::InvalidReason { .. }));
        assert!(response.set_reason("bell\u{7}").is_err());
        assert_eq!(response.reason(), None);

        response.set_reason("Tout\tva bien, ça marche").unwrap();
        response.end(None).await.unwrap();

        let text = output.to_string_lossy();
        assert!(text.starts_with("HTTP/1.1 200 Tout\tva bien, ça marche\r\n"));
        assert!(!text.contains("set-cookie") && !text.contains("Set-Cookie"));
    }

    #[tokio::test]
    async fn head_is_frozen_once_sent() {
        let (response, output) = response_for(Method::GET, Version::HTTP_11);
        response.set_status(StatusCode::ACCEPTED);
        response.write(Bytes::from_static(b"body")).await.unwrap();

        response.set_status(StatusCode::NOT_FOUND);
        response.set_reason("Too Late").unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.reason(), None);

        response.end(None).await.unwrap();
        assert!(output.to_string_lossy().starts_with("HTTP/1.1 202 Accepted\r\n"));
    }
}
