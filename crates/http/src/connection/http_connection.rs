use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use http::{Method, StatusCode, Version};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::codec::RequestDecoder;
use crate::ensure;
use crate::handler::Handler;
use crate::protocol::{
    HttpError, Message, ParseError, PayloadItem, PayloadSize, RawRequest, RawResponse, RequestHeader, SendError,
    SharedWriter,
};

/// Largest request body the connection buffers for a handler.
pub const MAX_BODY_SIZE: u64 = 1024 * 1024;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// One client connection: reads requests, runs the handler for each, and keeps the
/// connection open between exchanges when both sides allow it.
///
/// While a handler runs, the connection keeps watching the read half. A peer that closes
/// or breaks the connection before the response is finished aborts that response.
pub struct HttpConnection<R> {
    framed_read: FramedRead<R, RequestDecoder>,
    writer: SharedWriter,
    remote_addr: Option<SocketAddr>,
}

impl<R> HttpConnection<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new<W>(reader: R, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), READ_BUFFER_SIZE),
            writer: Arc::new(tokio::sync::Mutex::new(Box::new(writer))),
            remote_addr: None,
        }
    }

    pub fn with_remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
    {
        let mut pending: Option<(RequestHeader, PayloadSize)> = None;

        loop {
            let (header, payload_size) = match pending.take() {
                Some(head) => head,
                None => match self.framed_read.next().await {
                    Some(Ok(Message::Header(head))) => head,
                    Some(Ok(Message::Payload(_))) => {
                        let e = ParseError::invalid_body("received payload while waiting for a request head");
                        self.reject(e.status_code()).await;
                        return Err(e.into());
                    }
                    Some(Err(e)) => {
                        warn!(cause = %e, "can't decode request");
                        self.reject(e.status_code()).await;
                        return Err(e.into());
                    }
                    None => {
                        debug!("peer closed the connection");
                        return Ok(());
                    }
                },
            };

            if header.expects_continue() && !payload_size.is_empty() {
                self.write_continue().await?;
            }

            let body = match self.read_body(payload_size).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(cause = %e, "can't read request body");
                    self.reject(e.status_code()).await;
                    return Err(e.into());
                }
            };

            let response = Arc::new(RawResponse::new(Arc::clone(&self.writer), header.method().clone(), header.version()));
            response.set_keep_alive(header.is_keep_alive());
            let request = RawRequest::new(header, body, self.remote_addr);

            {
                let handle = handler.call(request, Arc::clone(&response));
                tokio::pin!(handle);
                let mut watching = true;

                loop {
                    select! {
                        biased;
                        () = &mut handle => break,
                        next = self.framed_read.next(), if watching => {
                            watching = false;
                            match next {
                                Some(Ok(Message::Header(head))) => pending = Some(head),
                                Some(Ok(Message::Payload(_))) => {}
                                Some(Err(_)) | None => response.abort(),
                            }
                        }
                    }
                }
            }

            if response.destroyed() {
                info!("response was not completed, connection shutdown");
                return Ok(());
            }

            if !response.finished() {
                warn!("handler returned without ending the response, connection shutdown");
                response.destroy();
                self.shutdown().await;
                return Ok(());
            }

            if !response.keep_alive() {
                self.shutdown().await;
                return Ok(());
            }
        }
    }

    async fn read_body(&mut self, payload_size: PayloadSize) -> Result<Bytes, ParseError> {
        if let PayloadSize::Length(length) = payload_size {
            ensure!(length <= MAX_BODY_SIZE, ParseError::too_large_body(length, MAX_BODY_SIZE));
        }

        let mut body = BytesMut::new();
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                    let size = (body.len() + bytes.len()) as u64;
                    ensure!(size <= MAX_BODY_SIZE, ParseError::too_large_body(size, MAX_BODY_SIZE));
                    body.extend_from_slice(&bytes);
                }
                Some(Ok(Message::Payload(PayloadItem::Eof))) => return Ok(body.freeze()),
                Some(Ok(Message::Header(_))) => return Err(ParseError::invalid_body("request head inside a body")),
                Some(Err(e)) => return Err(e),
                None => return Err(ParseError::invalid_body("connection closed before the body was complete")),
            }
        }
    }

    async fn write_continue(&self) -> Result<(), SendError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
        writer.flush().await?;
        info!("receive expect request header, sent continue response");
        Ok(())
    }

    /// Answers a request that could not be decoded, then the connection is closed.
    async fn reject(&self, status: StatusCode) {
        let response = RawResponse::new(Arc::clone(&self.writer), Method::GET, Version::HTTP_11);
        response.set_status(status);
        response.set_keep_alive(false);
        if let Err(e) = response.end(None).await {
            debug!(cause = %e, "can't send error response");
        }
        self.shutdown().await;
    }

    async fn shutdown(&self) {
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!(cause = %e, "can't shutdown connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::make_handler;
    use crate::testing::ParsedResponse;
    use tokio::io::{AsyncReadExt, duplex};

    async fn echo(req: RawRequest, res: Arc<RawResponse>) {
        let body = format!("{} {} {}", req.method(), req.uri(), String::from_utf8_lossy(req.body()));
        let _ = res.end(Some(Bytes::from(body))).await;
    }

    async fn exchange(raw: &[u8]) -> Vec<u8> {
        let (client, server) = duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(server);
        let task = tokio::spawn(HttpConnection::new(reader, writer).process(Arc::new(make_handler(echo))));

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(raw).await.unwrap();

        let mut out = Vec::new();
        client_read.read_to_end(&mut out).await.unwrap();
        drop(client_write);
        let _ = task.await;
        out
    }

    #[tokio::test]
    async fn serves_and_closes() {
        let out = exchange(b"POST /echo HTTP/1.1\r\nContent-Length: 4\r\nConnection: close\r\n\r\nping").await;
        let parsed = ParsedResponse::parse(&out);

        assert_eq!(parsed.status, StatusCode::OK);
        assert_eq!(parsed.body, b"POST /echo ping");
        assert_eq!(parsed.headers[http::header::CONNECTION], "close");
    }

    #[tokio::test]
    async fn keep_alive_pipelining() {
        let out = exchange(b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        let text = String::from_utf8_lossy(&out);

        assert!(text.contains("GET /a "));
        assert!(text.contains("GET /b "));
        assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 2);
    }

    #[tokio::test]
    async fn chunked_request_body() {
        let out = exchange(
            b"POST /c HTTP/1.1\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n",
        )
        .await;
        assert_eq!(ParsedResponse::parse(&out).body, b"POST /c abcde");
    }

    #[tokio::test]
    async fn rejects_bad_requests() {
        let out = exchange(b"GET / HTTP/1.1\r\nContent-Length: nope\r\n\r\n").await;
        assert_eq!(ParsedResponse::parse(&out).status, StatusCode::BAD_REQUEST);

        let out = exchange(b"POST / HTTP/1.1\r\nContent-Length: 99999999\r\n\r\n").await;
        assert_eq!(ParsedResponse::parse(&out).status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn expect_continue() {
        let out = exchange(b"PUT /e HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 1\r\nConnection: close\r\n\r\nx").await;
        let text = String::from_utf8_lossy(&out);
        assert!(text.starts_with("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn client_going_away_aborts_response() {
        let (client, server) = duplex(1024);
        let (reader, writer) = tokio::io::split(server);
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel::<Option<String>>();
        let seen_tx = Arc::new(parking_lot::Mutex::new(Some(seen_tx)));

        let handler = make_handler(move |_req: RawRequest, res: Arc<RawResponse>| {
            let seen_tx = seen_tx.clone();
            async move {
                res.on_finished(move |err| {
                    if let Some(tx) = seen_tx.lock().take() {
                        let _ = tx.send(err.map(|e| e.to_string()));
                    }
                });
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
        });
        let task = tokio::spawn(HttpConnection::new(reader, writer).process(Arc::new(handler)));

        let (_client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"GET /slow HTTP/1.1\r\n\r\n").await.unwrap();
        client_write.shutdown().await.unwrap();

        assert_eq!(seen_rx.await.unwrap().as_deref(), Some("request aborted by the client"));
        task.await.unwrap().unwrap();
    }
}
