//! The TCP accept loop behind [`Application::listen`](crate::Application::listen).

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use onion_http::connection::HttpConnection;
use tokio::net::TcpListener;
use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handler::RequestHandler;

/// A running server. Dropping the handle leaves the server running.
#[derive(Debug)]
pub struct Server {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Server {
    pub(crate) fn start(listener: TcpListener, handler: Arc<RequestHandler>) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "start listening");

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, handler, shutdown.clone()));
        Ok(Self { local_addr, shutdown, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections. Connections already accepted run to completion.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Waits until the accept loop has stopped.
    pub async fn join(self) -> io::Result<()> {
        self.task.await.map_err(io::Error::other)
    }
}

async fn accept_loop(listener: TcpListener, handler: Arc<RequestHandler>, shutdown: CancellationToken) {
    loop {
        let (tcp_stream, remote_addr) = select! {
            () = shutdown.cancelled() => {
                info!("stop listening");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            },
        };

        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            debug!(%remote_addr, "accepted connection");
            let (reader, writer) = tcp_stream.into_split();
            let connection = HttpConnection::new(reader, writer).with_remote_addr(remote_addr);
            match connection.process(handler).await {
                Ok(()) => debug!(%remote_addr, "connection shutdown"),
                Err(e) => warn!(%remote_addr, cause = %e, "connection shutdown with error"),
            }
        });
    }
}
