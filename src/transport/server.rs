use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::dispatch::Dispatcher;
use crate::error::BalancerError;
use crate::transport::{BackendLink, JobCodec};

/// Largest client request read in one go.
pub const MAX_REQUEST_LEN: usize = 1024;

/// Reply sent to a client whose backend failed or timed out.
pub const UNAVAILABLE_REPLY: &[u8] = b"ERR\n";

/// Accepts client connections and hands each one to the dispatcher on its
/// own task.
pub struct ClientListener<L, C> {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher<L, C>>,
    read_timeout: Duration,
}

impl<L: BackendLink, C: JobCodec + 'static> ClientListener<L, C> {
    pub fn new(
        listener: TcpListener,
        dispatcher: Arc<Dispatcher<L, C>>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            listener,
            dispatcher,
            read_timeout,
        }
    }

    pub async fn bind(
        addr: SocketAddr,
        dispatcher: Arc<Dispatcher<L, C>>,
        read_timeout: Duration,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::new(listener, dispatcher, read_timeout))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts until `shutdown` fires, then waits for in-flight requests.
    pub async fn run(self, shutdown: CancellationToken) {
        let tracker = TaskTracker::new();
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(addr = %addr, "Accepting clients");
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Listener stopping, draining in-flight requests");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let dispatcher = self.dispatcher.clone();
                            let read_timeout = self.read_timeout;
                            tracker.spawn(async move {
                                handle_client(dispatcher, stream, peer, read_timeout).await;
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept client");
                        }
                    }
                }
            }
        }

        tracker.close();
        tracker.wait().await;
        tracing::info!("Listener stopped");
    }
}

async fn read_request(stream: &mut TcpStream, read_timeout: Duration) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; MAX_REQUEST_LEN];
    let n = tokio::time::timeout(read_timeout, stream.read(&mut buf))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "client sent nothing"))??;
    buf.truncate(n);
    Ok(buf)
}

/// Owns one client connection from first byte to close.
async fn handle_client<L: BackendLink, C: JobCodec>(
    dispatcher: Arc<Dispatcher<L, C>>,
    mut stream: TcpStream,
    peer: SocketAddr,
    read_timeout: Duration,
) {
    let request = match read_request(&mut stream, read_timeout).await {
        Ok(request) if request.is_empty() => {
            tracing::debug!(peer = %peer, "Client closed before sending a request");
            return;
        }
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "Failed to read client request");
            return;
        }
    };

    let reply = match dispatcher.dispatch(&request).await {
        Ok(reply) => reply,
        Err(BalancerError::MalformedRequest(reason)) => {
            tracing::debug!(
                peer = %peer,
                reason = %reason,
                "Closing connection after malformed request"
            );
            return;
        }
        Err(e @ BalancerError::BackendUnavailable { .. }) => {
            tracing::warn!(peer = %peer, error = %e, "Replying with failure");
            UNAVAILABLE_REPLY.to_vec()
        }
        Err(e) => {
            tracing::error!(peer = %peer, error = %e, "Dispatch failed");
            return;
        }
    };

    if let Err(e) = stream.write_all(&reply).await {
        tracing::warn!(peer = %peer, error = %e, "Failed to reply to client");
        return;
    }
    let _ = stream.shutdown().await;
}
