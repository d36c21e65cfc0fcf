use std::future::Future;
use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Largest backend reply read in one exchange.
pub const MAX_RESPONSE_LEN: usize = 1024;

/// Outbound channel to one backend.
pub trait BackendLink: Send + Sync + 'static {
    /// Sends `request` and waits for the backend's reply.
    fn forward(&self, request: &[u8]) -> impl Future<Output = io::Result<Vec<u8>>> + Send;
}

/// One TCP connection per backend, shared by every request routed there.
///
/// Exchanges are serialised on the connection, so the backend sees one job
/// at a time. A connection only goes back into the slot when it cannot be
/// holding bytes of an earlier reply: a failed or abandoned exchange, a
/// reply that filled the read buffer, or unread bytes found before the next
/// write all drop it, and the next request dials a fresh one.
#[derive(Debug)]
pub struct TcpLink {
    endpoint: String,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpLink {
    /// Dials `endpoint` immediately.
    pub async fn connect(endpoint: impl Into<String>) -> io::Result<Self> {
        let endpoint = endpoint.into();
        let stream = TcpStream::connect(&endpoint).await?;
        stream.set_nodelay(true)?;
        tracing::info!(backend = %endpoint, "Connected to backend");
        Ok(Self {
            endpoint,
            stream: Mutex::new(Some(stream)),
        })
    }

    /// Defers dialling until the first request.
    pub fn lazy(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            stream: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn dial(&self) -> io::Result<TcpStream> {
        tracing::debug!(backend = %self.endpoint, "Dialling backend");
        let stream = TcpStream::connect(&self.endpoint).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

async fn exchange(stream: &mut TcpStream, request: &[u8]) -> io::Result<Vec<u8>> {
    stream.write_all(request).await?;
    let mut buf = vec![0u8; MAX_RESPONSE_LEN];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "backend closed the connection",
        ));
    }
    buf.truncate(n);
    Ok(buf)
}

/// True while the peer is connected and nothing is waiting to be read.
fn is_idle(stream: &TcpStream) -> bool {
    let mut scratch = [0u8; 1];
    matches!(stream.try_read(&mut scratch), Err(e) if e.kind() == io::ErrorKind::WouldBlock)
}

impl BackendLink for TcpLink {
    async fn forward(&self, request: &[u8]) -> io::Result<Vec<u8>> {
        let mut slot = self.stream.lock().await;
        // Taken out of the slot so a cancelled exchange leaves no stream
        // with a half-read reply behind.
        let mut stream = match slot.take() {
            Some(stream) if is_idle(&stream) => stream,
            Some(_) => {
                tracing::debug!(
                    backend = %self.endpoint,
                    "Discarding connection with stale or closed state"
                );
                self.dial().await?
            }
            None => self.dial().await?,
        };
        let reply = exchange(&mut stream, request).await?;
        if reply.len() < MAX_RESPONSE_LEN {
            *slot = Some(stream);
        } else {
            tracing::debug!(
                backend = %self.endpoint,
                "Reply filled the read buffer, dropping connection"
            );
        }
        Ok(reply)
    }
}
