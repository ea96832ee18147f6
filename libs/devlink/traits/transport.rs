//! Transport adapter
//!
//! The session never touches sockets directly. It asks a [`Transport`] for
//! a fresh duplex byte stream on every connect attempt and owns that stream
//! exclusively until it is torn down:
//!
//! ```text
//! connect()  ──> Transport::connect(host, port) ──> Stream
//! write      ──> AsyncWriteExt::write_all + flush
//! half-close ──> AsyncWriteExt::shutdown
//! destroy    ──> drop(Stream)
//! ```
//!
//! Connect deadlines and idle detection are enforced by the session, so a
//! transport only has to report success or an `io::Error`.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tracing::debug;

/// Trait for establishing the underlying byte stream
///
/// Implement this to run a session over something other than TCP
/// (a serial bridge, an in-memory pipe in tests, ...).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The duplex stream produced by a successful connect
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open a new stream to `host:port`
    ///
    /// The returned future may be dropped at any point (connect deadline,
    /// explicit close); implementations must not leak half-open streams
    /// when that happens.
    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream>;
}

/// Plain TCP transport
///
/// Keep-alive and `TCP_NODELAY` are on by default.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    keep_alive: bool,
    no_delay: bool,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            keep_alive: true,
            no_delay: true,
        }
    }

    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = enabled;
        self
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let mut last_err = None;

        for addr in lookup_host((host, port)).await? {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            socket.set_keepalive(self.keep_alive)?;

            match socket.connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(self.no_delay)?;
                    debug!("TCP connected to {}", addr);
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("TCP connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses resolved for {}:{}", host, port),
            )
        }))
    }
}
