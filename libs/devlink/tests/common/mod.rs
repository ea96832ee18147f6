//! Common test utilities for devlink integration tests
//!
//! A scripted line-oriented device on a local TCP port plus helpers for
//! waiting on session events without blocking the runtime.

#![allow(dead_code)]

use async_trait::async_trait;
use devlink::{Session, SessionEvent, Transport};
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Notify};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// What the device does with one received line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Reply(String),
    Ignore,
    Hangup,
}

type Responder = Arc<dyn Fn(&str) -> Action + Send + Sync>;

/// A mock device speaking newline-terminated commands
pub struct MockDevice {
    pub addr: SocketAddr,
    accepted: Arc<Mutex<Vec<Instant>>>,
    live: Arc<AtomicUsize>,
    push_tx: broadcast::Sender<String>,
    hangup: Arc<Notify>,
    shutdown: Arc<Notify>,
}

impl MockDevice {
    /// Device that never answers
    pub async fn start() -> Self {
        Self::with_responder(|_| Action::Ignore).await
    }

    /// Device answering every line through `responder`
    pub async fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Action + Send + Sync + 'static,
    {
        Self::spawn(Arc::new(responder), true).await
    }

    /// Device that never closes its side after the client half-closes
    pub async fn stubborn() -> Self {
        Self::spawn(Arc::new(|_| Action::Ignore), false).await
    }

    async fn spawn(responder: Responder, close_on_eof: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(Mutex::new(Vec::new()));
        let live = Arc::new(AtomicUsize::new(0));
        let (push_tx, _) = broadcast::channel(16);
        let hangup = Arc::new(Notify::new());
        let shutdown = Arc::new(Notify::new());

        {
            let accepted = Arc::clone(&accepted);
            let live = Arc::clone(&live);
            let push_tx = push_tx.clone();
            let hangup = Arc::clone(&hangup);
            let shutdown = Arc::clone(&shutdown);

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        result = listener.accept() => {
                            match result {
                                Ok((stream, _)) => {
                                    accepted.lock().push(Instant::now());
                                    let conn = Connection {
                                        responder: Arc::clone(&responder),
                                        push_rx: push_tx.subscribe(),
                                        hangup: Arc::clone(&hangup),
                                        live: Arc::clone(&live),
                                        close_on_eof,
                                    };
                                    tokio::spawn(conn.run(stream));
                                }
                                Err(e) => {
                                    eprintln!("Accept error: {}", e);
                                    break;
                                }
                            }
                        }
                        _ = shutdown.notified() => {
                            break;
                        }
                    }
                }
            });
        }

        Self {
            addr,
            accepted,
            live,
            push_tx,
            hangup,
            shutdown,
        }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.lock().len()
    }

    /// Time each connection was accepted
    pub fn accept_times(&self) -> Vec<Instant> {
        self.accepted.lock().clone()
    }

    /// Connections currently open on the device side
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Write `text` to every open connection
    pub fn push(&self, text: &str) {
        let _ = self.push_tx.send(text.to_string());
    }

    /// Abruptly close every open connection
    pub fn drop_connections(&self) {
        self.hangup.notify_waiters();
    }

    /// Stop accepting and close every open connection
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
        self.drop_connections();
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Connection {
    responder: Responder,
    push_rx: broadcast::Receiver<String>,
    hangup: Arc<Notify>,
    live: Arc<AtomicUsize>,
    close_on_eof: bool,
}

impl Connection {
    async fn run(mut self, stream: TcpStream) {
        self.live.fetch_add(1, Ordering::AcqRel);
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        let mut eof = false;

        loop {
            tokio::select! {
                line = lines.next_line(), if !eof => {
                    match line {
                        Ok(Some(line)) => {
                            match (self.responder)(line.trim_end_matches('\r')) {
                                Action::Reply(reply) => {
                                    if write.write_all(reply.as_bytes()).await.is_err() {
                                        break;
                                    }
                                }
                                Action::Ignore => {}
                                Action::Hangup => break,
                            }
                        }
                        Ok(None) if self.close_on_eof => break,
                        Ok(None) => eof = true,
                        Err(_) => break,
                    }
                }
                pushed = self.push_rx.recv() => {
                    match pushed {
                        Ok(text) => {
                            if write.write_all(text.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = self.hangup.notified() => {
                    break;
                }
            }
        }

        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Transport whose connect never completes
pub struct BlackHole;

#[async_trait]
impl Transport for BlackHole {
    type Stream = TcpStream;

    async fn connect(&self, _host: &str, _port: u16) -> io::Result<TcpStream> {
        std::future::pending().await
    }
}

/// Transport over an in-memory pipe whose far end is never read
///
/// The pipe holds `capacity` bytes; writes stall once it is full while the
/// connection itself stays open.
pub struct Unread {
    capacity: usize,
    peers: Mutex<Vec<DuplexStream>>,
}

impl Unread {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            peers: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Transport for Unread {
    type Stream = DuplexStream;

    async fn connect(&self, _host: &str, _port: u16) -> io::Result<DuplexStream> {
        let (client, device) = tokio::io::duplex(self.capacity);
        self.peers.lock().push(device);
        Ok(client)
    }
}

/// A port nothing listens on
pub async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Wait for the first event matching `pred`, returning everything seen
pub async fn events_until<F>(session: &Session, timeout: Duration, pred: F) -> Vec<SessionEvent>
where
    F: Fn(&SessionEvent) -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    loop {
        while let Some(event) = session.try_recv_event() {
            verbose_println!("  event: {:?}", event);
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
        if Instant::now() >= deadline {
            panic!("Timed out waiting for event; saw {:?}", seen);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Drain whatever events are queued right now
pub fn drain_events(session: &Session) -> Vec<SessionEvent> {
    std::iter::from_fn(|| session.try_recv_event()).collect()
}

/// Poll `check` until it holds or `timeout` passes
pub async fn eventually<F>(timeout: Duration, check: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

/// Short names for asserting on event sequences
pub fn kinds(events: &[SessionEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(|event| match event {
            SessionEvent::Connect => "connect",
            SessionEvent::Close => "close",
            SessionEvent::Reconnect(_) => "reconnect",
            SessionEvent::Timeout => "timeout",
            SessionEvent::Error(_) => "error",
            SessionEvent::Data(_) => "data",
        })
        .collect()
}
