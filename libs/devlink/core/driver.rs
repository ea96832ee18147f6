//! Connection lifecycle state machine
//!
//! One driver task owns the transport, the frame decoder, every timer and
//! the pending-request registry. Handles talk to it over an mpsc command
//! channel and get answers back on oneshot channels, so all state changes
//! happen on a single task in the order their causes arrive.
//!
//! ```text
//!            connect()                 handshake ok
//!   Idle ─────────────────> Connecting ─────────────> Connected
//!    ^ ^                      │    ^                      │
//!    │ │ close() /            │    │ timer fires          │ peer EOF, error,
//!    │ │ reconnect disabled   │    │                      │ idle timeout
//!    │ └──────────────────────┤  ReconnectWait <──────────┤
//!    │                        └───────────────────────────┘
//!    └──────── close() from any state ─────────
//! ```
//!
//! Loss of a transport emits `Timeout` (timer-induced only), `Error` (if
//! any), `Reconnect` (if scheduled), then `Close`.
//!
//! The stream is split once connected. Outgoing commands wait in a queue
//! that the loop drains one partial write at a time, so a peer that stops
//! reading stalls only that queue and every deadline keeps running.

use crate::core::config::SessionConfig;
use crate::core::connection_state::{AtomicMetrics, AtomicSessionState, SessionState};
use crate::core::events::{EventHub, SessionEvent};
use crate::core::pattern::Pattern;
use crate::core::pending::{deadline_after, PendingRequests, Reply, RequestId};
use crate::traits::{Frame, FrameDecoder, ReconnectionStrategy, Result, SessionError, Transport};
use bytes::{Buf, Bytes, BytesMut};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::future::pending;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{
    split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, sleep_until, Instant, Sleep};
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 4096;

/// Requests from a session handle to its driver
pub(crate) enum Command {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
    Send {
        payload: Bytes,
        reply: oneshot::Sender<Result<()>>,
    },
    Request {
        payload: Bytes,
        success: Pattern,
        failure: Option<Pattern>,
        reply: Reply,
    },
}

/// The live transport: unread input on one side, queued output on the other
struct Link<S> {
    reader: ReadHalf<S>,
    buf: BytesMut,
    writer: Outbound<S>,
}

struct Outbound<S> {
    half: WriteHalf<S>,
    queue: VecDeque<Outgoing>,
    /// Half-close once the queue is flushed
    shutdown: bool,
}

/// A queued command and who to tell once it is flushed
struct Outgoing {
    data: Bytes,
    ack: Ack,
}

enum Ack {
    Send(oneshot::Sender<Result<()>>),
    /// Already registered; only a write failure settles it here
    Request(RequestId),
}

/// One step of draining the outbound queue
enum Progress {
    Wrote(usize),
    Flushed,
    ShutDown,
}

/// Why the select loop woke up
enum Wake<S> {
    Command(Option<Command>),
    Connected(io::Result<S>),
    Read(io::Result<usize>),
    Write(io::Result<Progress>),
    ConnectDeadline,
    IdleDeadline,
    ReconnectTimer,
    CloseDeadline,
    RequestDeadline,
}

type Timer = Option<Pin<Box<Sleep>>>;

pub(crate) struct SessionDriver<T: Transport> {
    config: Arc<SessionConfig>,
    transport: Arc<T>,
    decoder: Box<dyn FrameDecoder>,
    reconnect: Box<dyn ReconnectionStrategy>,
    state: Arc<AtomicSessionState>,
    metrics: Arc<AtomicMetrics>,
    events: EventHub,
    commands: mpsc::UnboundedReceiver<Command>,

    link: Option<Link<T::Stream>>,
    attempt: Option<BoxFuture<'static, io::Result<T::Stream>>>,

    connect_deadline: Timer,
    idle_deadline: Timer,
    reconnect_timer: Timer,
    close_deadline: Timer,

    user_initiated_close: bool,
    /// Set while the write half is shut down and we wait for the peer's EOF
    closing: bool,
    /// A connect() arrived during a graceful close
    connect_after_close: bool,
    connect_waiters: Vec<oneshot::Sender<Result<()>>>,
    close_waiters: Vec<oneshot::Sender<()>>,

    pending: PendingRequests,
    reconnect_attempt: usize,
}

impl<T: Transport> SessionDriver<T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: Arc<SessionConfig>,
        transport: Arc<T>,
        decoder: Box<dyn FrameDecoder>,
        reconnect: Box<dyn ReconnectionStrategy>,
        state: Arc<AtomicSessionState>,
        metrics: Arc<AtomicMetrics>,
        events: EventHub,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            config,
            transport,
            decoder,
            reconnect,
            state,
            metrics,
            events,
            commands,
            link: None,
            attempt: None,
            connect_deadline: None,
            idle_deadline: None,
            reconnect_timer: None,
            close_deadline: None,
            user_initiated_close: false,
            closing: false,
            connect_after_close: false,
            connect_waiters: Vec::new(),
            close_waiters: Vec::new(),
            pending: PendingRequests::new(),
            reconnect_attempt: 0,
        }
    }

    /// Drive the session until every handle is dropped
    pub(crate) async fn run(mut self) {
        debug!("Session task started for {}", self.config.endpoint());

        loop {
            let request_deadline = self.pending.next_deadline();
            let (inbound, outbound) = match self.link.as_mut() {
                Some(link) => (
                    Some((&mut link.reader, &mut link.buf)),
                    Some(&mut link.writer),
                ),
                None => (None, None),
            };

            let wake = tokio::select! {
                cmd = self.commands.recv() => Wake::Command(cmd),
                result = poll_attempt(&mut self.attempt) => Wake::Connected(result),
                read = read_link(inbound) => Wake::Read(read),
                progress = drive_outbound(outbound) => Wake::Write(progress),
                _ = sleep_opt(&mut self.connect_deadline) => Wake::ConnectDeadline,
                _ = sleep_opt(&mut self.idle_deadline) => Wake::IdleDeadline,
                _ = sleep_opt(&mut self.reconnect_timer) => Wake::ReconnectTimer,
                _ = sleep_opt(&mut self.close_deadline) => Wake::CloseDeadline,
                _ = sleep_until_opt(request_deadline) => Wake::RequestDeadline,
            };

            match wake {
                Wake::Command(Some(cmd)) => self.handle_command(cmd),
                Wake::Command(None) => {
                    debug!("All session handles dropped");
                    break;
                }
                Wake::Connected(result) => {
                    self.attempt = None;
                    match result {
                        Ok(stream) => self.on_connected(stream),
                        Err(e) => self.on_connect_failed(e.into(), false),
                    }
                }
                Wake::Read(result) => self.on_read(result),
                Wake::Write(result) => self.on_write(result),
                Wake::ConnectDeadline => {
                    self.connect_deadline = None;
                    self.attempt = None;
                    warn!(
                        "Connect to {} timed out after {:?}",
                        self.config.endpoint(),
                        self.config.connect_timeout()
                    );
                    let err = SessionError::ConnectTimeout {
                        host: self.config.host.clone(),
                        port: self.config.port,
                    };
                    self.on_connect_failed(err, true);
                }
                Wake::IdleDeadline => {
                    self.idle_deadline = None;
                    let timeout = self.config.idle_timeout().unwrap_or_default();
                    warn!(
                        "No traffic on {} for {:?}, dropping connection",
                        self.config.endpoint(),
                        timeout
                    );
                    self.on_link_lost(Some(SessionError::IdleTimeout { timeout }), true);
                }
                Wake::ReconnectTimer => {
                    self.reconnect_timer = None;
                    self.reconnect_attempt += 1;
                    self.metrics.increment_reconnects();
                    info!(
                        "Reconnecting to {} (attempt {})",
                        self.config.endpoint(),
                        self.reconnect_attempt
                    );
                    self.start_attempt();
                }
                Wake::CloseDeadline => {
                    self.close_deadline = None;
                    debug!("Peer did not acknowledge close, dropping stream");
                    self.finish_close();
                }
                Wake::RequestDeadline => {
                    self.pending.expire(Instant::now());
                }
            }

            self.metrics.set_outstanding(self.pending.len());
        }

        self.teardown_link();
        self.state.set(SessionState::Idle);
        debug!("Session task exiting");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { reply } => self.on_connect_command(reply),
            Command::Close { reply } => self.on_close_command(reply),
            Command::Send { payload, reply } => {
                if !self.writable() {
                    let _ = reply.send(Err(SessionError::NotConnected));
                    return;
                }
                self.enqueue(payload, Ack::Send(reply));
            }
            Command::Request {
                payload,
                success,
                failure,
                reply,
            } => {
                if !self.writable() {
                    let _ = reply.send(Err(SessionError::NotConnected));
                    return;
                }
                // Listen before writing so a fast reply cannot slip past
                let id = self.pending.register(
                    success,
                    failure,
                    self.config.response_timeout(),
                    reply,
                );
                self.enqueue(payload, Ack::Request(id));
            }
        }
    }

    fn on_connect_command(&mut self, reply: oneshot::Sender<Result<()>>) {
        if self.closing {
            debug!("Connect requested during close, deferring");
            self.connect_waiters.push(reply);
            self.connect_after_close = true;
            return;
        }

        match self.state.get() {
            SessionState::Connected => {
                let _ = reply.send(Ok(()));
            }
            SessionState::Connecting => self.connect_waiters.push(reply),
            SessionState::Idle | SessionState::ReconnectWait => {
                self.connect_waiters.push(reply);
                self.start_attempt();
            }
        }
    }

    fn on_close_command(&mut self, reply: oneshot::Sender<()>) {
        self.user_initiated_close = true;
        self.reconnect_timer = None;

        if self.connect_after_close {
            self.connect_after_close = false;
            self.fail_connect_waiters(SessionError::ConnectionClosed);
        }

        if self.attempt.is_some() {
            debug!("Aborting connect to {}", self.config.endpoint());
            self.attempt = None;
            self.connect_deadline = None;
            self.state.set(SessionState::Idle);
            self.fail_connect_waiters(SessionError::ConnectionClosed);
            self.events.emit(SessionEvent::Close);
            let _ = reply.send(());
            return;
        }

        let Some(link) = self.link.as_mut() else {
            self.state.set(SessionState::Idle);
            let _ = reply.send(());
            return;
        };

        self.close_waiters.push(reply);
        if self.closing {
            return;
        }

        info!("Closing connection to {}", self.config.endpoint());
        // Queued output goes first, then the half-close; the deadline covers both
        link.writer.shutdown = true;
        self.closing = true;
        self.idle_deadline = None;
        self.close_deadline = Some(Box::pin(sleep(self.config.response_timeout())));
    }

    fn writable(&self) -> bool {
        self.link.is_some() && !self.closing
    }

    fn enqueue(&mut self, data: Bytes, ack: Ack) {
        match self.link.as_mut() {
            Some(link) => link.writer.queue.push_back(Outgoing { data, ack }),
            None => self.settle_unsent(ack, SessionError::NotConnected, true),
        }
    }

    fn on_write(&mut self, result: io::Result<Progress>) {
        let Some(link) = self.link.as_mut() else {
            return;
        };

        match result {
            Ok(Progress::Wrote(n)) => {
                if let Some(next) = link.writer.queue.front_mut() {
                    next.data.advance(n);
                }
                self.metrics.add_sent(n);
                if !self.closing {
                    self.arm_idle();
                }
            }
            Ok(Progress::Flushed) => {
                if let Some(Outgoing {
                    ack: Ack::Send(reply),
                    ..
                }) = link.writer.queue.pop_front()
                {
                    let _ = reply.send(Ok(()));
                }
            }
            Ok(Progress::ShutDown) => {
                link.writer.shutdown = false;
                debug!("Write half closed, waiting for peer");
            }
            Err(e) => {
                let err = SessionError::from(e);
                let unsent: Vec<Outgoing> = link.writer.queue.drain(..).collect();
                for item in unsent {
                    self.settle_unsent(item.ack, err.clone(), true);
                }

                if self.closing {
                    debug!("Write during close failed: {}", err);
                    self.finish_close();
                } else {
                    warn!("Write to {} failed: {}", self.config.endpoint(), err);
                    self.on_link_lost(Some(err), false);
                }
            }
        }
    }

    /// Answer a queued command that never made it onto the wire
    fn settle_unsent(&mut self, ack: Ack, err: SessionError, fail_request: bool) {
        match ack {
            Ack::Send(reply) => {
                let _ = reply.send(Err(err));
            }
            Ack::Request(id) if fail_request => {
                self.pending.fail(id, err);
            }
            Ack::Request(_) => {}
        }
    }

    fn start_attempt(&mut self) {
        self.user_initiated_close = false;
        self.reconnect_timer = None;
        self.state.set(SessionState::Connecting);

        let transport = Arc::clone(&self.transport);
        let host = self.config.host.clone();
        let port = self.config.port;
        debug!("Connecting to {}:{}", host, port);

        self.attempt = Some(Box::pin(async move { transport.connect(&host, port).await }));
        self.connect_deadline = Some(Box::pin(sleep(self.config.connect_timeout())));
    }

    fn on_connected(&mut self, stream: T::Stream) {
        self.connect_deadline = None;
        self.reconnect_timer = None;
        self.reconnect_attempt = 0;
        let (reader, half) = split(stream);
        self.link = Some(Link {
            reader,
            buf: BytesMut::with_capacity(READ_CHUNK),
            writer: Outbound {
                half,
                queue: VecDeque::new(),
                shutdown: false,
            },
        });
        self.arm_idle();
        self.state.set(SessionState::Connected);

        info!("Connected to {}", self.config.endpoint());
        self.events.emit(SessionEvent::Connect);

        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
    }

    fn on_connect_failed(&mut self, err: SessionError, timed_out: bool) {
        self.connect_deadline = None;
        if timed_out {
            self.metrics.increment_timeouts();
            self.events.emit(SessionEvent::Timeout);
        } else {
            warn!("Failed to connect to {}: {}", self.config.endpoint(), err);
        }
        self.events.emit(SessionEvent::Error(err.clone()));

        self.after_loss();
        self.fail_connect_waiters(err);
    }

    fn on_read(&mut self, result: io::Result<usize>) {
        match result {
            Ok(0) => {
                if self.closing {
                    debug!("Peer acknowledged close");
                    self.finish_close();
                } else {
                    info!("Connection closed by {}", self.config.endpoint());
                    self.on_link_lost(None, false);
                }
            }
            Ok(n) => {
                self.metrics.add_received(n);
                if !self.closing {
                    self.arm_idle();
                }
                self.drain_frames();
            }
            Err(e) => {
                warn!("Read from {} failed: {}", self.config.endpoint(), e);
                if self.closing {
                    self.events.emit(SessionEvent::Error(e.into()));
                    self.finish_close();
                } else {
                    self.on_link_lost(Some(e.into()), false);
                }
            }
        }
    }

    fn drain_frames(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };

        let mut frames = Vec::new();
        let mut failure = None;
        loop {
            match self.decoder.decode(&mut link.buf) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(e) => {
                    link.buf.clear();
                    failure = Some(e);
                    break;
                }
            }
        }

        for frame in frames {
            self.deliver(frame);
        }

        if let Some(err) = failure {
            warn!("Discarding undecodable input: {}", err);
            self.decoder.reset();
            self.events.emit(SessionEvent::Error(err));
        }
    }

    fn deliver(&mut self, frame: Frame) {
        self.metrics.increment_frames();
        self.events.emit(SessionEvent::Data(frame.clone()));

        self.pending.prune_abandoned();
        let settled = self.pending.dispatch(&frame);
        if settled > 0 {
            debug!("Frame settled {} pending request(s)", settled);
        }
    }

    /// Unexpected loss of a live link
    fn on_link_lost(&mut self, cause: Option<SessionError>, timed_out: bool) {
        if timed_out {
            self.metrics.increment_timeouts();
            self.events.emit(SessionEvent::Timeout);
        }
        if let Some(err) = cause {
            self.events.emit(SessionEvent::Error(err));
        }

        self.teardown_link();
        self.after_loss();
    }

    /// Shared tail of every unexpected close: schedule or give up, then `Close`
    fn after_loss(&mut self) {
        let delay = if self.user_initiated_close {
            None
        } else {
            self.reconnect.next_delay(self.reconnect_attempt)
        };

        match delay {
            Some(delay) => {
                let notice = format!(
                    "Connection at {} lost! Attempting reconnect in {} seconds...",
                    self.config.endpoint(),
                    delay.as_secs_f64()
                );
                info!("{}", notice);
                self.reconnect_timer = Some(Box::pin(sleep(delay)));
                self.state.set(SessionState::ReconnectWait);
                self.events.emit(SessionEvent::Reconnect(notice));
            }
            None => {
                if !self.user_initiated_close {
                    debug!("Not reconnecting to {}", self.config.endpoint());
                }
                self.state.set(SessionState::Idle);
            }
        }

        self.events.emit(SessionEvent::Close);
    }

    fn finish_close(&mut self) {
        self.close_deadline = None;
        self.closing = false;
        self.teardown_link();
        self.state.set(SessionState::Idle);

        info!("Connection to {} closed", self.config.endpoint());
        self.events.emit(SessionEvent::Close);

        for waiter in self.close_waiters.drain(..) {
            let _ = waiter.send(());
        }

        if self.connect_after_close {
            self.connect_after_close = false;
            if !self.connect_waiters.is_empty() {
                self.start_attempt();
            }
        }
    }

    /// Drop the stream and everything bound to it
    ///
    /// Unsent requests stay registered and run out their deadline.
    fn teardown_link(&mut self) {
        if let Some(link) = self.link.take() {
            self.decoder.reset();
            for item in link.writer.queue {
                self.settle_unsent(item.ack, SessionError::ConnectionClosed, false);
            }
        }
        self.idle_deadline = None;

        let detached = self.pending.detach_all();
        if detached > 0 {
            debug!("Detached {} pending request(s) from closed stream", detached);
        }
    }

    fn arm_idle(&mut self) {
        let Some(timeout) = self.config.idle_timeout() else {
            return;
        };
        let deadline = deadline_after(timeout);
        match self.idle_deadline.as_mut() {
            Some(timer) => timer.as_mut().reset(deadline),
            None => self.idle_deadline = Some(Box::pin(sleep_until(deadline))),
        }
    }

    fn fail_connect_waiters(&mut self, err: SessionError) {
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(err.clone()));
        }
    }
}

async fn sleep_opt(timer: &mut Timer) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn poll_attempt<S>(attempt: &mut Option<BoxFuture<'static, io::Result<S>>>) -> io::Result<S> {
    match attempt {
        Some(fut) => fut.as_mut().await,
        None => pending().await,
    }
}

async fn read_link<S: AsyncRead>(
    inbound: Option<(&mut ReadHalf<S>, &mut BytesMut)>,
) -> io::Result<usize> {
    match inbound {
        Some((reader, buf)) => {
            buf.reserve(READ_CHUNK);
            reader.read_buf(buf).await
        }
        None => pending().await,
    }
}

/// Advance the head of the outbound queue by one write, flush or half-close
///
/// Every step is cancel-safe: bytes count as written only once `write`
/// returns, and the queue is advanced by the caller.
async fn drive_outbound<S: AsyncWrite>(
    outbound: Option<&mut Outbound<S>>,
) -> io::Result<Progress> {
    let Some(out) = outbound else {
        return pending().await;
    };

    match out.queue.front() {
        Some(next) if !next.data.is_empty() => {
            let n = out.half.write(&next.data).await?;
            if n == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            Ok(Progress::Wrote(n))
        }
        Some(_) => {
            out.half.flush().await?;
            Ok(Progress::Flushed)
        }
        None if out.shutdown => {
            out.half.shutdown().await?;
            Ok(Progress::ShutDown)
        }
        None => pending().await,
    }
}
