use crate::core::builder::{states::NoEndpoint, SessionBuilder};
use crate::core::config::SessionConfig;
use crate::core::connection_state::{AtomicMetrics, AtomicSessionState, SessionState};
use crate::core::driver::{Command, SessionDriver};
use crate::core::events::{EventHub, SessionEvent};
use crate::core::pattern::{Pattern, ResponseMatch};
use crate::traits::*;
use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

/// Session metrics snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metrics {
    pub state: SessionState,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub frames_received: u64,
    pub reconnect_count: u64,
    pub timeout_count: u64,
    pub outstanding_requests: u64,
}

/// Resilient client session to a single remote endpoint
///
/// The handle is cheap to share behind an `Arc`; every operation is
/// forwarded to a background task that owns the transport:
/// - `connect`/`close` drive the lifecycle and wait for it to settle
/// - `send` writes a command and waits for the flush
/// - `request` writes a command and waits for a matching frame
///
/// Dropping the handle stops the background task and drops the transport.
pub struct Session {
    config: Arc<SessionConfig>,
    state: Arc<AtomicSessionState>,
    metrics: Arc<AtomicMetrics>,
    command_tx: mpsc::UnboundedSender<Command>,
    event_rx: Option<Receiver<SessionEvent>>,
    events: EventHub,
    task_handle: JoinHandle<()>,
}

impl Session {
    /// Start building a session
    pub fn builder() -> SessionBuilder<NoEndpoint> {
        SessionBuilder::new()
    }

    /// Spawn the session task
    ///
    /// Must be called from within a tokio runtime. Nothing connects until
    /// [`Session::connect`] is called.
    pub(crate) fn spawn<T: Transport>(
        config: SessionConfig,
        transport: T,
        decoder: Box<dyn FrameDecoder>,
        reconnect: Box<dyn ReconnectionStrategy>,
        event_queue: bool,
    ) -> Self {
        let config = Arc::new(config);
        let state = Arc::new(AtomicSessionState::new(SessionState::Idle));
        let metrics = Arc::new(AtomicMetrics::new());
        let (events, event_rx) = EventHub::new(event_queue);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let driver = SessionDriver::new(
            Arc::clone(&config),
            Arc::new(transport),
            decoder,
            reconnect,
            Arc::clone(&state),
            Arc::clone(&metrics),
            events.clone(),
            command_rx,
        );
        let task_handle = tokio::spawn(driver.run());

        Self {
            config,
            state,
            metrics,
            command_tx,
            event_rx,
            events,
            task_handle,
        }
    }

    fn command(&self, cmd: Command) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|_| SessionError::SessionClosed)
    }

    /// Connect, or join the attempt already in flight
    ///
    /// Resolves immediately when already connected. Only the outcome of the
    /// attempt this call started or joined is reported; later automatic
    /// reconnects show up on the event surface only.
    pub async fn connect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Connect { reply })?;
        rx.await.map_err(|_| SessionError::SessionClosed)?
    }

    /// Close the transport and cancel any pending reconnect
    ///
    /// Waits until the peer acknowledges the half-close, bounded by the
    /// response timeout. Safe to call in any state.
    pub async fn close(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Close { reply })?;
        rx.await.map_err(|_| SessionError::SessionClosed)
    }

    /// Write `command` and wait until it is flushed
    pub async fn send(&self, command: impl Into<Bytes>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send {
            payload: command.into(),
            reply,
        })?;
        rx.await.map_err(|_| SessionError::SessionClosed)?
    }

    /// Write `command` and wait for a frame matching `success` or `failure`
    ///
    /// Every outstanding request sees every frame, so one frame can settle
    /// several requests whose patterns overlap. Patterns should be specific
    /// enough to tell replies apart.
    ///
    /// # Errors
    /// - [`SessionError::RequestRejected`] if `failure` matched first
    /// - [`SessionError::RequestTimeout`] if nothing matched in time
    /// - [`SessionError::NotConnected`] if there is no live transport
    pub async fn request(
        &self,
        command: impl Into<Bytes>,
        success: Pattern,
        failure: Option<Pattern>,
    ) -> Result<ResponseMatch> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Request {
            payload: command.into(),
            success,
            failure,
            reply,
        })?;
        rx.await.map_err(|_| SessionError::SessionClosed)?
    }

    /// [`Session::request`] with patterns compiled from strings
    pub async fn request_str(
        &self,
        command: impl Into<Bytes>,
        success: &str,
        failure: Option<&str>,
    ) -> Result<ResponseMatch> {
        let success = Pattern::new(success)?;
        let failure = failure.map(Pattern::new).transpose()?;
        self.request(command, success, failure).await
    }

    /// Close and wait for the session task to exit
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down session to {}", self.config.endpoint());

        match self.close().await {
            Ok(()) | Err(SessionError::SessionClosed) => {}
            Err(e) => return Err(e),
        }

        let Session {
            command_tx,
            task_handle,
            ..
        } = self;
        drop(command_tx);
        let _ = task_handle.await;

        Ok(())
    }

    /// Register a callback run on the session task for every event
    ///
    /// Observers run in registration order, before the event reaches the
    /// polling channel. They must not block.
    pub fn observe<F>(&self, observer: F)
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.events.observe(Box::new(observer));
    }

    /// Try to receive an event (non-blocking)
    ///
    /// Always `None` unless the session was built
    /// [`with_event_queue`](SessionBuilder::with_event_queue).
    pub fn try_recv_event(&self) -> Option<SessionEvent> {
        self.event_rx.as_ref()?.try_recv().ok()
    }

    /// Receive an event (blocking)
    ///
    /// Fails at once when the session has no event queue.
    pub fn recv_event(&self) -> std::result::Result<SessionEvent, RecvError> {
        self.event_rx.as_ref().ok_or(RecvError)?.recv()
    }

    /// Receive an event, waiting at most `timeout` (blocking)
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<SessionEvent> {
        match self.event_rx.as_ref()?.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            state: self.state.get(),
            bytes_sent: self.metrics.bytes_sent(),
            bytes_received: self.metrics.bytes_received(),
            frames_received: self.metrics.frames_received(),
            reconnect_count: self.metrics.reconnect_count(),
            timeout_count: self.metrics.timeout_count(),
            outstanding_requests: self.metrics.outstanding_requests(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }
}
