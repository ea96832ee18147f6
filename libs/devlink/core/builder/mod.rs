pub mod states;

use crate::core::config::SessionConfig;
use crate::core::session::Session;
use crate::traits::reconnect::from_interval;
use crate::traits::*;
use states::*;
use std::marker::PhantomData;
use std::time::Duration;

/// Type-state builder for [`Session`]
///
/// An endpoint (or a whole [`SessionConfig`]) must be set before the
/// session can be built. Everything else has a default:
///
/// | Setting | Default |
/// |---|---|
/// | reconnect interval | 3 s, zero disables |
/// | response timeout | 5 s |
/// | connect / idle timeout | the response timeout |
/// | decoder | [`RawChunks`] |
/// | transport | [`TcpTransport`] |
/// | reconnect strategy | [`FixedDelay`] at the reconnect interval |
/// | polling event queue | off; observers only |
pub struct SessionBuilder<E, T = TcpTransport>
where
    E: EndpointState,
{
    _state: PhantomData<E>,
    config: Option<SessionConfig>,
    transport: T,
    decoder: Option<Box<dyn FrameDecoder>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    reconnect_interval: Option<Duration>,
    response_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    idle_timeout: Option<Duration>,
    event_queue: bool,
}

impl SessionBuilder<NoEndpoint> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: PhantomData,
            config: None,
            transport: TcpTransport::new(),
            decoder: None,
            reconnect_strategy: None,
            reconnect_interval: None,
            response_timeout: None,
            connect_timeout: None,
            idle_timeout: None,
            event_queue: false,
        }
    }
}

impl Default for SessionBuilder<NoEndpoint> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> SessionBuilder<NoEndpoint, T> {
    /// Connect to `host:port` with default timings
    pub fn endpoint(self, host: impl Into<String>, port: u16) -> SessionBuilder<HasEndpoint, T> {
        self.with_config(SessionConfig::new(host, port))
    }

    /// Start from a loaded configuration
    ///
    /// Timing setters called later override the matching config values.
    pub fn config(self, config: SessionConfig) -> SessionBuilder<HasEndpoint, T> {
        self.with_config(config)
    }

    fn with_config(self, config: SessionConfig) -> SessionBuilder<HasEndpoint, T> {
        SessionBuilder {
            _state: PhantomData,
            config: Some(config),
            transport: self.transport,
            decoder: self.decoder,
            reconnect_strategy: self.reconnect_strategy,
            reconnect_interval: self.reconnect_interval,
            response_timeout: self.response_timeout,
            connect_timeout: self.connect_timeout,
            idle_timeout: self.idle_timeout,
            event_queue: self.event_queue,
        }
    }
}

impl<E: EndpointState, T: Transport> SessionBuilder<E, T> {
    /// Delay before an automatic reconnect; zero disables it
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = Some(interval);
        self
    }

    /// Per-request deadline, also the default connect and idle deadline
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Drop the connection after `timeout` without traffic; zero disables
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Split the byte stream into frames
    pub fn decoder<D: FrameDecoder>(mut self, decoder: D) -> Self {
        self.decoder = Some(Box::new(decoder));
        self
    }

    /// Also queue every event for [`Session::try_recv_event`] and friends
    ///
    /// Without this the session keeps no event backlog and events reach
    /// observers only. Enable it only if something drains the queue.
    pub fn with_event_queue(mut self) -> Self {
        self.event_queue = true;
        self
    }

    /// Replace the reconnect interval with a custom strategy
    pub fn reconnect_strategy<S>(mut self, strategy: S) -> Self
    where
        S: ReconnectionStrategy + 'static,
    {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }

    /// Open connections through `transport` instead of plain TCP
    pub fn transport<NewT: Transport>(self, transport: NewT) -> SessionBuilder<E, NewT> {
        SessionBuilder {
            _state: PhantomData,
            config: self.config,
            transport,
            decoder: self.decoder,
            reconnect_strategy: self.reconnect_strategy,
            reconnect_interval: self.reconnect_interval,
            response_timeout: self.response_timeout,
            connect_timeout: self.connect_timeout,
            idle_timeout: self.idle_timeout,
            event_queue: self.event_queue,
        }
    }
}

impl<T: Transport> SessionBuilder<HasEndpoint, T> {
    /// Build the session and spawn its task
    ///
    /// Does not connect; call [`Session::connect`] afterwards.
    pub async fn build(self) -> Result<Session> {
        let mut config = self.config.ok_or_else(|| {
            SessionError::Configuration("endpoint not set".to_string())
        })?;

        if let Some(interval) = self.reconnect_interval {
            config.reconnect_interval_secs = interval.as_secs_f64();
        }
        if let Some(timeout) = self.response_timeout {
            config.response_timeout_secs = timeout.as_secs_f64();
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout_secs = Some(timeout.as_secs_f64());
        }
        if let Some(timeout) = self.idle_timeout {
            config.idle_timeout_secs = Some(timeout.as_secs_f64());
        }

        config
            .validate()
            .map_err(|e| SessionError::Configuration(e.to_string()))?;

        let reconnect = self
            .reconnect_strategy
            .unwrap_or_else(|| from_interval(config.reconnect_interval()));
        let decoder = self.decoder.unwrap_or_else(|| Box::new(RawChunks));

        Ok(Session::spawn(
            config,
            self.transport,
            decoder,
            reconnect,
            self.event_queue,
        ))
    }
}
