use std::time::Duration;

/// Trait for defining reconnection strategies
///
/// Consulted once per unexpected disconnection. A user-initiated close
/// never reaches the strategy.
pub trait ReconnectionStrategy: Send + Sync {
    /// Get the delay before the next reconnection attempt
    ///
    /// # Arguments
    /// * `attempt` - Consecutive failed or lost connections since the last
    ///   successful connect (0-indexed)
    ///
    /// # Returns
    /// * `Some(duration)` - Wait this long before reconnecting
    /// * `None` - Stay idle
    fn next_delay(&self, attempt: usize) -> Option<Duration>;
}

/// Build the default strategy for a configured interval
///
/// A zero interval disables reconnection entirely.
pub fn from_interval(interval: Duration) -> Box<dyn ReconnectionStrategy> {
    if interval.is_zero() {
        Box::new(NeverReconnect)
    } else {
        Box::new(FixedDelay::new(interval))
    }
}

/// Fixed delay reconnection strategy
///
/// Always waits the same amount of time between reconnection attempts.
/// There is no backoff growth.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<usize>,
}

impl FixedDelay {
    /// Retry forever every `delay`
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Give up after `max_attempts` consecutive failures
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.delay),
        }
    }
}

/// Never reconnect strategy
///
/// The session goes idle after any disconnection
#[derive(Debug, Clone)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn next_delay(&self, _attempt: usize) -> Option<Duration> {
        None
    }
}
