//! Lock-free session state and counters
//!
//! Written only by the session task, read from any handle.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// No transport and no reconnect pending
    Idle = 0,
    /// A connect attempt is in flight
    Connecting = 1,
    /// Handshake completed, transport live
    Connected = 2,
    /// Lost the peer, reconnect timer armed
    ReconnectWait = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Connecting,
            2 => SessionState::Connected,
            3 => SessionState::ReconnectWait,
            _ => SessionState::Idle,
        }
    }
}

/// Atomic wrapper around [`SessionState`]
#[derive(Debug)]
pub struct AtomicSessionState(AtomicU8);

impl AtomicSessionState {
    pub fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.get() == SessionState::Connected
    }
}

/// Session counters
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    frames_received: AtomicU64,
    reconnect_count: AtomicU64,
    timeout_count: AtomicU64,
    outstanding_requests: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_frames(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_timeouts(&self) {
        self.timeout_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_outstanding(&self, count: usize) {
        self.outstanding_requests.store(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    pub fn timeout_count(&self) -> u64 {
        self.timeout_count.load(Ordering::Relaxed)
    }

    /// Requests registered and not yet settled
    pub fn outstanding_requests(&self) -> u64 {
        self.outstanding_requests.load(Ordering::Relaxed)
    }
}
