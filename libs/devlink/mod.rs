//! # Devlink
//!
//! A resilient point-to-point TCP session client for command-oriented
//! device protocols.
//!
//! ## Features
//!
//! - **Automatic reconnection**: Fixed-interval reconnect after unexpected loss, never after `close()`
//! - **Liveness detection**: Connect and idle deadlines tear down silent peers
//! - **Pattern-matched requests**: Send a command and wait for a success or failure reply
//! - **Pluggable framing**: Raw chunks, lines, delimiters or any tokio-util codec
//! - **Lock-free observation**: Atomic state and metrics, unbounded crossbeam event channel

pub mod traits;
pub mod core;

// Re-export all traits
pub use traits::*;

// Re-export core session functionality
pub use crate::core::{
    builder, config, connection_state, events, pattern, session,
    builder::{states, SessionBuilder},
    config::{ConfigError, SessionConfig},
    connection_state::{AtomicMetrics, AtomicSessionState, SessionState},
    events::SessionEvent,
    pattern::{Pattern, ResponseMatch},
    session::{Metrics, Session},
};

// Convenience function
pub use crate::core::builder as session_builder;
