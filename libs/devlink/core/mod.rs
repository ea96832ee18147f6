//! # Devlink core
//!
//! The session machinery behind [`Session`]:
//!
//! - **driver**: connection lifecycle state machine on a dedicated task
//! - **pending**: registry of outstanding requests matched against frames
//! - **events**: observer registry plus a crossbeam channel for polling
//! - **builder**: type-state builder enforcing an endpoint before `build()`
//!
//! ## Example
//!
//! ```rust,ignore
//! use devlink::{LineDecoder, Pattern, Session, SessionEvent};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> devlink::Result<()> {
//!     let session = Session::builder()
//!         .endpoint("192.168.1.40", 4999)
//!         .decoder(LineDecoder::new())
//!         .reconnect_interval(Duration::from_secs(3))
//!         .build()
//!         .await?;
//!
//!     session.connect().await?;
//!
//!     let reply = session
//!         .request("PWR?\r\n", Pattern::new(r"PWR=(\d)")?, Some(Pattern::new("ERR")?))
//!         .await?;
//!     println!("power state: {:?}", reply.get(1));
//!
//!     while let Some(event) = session.try_recv_event() {
//!         println!("Event: {:?}", event);
//!     }
//!
//!     session.shutdown().await
//! }
//! ```

pub mod builder;
pub mod config;
pub mod connection_state;
pub(crate) mod driver;
pub mod events;
pub mod pattern;
pub(crate) mod pending;
pub mod session;

// Re-export main types
pub use self::builder::{states, SessionBuilder};
pub use self::config::{ConfigError, SessionConfig};
pub use self::connection_state::{AtomicMetrics, AtomicSessionState, SessionState};
pub use self::events::SessionEvent;
pub use self::pattern::{Pattern, ResponseMatch};
pub use self::session::{Metrics, Session};

// Re-export traits for convenience
pub use crate::traits::*;

/// Create a new session builder
///
/// # Example
/// ```ignore
/// let session = devlink::builder()
///     .endpoint("10.0.0.7", 23)
///     .response_timeout(Duration::from_secs(2))
///     .build()
///     .await?;
/// ```
pub fn builder() -> SessionBuilder<builder::states::NoEndpoint> {
    SessionBuilder::new()
}
