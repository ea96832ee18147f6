//! # Devlink Traits
//!
//! The seams a caller can plug into a session:
//!
//! - **Transport**: Open the underlying duplex byte stream
//! - **FrameDecoder**: Split the raw byte stream into application frames
//! - **ReconnectionStrategy**: Decide whether and when to reconnect
//!
//! Plus the shared error type.
//!
//! ## Example
//!
//! ```rust,ignore
//! use devlink::traits::*;
//!
//! // Frames terminated by a carriage return
//! struct CrDecoder;
//!
//! impl FrameDecoder for CrDecoder {
//!     fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>> {
//!         match buf.iter().position(|b| *b == b'\r') {
//!             Some(i) => {
//!                 let line = buf.split_to(i + 1);
//!                 Ok(Some(Frame::new(line.freeze().slice(..i))))
//!             }
//!             None => Ok(None),
//!         }
//!     }
//! }
//! ```

pub mod decoder;
pub mod error;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use decoder::{CodecDecoder, DelimiterDecoder, Frame, FrameDecoder, LineDecoder, RawChunks};
pub use error::{Result, SessionError};
pub use reconnect::{FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use transport::{TcpTransport, Transport};
