//! Session notifications
//!
//! Every event is handed to registered observers first, in registration
//! order, then, if the session was built with an event queue, pushed onto
//! an unbounded crossbeam channel for polling:
//!
//! ```text
//! session task ──emit──┬──> observer 1 (inline, same task)
//!                      ├──> observer 2
//!                      └──> crossbeam channel ──> try_recv_event / recv_event
//!                           (opt-in)
//! ```
//!
//! Observers run on the session task and must not block.

use crate::traits::{Frame, SessionError};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

/// Observable signals of a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Transport established
    Connect,
    /// Transport torn down, for any reason
    Close,
    /// Auto-reconnect scheduled after an unexpected loss
    Reconnect(String),
    /// Connect or idle deadline exceeded
    Timeout,
    /// Transport-level error, surfaced verbatim
    Error(SessionError),
    /// A decoded frame, whether or not a pending request consumed it
    Data(Frame),
}

type Observer = Box<dyn Fn(&SessionEvent) + Send + Sync>;

/// Fan-out point for session events
#[derive(Clone)]
pub(crate) struct EventHub {
    tx: Option<Sender<SessionEvent>>,
    observers: Arc<RwLock<Vec<Observer>>>,
}

impl EventHub {
    /// Hub feeding observers, plus a polling queue when `queue` is set
    pub(crate) fn new(queue: bool) -> (Self, Option<Receiver<SessionEvent>>) {
        let (tx, rx) = if queue {
            let (tx, rx) = unbounded();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let hub = Self {
            tx,
            observers: Arc::new(RwLock::new(Vec::new())),
        };
        (hub, rx)
    }

    pub(crate) fn observe(&self, observer: Observer) {
        self.observers.write().push(observer);
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        for observer in self.observers.read().iter() {
            observer(&event);
        }
        if let Some(tx) = &self.tx {
            // Receiver lives in the handle; a dropped handle means nobody listens
            let _ = tx.send(event);
        }
    }
}
