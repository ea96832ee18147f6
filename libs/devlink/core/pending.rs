//! Request correlator
//!
//! Outstanding requests live in an indexed registry owned by the session
//! task. Each one is an independent matcher consulted for every frame of
//! the connection it was registered on:
//!
//! ```text
//! frame ──> for each attached request:
//!             success pattern?  ──> settle Ok(match)
//!             failure pattern?  ──> settle Err(RequestRejected(match))
//!             otherwise         ──> keep waiting
//! ```
//!
//! There is no FIFO pairing between requests and responses. One frame can
//! settle several requests whose patterns overlap.
//!
//! Settling removes the entry, so it happens at most once whichever of
//! match or deadline comes first. On disconnect every entry is detached:
//! it stops seeing frames, from this connection or any later one, and can
//! only time out.

use crate::core::pattern::{Pattern, ResponseMatch};
use crate::traits::{Frame, Result, SessionError};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

pub(crate) type RequestId = u64;

/// Roughly 30 years, the horizon tokio uses for unbounded sleeps
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + timeout`, saturating at a far-future instant
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

/// Where a request's outcome is delivered
pub(crate) type Reply = oneshot::Sender<Result<ResponseMatch>>;

struct PendingRequest {
    success: Pattern,
    failure: Option<Pattern>,
    deadline: Instant,
    timeout: Duration,
    attached: bool,
    reply: Reply,
}

enum Outcome {
    Matched(ResponseMatch),
    Rejected(ResponseMatch),
}

impl PendingRequest {
    fn evaluate(&self, text: &str, frame: &Frame) -> Option<Outcome> {
        if let Some(m) = self.success.capture(text, frame) {
            return Some(Outcome::Matched(m));
        }
        self.failure
            .as_ref()?
            .capture(text, frame)
            .map(Outcome::Rejected)
    }
}

/// Registry of active matchers
#[derive(Default)]
pub(crate) struct PendingRequests {
    next_id: RequestId,
    entries: HashMap<RequestId, PendingRequest>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Attach a new matcher to the live frame stream
    pub(crate) fn register(
        &mut self,
        success: Pattern,
        failure: Option<Pattern>,
        timeout: Duration,
        reply: Reply,
    ) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            id,
            PendingRequest {
                success,
                failure,
                deadline: deadline_after(timeout),
                timeout,
                attached: true,
                reply,
            },
        );
        id
    }

    /// Offer `frame` to every attached matcher
    ///
    /// Returns the number of requests settled by this frame.
    pub(crate) fn dispatch(&mut self, frame: &Frame) -> usize {
        if !self.entries.values().any(|req| req.attached) {
            return 0;
        }

        let text = frame.to_text_lossy();
        let settled: Vec<(RequestId, Outcome)> = self
            .entries
            .iter()
            .filter(|(_, req)| req.attached)
            .filter_map(|(id, req)| req.evaluate(&text, frame).map(|outcome| (*id, outcome)))
            .collect();

        let count = settled.len();
        for (id, outcome) in settled {
            if let Some(req) = self.entries.remove(&id) {
                let result = match outcome {
                    Outcome::Matched(m) => Ok(m),
                    Outcome::Rejected(m) => Err(SessionError::RequestRejected(m)),
                };
                // Caller may have stopped waiting
                let _ = req.reply.send(result);
            }
        }
        count
    }

    /// Settle every request whose deadline is at or before `now`
    pub(crate) fn expire(&mut self, now: Instant) -> usize {
        let expired: Vec<RequestId> = self
            .entries
            .iter()
            .filter(|(_, req)| req.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(req) = self.entries.remove(id) {
                debug!("Request {} timed out after {:?}", id, req.timeout);
                let _ = req.reply.send(Err(SessionError::RequestTimeout {
                    timeout: req.timeout,
                }));
            }
        }
        expired.len()
    }

    /// Settle one request with an error
    pub(crate) fn fail(&mut self, id: RequestId, err: SessionError) -> bool {
        match self.entries.remove(&id) {
            Some(req) => {
                let _ = req.reply.send(Err(err));
                true
            }
            None => false,
        }
    }

    /// Detach every matcher from the frame stream
    ///
    /// Detached requests keep their deadline and nothing else.
    pub(crate) fn detach_all(&mut self) -> usize {
        let mut detached = 0;
        for req in self.entries.values_mut().filter(|req| req.attached) {
            req.attached = false;
            detached += 1;
        }
        detached
    }

    /// Drop requests whose caller is no longer waiting
    pub(crate) fn prune_abandoned(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, req| !req.reply.is_closed());
        before - self.entries.len()
    }

    /// Earliest deadline among all outstanding requests
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|req| req.deadline).min()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn attached_count(&self) -> usize {
        self.entries.values().filter(|req| req.attached).count()
    }
}
