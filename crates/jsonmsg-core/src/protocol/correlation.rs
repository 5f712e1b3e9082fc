//! Matching `Ack` frames to the requests that caused them.
//!
//! Every `Subscribe`, `CloseSubscription`, `DestroySubscription` and QoS ≥ 1
//! `Send` carries a numeric `ID`.  The server answers each one with an `Ack`
//! echoing that ID, in whatever order it likes.  [`RequestCorrelator`] owns the
//! table of outstanding requests and invokes the matching callback exactly
//! once, whether the request is acknowledged, times out, or is abandoned when
//! the connection goes away.
//!
//! # ID allocation
//!
//! IDs start at 1 and increase monotonically for the lifetime of the
//! correlator.  They are never reused, even after the request resolves, so a
//! late duplicate `Ack` can never resolve a newer request by accident.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use super::frames::AckFrame;

/// Invoked when the server acknowledges a request with `RC` 0.
pub type SuccessCallback = Box<dyn FnOnce(&RequestTarget) + Send>;

/// Invoked when a request is rejected, times out, or is abandoned.
pub type FailureCallback = Box<dyn FnOnce(&RequestTarget, &RequestFailure) + Send>;

/// Kind of request an ID was allocated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Subscribe,
    CloseSubscription,
    DestroySubscription,
    Send,
}

/// What a request was about, handed back to its callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    Subscribe { name: String, topic: String },
    CloseSubscription { name: String },
    DestroySubscription { name: String },
    Send { topic: String },
}

impl RequestTarget {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestTarget::Subscribe { .. } => RequestKind::Subscribe,
            RequestTarget::CloseSubscription { .. } => RequestKind::CloseSubscription,
            RequestTarget::DestroySubscription { .. } => RequestKind::DestroySubscription,
            RequestTarget::Send { .. } => RequestKind::Send,
        }
    }

    /// The subscription name, for subscription requests.
    pub fn name(&self) -> Option<&str> {
        match self {
            RequestTarget::Subscribe { name, .. }
            | RequestTarget::CloseSubscription { name }
            | RequestTarget::DestroySubscription { name } => Some(name),
            RequestTarget::Send { .. } => None,
        }
    }

    /// The topic, for `Subscribe` and `Send` requests.
    pub fn topic(&self) -> Option<&str> {
        match self {
            RequestTarget::Subscribe { topic, .. } | RequestTarget::Send { topic } => Some(topic),
            _ => None,
        }
    }
}

/// Why a request did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestFailure {
    /// The server answered with a nonzero result code.
    Rejected { rc: u32, reason: Option<String> },
    /// No `Ack` arrived within the request timeout.
    Timeout,
    /// The connection ended while the request was outstanding.
    ConnectionClosed,
}

impl RequestFailure {
    /// The server result code, for [`RequestFailure::Rejected`].
    pub fn result_code(&self) -> Option<u32> {
        match self {
            RequestFailure::Rejected { rc, .. } => Some(*rc),
            _ => None,
        }
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestFailure::Rejected {
                rc,
                reason: Some(reason),
            } => write!(f, "rejected by server (RC={rc}): {reason}"),
            RequestFailure::Rejected { rc, reason: None } => {
                write!(f, "rejected by server (RC={rc})")
            }
            RequestFailure::Timeout => f.write_str("no acknowledgment before the request timeout"),
            RequestFailure::ConnectionClosed => f.write_str("connection closed before acknowledgment"),
        }
    }
}

/// One outstanding request and its callbacks.
pub struct PendingRequest {
    id: u64,
    target: RequestTarget,
    on_success: Option<SuccessCallback>,
    on_failure: Option<FailureCallback>,
}

impl PendingRequest {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn target(&self) -> &RequestTarget {
        &self.target
    }

    /// Consumes the request and runs its success callback, if any.
    pub fn succeed(self) {
        let PendingRequest {
            target, on_success, ..
        } = self;
        if let Some(f) = on_success {
            f(&target);
        }
    }

    /// Consumes the request and runs its failure callback, if any.
    pub fn fail(self, failure: &RequestFailure) {
        let PendingRequest {
            target, on_failure, ..
        } = self;
        if let Some(f) = on_failure {
            f(&target, failure);
        }
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Outcome of feeding an `Ack` to [`RequestCorrelator::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub id: u64,
    pub kind: RequestKind,
    pub accepted: bool,
}

/// Table of outstanding requests keyed by ID.
#[derive(Debug)]
pub struct RequestCorrelator {
    next_id: u64,
    pending: HashMap<u64, PendingRequest>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
        }
    }

    /// Allocates a fresh ID without registering a pending entry.
    ///
    /// Used for QoS 0 sends, which carry no ID on the wire but still consume
    /// one so IDs stay unique across every request the caller made.
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Registers a request and returns the ID to put on the wire.
    pub fn register(
        &mut self,
        target: RequestTarget,
        on_success: Option<SuccessCallback>,
        on_failure: Option<FailureCallback>,
    ) -> u64 {
        let id = self.allocate_id();
        debug!("request {id}: registered {:?}", target.kind());
        self.pending.insert(
            id,
            PendingRequest {
                id,
                target,
                on_success,
                on_failure,
            },
        );
        id
    }

    /// Resolves the request named by `ack`, invoking its callback.
    ///
    /// The entry is removed before the callback runs, so a panicking callback
    /// still leaves the table consistent.  Returns `None` for an unknown ID.
    pub fn resolve(&mut self, ack: &AckFrame) -> Option<Resolved> {
        let Some(request) = self.pending.remove(&ack.id) else {
            warn!("ack for unknown request id {}; ignoring", ack.id);
            return None;
        };
        let kind = request.target.kind();
        let accepted = ack.rc == 0;
        if accepted {
            debug!("request {}: acknowledged", ack.id);
            request.succeed();
        } else {
            debug!("request {}: rejected with RC={}", ack.id, ack.rc);
            request.fail(&RequestFailure::Rejected {
                rc: ack.rc,
                reason: ack.reason.clone(),
            });
        }
        Some(Resolved {
            id: ack.id,
            kind,
            accepted,
        })
    }

    /// Fails request `id` with [`RequestFailure::Timeout`].
    ///
    /// Returns `false` if the request already resolved.
    pub fn expire(&mut self, id: u64) -> bool {
        match self.pending.remove(&id) {
            Some(request) => {
                debug!("request {id}: timed out");
                request.fail(&RequestFailure::Timeout);
                true
            }
            None => false,
        }
    }

    /// Removes every outstanding request, in ID order.
    ///
    /// The caller decides how to fail them; callbacks are not invoked here.
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        let mut drained: Vec<PendingRequest> = self.pending.drain().map(|(_, r)| r).collect();
        drained.sort_by_key(|r| r.id);
        drained
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
