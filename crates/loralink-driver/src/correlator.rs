//! FIFO matching of module replies to outstanding commands.
//!
//! The module answers commands strictly in the order it receives them and
//! its replies carry no request identifier. The correlator therefore keeps
//! pending requests in transmission order and hands every acknowledgement
//! to the oldest one. Nothing is matched by content.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{DriverError, Result};

/// Shape a reply is decoded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// The reply text as-is.
    Text,
    /// The reply text parsed as a base-10 integer.
    Integer,
    /// Whether the reply text ends with `OK`.
    Boolean,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResponseKind::Text => "text",
            ResponseKind::Integer => "integer",
            ResponseKind::Boolean => "boolean",
        })
    }
}

/// A request waiting for its reply, tagged with the shape it expects.
#[derive(Debug)]
pub enum PendingRequest {
    Text(oneshot::Sender<Result<String>>),
    Integer(oneshot::Sender<Result<i64>>),
    Boolean(oneshot::Sender<Result<bool>>),
}

impl PendingRequest {
    pub fn kind(&self) -> ResponseKind {
        match self {
            PendingRequest::Text(_) => ResponseKind::Text,
            PendingRequest::Integer(_) => ResponseKind::Integer,
            PendingRequest::Boolean(_) => ResponseKind::Boolean,
        }
    }

    /// Decode `text` for this request and complete its slot.
    ///
    /// A waiter that already gave up is not an error.
    fn resolve(self, text: &str) {
        let delivered = match self {
            PendingRequest::Text(tx) => tx.send(Ok(text.to_string())).is_ok(),
            PendingRequest::Integer(tx) => tx.send(parse_integer(text)).is_ok(),
            PendingRequest::Boolean(tx) => tx.send(Ok(text.ends_with("OK"))).is_ok(),
        };
        if !delivered {
            debug!(reply = text, "waiter gone, reply discarded");
        }
    }
}

fn parse_integer(text: &str) -> Result<i64> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| DriverError::ProtocolMismatch {
            expected: ResponseKind::Integer,
            reply: text.to_string(),
        })
}

#[derive(Debug, Default)]
struct Queue {
    next_id: u64,
    entries: VecDeque<(u64, PendingRequest)>,
}

/// Strictly ordered queue of pending requests.
#[derive(Debug, Default)]
pub struct Correlator {
    queue: Mutex<Queue>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect a text reply.
    pub fn enqueue_text(&self) -> Reply<String> {
        let (tx, rx) = oneshot::channel();
        let id = self.push(PendingRequest::Text(tx));
        Reply { id, rx }
    }

    /// Expect an integer reply.
    pub fn enqueue_integer(&self) -> Reply<i64> {
        let (tx, rx) = oneshot::channel();
        let id = self.push(PendingRequest::Integer(tx));
        Reply { id, rx }
    }

    /// Expect a boolean reply.
    pub fn enqueue_boolean(&self) -> Reply<bool> {
        let (tx, rx) = oneshot::channel();
        let id = self.push(PendingRequest::Boolean(tx));
        Reply { id, rx }
    }

    fn push(&self, request: PendingRequest) -> u64 {
        let mut queue = self.lock();
        let id = queue.next_id;
        queue.next_id = queue.next_id.wrapping_add(1);
        debug!(id, kind = %request.kind(), pending = queue.entries.len() + 1, "request queued");
        queue.entries.push_back((id, request));
        id
    }

    /// Hand a module reply to the oldest pending request.
    ///
    /// Returns `false` if nothing was waiting; the reply is then dropped.
    pub fn deliver(&self, text: &str) -> bool {
        let next = self.lock().entries.pop_front();
        match next {
            Some((id, request)) => {
                debug!(id, kind = %request.kind(), reply = text, "reply delivered");
                request.resolve(text);
                true
            }
            None => {
                warn!(reply = text, "module reply with no pending request");
                false
            }
        }
    }

    /// Remove a specific request if it is still queued.
    pub fn withdraw(&self, id: u64) -> bool {
        let mut queue = self.lock();
        match queue.entries.iter().position(|(entry, _)| *entry == id) {
            Some(pos) => {
                queue.entries.remove(pos);
                debug!(id, "request withdrawn");
                true
            }
            None => false,
        }
    }

    /// Wait for `reply`, withdrawing it if the wait expires.
    ///
    /// A module that drops one reply would otherwise leave the dead request
    /// at the head of the queue, and every later reply would land one slot
    /// early.
    pub async fn settle<T>(&self, reply: Reply<T>, timeout: Option<Duration>) -> Result<T> {
        let id = reply.id();
        match reply.wait(timeout).await {
            Err(DriverError::Timeout(limit)) => {
                if self.withdraw(id) {
                    warn!(id, ?limit, "request timed out; withdrawn from queue");
                }
                Err(DriverError::Timeout(limit))
            }
            other => other,
        }
    }

    /// Drop every pending request. Waiters observe `Cancelled`.
    pub fn clear(&self) -> usize {
        let mut queue = self.lock();
        let dropped = queue.entries.len();
        queue.entries.clear();
        if dropped > 0 {
            debug!(dropped, "pending requests cleared");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Single-assignment result slot for one pending request.
#[derive(Debug)]
pub struct Reply<T> {
    id: u64,
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Reply<T> {
    /// Queue identifier, usable with [`Correlator::withdraw`].
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the reply.
    ///
    /// With a timeout, an expired wait fails with `Timeout` and leaves the
    /// request queued. Use [`Correlator::settle`] to also withdraw it.
    pub async fn wait(self, timeout: Option<Duration>) -> Result<T> {
        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.rx)
                .await
                .map_err(|_| DriverError::Timeout(limit))?,
            None => self.rx.await,
        };
        received.map_err(|_| DriverError::Cancelled)?
    }

    /// Take the reply if it has already arrived.
    pub fn try_take(&mut self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(DriverError::Cancelled)),
        }
    }
}
