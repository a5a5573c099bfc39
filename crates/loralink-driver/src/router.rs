//! Classification and dispatch of inbound frames.

use std::sync::{Arc, PoisonError, RwLock};

use loralink_frame::{classify, Frame, FrameKind, RemoteMessage};
use tracing::{debug, warn};

use crate::access::{AccessPolicy, AllowAll};
use crate::correlator::Correlator;
use crate::handler::{LogHandler, MessageHandler};

/// What became of a routed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Module reply handed to a pending request.
    Delivered,
    /// Module reply with nothing pending.
    Unmatched,
    /// Remote message handed to the consumer.
    Remote,
    /// Remote message refused by the access policy.
    Rejected,
    /// Empty frame, or remote frame too short or with a malformed header.
    Dropped,
    /// Unrecognized prefix.
    Unknown,
}

/// Sends module replies to the correlator and remote traffic to the consumer.
pub struct MessageRouter {
    correlator: Arc<Correlator>,
    handler: RwLock<Arc<dyn MessageHandler>>,
    policy: RwLock<Arc<dyn AccessPolicy>>,
}

impl MessageRouter {
    pub fn new(correlator: Arc<Correlator>) -> Self {
        Self {
            correlator,
            handler: RwLock::new(Arc::new(LogHandler)),
            policy: RwLock::new(Arc::new(AllowAll)),
        }
    }

    pub fn set_handler(&self, handler: Arc<dyn MessageHandler>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = handler;
    }

    pub fn set_policy(&self, policy: Arc<dyn AccessPolicy>) {
        *self.policy.write().unwrap_or_else(PoisonError::into_inner) = policy;
    }

    /// Route one complete frame.
    pub fn route(&self, frame: Frame) -> Route {
        if frame.is_empty() {
            debug!("empty frame dropped");
            return Route::Dropped;
        }
        match classify(&frame) {
            FrameKind::Module => {
                if self.correlator.deliver(&frame.to_text()) {
                    Route::Delivered
                } else {
                    Route::Unmatched
                }
            }
            FrameKind::Remote => self.route_remote(&frame),
            FrameKind::Unknown => {
                warn!(frame = %frame.to_text(), "frame with unknown prefix dropped");
                Route::Unknown
            }
        }
    }

    fn route_remote(&self, frame: &Frame) -> Route {
        let message = match RemoteMessage::parse(frame) {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, frame_len = frame.len(), "remote frame dropped");
                return Route::Dropped;
            }
        };

        let policy = Arc::clone(&self.policy.read().unwrap_or_else(PoisonError::into_inner));
        if !policy.is_authorized(&message.source) {
            debug!(source = %message.source, "remote message rejected by access policy");
            return Route::Rejected;
        }

        // Clone out so a handler may replace itself without deadlocking.
        let handler = Arc::clone(&self.handler.read().unwrap_or_else(PoisonError::into_inner));
        handler.received(message);
        Route::Remote
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("pending", &self.correlator.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::access::AllowList;

    fn frame(bytes: &'static [u8]) -> Frame {
        Frame::new(bytes)
    }

    fn collecting_router() -> (MessageRouter, Arc<Correlator>, Arc<Mutex<Vec<RemoteMessage>>>) {
        let correlator = Arc::new(Correlator::new());
        let router = MessageRouter::new(Arc::clone(&correlator));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        router.set_handler(Arc::new(move |message: RemoteMessage| {
            sink.lock().unwrap().push(message);
        }));
        (router, correlator, seen)
    }

    #[tokio::test]
    async fn module_reply_completes_oldest_request() {
        let (router, correlator, _) = collecting_router();
        let reply = correlator.enqueue_boolean();

        assert_eq!(router.route(frame(b"AT,OK")), Route::Delivered);
        assert!(reply.wait(None).await.unwrap());
        assert_eq!(router.route(frame(b"AT,OK")), Route::Unmatched);
    }

    #[test]
    fn remote_message_reaches_handler() {
        let (router, _, seen) = collecting_router();

        assert_eq!(router.route(frame(b"LR,0A2F,05,hello")), Route::Remote);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].source, "0A2F");
        assert_eq!(seen[0].payload.as_ref(), b"hello");
    }

    #[test]
    fn short_remote_frame_leaves_correlator_alone() {
        let (router, correlator, seen) = collecting_router();
        let _reply = correlator.enqueue_boolean();

        assert_eq!(router.route(frame(b"LR,0A2F")), Route::Dropped);
        assert_eq!(router.route(frame(b"LR,0A,F,05,hello")), Route::Dropped);

        assert_eq!(correlator.len(), 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_prefix_is_dropped() {
        let (router, correlator, _) = collecting_router();
        let _reply = correlator.enqueue_text();

        assert_eq!(router.route(frame(b"+READY")), Route::Unknown);
        assert_eq!(correlator.len(), 1);
    }

    #[test]
    fn empty_frame_is_dropped_quietly() {
        let (router, correlator, seen) = collecting_router();
        let _reply = correlator.enqueue_text();

        assert_eq!(router.route(frame(b"")), Route::Dropped);
        assert_eq!(correlator.len(), 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn access_policy_filters_sources() {
        let (router, _, seen) = collecting_router();
        router.set_policy(Arc::new(AllowList::new(["0A2F"])));

        assert_eq!(router.route(frame(b"LR,1234,02,no")), Route::Rejected);
        assert_eq!(router.route(frame(b"LR,0A2F,03,yes")), Route::Remote);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
