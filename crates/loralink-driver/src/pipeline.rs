//! Ordered middleware applied to remote messages before the consumer.

use std::sync::Arc;

use loralink_frame::RemoteMessage;
use tracing::debug;

use crate::handler::MessageHandler;

/// Decision of one middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Pass the (possibly rewritten) message on.
    Continue(RemoteMessage),
    /// Drop the message.
    Stop,
}

pub trait Middleware: Send + Sync {
    fn process(&self, message: RemoteMessage) -> Flow;
}

impl<F> Middleware for F
where
    F: Fn(RemoteMessage) -> Flow + Send + Sync,
{
    fn process(&self, message: RemoteMessage) -> Flow {
        self(message)
    }
}

/// Runs middlewares in order, then hands surviving messages to a handler.
pub struct Pipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
    handler: Arc<dyn MessageHandler>,
}

impl Pipeline {
    pub fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            middlewares: Vec::new(),
            handler,
        }
    }

    /// Append a middleware; it runs after those already added.
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Apply every middleware. `None` if one of them stopped the message.
    pub fn run(&self, message: RemoteMessage) -> Option<RemoteMessage> {
        let mut current = message;
        for (index, middleware) in self.middlewares.iter().enumerate() {
            match middleware.process(current) {
                Flow::Continue(next) => current = next,
                Flow::Stop => {
                    debug!(index, "message stopped by middleware");
                    return None;
                }
            }
        }
        Some(current)
    }
}

impl MessageHandler for Pipeline {
    fn received(&self, message: RemoteMessage) {
        if let Some(message) = self.run(message) {
            self.handler.received(message);
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("middlewares", &self.middlewares.len())
            .finish_non_exhaustive()
    }
}
