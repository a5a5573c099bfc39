//! Application-level node: a driver plus a message pipeline and an
//! address cache.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::access::AccessPolicy;
use crate::driver::Driver;
use crate::error::Result;
use crate::handler::{LogHandler, MessageHandler};
use crate::pipeline::{Middleware, Pipeline};

/// A radio node ready for application use.
#[derive(Debug)]
pub struct Node {
    driver: Driver,
    pipeline: Arc<Pipeline>,
    address: Mutex<Option<String>>,
    bootstrapped: AtomicBool,
}

impl Node {
    pub fn builder(driver: Driver) -> NodeBuilder {
        NodeBuilder::new(driver)
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Install the pipeline as the message consumer and connect.
    pub async fn bootstrap(&self) -> Result<bool> {
        let pipeline: Arc<dyn MessageHandler> = self.pipeline.clone();
        self.driver.set_message_handler(pipeline);
        let connected = self.driver.connect().await?;
        self.bootstrapped.store(connected, Ordering::SeqCst);
        if connected {
            info!(middlewares = self.pipeline.len(), "node bootstrapped");
        }
        Ok(connected)
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::SeqCst)
    }

    /// Disconnect and forget the cached address.
    pub fn disconnect(&self) -> Result<()> {
        self.bootstrapped.store(false, Ordering::SeqCst);
        self.cache(None);
        self.driver.disconnect()
    }

    /// Module address, queried once and cached.
    pub async fn address(&self) -> Result<String> {
        if let Some(address) = self.cached() {
            return Ok(address);
        }
        let address = self.driver.address().await?;
        if !address.is_empty() {
            self.cache(Some(address.clone()));
        }
        Ok(address)
    }

    pub async fn set_address(&self, address: &str) -> Result<bool> {
        let accepted = self.driver.set_address(address).await?;
        if accepted {
            self.cache(Some(address.to_ascii_uppercase()));
        }
        Ok(accepted)
    }

    /// Send to one node. `false` before [`Node::bootstrap`] succeeded.
    pub async fn send(&self, payload: &[u8], destination: &str) -> Result<bool> {
        if !self.is_bootstrapped() {
            return Ok(false);
        }
        self.driver.send_payload(payload, destination).await
    }

    /// Send to every node. `false` before [`Node::bootstrap`] succeeded.
    pub async fn broadcast(&self, payload: &[u8]) -> Result<bool> {
        if !self.is_bootstrapped() {
            return Ok(false);
        }
        self.driver.broadcast(payload).await
    }

    pub fn max_payload_size(&self) -> usize {
        self.driver.max_payload_size()
    }

    /// Channels this node can switch to. The module's channel is fixed by
    /// the radio configuration written at connect, so the list is empty.
    pub fn supported_channels(&self) -> &[u16] {
        &[]
    }

    /// Current channel, if the node exposes one. Always `None`.
    pub fn channel(&self) -> Option<u16> {
        None
    }

    /// Channel switching is not supported; always `false` and writes nothing.
    pub fn set_channel(&self, channel: u16) -> bool {
        debug!(channel, "channel switching not supported");
        false
    }

    fn cached(&self) -> Option<String> {
        self.address
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn cache(&self, address: Option<String>) {
        *self.address.lock().unwrap_or_else(PoisonError::into_inner) = address;
    }
}

/// Assembles a [`Node`].
pub struct NodeBuilder {
    driver: Driver,
    middlewares: Vec<Arc<dyn Middleware>>,
    handler: Arc<dyn MessageHandler>,
    policy: Option<Arc<dyn AccessPolicy>>,
}

impl NodeBuilder {
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            middlewares: Vec::new(),
            handler: Arc::new(LogHandler),
            policy: None,
        }
    }

    #[must_use]
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Final consumer of messages that pass the middlewares.
    #[must_use]
    pub fn handler(mut self, handler: impl MessageHandler + 'static) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    #[must_use]
    pub fn access_policy(mut self, policy: impl AccessPolicy + 'static) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    pub fn build(self) -> Node {
        let mut pipeline = Pipeline::new(self.handler);
        for middleware in self.middlewares {
            pipeline.push(middleware);
        }
        if let Some(policy) = self.policy {
            self.driver.set_access_policy(policy);
        }
        Node {
            driver: self.driver,
            pipeline: Arc::new(pipeline),
            address: Mutex::new(None),
            bootstrapped: AtomicBool::new(false),
        }
    }
}
