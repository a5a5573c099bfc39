//! Caller-facing driver.
//!
//! Every operation writes its command and registers the expected reply
//! under one transmit lock, so the correlator queue is always in wire order.
//! Multi-step protocols (connect, payload send) additionally hold the
//! exchange lock for their whole duration so no other caller's command can
//! land between their steps.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use loralink_frame::{
    encode_line, Command, BROADCAST_ADDRESS, MAX_PAYLOAD_SIZE, SENDING_MARKER, SENT_MARKER,
};
use loralink_transport::Link;
use tracing::{debug, info, warn};

use crate::access::AccessPolicy;
use crate::config::DriverConfig;
use crate::correlator::{Correlator, Reply};
use crate::error::{DriverError, Result};
use crate::handler::MessageHandler;
use crate::reader::{spawn_reader, ReaderHandle};
use crate::router::MessageRouter;
use crate::state::{ConnectionState, StateCell};

const ADDRESS_LEN: usize = 4;

/// Driver for one radio module.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Driver {
    inner: Arc<Inner>,
}

struct Inner {
    link: Arc<dyn Link>,
    config: DriverConfig,
    correlator: Arc<Correlator>,
    router: Arc<MessageRouter>,
    state: StateCell,
    tx_lock: Mutex<()>,
    exchange: tokio::sync::Mutex<()>,
    reader: Mutex<Option<ReaderHandle>>,
}

impl Driver {
    /// Create a driver over `link` with default settings.
    pub fn new<L: Link>(link: L) -> Self {
        Self::with_config(link, DriverConfig::default())
    }

    pub fn with_config<L: Link>(link: L, config: DriverConfig) -> Self {
        let correlator = Arc::new(Correlator::new());
        let router = Arc::new(MessageRouter::new(Arc::clone(&correlator)));
        Self {
            inner: Arc::new(Inner {
                link: Arc::new(link),
                config,
                correlator,
                router,
                state: StateCell::new(),
                tx_lock: Mutex::new(()),
                exchange: tokio::sync::Mutex::new(()),
                reader: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    /// Whether the handshake has completed and the link is open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Ready && self.inner.link.is_open()
    }

    /// Largest payload accepted by [`Driver::send_payload`].
    pub fn max_payload_size(&self) -> usize {
        MAX_PAYLOAD_SIZE
    }

    /// Replace the consumer of remote messages.
    pub fn set_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.inner.router.set_handler(handler);
    }

    /// Replace the policy deciding which sources reach the consumer.
    pub fn set_access_policy(&self, policy: Arc<dyn AccessPolicy>) {
        self.inner.router.set_policy(policy);
    }

    /// Number of commands still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.len()
    }

    /// Open the link and run the configuration handshake.
    ///
    /// Resolves `true` once the module is configured and in receive mode,
    /// immediately if it already is. Resolves `false` if the link cannot be
    /// opened, the module rejects either handshake step, or another connect
    /// is in progress. A failed handshake leaves the link closed.
    pub async fn connect(&self) -> Result<bool> {
        match self.state() {
            ConnectionState::Ready => return Ok(true),
            ConnectionState::Connecting => return Ok(false),
            ConnectionState::Disconnected => {}
        }

        let _exchange = self.inner.exchange.lock().await;
        if self.state() == ConnectionState::Ready {
            return Ok(true);
        }

        if let Some(stale) = self.inner.take_reader() {
            stale.join();
        }

        if let Err(err) = self.inner.link.open() {
            warn!(link = self.inner.link.name(), error = %err, "failed to open link");
            return Ok(false);
        }
        let guard = ConnectGuard::new(&self.inner);

        let reader = match spawn_reader(
            Arc::clone(&self.inner.link),
            Arc::clone(&self.inner.router),
            self.inner.config.poll_interval(),
            self.inner.config.frame_config(),
        ) {
            Ok(reader) => reader,
            Err(err) => {
                warn!(error = %err, "failed to start reader");
                return Ok(false);
            }
        };
        *lock(&self.inner.reader) = Some(reader);

        if let Err(found) = self
            .inner
            .state
            .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
        {
            debug!(state = %found, "unexpected state at connect");
            return Ok(false);
        }
        info!(link = self.inner.link.name(), "configuring module");

        let configure = Command::Configure(self.inner.config.radio_config.clone());
        if !self.handshake_step(&configure).await {
            return Ok(false);
        }
        if !self.handshake_step(&Command::ReceiveMode).await {
            return Ok(false);
        }
        // A disconnect may have landed while the last reply was in flight.
        if self
            .inner
            .state
            .transition(ConnectionState::Connecting, ConnectionState::Ready)
            .is_err()
        {
            return Ok(false);
        }

        guard.disarm();
        info!(link = self.inner.link.name(), "module ready");
        Ok(true)
    }

    /// Stop the reader, drop pending requests and close the link.
    ///
    /// Safe to call from a message handler. Waiters observe `Cancelled`.
    pub fn disconnect(&self) -> Result<()> {
        self.inner.stop_reader();
        self.inner.correlator.clear();
        self.inner.state.set(ConnectionState::Disconnected);
        self.inner.link.close().map_err(DriverError::from_link)?;
        info!(link = self.inner.link.name(), "disconnected");
        Ok(())
    }

    /// Reboot the module (`AT+RST`).
    pub async fn reboot(&self) -> Result<bool> {
        let accepted = self
            .exchange(Command::Reboot, Correlator::enqueue_boolean)
            .await?;
        Ok(accepted.unwrap_or(false))
    }

    /// Query the module address.
    ///
    /// Resolves to an empty string if the reply is not of the form
    /// `AT,<addr4>,OK`.
    pub async fn address(&self) -> Result<String> {
        let reply = self
            .exchange(Command::QueryAddress, Correlator::enqueue_text)
            .await?;
        Ok(reply
            .as_deref()
            .and_then(parse_address_reply)
            .unwrap_or_default())
    }

    /// Set the module address.
    pub async fn set_address(&self, address: &str) -> Result<bool> {
        validate_address(address)?;
        let accepted = self
            .exchange(
                Command::SetAddress(address.to_ascii_uppercase()),
                Correlator::enqueue_boolean,
            )
            .await?;
        Ok(accepted.unwrap_or(false))
    }

    /// Transmit `payload` to the node at `destination`.
    ///
    /// Resolves `true` once the module reports the payload sent. Any step the
    /// module rejects, or that fails after the first command was admitted,
    /// resolves `false`.
    pub async fn send_payload(&self, payload: &[u8], destination: &str) -> Result<bool> {
        if payload.is_empty() {
            return Err(DriverError::InvalidArgument("payload is empty".to_string()));
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(DriverError::InvalidArgument(format!(
                "payload is {} bytes, maximum is {MAX_PAYLOAD_SIZE}",
                payload.len()
            )));
        }
        validate_address(destination)?;

        let set_destination = Command::SetDestination(destination.to_ascii_uppercase());
        if !self.admit(&set_destination)? {
            return Ok(false);
        }
        let _exchange = self.inner.exchange.lock().await;

        match self.run_payload(set_destination, payload).await {
            Ok(sent) => Ok(sent),
            Err(err @ (DriverError::NotConnected | DriverError::InvalidArgument(_))) => Err(err),
            Err(err) => {
                warn!(destination, error = %err, "payload send failed");
                Ok(false)
            }
        }
    }

    /// Transmit `payload` to every node.
    pub async fn broadcast(&self, payload: &[u8]) -> Result<bool> {
        self.send_payload(payload, BROADCAST_ADDRESS).await
    }

    async fn run_payload(&self, set_destination: Command, payload: &[u8]) -> Result<bool> {
        let timeout = self.inner.config.reply_timeout();

        let Some(accepted) = self
            .request(&set_destination, Correlator::enqueue_boolean)
            .await?
        else {
            return Ok(false);
        };
        if !accepted {
            debug!("destination rejected");
            return Ok(false);
        }

        let announce = Command::AnnounceSize(payload.len());
        let Some(accepted) = self.request(&announce, Correlator::enqueue_boolean).await? else {
            return Ok(false);
        };
        if !accepted {
            debug!(size = payload.len(), "payload size rejected");
            return Ok(false);
        }

        let (sending, sent) = self.transmit_payload(payload)?;
        let sent_id = sent.id();
        let started = self.inner.correlator.settle(sending, timeout).await;
        match started {
            Ok(text) if text == SENDING_MARKER => {}
            Ok(text) => {
                debug!(reply = %text, "module did not start sending");
                self.inner.correlator.withdraw(sent_id);
                return Ok(false);
            }
            Err(err) => {
                self.inner.correlator.withdraw(sent_id);
                return Err(err);
            }
        }

        let finished = self.inner.correlator.settle(sent, timeout).await?;
        let ok = finished == SENT_MARKER;
        if ok {
            debug!(size = payload.len(), "payload sent");
        } else {
            debug!(reply = %finished, "unexpected completion marker");
        }
        Ok(ok)
    }

    async fn handshake_step(&self, command: &Command) -> bool {
        match self.request(command, Correlator::enqueue_boolean).await {
            Ok(Some(true)) => true,
            Ok(_) => {
                warn!(command = command.name(), "module rejected handshake step");
                false
            }
            Err(err) => {
                warn!(command = command.name(), error = %err, "handshake step failed");
                false
            }
        }
    }

    /// Admit, take the exchange lock and run one command.
    async fn exchange<T>(
        &self,
        command: Command,
        enqueue: impl FnOnce(&Correlator) -> Reply<T>,
    ) -> Result<Option<T>> {
        if !self.admit(&command)? {
            return Ok(None);
        }
        let _exchange = self.inner.exchange.lock().await;
        self.request(&command, enqueue).await
    }

    /// Send one command and wait for its reply.
    ///
    /// `None` means the command was not admitted and nothing was written.
    async fn request<T>(
        &self,
        command: &Command,
        enqueue: impl FnOnce(&Correlator) -> Reply<T>,
    ) -> Result<Option<T>> {
        if !self.admit(command)? {
            return Ok(None);
        }
        let reply = self.transmit(command, enqueue)?;
        self.inner
            .correlator
            .settle(reply, self.inner.config.reply_timeout())
            .await
            .map(Some)
    }

    /// Decide whether `command` may go out now.
    ///
    /// While connecting only handshake commands pass; others are refused
    /// without error. A closed link or an unconfigured module is an error.
    fn admit(&self, command: &Command) -> Result<bool> {
        let state = self.state();
        if state == ConnectionState::Connecting && !command.is_handshake() {
            debug!(command = command.name(), "command refused while connecting");
            return Ok(false);
        }
        if !self.inner.link.is_open() {
            return Err(DriverError::NotConnected);
        }
        match state {
            ConnectionState::Disconnected => Err(DriverError::NotConnected),
            ConnectionState::Connecting | ConnectionState::Ready => Ok(true),
        }
    }

    fn transmit<T>(
        &self,
        command: &Command,
        enqueue: impl FnOnce(&Correlator) -> Reply<T>,
    ) -> Result<Reply<T>> {
        let mut line = BytesMut::new();
        command.encode(&mut line);

        let _tx = lock(&self.inner.tx_lock);
        let reply = enqueue(&self.inner.correlator);
        if let Err(err) = self.inner.link.write(&line) {
            self.inner.correlator.withdraw(reply.id());
            return Err(DriverError::from_link(err));
        }
        debug!(command = command.name(), "command sent");
        Ok(reply)
    }

    /// Write the raw payload, expecting the sending and sent markers.
    fn transmit_payload(&self, payload: &[u8]) -> Result<(Reply<String>, Reply<String>)> {
        let mut line = BytesMut::with_capacity(payload.len() + 2);
        encode_line(payload, &mut line);

        let _tx = lock(&self.inner.tx_lock);
        let sending = self.inner.correlator.enqueue_text();
        let sent = self.inner.correlator.enqueue_text();
        if let Err(err) = self.inner.link.write(&line) {
            self.inner.correlator.withdraw(sending.id());
            self.inner.correlator.withdraw(sent.id());
            return Err(DriverError::from_link(err));
        }
        debug!(size = payload.len(), "payload written");
        Ok((sending, sent))
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("link", &self.inner.link.name())
            .field("state", &self.state())
            .field("pending", &self.pending_requests())
            .finish()
    }
}

impl Inner {
    fn take_reader(&self) -> Option<ReaderHandle> {
        lock(&self.reader).take()
    }

    fn close_link(&self) {
        if let Err(err) = self.link.close() {
            debug!(error = %err, "close failed");
        }
    }

    /// Signal the reader to exit. The handle stays in place so the next
    /// connect can join it before reopening the link.
    fn stop_reader(&self) {
        if let Some(reader) = lock(&self.reader).as_ref() {
            reader.stop();
        }
    }

    fn abort_connect(&self) {
        self.stop_reader();
        self.correlator.clear();
        self.state.set(ConnectionState::Disconnected);
        self.close_link();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop_reader();
        self.close_link();
    }
}

/// Rolls a connect back unless disarmed, including when the connect
/// future is dropped midway.
struct ConnectGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl<'a> ConnectGuard<'a> {
    fn new(inner: &'a Inner) -> Self {
        Self { inner, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            info!(link = self.inner.link.name(), "handshake failed");
            self.inner.abort_connect();
        }
    }
}

fn validate_address(address: &str) -> Result<()> {
    if address.len() != ADDRESS_LEN || !address.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DriverError::InvalidArgument(format!(
            "address '{address}' is not {ADDRESS_LEN} hex digits"
        )));
    }
    Ok(())
}

/// Extract the address from an `AT,<addr4>,OK` reply.
fn parse_address_reply(reply: &str) -> Option<String> {
    let fields: Vec<&str> = reply.split(',').collect();
    match fields.as_slice() {
        [_, address, status] if *status == "OK" && address.len() == ADDRESS_LEN => {
            Some((*address).to_string())
        }
        _ => {
            debug!(reply, "unexpected address reply");
            None
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use loralink_transport::{MemoryLink, ModuleEnd};

    use super::*;
    use crate::testing::{cooperative_script, written_lines, Responder};

    fn quick_config() -> DriverConfig {
        DriverConfig {
            reply_timeout_ms: Some(2_000),
            poll_interval_ms: 1,
            ..DriverConfig::default()
        }
    }

    fn driver() -> (Driver, ModuleEnd) {
        let (link, module) = MemoryLink::pair();
        (Driver::with_config(link, quick_config()), module)
    }

    async fn connected() -> (Driver, ModuleEnd, Responder) {
        let (driver, module) = driver();
        let responder = Responder::cooperative(module.clone());
        assert!(driver.connect().await.unwrap());
        (driver, module, responder)
    }

    #[tokio::test]
    async fn connect_runs_handshake() {
        let (driver, module, _responder) = connected().await;

        assert_eq!(driver.state(), ConnectionState::Ready);
        assert!(driver.is_connected());
        assert_eq!(
            written_lines(&module),
            vec![
                "AT+CFG=433000000,20,6,12,1,1,0,0,0,0,3000,8,4".to_string(),
                "AT+RX".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn connect_twice_handshakes_once() {
        let (driver, module, _responder) = connected().await;

        assert!(driver.connect().await.unwrap());
        assert_eq!(written_lines(&module).len(), 2);
        assert_eq!(module.open_count(), 1);
    }

    #[tokio::test]
    async fn connect_fails_when_link_refuses_to_open() {
        let (driver, module) = driver();
        module.refuse_open(true);

        assert!(!driver.connect().await.unwrap());
        assert_eq!(driver.state(), ConnectionState::Disconnected);
        assert!(module.written().is_empty());
    }

    #[tokio::test]
    async fn rejected_configuration_skips_receive_mode() {
        let (driver, module) = driver();
        let _responder = Responder::spawn(module.clone(), |_| vec!["AT,ERR".to_string()]);

        assert!(!driver.connect().await.unwrap());
        assert_eq!(driver.state(), ConnectionState::Disconnected);
        assert_eq!(driver.pending_requests(), 0);
        assert!(!module.is_open());

        let lines = written_lines(&module);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("AT+CFG="));
    }

    #[tokio::test]
    async fn rejected_receive_mode_fails_connect() {
        let (driver, module) = driver();
        let _responder = Responder::spawn(module.clone(), |line| {
            if line == "AT+RX" {
                vec!["AT,ERR".to_string()]
            } else {
                vec!["AT,OK".to_string()]
            }
        });

        assert!(!driver.connect().await.unwrap());
        assert_eq!(driver.state(), ConnectionState::Disconnected);
        assert_eq!(written_lines(&module).len(), 2);
    }

    #[tokio::test]
    async fn connect_retries_from_scratch_after_failure() {
        let (driver, module) = driver();
        let (tx, rx) = std::sync::mpsc::channel::<bool>();
        let _responder = Responder::spawn(module.clone(), move |line| {
            let healthy = rx.try_recv().unwrap_or(false);
            if healthy || line == "AT+RX" {
                vec!["AT,OK".to_string()]
            } else {
                vec!["AT,ERR".to_string()]
            }
        });

        assert!(!driver.connect().await.unwrap());
        tx.send(true).unwrap();
        assert!(driver.connect().await.unwrap());
        assert_eq!(module.open_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn commands_refused_while_connecting() {
        let (driver, module) = driver();
        let connecting = {
            let driver = driver.clone();
            tokio::spawn(async move { driver.connect().await })
        };
        let cfg = module.recv_line(Duration::from_secs(2)).unwrap();
        assert!(cfg.starts_with(b"AT+CFG="));
        assert_eq!(driver.state(), ConnectionState::Connecting);

        assert!(!driver.send_payload(b"hello", "0A2F").await.unwrap());
        assert!(!driver.broadcast(b"hello").await.unwrap());
        assert!(!driver.reboot().await.unwrap());
        assert_eq!(driver.address().await.unwrap(), "");
        assert!(!driver.connect().await.unwrap());
        assert_eq!(driver.pending_requests(), 1);

        module.reply("AT,OK");
        assert_eq!(
            module.recv_line(Duration::from_secs(2)).unwrap(),
            b"AT+RX".to_vec()
        );
        module.reply("AT,OK");

        assert!(connecting.await.unwrap().unwrap());
        assert_eq!(driver.state(), ConnectionState::Ready);
        assert_eq!(written_lines(&module).len(), 2);
    }

    #[tokio::test]
    async fn send_payload_follows_protocol() {
        let (driver, module, _responder) = connected().await;

        assert!(driver.send_payload(b"hello", "0a2f").await.unwrap());
        assert_eq!(
            written_lines(&module)[2..],
            ["AT+DEST=0A2F", "AT+SEND=5", "hello"]
        );
        assert_eq!(driver.pending_requests(), 0);
    }

    #[tokio::test]
    async fn single_byte_payload() {
        let (driver, module, _responder) = connected().await;

        assert!(driver.send_payload(b"x", "0A2F").await.unwrap());
        assert_eq!(written_lines(&module)[2..], ["AT+DEST=0A2F", "AT+SEND=1", "x"]);
    }

    #[tokio::test]
    async fn binary_payload_is_written_verbatim() {
        let (driver, module, _responder) = connected().await;
        let payload = [0x00, 0xFF, 0x7F, 0x80];

        assert!(driver.send_payload(&payload, "0A2F").await.unwrap());
        assert!(module
            .written()
            .ends_with(b"AT+SEND=4\r\n\x00\xFF\x7F\x80\r\n"));
        assert_eq!(driver.pending_requests(), 0);
    }

    #[tokio::test]
    async fn broadcast_targets_all_nodes() {
        let (driver, module, _responder) = connected().await;

        assert!(driver.broadcast(&[b'x'; MAX_PAYLOAD_SIZE]).await.unwrap());
        assert_eq!(written_lines(&module)[2], "AT+DEST=FFFF");
        assert_eq!(written_lines(&module)[3], "AT+SEND=250");
    }

    #[tokio::test]
    async fn invalid_arguments_touch_nothing() {
        let (driver, module, _responder) = connected().await;
        let before = module.written().len();

        let oversized = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        assert!(matches!(
            driver.send_payload(&oversized, "0A2F").await,
            Err(DriverError::InvalidArgument(_))
        ));
        assert!(matches!(
            driver.send_payload(b"", "0A2F").await,
            Err(DriverError::InvalidArgument(_))
        ));
        assert!(matches!(
            driver.send_payload(b"hi", "").await,
            Err(DriverError::InvalidArgument(_))
        ));
        assert!(matches!(
            driver.set_address("XYZ1").await,
            Err(DriverError::InvalidArgument(_))
        ));

        assert_eq!(module.written().len(), before);
        assert_eq!(driver.pending_requests(), 0);
    }

    #[tokio::test]
    async fn rejected_destination_short_circuits() {
        let (driver, module) = driver();
        let _responder = Responder::spawn(module.clone(), |line| {
            if line.starts_with("AT+DEST=") {
                vec!["AT,ERR".to_string()]
            } else {
                cooperative_script(line)
            }
        });
        assert!(driver.connect().await.unwrap());

        assert!(!driver.send_payload(b"hello", "0A2F").await.unwrap());
        let lines = written_lines(&module);
        assert_eq!(lines.last().map(String::as_str), Some("AT+DEST=0A2F"));
    }

    #[tokio::test]
    async fn missing_sending_marker_withdraws_completion() {
        let (driver, module) = driver();
        let _responder = Responder::spawn(module.clone(), |line| {
            if line.starts_with("AT+") {
                cooperative_script(line)
            } else {
                vec!["AT,ERR".to_string()]
            }
        });
        assert!(driver.connect().await.unwrap());

        assert!(!driver.send_payload(b"hello", "0A2F").await.unwrap());
        assert_eq!(driver.pending_requests(), 0);
        assert!(driver.reboot().await.unwrap());
    }

    #[tokio::test]
    async fn wrong_completion_marker_fails_send() {
        let (driver, module) = driver();
        let _responder = Responder::spawn(module.clone(), |line| {
            if line.starts_with("AT+") {
                cooperative_script(line)
            } else {
                vec!["AT,SENDING".to_string(), "AT,SENDFAIL".to_string()]
            }
        });
        assert!(driver.connect().await.unwrap());

        assert!(!driver.send_payload(b"hello", "0A2F").await.unwrap());
    }

    #[tokio::test]
    async fn address_query_and_update() {
        let (driver, module, _responder) = connected().await;

        assert_eq!(driver.address().await.unwrap(), "0A2F");
        assert!(driver.set_address("1b3c").await.unwrap());
        assert_eq!(written_lines(&module).last().unwrap(), "AT+ADDR=1B3C");
    }

    #[test]
    fn address_reply_parsing() {
        assert_eq!(parse_address_reply("AT,0A2F,OK").as_deref(), Some("0A2F"));
        assert_eq!(parse_address_reply("AT,0A2F,ERR"), None);
        assert_eq!(parse_address_reply("AT,0A2,OK"), None);
        assert_eq!(parse_address_reply("AT,OK"), None);
        assert_eq!(parse_address_reply("AT,0A2F,OK,extra"), None);
    }

    #[tokio::test]
    async fn reboot_reports_acceptance() {
        let (driver, module, _responder) = connected().await;

        assert!(driver.reboot().await.unwrap());
        assert_eq!(written_lines(&module).last().unwrap(), "AT+RST");
    }

    #[tokio::test]
    async fn sends_require_connection() {
        let (driver, _module) = driver();

        assert!(matches!(
            driver.send_payload(b"hello", "0A2F").await,
            Err(DriverError::NotConnected)
        ));
        assert!(matches!(driver.reboot().await, Err(DriverError::NotConnected)));
    }

    #[tokio::test]
    async fn disconnect_closes_and_blocks_sends() {
        let (driver, module, _responder) = connected().await;

        driver.disconnect().unwrap();
        assert_eq!(driver.state(), ConnectionState::Disconnected);
        assert!(!module.is_open());
        assert!(matches!(
            driver.broadcast(b"hello").await,
            Err(DriverError::NotConnected)
        ));

        assert!(driver.connect().await.unwrap());
        assert_eq!(module.open_count(), 2);
    }

    #[tokio::test]
    async fn silent_module_times_out() {
        let (link, module) = MemoryLink::pair();
        let config = DriverConfig {
            reply_timeout_ms: Some(50),
            ..quick_config()
        };
        let driver = Driver::with_config(link, config);
        let _responder = Responder::spawn(module.clone(), |line| {
            if line == "AT+RST" {
                Vec::new()
            } else {
                cooperative_script(line)
            }
        });
        assert!(driver.connect().await.unwrap());

        assert!(matches!(driver.reboot().await, Err(DriverError::Timeout(_))));
        assert_eq!(driver.pending_requests(), 0);
    }

    #[tokio::test]
    async fn dropped_reply_does_not_shift_later_replies() {
        let (link, module) = MemoryLink::pair();
        let config = DriverConfig {
            reply_timeout_ms: Some(100),
            ..quick_config()
        };
        let driver = Driver::with_config(link, config);
        let mut dropped = false;
        let _responder = Responder::spawn(module.clone(), move |line| {
            if line == "AT+RST" && !dropped {
                dropped = true;
                Vec::new()
            } else {
                cooperative_script(line)
            }
        });
        assert!(driver.connect().await.unwrap());

        assert!(matches!(driver.reboot().await, Err(DriverError::Timeout(_))));
        assert_eq!(driver.pending_requests(), 0);

        assert_eq!(driver.address().await.unwrap(), "0A2F");
        assert!(driver.reboot().await.unwrap());
        assert!(driver.set_address("0B01").await.unwrap());
        assert!(driver.send_payload(b"hi", "0A2F").await.unwrap());
        assert_eq!(driver.pending_requests(), 0);
    }

    #[tokio::test]
    async fn lost_sending_marker_leaves_queue_clean() {
        let (link, module) = MemoryLink::pair();
        let config = DriverConfig {
            reply_timeout_ms: Some(100),
            ..quick_config()
        };
        let driver = Driver::with_config(link, config);
        let mut dropped = false;
        let _responder = Responder::spawn(module.clone(), move |line| {
            if !line.starts_with("AT+") && !dropped {
                dropped = true;
                Vec::new()
            } else {
                cooperative_script(line)
            }
        });
        assert!(driver.connect().await.unwrap());

        assert!(!driver.send_payload(b"lost", "0A2F").await.unwrap());
        assert_eq!(driver.pending_requests(), 0);
        assert!(driver.send_payload(b"again", "0A2F").await.unwrap());
        assert_eq!(driver.address().await.unwrap(), "0A2F");
    }

    #[tokio::test]
    async fn remote_messages_reach_handler() {
        let (driver, module, _responder) = connected().await;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        driver.set_message_handler(Arc::new(move |message: loralink_frame::RemoteMessage| {
            let _ = tx.send(message);
        }));

        module.reply("LR,0A2F,05,hello");

        let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.source, "0A2F");
        assert_eq!(message.payload.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn remote_payload_with_crlf_arrives_whole() {
        let (driver, module, _responder) = connected().await;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        driver.set_message_handler(Arc::new(move |message: loralink_frame::RemoteMessage| {
            let _ = tx.send(message);
        }));

        module.inject(b"LR,0A2F,04,a\r\nb\r\n");
        assert_eq!(driver.address().await.unwrap(), "0A2F");

        let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&message.payload[..], &[97, 13, 10, 98]);
        assert!(rx.try_recv().is_err());
    }
}
