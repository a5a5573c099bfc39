use std::io::{ErrorKind, Read, Write};
use std::sync::Mutex;
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{lock, Link};

/// Line speed expected by the radio module firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial port settings.
///
/// Framing is fixed at 8 data bits, 1 stop bit, no parity.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub path: String,
    /// Line speed in baud. Default: 115200.
    pub baud_rate: u32,
    /// Timeout applied to blocking reads and writes.
    pub timeout: Duration,
}

impl SerialConfig {
    /// Settings for `path` with the module defaults.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(100),
        }
    }
}

/// Hardware serial link.
///
/// The port is cloned on open so the reader loop and the send path hold
/// separate handles and never contend on the same lock.
pub struct SerialLink {
    config: SerialConfig,
    writer: Mutex<Option<Box<dyn SerialPort>>>,
    reader: Mutex<Option<Box<dyn SerialPort>>>,
}

impl SerialLink {
    /// Create a closed link for the given settings.
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    /// The settings this link opens with.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl Link for SerialLink {
    fn open(&self) -> Result<()> {
        let mut writer = lock(&self.writer);
        if writer.is_some() {
            return Ok(());
        }

        let port = serialport::new(&self.config.path, self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(self.config.timeout)
            .open()
            .map_err(|source| TransportError::Open {
                path: self.config.path.clone(),
                source,
            })?;
        let reader_port = port.try_clone()?;

        *lock(&self.reader) = Some(reader_port);
        *writer = Some(port);

        info!(
            path = %self.config.path,
            baud = self.config.baud_rate,
            "opened serial link"
        );
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let had_port = lock(&self.writer).take().is_some();
        lock(&self.reader).take();
        if had_port {
            debug!(path = %self.config.path, "closed serial link");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        lock(&self.writer).is_some()
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = lock(&self.writer);
        let port = guard.as_mut().ok_or(TransportError::NotConnected)?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn bytes_available(&self) -> Result<usize> {
        let guard = lock(&self.reader);
        let port = guard.as_ref().ok_or(TransportError::NotConnected)?;
        Ok(port.bytes_to_read()? as usize)
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut guard = lock(&self.reader);
        let port = guard.as_mut().ok_or(TransportError::NotConnected)?;
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == ErrorKind::TimedOut => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    fn name(&self) -> &str {
        &self.config.path
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("path", &self.config.path)
            .field("baud_rate", &self.config.baud_rate)
            .field("open", &self.is_open())
            .finish()
    }
}
