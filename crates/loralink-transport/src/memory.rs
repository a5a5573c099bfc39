//! In-process link for tests and simulation.
//!
//! [`MemoryLink`] is the host side handed to the driver. [`ModuleEnd`] plays
//! the radio module: it sees every byte the host writes and injects replies
//! and remote traffic into the host's receive buffer.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{lock, Link};

const TERMINATOR: &[u8] = b"\r\n";

#[derive(Default)]
struct State {
    open: bool,
    refuse_open: bool,
    opens: usize,
    /// Module -> host bytes not yet read.
    inbound: VecDeque<u8>,
    /// Host -> module bytes not yet consumed by `recv_line`.
    outbound: Vec<u8>,
    /// Everything the host ever wrote.
    log: Vec<u8>,
    read_error: Option<ErrorKind>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    written: Condvar,
}

/// Host side of an in-process link.
pub struct MemoryLink {
    shared: Arc<Shared>,
}

/// Module side of an in-process link.
#[derive(Clone)]
pub struct ModuleEnd {
    shared: Arc<Shared>,
}

impl MemoryLink {
    /// Create a closed link and the module end attached to it.
    pub fn pair() -> (MemoryLink, ModuleEnd) {
        let shared = Arc::new(Shared::default());
        (
            MemoryLink {
                shared: Arc::clone(&shared),
            },
            ModuleEnd { shared },
        )
    }
}

impl Link for MemoryLink {
    fn open(&self) -> Result<()> {
        let mut state = lock(&self.shared.state);
        if state.open {
            return Ok(());
        }
        if state.refuse_open {
            return Err(TransportError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                "memory link refused to open",
            )));
        }
        state.open = true;
        state.opens += 1;
        debug!("opened memory link");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        lock(&self.shared.state).open = false;
        self.shared.written.notify_all();
        Ok(())
    }

    fn is_open(&self) -> bool {
        lock(&self.shared.state).open
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut state = lock(&self.shared.state);
        if !state.open {
            return Err(TransportError::NotConnected);
        }
        state.outbound.extend_from_slice(bytes);
        state.log.extend_from_slice(bytes);
        drop(state);
        self.shared.written.notify_all();
        Ok(())
    }

    fn bytes_available(&self) -> Result<usize> {
        let mut state = lock(&self.shared.state);
        if !state.open {
            return Err(TransportError::NotConnected);
        }
        if let Some(kind) = state.read_error.take() {
            return Err(TransportError::Io(std::io::Error::new(
                kind,
                "injected read failure",
            )));
        }
        Ok(state.inbound.len())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut state = lock(&self.shared.state);
        if !state.open {
            return Err(TransportError::NotConnected);
        }
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

impl ModuleEnd {
    /// Queue raw bytes for the host to read.
    pub fn inject(&self, bytes: &[u8]) {
        lock(&self.shared.state).inbound.extend(bytes.iter().copied());
    }

    /// Queue one terminated line for the host to read.
    pub fn reply(&self, line: &str) {
        let mut state = lock(&self.shared.state);
        state.inbound.extend(line.as_bytes().iter().copied());
        state.inbound.extend(TERMINATOR.iter().copied());
    }

    /// Wait for the next terminated line written by the host.
    ///
    /// Returns the line without its terminator, or `None` on timeout.
    pub fn recv_line(&self, timeout: Duration) -> Option<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.shared.state);
        loop {
            if let Some(pos) = state
                .outbound
                .windows(TERMINATOR.len())
                .position(|window| window == TERMINATOR)
            {
                let mut line: Vec<u8> = state.outbound.drain(..pos + TERMINATOR.len()).collect();
                line.truncate(pos);
                return Some(line);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = self
                .shared
                .written
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .0;
        }
    }

    /// Every byte the host has written so far.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.shared.state).log.clone()
    }

    /// Make subsequent `open` calls fail.
    pub fn refuse_open(&self, refuse: bool) {
        lock(&self.shared.state).refuse_open = refuse;
    }

    /// Fail the host's next availability poll with an I/O error.
    pub fn fail_next_read(&self, kind: ErrorKind) {
        lock(&self.shared.state).read_error = Some(kind);
    }

    /// Number of times the host opened the link.
    pub fn open_count(&self) -> usize {
        lock(&self.shared.state).opens
    }

    /// Whether the host side is open.
    pub fn is_open(&self) -> bool {
        lock(&self.shared.state).open
    }
}

impl std::fmt::Debug for MemoryLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLink")
            .field("open", &self.is_open())
            .finish()
    }
}
