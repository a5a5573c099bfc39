use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lifecycle of the connection to the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Link closed or handshake failed.
    Disconnected,
    /// Handshake in progress; ordinary commands are rejected.
    Connecting,
    /// Handshake complete.
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
        })
    }
}

/// Shared connection state.
#[derive(Debug)]
pub(crate) struct StateCell {
    inner: Mutex<ConnectionState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(ConnectionState::Disconnected),
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.lock()
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        *self.lock() = state;
    }

    /// Move from `from` to `to`. Returns the state found if it was not `from`.
    pub(crate) fn transition(
        &self,
        from: ConnectionState,
        to: ConnectionState,
    ) -> std::result::Result<(), ConnectionState> {
        let mut current = self.lock();
        if *current != from {
            return Err(*current);
        }
        *current = to;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
