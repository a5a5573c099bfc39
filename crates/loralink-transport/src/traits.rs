use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::Result;

/// A byte pipe to a radio module.
///
/// Writes come from the caller-facing send path while reads come from a
/// single dedicated reader loop, so every method takes `&self` and
/// implementations synchronize internally.
pub trait Link: Send + Sync + 'static {
    /// Open the link. Returns `Ok(())` immediately if already open.
    fn open(&self) -> Result<()>;

    /// Close the link. Closing an already closed link is not an error.
    fn close(&self) -> Result<()>;

    /// Whether the link is currently open.
    fn is_open(&self) -> bool;

    /// Write all bytes. Fails with `NotConnected` when the link is closed.
    fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Number of bytes that can be read without blocking.
    fn bytes_available(&self) -> Result<usize>;

    /// Read available bytes into `buf`, returning the count read.
    ///
    /// Reserved for the reader loop.
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Link name for diagnostics.
    fn name(&self) -> &str;
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
