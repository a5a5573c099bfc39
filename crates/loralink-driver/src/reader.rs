//! Dedicated reader loop: serial bytes in, routed frames out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use loralink_frame::{FrameAssembler, FrameConfig};
use loralink_transport::Link;
use tracing::{debug, warn};

use crate::error::{DriverError, Result};
use crate::router::MessageRouter;

const READ_CHUNK_SIZE: usize = 512;
const THREAD_NAME: &str = "loralink-reader";

/// Handle to a running reader loop.
#[derive(Debug)]
pub struct ReaderHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReaderHandle {
    /// Ask the loop to exit after its current iteration.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Whether the loop thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// Called from the reader thread itself (e.g. from a message handler)
    /// this only sets the stop flag.
    pub fn join(mut self) {
        self.stop();
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            warn!("reader thread panicked");
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start the reader loop on its own thread.
///
/// The loop polls `link` for available bytes, sleeping `poll_interval`
/// between empty polls, and routes every complete frame. I/O errors discard
/// the partial frame and are logged; the loop keeps running until stopped.
pub fn spawn_reader(
    link: Arc<dyn Link>,
    router: Arc<MessageRouter>,
    poll_interval: Duration,
    config: FrameConfig,
) -> Result<ReaderHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);

    let thread = thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .spawn(move || run(link.as_ref(), &router, &flag, poll_interval, config))
        .map_err(|err| DriverError::Transport(err.into()))?;

    Ok(ReaderHandle {
        stop,
        thread: Some(thread),
    })
}

fn run(
    link: &dyn Link,
    router: &MessageRouter,
    stop: &AtomicBool,
    poll_interval: Duration,
    config: FrameConfig,
) {
    let mut assembler = FrameAssembler::with_config(config);
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    debug!(link = link.name(), "reader loop started");

    while !stop.load(Ordering::SeqCst) {
        match poll(link, &mut assembler, &mut chunk) {
            Ok(0) => thread::sleep(poll_interval),
            Ok(_) => {
                for frame in assembler.frames() {
                    let route = router.route(frame);
                    debug!(?route, "frame routed");
                }
            }
            Err(err) => {
                assembler.clear();
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                warn!(link = link.name(), error = %err, "reader error, partial frame discarded");
                thread::sleep(poll_interval);
            }
        }
    }

    debug!(link = link.name(), "reader loop stopped");
}

/// Move every available byte into the assembler. Returns the count read.
fn poll(link: &dyn Link, assembler: &mut FrameAssembler, chunk: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    let mut available = link.bytes_available().map_err(DriverError::from_link)?;
    while available > 0 {
        let want = available.min(chunk.len());
        let read = link
            .read(&mut chunk[..want])
            .map_err(DriverError::from_link)?;
        if read == 0 {
            break;
        }
        assembler.push(&chunk[..read])?;
        total += read;
        available = available.saturating_sub(read);
    }
    Ok(total)
}
