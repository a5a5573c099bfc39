//! Scripted module for driver tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use loralink_transport::ModuleEnd;

/// Plays the module side of a `MemoryLink` on a background thread.
///
/// Every line the host writes is passed to the script; each returned string
/// is sent back as one terminated reply line.
pub(crate) struct Responder {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Responder {
    pub(crate) fn spawn<F>(module: ModuleEnd, mut script: F) -> Self
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                let Some(line) = module.recv_line(Duration::from_millis(10)) else {
                    continue;
                };
                let line = String::from_utf8_lossy(&line).into_owned();
                for reply in script(&line) {
                    module.reply(&reply);
                }
            }
        });
        Self {
            stop,
            thread: Some(thread),
        }
    }

    /// A module that accepts everything.
    pub(crate) fn cooperative(module: ModuleEnd) -> Self {
        Self::spawn(module, cooperative_script)
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Replies of a healthy module with address `0A2F`.
pub(crate) fn cooperative_script(line: &str) -> Vec<String> {
    let replies: &[&str] = if line.starts_with("AT+ADDR?") {
        &["AT,0A2F,OK"]
    } else if line.starts_with("AT+") {
        &["AT,OK"]
    } else {
        &["AT,SENDING", "AT,SENDED"]
    };
    replies.iter().map(|reply| reply.to_string()).collect()
}

/// Every line the host wrote, without terminators.
pub(crate) fn written_lines(module: &ModuleEnd) -> Vec<String> {
    String::from_utf8_lossy(&module.written())
        .split("\r\n")
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
