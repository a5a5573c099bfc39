use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loralink_driver::RemoteMessage;
use tokio::sync::mpsc;
use tracing::info;

use crate::cmd::{connect, runtime, ListenArgs};
use crate::exit::{driver_error, CliError, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

const STOP_POLL: Duration = Duration::from_millis(200);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    runtime()?.block_on(async {
        let driver = connect(&args.link).await?;
        let (tx, mut rx) = mpsc::unbounded_channel::<RemoteMessage>();
        driver.set_message_handler(Arc::new(move |message: RemoteMessage| {
            let _ = tx.send(message);
        }));
        info!(port = %args.link.port, "listening");

        let mut printed = 0usize;
        while running.load(Ordering::SeqCst) {
            let message = match tokio::time::timeout(STOP_POLL, rx.recv()).await {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(_) => continue,
            };

            print_message(&message, format);
            printed = printed.saturating_add(1);

            if let Some(count) = args.count {
                if printed >= count {
                    break;
                }
            }
        }

        driver
            .disconnect()
            .map_err(|err| driver_error("disconnect failed", err))?;
        Ok::<_, CliError>(SUCCESS)
    })
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
