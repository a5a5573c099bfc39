use loralink_frame::BROADCAST_ADDRESS;

use crate::cmd::{connect, resolve_payload, runtime, BroadcastArgs};
use crate::exit::{driver_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_outcome, OutputFormat};

pub fn run(args: BroadcastArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args.payload)?;

    runtime()?.block_on(async {
        let driver = connect(&args.link).await?;
        let sent = driver
            .broadcast(&payload)
            .await
            .map_err(|err| driver_error("broadcast failed", err))?;
        print_outcome("broadcast", Some(BROADCAST_ADDRESS), sent, format);

        driver
            .disconnect()
            .map_err(|err| driver_error("disconnect failed", err))?;
        Ok::<_, CliError>(if sent { SUCCESS } else { FAILURE })
    })
}
