use crate::cmd::{connect, resolve_payload, runtime, SendArgs};
use crate::exit::{driver_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_outcome, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args.payload)?;

    runtime()?.block_on(async {
        let driver = connect(&args.link).await?;
        let sent = driver
            .send_payload(&payload, &args.destination)
            .await
            .map_err(|err| driver_error("send failed", err))?;
        print_outcome("send", Some(&args.destination), sent, format);

        driver
            .disconnect()
            .map_err(|err| driver_error("disconnect failed", err))?;
        Ok::<_, CliError>(if sent { SUCCESS } else { FAILURE })
    })
}
