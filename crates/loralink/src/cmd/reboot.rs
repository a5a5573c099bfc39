use crate::cmd::{connect, runtime, RebootArgs};
use crate::exit::{driver_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_outcome, OutputFormat};

pub fn run(args: RebootArgs, format: OutputFormat) -> CliResult<i32> {
    runtime()?.block_on(async {
        let driver = connect(&args.link).await?;
        let accepted = driver
            .reboot()
            .await
            .map_err(|err| driver_error("reboot failed", err))?;
        print_outcome("reboot", None, accepted, format);

        // The module drops off the line while it restarts.
        driver
            .disconnect()
            .map_err(|err| driver_error("disconnect failed", err))?;
        Ok::<_, CliError>(if accepted { SUCCESS } else { FAILURE })
    })
}
