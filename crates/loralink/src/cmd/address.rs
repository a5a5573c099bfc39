use serde::Serialize;

use crate::cmd::{connect, runtime, AddressArgs};
use crate::exit::{driver_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS};
use crate::output::{print_outcome, print_raw, OutputFormat};

#[derive(Serialize)]
struct AddressOutput<'a> {
    event: &'static str,
    address: &'a str,
}

pub fn run(args: AddressArgs, format: OutputFormat) -> CliResult<i32> {
    runtime()?.block_on(async {
        let driver = connect(&args.link).await?;

        let code = match &args.set {
            Some(address) => {
                let accepted = driver
                    .set_address(address)
                    .await
                    .map_err(|err| driver_error("set address failed", err))?;
                print_outcome("set-address", Some(address), accepted, format);
                if accepted {
                    SUCCESS
                } else {
                    FAILURE
                }
            }
            None => {
                let address = driver
                    .address()
                    .await
                    .map_err(|err| driver_error("address query failed", err))?;
                print_address(&address, format);
                if address.is_empty() {
                    DATA_INVALID
                } else {
                    SUCCESS
                }
            }
        };

        driver
            .disconnect()
            .map_err(|err| driver_error("disconnect failed", err))?;
        Ok::<_, CliError>(code)
    })
}

fn print_address(address: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = AddressOutput {
                event: "address",
                address,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => println!("address: {address}"),
        OutputFormat::Raw => {
            print_raw(address.as_bytes());
            print_raw(b"\n");
        }
    }
}
