use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use loralink_driver::{Driver, DriverConfig};
use loralink_transport::{SerialConfig, SerialLink, DEFAULT_BAUD_RATE};

use crate::exit::{driver_error, io_error, CliError, CliResult, FAILURE, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod address;
pub mod broadcast;
pub mod listen;
pub mod reboot;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect and print messages from other nodes.
    Listen(ListenArgs),
    /// Send a payload to one node.
    Send(SendArgs),
    /// Send a payload to every node.
    Broadcast(BroadcastArgs),
    /// Show or change the module address.
    Address(AddressArgs),
    /// Reboot the module.
    Reboot(RebootArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Broadcast(args) => broadcast::run(args, format),
        Command::Address(args) => address::run(args, format),
        Command::Reboot(args) => reboot::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Options shared by every command that talks to a module.
#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Serial port of the module (e.g. /dev/ttyUSB0, COM3).
    #[arg(env = "LORALINK_PORT")]
    pub port: String,
    /// Serial baud rate.
    #[arg(long, env = "LORALINK_BAUD", default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Driver settings as JSON.
    #[arg(long, value_name = "FILE", env = "LORALINK_CONFIG")]
    pub config: Option<PathBuf>,
    /// Radio parameters sent with AT+CFG, overriding the config file.
    #[arg(long, value_name = "PARAMS")]
    pub radio_config: Option<String>,
    /// How long to wait for each module reply (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION")]
    pub reply_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct PayloadArgs {
    /// Raw string payload.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Destination node address (4 hex digits).
    pub destination: String,
    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[derive(Args, Debug)]
pub struct BroadcastArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[derive(Args, Debug)]
pub struct AddressArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// New address (4 hex digits).
    #[arg(long, value_name = "ADDR")]
    pub set: Option<String>,
}

#[derive(Args, Debug)]
pub struct RebootArgs {
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Build the driver configuration: file first, then flag overrides.
pub fn driver_config(args: &LinkArgs) -> CliResult<DriverConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
            serde_json::from_str::<DriverConfig>(&text).map_err(|err| {
                CliError::new(USAGE, format!("invalid config {}: {err}", path.display()))
            })?
        }
        None => DriverConfig::default(),
    };

    if let Some(radio_config) = &args.radio_config {
        config.radio_config = radio_config.clone();
    }
    if let Some(timeout) = &args.reply_timeout {
        let timeout = parse_duration(timeout)?;
        config.reply_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
    }
    Ok(config)
}

/// Open the serial port and run the handshake.
pub async fn connect(args: &LinkArgs) -> CliResult<Driver> {
    let config = driver_config(args)?;
    let serial = SerialConfig {
        baud_rate: args.baud,
        ..SerialConfig::new(args.port.clone())
    };
    let driver = Driver::with_config(SerialLink::new(serial), config);

    let connected = driver
        .connect()
        .await
        .map_err(|err| driver_error("connect failed", err))?;
    if !connected {
        return Err(CliError::new(
            FAILURE,
            format!("module on {} did not complete the handshake", args.port),
        ));
    }
    Ok(driver)
}

pub fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))
}

pub fn resolve_payload(args: &PayloadArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Err(CliError::new(USAGE, "one of --data or --file is required"))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link_args() -> LinkArgs {
        LinkArgs {
            port: "/dev/ttyUSB0".to_string(),
            baud: DEFAULT_BAUD_RATE,
            config: None,
            radio_config: None,
            reply_timeout: None,
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let mut args = link_args();
        args.radio_config = Some("868000000,14,7,9,1,1,0,0,0,0,3000,8,8".to_string());
        args.reply_timeout = Some("750ms".to_string());

        let config = driver_config(&args).unwrap();
        assert_eq!(config.radio_config, "868000000,14,7,9,1,1,0,0,0,0,3000,8,8");
        assert_eq!(config.reply_timeout(), Some(Duration::from_millis(750)));
    }

    #[test]
    fn config_file_is_loaded() {
        let path = std::env::temp_dir().join(format!("loralink-config-{}.json", std::process::id()));
        fs::write(&path, r#"{"poll_interval_ms": 5, "reply_timeout_ms": null}"#).unwrap();

        let mut args = link_args();
        args.config = Some(path.clone());
        let config = driver_config(&args).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(config.poll_interval(), Duration::from_millis(5));
        assert_eq!(config.reply_timeout(), None);
    }

    #[test]
    fn missing_config_file_is_reported() {
        let mut args = link_args();
        args.config = Some(PathBuf::from("/nonexistent/loralink.json"));
        assert!(driver_config(&args).is_err());
    }

    #[test]
    fn resolve_payload_prefers_data() {
        let args = PayloadArgs {
            data: Some("hello".to_string()),
            file: None,
        };
        assert_eq!(resolve_payload(&args).unwrap(), b"hello");
    }
}
