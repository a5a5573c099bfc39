//! AT command vocabulary of the radio module.

use std::fmt;

use bytes::BytesMut;

use crate::codec::encode_line;

/// Acknowledgement sent when the module starts transmitting a payload.
pub const SENDING_MARKER: &str = "AT,SENDING";

/// Acknowledgement sent when the module finished transmitting a payload.
pub const SENT_MARKER: &str = "AT,SENDED";

/// Destination address that reaches every node.
pub const BROADCAST_ADDRESS: &str = "FFFF";

/// Largest payload the module accepts in one transmission.
pub const MAX_PAYLOAD_SIZE: usize = 250;

/// Radio parameters applied on connect:
/// frequency, power, bandwidth, spreading factor, coding rate, CRC,
/// implicit header, RX single, frequency hopping, hop period, RX timeout,
/// payload length, preamble length.
pub const DEFAULT_RADIO_CONFIG: &str = "433000000,20,6,12,1,1,0,0,0,0,3000,8,4";

/// A command understood by the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `AT+CFG=<params>`: apply radio parameters.
    Configure(String),
    /// `AT+RX`: switch to receive mode.
    ReceiveMode,
    /// `AT+ADDR?`: query the module address.
    QueryAddress,
    /// `AT+ADDR=<addr>`: set the module address.
    SetAddress(String),
    /// `AT+DEST=<addr>`: set the destination for the next payload.
    SetDestination(String),
    /// `AT+SEND=<len>`: announce the size of the next payload.
    AnnounceSize(usize),
    /// `AT+RST`: reboot the module.
    Reboot,
}

impl Command {
    /// Whether this command belongs to the connect handshake.
    ///
    /// Handshake commands are admitted while the driver is still connecting.
    pub fn is_handshake(&self) -> bool {
        matches!(self, Command::Configure(_) | Command::ReceiveMode)
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Configure(_) => "configure",
            Command::ReceiveMode => "receive-mode",
            Command::QueryAddress => "query-address",
            Command::SetAddress(_) => "set-address",
            Command::SetDestination(_) => "set-destination",
            Command::AnnounceSize(_) => "announce-size",
            Command::Reboot => "reboot",
        }
    }

    /// Append the command line and terminator to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        encode_line(self.to_string().as_bytes(), dst);
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Configure(params) => write!(f, "AT+CFG={params}"),
            Command::ReceiveMode => f.write_str("AT+RX"),
            Command::QueryAddress => f.write_str("AT+ADDR?"),
            Command::SetAddress(addr) => write!(f, "AT+ADDR={addr}"),
            Command::SetDestination(addr) => write!(f, "AT+DEST={addr}"),
            Command::AnnounceSize(len) => write!(f, "AT+SEND={len}"),
            Command::Reboot => f.write_str("AT+RST"),
        }
    }
}
