use std::time::Duration;

use loralink_frame::{FrameConfig, DEFAULT_MAX_FRAME, DEFAULT_RADIO_CONFIG};
use serde::{Deserialize, Serialize};

/// Driver behavior settings.
///
/// Deserializable so front ends can load it from a file; missing fields
/// take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Parameter string sent with `AT+CFG` during the handshake.
    pub radio_config: String,
    /// How long a caller waits for each module reply, in milliseconds.
    /// `None` waits forever.
    pub reply_timeout_ms: Option<u64>,
    /// Delay between empty polls of the reader loop, in milliseconds.
    /// Values below 1 are treated as 1.
    pub poll_interval_ms: u64,
    /// Maximum bytes buffered without a terminator.
    pub max_frame_size: usize,
}

const MIN_POLL_INTERVAL_MS: u64 = 1;

impl DriverConfig {
    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_ms.map(Duration::from_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_frame_size: self.max_frame_size,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            radio_config: DEFAULT_RADIO_CONFIG.to_string(),
            // A 250 byte payload at SF12 keeps the module busy for seconds.
            reply_timeout_ms: Some(30_000),
            poll_interval_ms: 20,
            max_frame_size: DEFAULT_MAX_FRAME,
        }
    }
}
