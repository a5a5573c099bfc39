use loralink_frame::RemoteMessage;
use tracing::info;

/// Consumer of remote messages.
///
/// Called on the reader thread once per accepted message; keep it short or
/// hand the message off.
pub trait MessageHandler: Send + Sync {
    fn received(&self, message: RemoteMessage);
}

impl<F> MessageHandler for F
where
    F: Fn(RemoteMessage) + Send + Sync,
{
    fn received(&self, message: RemoteMessage) {
        self(message)
    }
}

/// Default handler: logs every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

impl MessageHandler for LogHandler {
    fn received(&self, message: RemoteMessage) {
        info!(
            source = %message.source,
            size = message.payload.len(),
            payload = %message.payload_text(),
            "remote message received"
        );
    }
}
