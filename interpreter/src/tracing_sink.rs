use blocks::event::{LogEvent, LogLevel, LogSink};
use tracing::{debug, error, info, warn};

/// Forwards runtime log events to `tracing`, for hosts without a log panel.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn log(&mut self, event: LogEvent) {
        let LogEvent { level, message } = event;
        match level {
            LogLevel::Error => error!(target: "blocks::runtime", %level, "{}", message),
            LogLevel::Warning => warn!(target: "blocks::runtime", %level, "{}", message),
            LogLevel::Info | LogLevel::Success | LogLevel::Connection => {
                info!(target: "blocks::runtime", %level, "{}", message)
            }
            LogLevel::Execution => debug!(target: "blocks::runtime", %level, "{}", message),
        }
    }
}
