use std::path::PathBuf;
use std::time::Duration;

/// Default directory for the bridge log file, relative to the working
/// directory the host starts the bridge in.
pub const DEFAULT_LOG_DIRECTORY: &str = "application-data/logs";

/// Default shutdown drain window in milliseconds. Workers that are still
/// producing messages when the bridge stops get this long, per message,
/// before the response channel is torn down.
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 1_000;

const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for a bridge process.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Directory the log file is written to. Created at startup if missing.
    pub log_directory: PathBuf,
    /// Capacity of the pending-request queue between the reader and the
    /// spawn dispatcher.
    pub queue_capacity: usize,
    /// Capacity of the shared message channel all workers write to.
    pub channel_capacity: usize,
    /// Idle timeout while draining worker messages at shutdown.
    pub drain_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from(DEFAULT_LOG_DIRECTORY),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl BridgeConfig {
    pub fn new(log_directory: impl Into<PathBuf>) -> Self {
        Self {
            log_directory: log_directory.into(),
            ..Default::default()
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_drain_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.drain_timeout_ms = timeout_ms;
        self
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
