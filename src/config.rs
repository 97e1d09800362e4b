use crate::error::{Error, Result};
use std::time::Duration;

/// Tunables for the supervised writer/reader demo
///
/// 受监管的写入者/读者演示的可调参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of reader threads (zero is valid)
    pub readers: usize,
    /// Pause between writer cycles
    pub write_interval: Duration,
    /// Pause between read sessions
    pub read_interval: Duration,
    /// Pause on each node inside a read session; keep it short, it delays grace periods
    pub node_pause: Duration,
    /// Nodes visited per read session before the session is cut short
    pub read_budget: usize,
    /// The writer retires the node published `window` insertions ago
    pub window: u64,
    /// Delay before retrying a publish that failed to allocate
    pub alloc_backoff: Duration,
    /// Stack size for every spawned thread; the platform default when `None`
    pub stack_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            readers: 1,
            write_interval: Duration::from_millis(2000),
            read_interval: Duration::from_millis(200),
            node_pause: Duration::from_millis(10),
            read_budget: 5,
            window: 2,
            alloc_backoff: Duration::from_millis(1000),
            stack_size: None,
        }
    }
}

impl Config {
    pub fn with_readers(mut self, readers: usize) -> Self {
        self.readers = readers;
        self
    }

    pub fn with_write_interval(mut self, interval: Duration) -> Self {
        self.write_interval = interval;
        self
    }

    pub fn with_read_interval(mut self, interval: Duration) -> Self {
        self.read_interval = interval;
        self
    }

    pub fn with_node_pause(mut self, pause: Duration) -> Self {
        self.node_pause = pause;
        self
    }

    pub fn with_read_budget(mut self, budget: usize) -> Self {
        self.read_budget = budget;
        self
    }

    pub fn with_window(mut self, window: u64) -> Self {
        self.window = window;
        self
    }

    pub fn with_alloc_backoff(mut self, backoff: Duration) -> Self {
        self.alloc_backoff = backoff;
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(Error::InvalidConfig("window must be at least 1"));
        }
        if self.read_budget == 0 {
            return Err(Error::InvalidConfig("read budget must be at least 1"));
        }
        Ok(())
    }
}
