use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::{PipelineError, Result};
use crate::preflight::{ResourceProbe, SystemProbe};
use crate::progress::{LogProgress, ProgressObserver};

/// Default uncompressed block size (1 MiB).
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

/// Default capacity of the input queue and the output collection, in blocks.
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Default safety multiplier applied to the preflight memory estimate.
pub const DEFAULT_MEMORY_HEADROOM: f64 = 1.1;

/// Tunables for one compress or decompress invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Size of each uncompressed block; only the last block may be shorter.
    pub block_size: usize,
    /// Capacity of the input queue and of the output collection.
    pub buffer_size: usize,
    /// Worker thread count. `None` uses `available_parallelism - 1`.
    pub workers: Option<usize>,
    /// Multiplier applied to the preflight memory estimate.
    pub memory_headroom: f64,
    /// Cadence of progress snapshots.
    pub progress_interval: Duration,
    /// Upper bound on how long a blocked thread sleeps before rechecking
    /// cancellation and failure state.
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            workers: None,
            memory_headroom: DEFAULT_MEMORY_HEADROOM,
            progress_interval: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl PipelineConfig {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_memory_headroom(mut self, headroom: f64) -> Self {
        self.memory_headroom = headroom;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Resolved worker count: the override, or one less than the available
    /// parallelism (the orchestrator occupies the remaining core).
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .saturating_sub(1)
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(PipelineError::InvalidConfig("block size must be non-zero"));
        }
        // Ids 0 and 1 (the container header) are seeded into the output
        // collection before any worker starts.
        if self.buffer_size < 2 {
            return Err(PipelineError::InvalidConfig(
                "buffer size must hold at least two blocks",
            ));
        }
        if !(self.memory_headroom.is_finite() && self.memory_headroom >= 1.0) {
            return Err(PipelineError::InvalidConfig(
                "memory headroom must be a finite multiplier of at least 1.0",
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(PipelineError::InvalidConfig("poll interval must be non-zero"));
        }
        Ok(())
    }
}

/// Everything a pipeline invocation needs besides the two paths.
#[derive(Clone)]
pub struct PipelineOptions {
    pub config: PipelineConfig,
    pub probe: Arc<dyn ResourceProbe>,
    pub progress: Arc<dyn ProgressObserver>,
    pub cancel: CancelToken,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl PipelineOptions {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            probe: Arc::new(SystemProbe),
            progress: Arc::new(LogProgress),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
