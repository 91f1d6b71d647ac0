use std::fmt;
use std::time::{Duration, Instant};

use sysinfo::{Pid, System};

/// Which way blocks are flowing through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Compress,
    Decompress,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Compress => f.write_str("compress"),
            Direction::Decompress => f.write_str("decompress"),
        }
    }
}

/// Point-in-time view of a running pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub direction: Direction,
    /// Blocks waiting in the input queue.
    pub input_depth: usize,
    /// Finished blocks waiting to be written.
    pub output_depth: usize,
    pub blocks_written: u64,
    pub blocks_total: u64,
    pub bytes_written: u64,
    pub elapsed: Duration,
    /// Resident memory of this process, when the platform reports it.
    pub process_memory: Option<u64>,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.blocks_total == 0 {
            return 100.0;
        }
        self.blocks_written as f64 / self.blocks_total as f64 * 100.0
    }
}

/// Receives progress reports. Purely observational.
pub trait ProgressObserver: Send + Sync {
    fn on_start(&self, _direction: Direction, _blocks_total: u64) {}
    fn on_progress(&self, snapshot: &ProgressSnapshot);
    fn on_finish(&self, _snapshot: &ProgressSnapshot) {}
}

/// Reports progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        tracing::info!(
            direction = %snapshot.direction,
            input_depth = snapshot.input_depth,
            output_depth = snapshot.output_depth,
            blocks_written = snapshot.blocks_written,
            blocks_total = snapshot.blocks_total,
            elapsed_ms = snapshot.elapsed.as_millis() as u64,
            memory_mb = snapshot.process_memory.map(|bytes| bytes / (1024 * 1024)),
            "progress {:.1}%",
            snapshot.percent()
        );
    }

    fn on_finish(&self, snapshot: &ProgressSnapshot) {
        tracing::info!(
            direction = %snapshot.direction,
            blocks = snapshot.blocks_written,
            bytes = snapshot.bytes_written,
            "finished in {:.2?}",
            snapshot.elapsed
        );
    }
}

/// Discards all reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}
}

/// Emits snapshots at a fixed cadence from the orchestrator loop.
pub(crate) struct ProgressTracker {
    direction: Direction,
    blocks_total: u64,
    started_at: Instant,
    interval: Duration,
    next_report: Duration,
    system: System,
    pid: Option<Pid>,
}

impl ProgressTracker {
    pub(crate) fn new(direction: Direction, blocks_total: u64, interval: Duration) -> Self {
        Self {
            direction,
            blocks_total,
            started_at: Instant::now(),
            interval,
            next_report: Duration::ZERO,
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    pub(crate) fn is_due(&self) -> bool {
        self.started_at.elapsed() >= self.next_report
    }

    pub(crate) fn snapshot(
        &mut self,
        input_depth: usize,
        output_depth: usize,
        blocks_written: u64,
        bytes_written: u64,
    ) -> ProgressSnapshot {
        ProgressSnapshot {
            direction: self.direction,
            input_depth,
            output_depth,
            blocks_written,
            blocks_total: self.blocks_total,
            bytes_written,
            elapsed: self.started_at.elapsed(),
            process_memory: self.process_memory(),
        }
    }

    pub(crate) fn mark_reported(&mut self) {
        while self.next_report <= self.started_at.elapsed() {
            self.next_report += self.interval.max(Duration::from_millis(1));
        }
    }

    fn process_memory(&mut self) -> Option<u64> {
        let pid = self.pid?;
        self.system.refresh_process(pid);
        self.system.process(pid).map(|process| process.memory())
    }
}
