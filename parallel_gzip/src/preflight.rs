//! Resource checks run before a pipeline creates its destination file.
//!
//! Both checks are heuristics. The memory estimate models the queues and
//! per-worker scratch space but not codec internals, and the disk estimate
//! uses the source length as an upper bound for compressed output.

use std::path::{Path, PathBuf};

use sysinfo::{Disks, System};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Host resource queries, abstracted so callers can substitute them.
pub trait ResourceProbe: Send + Sync {
    /// Memory currently available to new allocations, in bytes.
    fn available_memory(&self) -> u64;

    /// Free space on the volume holding `path`, or `None` when the volume
    /// cannot be determined.
    fn available_space(&self, path: &Path) -> Option<u64>;
}

/// Probe backed by `sysinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl ResourceProbe for SystemProbe {
    fn available_memory(&self) -> u64 {
        let mut system = System::new();
        system.refresh_memory();
        system.available_memory()
    }

    fn available_space(&self, path: &Path) -> Option<u64> {
        let target = resolve_volume_path(path);
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| target.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

/// Canonical form of the directory that will hold `path`.
fn resolve_volume_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    // The destination usually does not exist yet; walk up to the first
    // ancestor that does so symlinks resolve to the real volume.
    absolute
        .ancestors()
        .find_map(|ancestor| ancestor.canonicalize().ok())
        .unwrap_or(absolute)
}

/// Peak memory estimate: input and output queues full of blocks, plus four
/// block-sized buffers per worker, scaled by `memory_headroom`.
pub fn estimate_memory(config: &PipelineConfig, workers: usize) -> u64 {
    let block = config.block_size as u64;
    let buffer = config.buffer_size as u64;
    let queues = block.saturating_mul(buffer).saturating_mul(2);
    let scratch = block.saturating_mul(4).saturating_mul(workers as u64);
    let raw = queues.saturating_add(scratch);
    (raw as f64 * config.memory_headroom).ceil() as u64
}

/// Outcome of the memory check, kept for later per-frame validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBudget {
    pub required: u64,
    pub available: u64,
}

pub fn check_memory(
    probe: &dyn ResourceProbe,
    config: &PipelineConfig,
    workers: usize,
) -> Result<MemoryBudget> {
    let required = estimate_memory(config, workers);
    let available = probe.available_memory();
    tracing::debug!(required, available, workers, "memory preflight");

    if available < required {
        return Err(PipelineError::InsufficientMemory {
            required,
            available,
        });
    }
    Ok(MemoryBudget {
        required,
        available,
    })
}

/// Fails when the volume holding `dest` has less than `required` bytes free.
pub fn check_disk(probe: &dyn ResourceProbe, dest: &Path, required: u64) -> Result<()> {
    match probe.available_space(dest) {
        Some(available) => {
            tracing::debug!(required, available, dest = %dest.display(), "disk preflight");
            if available < required {
                return Err(PipelineError::InsufficientDiskSpace {
                    required,
                    available,
                });
            }
            Ok(())
        }
        None => {
            tracing::warn!(
                dest = %dest.display(),
                "could not resolve destination volume; skipping disk space check"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe {
        memory: u64,
        space: Option<u64>,
    }

    impl ResourceProbe for FixedProbe {
        fn available_memory(&self) -> u64 {
            self.memory
        }

        fn available_space(&self, _path: &Path) -> Option<u64> {
            self.space
        }
    }

    #[test]
    fn estimate_matches_formula() {
        let config = PipelineConfig::default()
            .with_block_size(1024 * 1024)
            .with_buffer_size(100);
        let raw = (1024 * 1024 * 100 * 2 + 1024 * 1024 * 4 * 3) as f64;
        assert_eq!(estimate_memory(&config, 3), (raw * 1.1).ceil() as u64);

        let exact = config.with_memory_headroom(1.0);
        assert_eq!(estimate_memory(&exact, 0), 1024 * 1024 * 200);
    }

    #[test]
    fn memory_check_refuses_when_short() {
        let config = PipelineConfig::default().with_block_size(1024).with_buffer_size(10);
        let probe = FixedProbe {
            memory: 1000,
            space: None,
        };
        let err = check_memory(&probe, &config, 1).unwrap_err();
        assert!(err.is_preflight());
        assert!(matches!(err, PipelineError::InsufficientMemory { available: 1000, .. }));

        let roomy = FixedProbe {
            memory: u64::MAX,
            space: None,
        };
        let budget = check_memory(&roomy, &config, 1).unwrap();
        assert_eq!(budget.available, u64::MAX);
    }

    #[test]
    fn disk_check_compares_free_space() {
        let probe = FixedProbe {
            memory: 0,
            space: Some(100),
        };
        assert!(check_disk(&probe, Path::new("out.bin"), 100).is_ok());
        assert!(matches!(
            check_disk(&probe, Path::new("out.bin"), 101),
            Err(PipelineError::InsufficientDiskSpace {
                required: 101,
                available: 100
            })
        ));
    }

    #[test]
    fn unknown_volume_skips_disk_check() {
        let probe = FixedProbe {
            memory: 0,
            space: None,
        };
        assert!(check_disk(&probe, Path::new("out.bin"), u64::MAX).is_ok());
    }

    #[test]
    fn system_probe_reports_memory() {
        assert!(SystemProbe.available_memory() > 0);
    }
}
