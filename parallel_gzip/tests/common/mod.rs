#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parallel_gzip::{NoProgress, PipelineConfig, PipelineOptions, ResourceProbe};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

/// Probe with fixed answers so tests do not depend on the host.
pub struct FixedProbe {
    pub memory: u64,
    pub space: Option<u64>,
}

impl FixedProbe {
    pub fn roomy() -> Self {
        Self {
            memory: u64::MAX,
            space: None,
        }
    }
}

impl ResourceProbe for FixedProbe {
    fn available_memory(&self) -> u64 {
        self.memory
    }

    fn available_space(&self, _path: &Path) -> Option<u64> {
        self.space
    }
}

pub fn options(config: PipelineConfig) -> PipelineOptions {
    PipelineOptions::new(config)
        .with_probe(Arc::new(FixedProbe::roomy()))
        .with_progress(Arc::new(NoProgress))
}

/// Mix of compressible text and random noise.
pub fn sample_data(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let phrase = b"the quick brown fox jumps over the lazy dog ";
    let mut data = Vec::with_capacity(len);
    while data.len() < len {
        if rng.gen_bool(0.5) {
            let take = phrase.len().min(len - data.len());
            data.extend_from_slice(&phrase[..take]);
        } else {
            let run = rng.gen_range(1..64).min(len - data.len());
            data.extend((0..run).map(|_| rng.gen::<u8>()));
        }
    }
    data
}

pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, data).expect("write fixture");
        path
    }
}

/// Splits a container into its header fields and frames.
pub fn parse_container(bytes: &[u8]) -> (u64, u64, Vec<(u64, Vec<u8>)>) {
    let field = |at: usize| u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap());
    let len = field(0);
    let count = field(8);
    let mut frames = Vec::new();
    let mut at = 16;
    while at < bytes.len() {
        let decoded = field(at);
        let encoded = field(at + 8) as usize;
        frames.push((decoded, bytes[at + 16..at + 16 + encoded].to_vec()));
        at += 16 + encoded;
    }
    (len, count, frames)
}
