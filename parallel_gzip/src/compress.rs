use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::block::Block;
use crate::config::PipelineOptions;
use crate::error::{PipelineError, Result};
use crate::frame::ContainerHeader;
use crate::pipeline::{run_pipeline, BlockSource, CompressTransform, PipelineReport};
use crate::preflight;
use crate::progress::Direction;

/// Cuts a reader of known length into fixed-size raw blocks.
///
/// The container header goes out first as two verbatim pseudo-blocks.
pub struct ChunkSource<R> {
    reader: R,
    header: ContainerHeader,
    remaining: u64,
    block_size: usize,
}

impl<R: Read> ChunkSource<R> {
    pub fn new(reader: R, len: u64, block_size: usize) -> Self {
        Self {
            reader,
            header: ContainerHeader::for_length(len, block_size),
            remaining: len,
            block_size,
        }
    }

    pub fn header(&self) -> ContainerHeader {
        self.header
    }
}

impl<R: Read> BlockSource for ChunkSource<R> {
    fn preamble(&self) -> Vec<Vec<u8>> {
        vec![
            self.header.length_field().to_vec(),
            self.header.count_field().to_vec(),
        ]
    }

    fn total_blocks(&self) -> u64 {
        self.header.block_count
    }

    fn next_block(&mut self, id: u64) -> Result<Option<Block>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let len = self.remaining.min(self.block_size as u64) as usize;
        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload)?;
        self.remaining -= len as u64;
        Ok(Some(Block::new(id, payload)))
    }
}

/// Compresses `source` into a new container at `dest`.
pub fn compress_with(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    options: &PipelineOptions,
) -> Result<PipelineReport> {
    let (source, dest) = (source.as_ref(), dest.as_ref());
    let config = &options.config;
    config.validate()?;

    let input = File::open(source).map_err(|err| {
        PipelineError::from(err).with_context(format!("opening {}", source.display()))
    })?;
    let len = input.metadata()?.len();

    let workers = config.worker_count();
    preflight::check_memory(options.probe.as_ref(), config, workers)?;
    preflight::check_disk(options.probe.as_ref(), dest, len)?;

    tracing::info!(
        source = %source.display(),
        dest = %dest.display(),
        len,
        block_size = config.block_size,
        workers,
        "compressing"
    );

    let output = File::create(dest).map_err(|err| {
        PipelineError::from(err).with_context(format!("creating {}", dest.display()))
    })?;
    let mut chunks = ChunkSource::new(BufReader::new(input), len, config.block_size);
    let (output, report) = run_pipeline(
        Direction::Compress,
        &mut chunks,
        &CompressTransform,
        output,
        options,
    )?;
    output.sync_all()?;
    Ok(report)
}

/// Compresses `source` into `dest` with default settings.
pub fn compress(source: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<()> {
    compress_with(source, dest, &PipelineOptions::default()).map(|_| ())
}
