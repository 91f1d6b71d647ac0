use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::block::Block;
use crate::config::PipelineOptions;
use crate::error::{PipelineError, Result};
use crate::frame::{encoded_size_bound, ContainerHeader, FrameHeader};
use crate::pipeline::{run_pipeline, BlockSource, DecompressTransform, PipelineReport};
use crate::preflight;
use crate::progress::Direction;

/// Reads and validates the frames that follow a container header.
///
/// Size fields are only sanity-checked: a decoded size may not exceed the
/// declared file length (nor what is left of it), an encoded size may not
/// exceed the worst-case gzip size of the whole file, and neither may
/// exceed the memory limit.
pub struct FrameSource<R> {
    reader: R,
    header: ContainerHeader,
    frames_left: u64,
    undeclared: u64,
    memory_limit: u64,
}

impl<R: Read> FrameSource<R> {
    /// `reader` must be positioned right after the container header.
    pub fn new(reader: R, header: ContainerHeader, memory_limit: u64) -> Self {
        Self {
            reader,
            header,
            frames_left: header.data_blocks(),
            undeclared: header.decoded_len,
            memory_limit,
        }
    }

    fn validate(&self, frame: &FrameHeader) -> Result<()> {
        let total = self.header.decoded_len;
        if frame.decoded_size > total {
            return Err(PipelineError::CorruptFile(format!(
                "block decodes to {} bytes but the whole file is {total} bytes",
                frame.decoded_size
            )));
        }
        if frame.decoded_size > self.undeclared {
            return Err(PipelineError::CorruptFile(format!(
                "blocks decode to more than the declared {total} bytes"
            )));
        }
        if frame.compressed_size > encoded_size_bound(total) {
            return Err(PipelineError::CorruptFile(format!(
                "compressed block of {} bytes exceeds the bound for a {total}-byte file",
                frame.compressed_size
            )));
        }
        if frame.decoded_size > self.memory_limit || frame.compressed_size > self.memory_limit {
            return Err(PipelineError::CorruptFile(format!(
                "block sizes ({} decoded, {} compressed) exceed available memory ({} bytes)",
                frame.decoded_size, frame.compressed_size, self.memory_limit
            )));
        }
        Ok(())
    }
}

impl<R: Read> BlockSource for FrameSource<R> {
    fn total_blocks(&self) -> u64 {
        self.header.data_blocks()
    }

    fn next_block(&mut self, id: u64) -> Result<Option<Block>> {
        if self.frames_left == 0 {
            return Ok(None);
        }

        let frame = FrameHeader::read(&mut self.reader)?;
        self.validate(&frame)?;
        let payload = frame.read_payload(&mut self.reader)?;

        self.frames_left -= 1;
        self.undeclared -= frame.decoded_size;
        if self.frames_left == 0 && self.undeclared != 0 {
            return Err(PipelineError::CorruptFile(format!(
                "blocks decode to {} bytes fewer than the declared {}",
                self.undeclared, self.header.decoded_len
            )));
        }
        Ok(Some(Block::with_decoded_size(
            id,
            payload,
            frame.decoded_size,
        )))
    }
}

/// Restores the original file from the container at `source`.
pub fn decompress_with(
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
    let mut reader = BufReader::new(input);
    let header = ContainerHeader::read(&mut reader)?;

    let workers = config.worker_count();
    let budget = preflight::check_memory(options.probe.as_ref(), config, workers)?;
    preflight::check_disk(options.probe.as_ref(), dest, header.decoded_len)?;

    tracing::info!(
        source = %source.display(),
        dest = %dest.display(),
        len = header.decoded_len,
        frames = header.data_blocks(),
        workers,
        "decompressing"
    );

    let output = File::create(dest).map_err(|err| {
        PipelineError::from(err).with_context(format!("creating {}", dest.display()))
    })?;
    let mut frames = FrameSource::new(reader, header, budget.available);
    let (output, report) = run_pipeline(
        Direction::Decompress,
        &mut frames,
        &DecompressTransform,
        output,
        options,
    )?;
    output.sync_all()?;
    Ok(report)
}

/// Restores `source` into `dest` with default settings.
pub fn decompress(source: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<()> {
    decompress_with(source, dest, &PipelineOptions::default()).map(|_| ())
}
