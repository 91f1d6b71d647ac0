//! The ordered block pipeline shared by compression and decompression.
//!
//! One orchestrator (the calling thread) reads blocks from a
//! [`BlockSource`] into the bounded input queue, while a [`WorkerPool`]
//! applies a [`BlockTransform`] to each one and publishes the result under
//! the block's id. The orchestrator writes results strictly in id order;
//! workers never coordinate ordering among themselves.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::block::Block;
use crate::cancel::CancelToken;
use crate::config::PipelineOptions;
use crate::error::{PipelineError, Result};
use crate::frame::{compress_block, decompress_block, encode_frame};
use crate::progress::{Direction, ProgressTracker};
use crate::queue::{input_queue, Dequeue, InputConsumer, InputProducer, OutputSlots};
use crate::worker::{self, WorkerPool};
use crate::writer::OutputWriter;

/// Per-block work done by the workers.
pub trait BlockTransform: Send + Sync {
    fn transform(&self, block: Block) -> Result<Vec<u8>>;
}

/// Gzips a raw chunk and wraps it in a frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressTransform;

impl BlockTransform for CompressTransform {
    fn transform(&self, block: Block) -> Result<Vec<u8>> {
        let compressed = compress_block(&block.payload)?;
        Ok(encode_frame(block.payload.len() as u64, &compressed))
    }
}

/// Inflates a frame payload back to its declared size.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecompressTransform;

impl BlockTransform for DecompressTransform {
    fn transform(&self, block: Block) -> Result<Vec<u8>> {
        decompress_block(&block.payload, block.decoded_size)
    }
}

/// Producer side of a pipeline run.
pub trait BlockSource {
    /// Byte strings written verbatim ahead of the data blocks, as ids
    /// `0..n`. At most two.
    fn preamble(&self) -> Vec<Vec<u8>> {
        Vec::new()
    }

    /// Number of blocks the run writes, preamble included.
    fn total_blocks(&self) -> u64;

    /// Reads the next block and tags it with `id`; `None` once exhausted.
    fn next_block(&mut self, id: u64) -> Result<Option<Block>>;
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub blocks_written: u64,
    pub bytes_written: u64,
    pub workers: usize,
    /// Blocks transformed by each worker; empty when the orchestrator
    /// transformed everything inline.
    pub worker_tasks: Vec<usize>,
    /// Most finished blocks ever held in the output collection at once.
    pub output_high_water: usize,
    pub elapsed: Duration,
}

/// State shared between the orchestrator and its workers.
pub(crate) struct PipelineContext {
    pub(crate) input: InputConsumer<Block>,
    pub(crate) output: OutputSlots<Vec<u8>>,
    pub(crate) poll_interval: Duration,
    cancel: CancelToken,
    aborted: AtomicBool,
    failure: Mutex<Option<PipelineError>>,
}

impl PipelineContext {
    fn new(
        input: InputConsumer<Block>,
        capacity: usize,
        cancel: CancelToken,
        poll_interval: Duration,
    ) -> Self {
        Self {
            input,
            output: OutputSlots::new(capacity),
            poll_interval,
            cancel,
            aborted: AtomicBool::new(false),
            failure: Mutex::new(None),
        }
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.aborted.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }

    /// Records the first failure and stops everyone.
    pub(crate) fn fail(&self, err: PipelineError) {
        {
            let mut slot = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(err);
            }
        }
        self.abort();
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        self.output.wake_all();
    }

    fn take_failure(&self) -> Option<PipelineError> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Runs `source` through `transform` into `dest`, preserving block order.
///
/// Returns the destination once every block has been written and flushed.
pub fn run_pipeline<S, T, W>(
    direction: Direction,
    source: &mut S,
    transform: &T,
    dest: W,
    options: &PipelineOptions,
) -> Result<(W, PipelineReport)>
where
    S: BlockSource,
    T: BlockTransform,
    W: Write,
{
    let config = &options.config;
    config.validate()?;

    let pool = WorkerPool::new(config.worker_count());
    let (producer, consumer) = input_queue(config.buffer_size);
    let ctx = PipelineContext::new(
        consumer,
        config.buffer_size,
        options.cancel.clone(),
        config.poll_interval,
    );

    let preamble = source.preamble();
    let mut state = OrchestratorState::new(preamble.len() as u64, source.total_blocks());
    for (id, bytes) in preamble.into_iter().enumerate() {
        if ctx.output.try_insert(id as u64, bytes).is_err() {
            return Err(PipelineError::InvalidConfig(
                "buffer size is too small for the container header",
            ));
        }
    }

    let mut tracker = ProgressTracker::new(direction, state.remaining, config.progress_interval);
    options.progress.on_start(direction, state.remaining);

    let mut out = OutputWriter::new(dest);
    let (outcome, joined) = thread::scope(|scope| {
        let workers = pool.spawn(scope, &ctx, transform);
        let outcome = orchestrate(
            &ctx,
            &pool,
            &mut state,
            source,
            producer,
            transform,
            &mut out,
            &mut tracker,
            options,
        );
        if outcome.is_err() {
            ctx.abort();
        }
        (outcome, workers.join())
    });

    outcome?;
    let worker_tasks = joined?;

    let blocks_written = state.next_emit;
    let bytes_written = out.bytes_written();
    let snapshot = tracker.snapshot(0, 0, blocks_written, bytes_written);
    options.progress.on_finish(&snapshot);
    let dest = out.finish()?;

    Ok((
        dest,
        PipelineReport {
            blocks_written,
            bytes_written,
            workers: pool.num_workers(),
            worker_tasks,
            output_high_water: ctx.output.high_water(),
            elapsed: snapshot.elapsed,
        },
    ))
}

struct OrchestratorState {
    next_assign: u64,
    next_emit: u64,
    remaining: u64,
    pending: Option<Block>,
}

impl OrchestratorState {
    fn new(first_data_id: u64, total_blocks: u64) -> Self {
        Self {
            next_assign: first_data_id,
            next_emit: 0,
            remaining: total_blocks,
            pending: None,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn orchestrate<S, T, W>(
    ctx: &PipelineContext,
    pool: &WorkerPool,
    state: &mut OrchestratorState,
    source: &mut S,
    producer: InputProducer<Block>,
    transform: &T,
    out: &mut OutputWriter<W>,
    tracker: &mut ProgressTracker,
    options: &PipelineOptions,
) -> Result<()>
where
    S: BlockSource,
    T: BlockTransform,
    W: Write,
{
    let mut producer = Some(producer);
    let inline = pool.num_workers() == 0;

    while state.remaining > 0 {
        if options.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if let Some(err) = ctx.take_failure() {
            return Err(err);
        }

        let mut progressed = false;

        if let Some(input) = producer.as_ref() {
            if state.pending.is_none() && input.has_capacity() {
                match source.next_block(state.next_assign)? {
                    Some(block) => {
                        state.pending = Some(block);
                        state.next_assign += 1;
                    }
                    None => {
                        if let Some(input) = producer.take() {
                            input.close();
                        }
                    }
                }
            }
            if let (Some(input), Some(block)) = (producer.as_ref(), state.pending.take()) {
                match input.try_enqueue(block) {
                    Ok(()) => progressed = true,
                    Err(block) => state.pending = Some(block),
                }
            }
        }

        if inline && ctx.output.try_reserve() {
            match ctx.input.try_dequeue() {
                Dequeue::Item(block) => {
                    if !worker::apply(ctx, transform, block) {
                        continue;
                    }
                    progressed = true;
                }
                Dequeue::Empty | Dequeue::Closed => ctx.output.release(),
            }
        }

        if let Some(bytes) = ctx.output.take(state.next_emit) {
            emit(state, out, &bytes)?;
            progressed = true;
        }

        if tracker.is_due() {
            let snapshot = tracker.snapshot(
                ctx.input.len(),
                ctx.output.len(),
                state.next_emit,
                out.bytes_written(),
            );
            options.progress.on_progress(&snapshot);
            tracker.mark_reported();
        }

        if progressed {
            continue;
        }

        if producer.is_none() && state.pending.is_none() && state.next_emit == state.next_assign {
            return Err(PipelineError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "source ran out after {} blocks; {} more were expected",
                    state.next_assign, state.remaining
                ),
            )));
        }

        if !inline {
            if let Some(bytes) = ctx.output.take_timeout(state.next_emit, ctx.poll_interval) {
                emit(state, out, &bytes)?;
            }
        }
    }

    Ok(())
}

fn emit<W: Write>(state: &mut OrchestratorState, out: &mut OutputWriter<W>, bytes: &[u8]) -> Result<()> {
    out.write_all(bytes)?;
    state.next_emit += 1;
    state.remaining -= 1;
    Ok(())
}
