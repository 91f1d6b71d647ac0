use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{Scope, ScopedJoinHandle};

use crate::block::Block;
use crate::error::PipelineError;
use crate::pipeline::{BlockTransform, PipelineContext};
use crate::queue::Dequeue;

/// Fixed-size set of transform threads for one pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    num_workers: usize,
}

impl WorkerPool {
    /// A pool of `num_workers` threads. Zero is allowed; the orchestrator
    /// then transforms blocks itself.
    pub fn new(num_workers: usize) -> Self {
        Self { num_workers }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Starts the workers inside `scope`.
    pub(crate) fn spawn<'scope, 'env, T>(
        &self,
        scope: &'scope Scope<'scope, 'env>,
        ctx: &'env PipelineContext,
        transform: &'env T,
    ) -> WorkerPoolHandle<'scope>
    where
        T: BlockTransform,
    {
        let handles = (0..self.num_workers)
            .map(|worker_id| scope.spawn(move || run_worker_loop(worker_id, ctx, transform)))
            .collect();
        WorkerPoolHandle { handles }
    }
}

/// Join handles of running workers.
pub(crate) struct WorkerPoolHandle<'scope> {
    handles: Vec<ScopedJoinHandle<'scope, usize>>,
}

impl WorkerPoolHandle<'_> {
    /// Waits for every worker and returns how many blocks each transformed.
    pub(crate) fn join(self) -> Result<Vec<usize>, PipelineError> {
        let mut counts = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            match handle.join() {
                Ok(count) => counts.push(count),
                Err(payload) => {
                    return Err(PipelineError::WorkerPanicked(panic_message(payload.as_ref())))
                }
            }
        }
        Ok(counts)
    }
}

/// One worker: reserve an output slot, take a block, transform it, publish.
///
/// The reservation comes first so a worker never pulls input while the
/// output collection is full.
fn run_worker_loop<T: BlockTransform>(worker_id: usize, ctx: &PipelineContext, transform: &T) -> usize {
    tracing::debug!(worker_id, "worker started");
    let mut completed = 0usize;

    'work: while !ctx.should_stop() {
        if !ctx.output.reserve_timeout(ctx.poll_interval) {
            continue;
        }

        let block = loop {
            if ctx.should_stop() {
                ctx.output.release();
                break 'work;
            }
            match ctx.input.dequeue(ctx.poll_interval) {
                Dequeue::Item(block) => break block,
                Dequeue::Empty => continue,
                Dequeue::Closed => {
                    ctx.output.release();
                    break 'work;
                }
            }
        };

        if apply(ctx, transform, block) {
            completed += 1;
        } else {
            break;
        }
    }

    tracing::debug!(worker_id, completed, "worker stopped");
    completed
}

/// Transforms one block into an already reserved slot. Returns false when
/// the pipeline has been failed.
pub(crate) fn apply<T: BlockTransform>(ctx: &PipelineContext, transform: &T, block: Block) -> bool {
    let id = block.id;
    match catch_unwind(AssertUnwindSafe(|| transform.transform(block))) {
        Ok(Ok(bytes)) => {
            ctx.output.publish(id, bytes);
            true
        }
        Ok(Err(err)) => {
            tracing::debug!(block = id, error = %err, "block transform failed");
            ctx.output.release();
            ctx.fail(err);
            false
        }
        Err(payload) => {
            ctx.output.release();
            ctx.fail(PipelineError::WorkerPanicked(format!(
                "block {id}: {}",
                panic_message(payload.as_ref())
            )));
            false
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
