//! Parallel, order-preserving block compression into a framed gzip container.
//!
//! A file is cut into fixed-size blocks, every block is gzipped on its own
//! worker thread, and the frames are written back in their original order
//! behind a small header (see [`frame`] for the layout). Decompression runs
//! the same pipeline in reverse.
//!
//! ```no_run
//! parallel_gzip::compress("data.bin", "data.bin.pgz")?;
//! parallel_gzip::decompress("data.bin.pgz", "data.restored")?;
//! # Ok::<(), parallel_gzip::PipelineError>(())
//! ```

pub mod block;
pub mod cancel;
pub mod compress;
pub mod config;
pub mod decompress;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod preflight;
pub mod progress;
pub mod queue;
pub mod worker;
pub mod writer;

pub use block::Block;
pub use cancel::CancelToken;
pub use compress::{compress, compress_with, ChunkSource};
pub use config::{PipelineConfig, PipelineOptions};
pub use decompress::{decompress, decompress_with, FrameSource};
pub use error::{PipelineError, Result};
pub use frame::{
    compress_block, decode_frame, decompress_block, encode_frame, ContainerHeader, Frame,
    FrameHeader,
};
pub use pipeline::{
    run_pipeline, BlockSource, BlockTransform, CompressTransform, DecompressTransform,
    PipelineReport,
};
pub use preflight::{ResourceProbe, SystemProbe};
pub use progress::{Direction, LogProgress, NoProgress, ProgressObserver, ProgressSnapshot};
pub use worker::WorkerPool;
