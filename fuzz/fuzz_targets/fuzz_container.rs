#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use parallel_gzip::{
    run_pipeline, ContainerHeader, DecompressTransform, Direction, FrameSource, NoProgress,
    PipelineConfig, PipelineOptions,
};

const MEMORY_LIMIT: u64 = 16 * 1024 * 1024;

fuzz_target!(|data: &[u8]| {
    let mut reader = data;
    let Ok(header) = ContainerHeader::read(&mut reader) else {
        return;
    };

    let options = PipelineOptions::new(
        PipelineConfig::default()
            .with_block_size(64 * 1024)
            .with_buffer_size(4)
            .with_workers(2),
    )
    .with_progress(Arc::new(NoProgress));

    let mut frames = FrameSource::new(reader, header, MEMORY_LIMIT);
    if let Ok((output, _)) = run_pipeline(
        Direction::Decompress,
        &mut frames,
        &DecompressTransform,
        Vec::new(),
        &options,
    ) {
        assert_eq!(output.len() as u64, header.decoded_len);
    }
});
