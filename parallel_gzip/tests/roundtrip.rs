mod common;

use std::fs;
use std::io::Read;

use common::{options, parse_container, sample_data, Workspace};
use flate2::read::GzDecoder;
use parallel_gzip::{compress_with, decompress_with, PipelineConfig};

const BLOCK: usize = 64 * 1024;

fn roundtrip(len: usize, config: PipelineConfig) -> Vec<u8> {
    let ws = Workspace::new();
    let data = sample_data(len, len as u64);
    let source = ws.write("input.bin", &data);
    let packed = ws.path("input.pgz");
    let restored = ws.path("restored.bin");

    let opts = options(config);
    compress_with(&source, &packed, &opts).expect("compress");
    decompress_with(&packed, &restored, &opts).expect("decompress");

    let output = fs::read(&restored).unwrap();
    assert_eq!(output.len(), data.len(), "length mismatch for {len} bytes");
    assert!(output == data, "content mismatch for {len} bytes");
    fs::read(&packed).unwrap()
}

fn config() -> PipelineConfig {
    PipelineConfig::default()
        .with_block_size(BLOCK)
        .with_buffer_size(8)
        .with_workers(3)
}

#[test]
fn empty_file() {
    let packed = roundtrip(0, config());
    assert_eq!(packed.len(), 16);
    assert_eq!(&packed[..8], &0u64.to_le_bytes());
    assert_eq!(&packed[8..], &2u64.to_le_bytes());
}

#[test]
fn shorter_than_one_block() {
    let packed = roundtrip(1000, config());
    let (len, count, frames) = parse_container(&packed);
    assert_eq!((len, count), (1000, 3));
    assert_eq!(frames.len(), 1);
}

#[test]
fn single_byte() {
    roundtrip(1, config());
}

#[test]
fn exactly_one_block() {
    let packed = roundtrip(BLOCK, config());
    let (_, count, frames) = parse_container(&packed);
    assert_eq!(count, 3);
    assert_eq!(frames[0].0, BLOCK as u64);
}

#[test]
fn many_blocks_with_remainder() {
    let len = BLOCK * 37 + 1234;
    let packed = roundtrip(len, config());
    let (declared, count, frames) = parse_container(&packed);
    assert_eq!(declared, len as u64);
    assert_eq!(count, 38 + 2);
    assert_eq!(frames.len(), 38);
    assert!(frames[..37].iter().all(|(size, _)| *size == BLOCK as u64));
    assert_eq!(frames[37].0, 1234);
}

#[test]
fn more_blocks_than_buffer_with_many_workers() {
    let config = PipelineConfig::default()
        .with_block_size(4096)
        .with_buffer_size(3)
        .with_workers(8);
    roundtrip(4096 * 200 + 7, config);
}

#[test]
fn default_worker_count() {
    let config = PipelineConfig::default()
        .with_block_size(BLOCK)
        .with_buffer_size(4);
    roundtrip(BLOCK * 9 + 3, config);
}

#[test]
fn frames_are_standalone_gzip_members() {
    let ws = Workspace::new();
    let data = sample_data(BLOCK * 3 + 99, 7);
    let source = ws.write("input.bin", &data);
    let packed = ws.path("input.pgz");
    compress_with(&source, &packed, &options(config())).unwrap();

    let (_, _, frames) = parse_container(&fs::read(&packed).unwrap());
    let mut rebuilt = Vec::new();
    for (decoded, payload) in frames {
        let mut block = Vec::new();
        GzDecoder::new(&payload[..]).read_to_end(&mut block).unwrap();
        assert_eq!(block.len() as u64, decoded);
        rebuilt.extend_from_slice(&block);
    }
    assert!(rebuilt == data);
}

#[test]
fn three_megabytes_in_one_megabyte_blocks() {
    let ws = Workspace::new();
    let data = sample_data(3 * 1024 * 1024, 3);
    let source = ws.write("three.bin", &data);
    let packed = ws.path("three.pgz");
    let restored = ws.path("three.out");

    let opts = options(
        PipelineConfig::default()
            .with_block_size(1024 * 1024)
            .with_buffer_size(2),
    );
    compress_with(&source, &packed, &opts).unwrap();

    let bytes = fs::read(&packed).unwrap();
    assert_eq!(&bytes[..8], &3_145_728u64.to_le_bytes());
    assert_eq!(&bytes[8..16], &5u64.to_le_bytes());
    let (_, _, frames) = parse_container(&bytes);
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|(size, _)| *size == 1024 * 1024));

    decompress_with(&packed, &restored, &opts).unwrap();
    assert!(fs::read(&restored).unwrap() == data);
}

#[test]
fn report_counts_written_blocks() {
    let ws = Workspace::new();
    let data = sample_data(BLOCK * 5, 11);
    let source = ws.write("input.bin", &data);
    let packed = ws.path("input.pgz");
    let restored = ws.path("restored.bin");
    let opts = options(config());

    let report = compress_with(&source, &packed, &opts).unwrap();
    assert_eq!(report.blocks_written, 7);
    assert_eq!(report.bytes_written, fs::metadata(&packed).unwrap().len());
    assert_eq!(report.workers, 3);
    assert_eq!(report.worker_tasks.iter().sum::<usize>(), 5);

    let report = decompress_with(&packed, &restored, &opts).unwrap();
    assert_eq!(report.blocks_written, 5);
    assert_eq!(report.bytes_written, data.len() as u64);
}
