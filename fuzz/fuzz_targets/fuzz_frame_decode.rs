#![no_main]

use libfuzzer_sys::fuzz_target;
use parallel_gzip::{decode_frame, decompress_block};

fuzz_target!(|data: &[u8]| {
    // Frames are read back to back until the input runs dry or turns bad.
    let mut reader = data;
    while let Ok(frame) = decode_frame(&mut reader) {
        assert_eq!(frame.payload.len() as u64, frame.compressed_size);
        if frame.decoded_size <= 1 << 24 {
            let _ = decompress_block(&frame.payload, frame.decoded_size);
        }
    }
});
