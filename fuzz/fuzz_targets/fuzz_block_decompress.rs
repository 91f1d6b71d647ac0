#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parallel_gzip::{compress_block, decompress_block};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    data: Vec<u8>,
    declared: u32,
    raw: bool,
}

fuzz_target!(|input: FuzzInput| {
    if input.data.len() > 1_000_000 {
        return;
    }

    if input.raw {
        // Valid members must round trip exactly.
        let compressed = compress_block(&input.data).unwrap();
        let restored = decompress_block(&compressed, input.data.len() as u64).unwrap();
        assert_eq!(restored, input.data);
        // A wrong declared size is always rejected.
        let _ = decompress_block(&compressed, input.data.len() as u64 + 1).unwrap_err();
    } else {
        let _ = decompress_block(&input.data, u64::from(input.declared));
    }
});
