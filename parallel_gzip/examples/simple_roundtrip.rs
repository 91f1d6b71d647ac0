use anyhow::Result;
use std::env;
use std::fs;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <input>", args[0]);
        return Ok(());
    }

    let input = &args[1];
    let packed = format!("{input}.pgz");
    let restored = format!("{input}.restored");

    parallel_gzip::compress(input, &packed)?;
    parallel_gzip::decompress(&packed, &restored)?;

    let original = fs::metadata(input)?.len();
    let compressed = fs::metadata(&packed)?.len();
    let same = fs::read(input)? == fs::read(&restored)?;
    println!("{original} -> {compressed} bytes, round trip identical: {same}");

    Ok(())
}
