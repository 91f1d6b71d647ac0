//! Container format and per-block gzip codec.
//!
//! A container is a 16-byte header followed by one frame per data block:
//!
//! ```text
//! [0..8)   u64 LE  uncompressed length of the whole file
//! [8..16)  u64 LE  block count N, counting the two header fields as blocks 0 and 1
//! N - 2 frames, each:
//!   [0..8)     u64 LE  decoded size of the block
//!   [8..16)    u64 LE  encoded size C
//!   [16..16+C) one gzip member holding the block
//! ```
//!
//! Every block is an independent gzip member, so blocks can be inflated in
//! any order and on any thread. The header fields travel through the same
//! id-ordered channel as the data frames and are written verbatim.

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{PipelineError, Result};

/// Size of the container header in bytes.
pub const CONTAINER_HEADER_SIZE: usize = 16;

/// Size of the fixed part of a frame (decoded size + encoded size).
pub const FRAME_HEADER_SIZE: usize = 16;

/// Number of header pseudo-blocks counted in the block-count field.
pub const HEADER_PSEUDO_BLOCKS: u64 = 2;

/// The two leading fields of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Total uncompressed length of the original file.
    pub decoded_len: u64,
    /// Data frames plus the two header pseudo-blocks.
    pub block_count: u64,
}

impl ContainerHeader {
    /// Header for a file of `len` bytes cut into `block_size` blocks.
    pub fn for_length(len: u64, block_size: usize) -> Self {
        Self {
            decoded_len: len,
            block_count: len.div_ceil(block_size as u64) + HEADER_PSEUDO_BLOCKS,
        }
    }

    /// Number of data frames that follow the header.
    pub fn data_blocks(&self) -> u64 {
        self.block_count.saturating_sub(HEADER_PSEUDO_BLOCKS)
    }

    /// Header pseudo-block 0: the uncompressed length.
    pub fn length_field(&self) -> [u8; 8] {
        self.decoded_len.to_le_bytes()
    }

    /// Header pseudo-block 1: the block count.
    pub fn count_field(&self) -> [u8; 8] {
        self.block_count.to_le_bytes()
    }

    pub fn to_bytes(&self) -> [u8; CONTAINER_HEADER_SIZE] {
        let mut bytes = [0u8; CONTAINER_HEADER_SIZE];
        bytes[..8].copy_from_slice(&self.length_field());
        bytes[8..].copy_from_slice(&self.count_field());
        bytes
    }

    /// Reads and validates a header.
    ///
    /// The length field is signed on the wire. A negative length, a block
    /// count below two, a non-empty file without data blocks, or a
    /// truncated header is a corrupt file.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = [0u8; CONTAINER_HEADER_SIZE];
        reader.read_exact(&mut bytes).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                PipelineError::CorruptFile("container header is truncated".to_string())
            } else {
                PipelineError::Io(err)
            }
        })?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: [u8; CONTAINER_HEADER_SIZE]) -> Result<Self> {
        let raw_len = i64::from_le_bytes(le_field(&bytes[..8]));
        if raw_len < 0 {
            return Err(PipelineError::CorruptFile(format!(
                "declared file length is negative ({raw_len})"
            )));
        }

        let block_count = u64::from_le_bytes(le_field(&bytes[8..]));
        if block_count < HEADER_PSEUDO_BLOCKS {
            return Err(PipelineError::CorruptFile(format!(
                "declared block count {block_count} is smaller than the header itself"
            )));
        }

        if raw_len > 0 && block_count == HEADER_PSEUDO_BLOCKS {
            return Err(PipelineError::CorruptFile(format!(
                "declared length {raw_len} but no data blocks"
            )));
        }

        Ok(Self {
            decoded_len: raw_len as u64,
            block_count,
        })
    }
}

/// Size prefix of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub decoded_size: u64,
    pub compressed_size: u64,
}

impl FrameHeader {
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut bytes = [0u8; FRAME_HEADER_SIZE];
        bytes[..8].copy_from_slice(&self.decoded_size.to_le_bytes());
        bytes[8..].copy_from_slice(&self.compressed_size.to_le_bytes());
        bytes
    }

    /// Reads the two size fields; fails with `CorruptFrame` on a short read.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = [0u8; FRAME_HEADER_SIZE];
        read_frame_bytes(reader, &mut bytes, "frame header")?;
        Ok(Self {
            decoded_size: u64::from_le_bytes(le_field(&bytes[..8])),
            compressed_size: u64::from_le_bytes(le_field(&bytes[8..])),
        })
    }

    /// Reads the `compressed_size` payload bytes that follow this header.
    ///
    /// The buffer grows with the data actually read, so a lying size field
    /// cannot force a huge allocation up front.
    pub fn read_payload<R: Read>(&self, reader: &mut R) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        reader
            .take(self.compressed_size)
            .read_to_end(&mut payload)?;
        if (payload.len() as u64) != self.compressed_size {
            return Err(PipelineError::CorruptFrame(format!(
                "payload ended after {} of {} bytes",
                payload.len(),
                self.compressed_size
            )));
        }
        Ok(payload)
    }
}

/// A fully decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub decoded_size: u64,
    pub compressed_size: u64,
    pub payload: Vec<u8>,
}

/// Serializes one frame: both size prefixes, then the gzip payload.
pub fn encode_frame(decoded_size: u64, compressed: &[u8]) -> Vec<u8> {
    let header = FrameHeader {
        decoded_size,
        compressed_size: compressed.len() as u64,
    };
    let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + compressed.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(compressed);
    out
}

/// Reads one frame from `reader`.
pub fn decode_frame<R: Read>(reader: &mut R) -> Result<Frame> {
    let header = FrameHeader::read(reader)?;
    let payload = header.read_payload(reader)?;
    Ok(Frame {
        decoded_size: header.decoded_size,
        compressed_size: header.compressed_size,
        payload,
    })
}

/// Gzips one block at the fixed default level.
///
/// Incompressible input comes out slightly larger than it went in.
pub fn compress_block(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(raw.len() / 2 + 64),
        Compression::default(),
    );
    encoder.write_all(raw)?;
    Ok(encoder.finish()?)
}

/// Inflates exactly `expected_decoded_size` bytes from one gzip member.
///
/// The member must end right after those bytes; reading to its end also
/// checks the gzip trailer.
pub fn decompress_block(compressed: &[u8], expected_decoded_size: u64) -> Result<Vec<u8>> {
    let len = usize::try_from(expected_decoded_size).map_err(|_| {
        PipelineError::CorruptFrame(format!(
            "decoded size {expected_decoded_size} does not fit in memory"
        ))
    })?;

    let mut decoder = GzDecoder::new(compressed);
    let mut out = vec![0u8; len];
    decoder.read_exact(&mut out).map_err(|err| {
        PipelineError::CorruptFrame(format!(
            "inflating {expected_decoded_size} bytes failed: {err}"
        ))
    })?;

    let mut probe = [0u8; 1];
    match decoder.read(&mut probe) {
        Ok(0) => Ok(out),
        Ok(_) => Err(PipelineError::CorruptFrame(format!(
            "block inflates past its declared {expected_decoded_size} bytes"
        ))),
        Err(err) => Err(PipelineError::CorruptFrame(format!(
            "gzip trailer check failed: {err}"
        ))),
    }
}

/// Worst-case gzip size for `n` input bytes.
///
/// Deflate's own bound plus the gzip header and trailer, with slack for
/// optional header fields written by other encoders.
pub fn encoded_size_bound(n: u64) -> u64 {
    n.saturating_add(n >> 12)
        .saturating_add(n >> 14)
        .saturating_add(n >> 25)
        .saturating_add(13 + 18 + 64)
}

fn le_field(bytes: &[u8]) -> [u8; 8] {
    let mut field = [0u8; 8];
    field.copy_from_slice(&bytes[..8]);
    field
}

fn read_frame_bytes<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            PipelineError::CorruptFrame(format!("stream ended inside {what}"))
        } else {
            PipelineError::Io(err)
        }
    })
}
