//! Zstd helpers shared by compressed archives and session payloads.
//!
//! NGS servers may send a zstd frame in place of a plaintext packet batch
//! inside an encrypted envelope. Decompression is bounded to keep a hostile
//! peer from inflating a small envelope into an unbounded allocation.
//! Corrupt or oversized streams are reported as
//! [`ArchiveErrorKind::CorruptStream`].

use crate::config::MAX_FRAME_SIZE;
use crate::error::{constants, ArchiveErrorKind, ProtocolError, Result};
use std::io::{self, BufReader, Read, Write};
use zstd::stream::read::Decoder;
use zstd::stream::write::Encoder;

/// Maximum output size for decompression
const MAX_DECOMPRESSION_SIZE: usize = MAX_FRAME_SIZE;

/// Zstd frame magic (`28 B5 2F FD`), little-endian on the wire
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

fn corrupt(message: &'static str) -> ProtocolError {
    ArchiveErrorKind::CorruptStream(message).into()
}

/// Whether `data` starts with a zstd frame header.
///
/// Only bytes 1..4 are compared: clients are known to clobber the first byte.
pub fn is_zstd_frame(data: &[u8]) -> bool {
    data.len() >= 4 && data[1..4] == ZSTD_MAGIC[1..4]
}

/// Streaming compressor at the given level
pub fn encoder<W: Write>(writer: W, level: i32) -> Result<Encoder<'static, W>> {
    Ok(Encoder::new(writer, level)?)
}

/// Streaming decompressor
pub fn decoder<R: Read>(reader: R) -> Result<Decoder<'static, BufReader<R>>> {
    Ok(Decoder::new(reader)?)
}

/// Map a read error from a zstd stream.
///
/// End of input stays an I/O condition for the caller; anything else means
/// the compressed data itself is bad.
pub fn stream_error(e: io::Error) -> ProtocolError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
            ProtocolError::from(e)
        }
        _ => corrupt(constants::ERR_DECOMPRESSION_FAILED),
    }
}

/// Decompresses a zstd stream, enforcing [`MAX_FRAME_SIZE`] on the output
///
/// # Errors
/// Returns `ArchiveErrorKind::CorruptStream` if:
/// - Decompression fails
/// - Output size exceeds the limit
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    decompress_limited(data, MAX_DECOMPRESSION_SIZE)
}

pub fn decompress_limited(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut reader = decoder(data).map_err(|_| corrupt(constants::ERR_DECOMPRESSION_FAILED))?;

    let mut out = Vec::new();
    let mut buffer = [0u8; 8192];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                out.extend_from_slice(&buffer[..n]);
                if out.len() > limit {
                    return Err(corrupt(constants::ERR_DECOMPRESSION_LIMIT));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(_) => return Err(corrupt(constants::ERR_DECOMPRESSION_FAILED)),
        }
    }
    Ok(out)
}
