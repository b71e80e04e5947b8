//! # Packet Archives
//!
//! Reader and writer for PPAC capture files: a sequence of timestamped,
//! directional, dialect tagged frame records used to record and replay
//! traffic.
//!
//! ## File Layout
//! ```text
//! "PPAC" [version u8] [dialect u8 (v3+)] [compressed u8 (v4+)] records...
//! ```
//! With the compression byte set everything after the header is a single
//! zstd stream.
//!
//! ## Record Layout
//! ```text
//! v1:    [secs u64] [direction u8] [len u64] [raw]
//! v2-v4: [nanos u128] [direction u8] [len u64] [raw]
//! v5:    [nanos u128] [direction u8] [dialect u8] [raw len u64]
//!        [payload len u64] [raw] [payload (MessagePack, named)]
//! ```
//! All integers are little endian. This crate writes version 5 and reads
//! every version from 1 to 5.
//!
//! ## Example Usage
//! ```rust
//! use packetlib::archive::{Direction, PPACReader, PPACWriter, ReaderResult};
//! use packetlib::core::header::PacketType;
//! use packetlib::protocol::{LoadLevelPacket, Packet};
//! use std::time::Duration;
//!
//! let mut writer = PPACWriter::new(Vec::new(), PacketType::NGS, false).unwrap();
//! let packet = Packet::LoadLevel(LoadLevelPacket::default());
//! writer
//!     .write_packet(Duration::from_secs(1), Direction::ToClient, &packet)
//!     .unwrap();
//! let file = writer.into_inner().unwrap();
//!
//! let mut reader = PPACReader::open(file.as_slice()).unwrap();
//! assert!(matches!(reader.read_packet(), ReaderResult::Ok));
//! let record = reader.get_reader_data().unwrap();
//! assert_eq!(record.packet, Some(packet));
//! assert!(matches!(reader.read_packet(), ReaderResult::ReaderEOF));
//! ```

mod reader;
mod writer;

pub use crate::utils::time::now;
pub use reader::PPACReader;
pub use writer::PPACWriter;

use crate::core::header::PacketType;
use crate::error::{ArchiveErrorKind, ProtocolError};
use crate::protocol::Packet;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// File magic
pub const MAGIC: &[u8; 4] = b"PPAC";

/// Version written by [`PPACWriter`]
pub const CURRENT_VERSION: u8 = 5;

/// Direction a recorded frame was travelling in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    ToServer = 0,
    ToClient = 1,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::ToServer => Direction::ToClient,
            Direction::ToClient => Direction::ToServer,
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(Direction::ToServer),
            1 => Ok(Direction::ToClient),
            x => Err(ArchiveErrorKind::InvalidDirection(x).into()),
        }
    }
}

/// What a reader produces per record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputType {
    /// Decoded packets only; undecodable frames fall back to raw
    Packet,
    /// Raw frames only, nothing is decoded
    Raw,
    /// Both renderings
    #[default]
    Both,
}

/// One frame read back from an archive
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRecord {
    /// Capture time since the Unix epoch
    pub time: Duration,
    pub direction: Direction,
    /// Dialect the frame was captured under
    pub packet_type: PacketType,
    pub raw: Option<Vec<u8>>,
    pub packet: Option<Packet>,
    /// Why `packet` is absent when decoding was attempted and failed
    pub parse_error: Option<String>,
}

impl ArchiveRecord {
    /// Capture time in whole seconds
    pub fn timestamp_secs(&self) -> u64 {
        self.time.as_secs()
    }

    /// Raw bytes are present but no decoded packet
    pub fn is_raw_only(&self) -> bool {
        self.raw.is_some() && self.packet.is_none()
    }
}

/// Status of [`PPACReader::read_packet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderResult {
    /// A record is ready and carries a decoded packet
    Ok,
    /// A record is ready but holds raw bytes only
    RawOnly,
    /// End of archive
    ReaderEOF,
    /// The archive is corrupt; the reader is finished
    PPACError,
}

#[cfg(test)]
mod tests;
