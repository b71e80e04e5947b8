//! PPAC writer.
//!
//! Always writes the newest record layout. Every record carries the dialect
//! it was captured under, so a capture that switches dialect midway reads
//! back correctly even from a compressed file.

use super::{Direction, CURRENT_VERSION, MAGIC};
use crate::core::header::{split_frames, PacketType};
use crate::core::serialization::{MultiFormat, SerializedFormat};
use crate::error::{ArchiveErrorKind, ProtocolError, Result};
use crate::protocol::Packet;
use crate::utils::compression;
use std::io::{self, Seek, SeekFrom, Write};
use std::time::Duration;
use tracing::{debug, warn};
use zstd::stream::write::Encoder;

/// Default zstd level for compressed archives
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Offset of the dialect byte in the file header
const DIALECT_OFFSET: u64 = 5;

/// Discriminant reported for dialects that have no archive byte
const UNARCHIVABLE_DIALECT: u8 = 5;

enum Sink<W: Write> {
    Plain(W),
    Zstd(Encoder<'static, W>),
}

impl<W: Write> Write for Sink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Zstd(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Zstd(w) => w.flush(),
        }
    }
}

impl<W: Write> Sink<W> {
    /// The file itself, bypassing compression
    fn file_mut(&mut self) -> &mut W {
        match self {
            Sink::Plain(w) => w,
            Sink::Zstd(w) => w.get_mut(),
        }
    }

    fn finish(self) -> io::Result<W> {
        match self {
            Sink::Plain(w) => Ok(w),
            Sink::Zstd(w) => w.finish(),
        }
    }
}

/// Archive writer
pub struct PPACWriter<W: Write> {
    sink: Option<Sink<W>>,
    packet_type: PacketType,
}

impl<W: Write> std::fmt::Debug for PPACWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PPACWriter")
            .field("packet_type", &self.packet_type)
            .field("compressed", &matches!(self.sink, Some(Sink::Zstd(_))))
            .finish()
    }
}

fn archive_byte(packet_type: PacketType) -> Result<u8> {
    packet_type
        .archive_byte()
        .ok_or_else(|| ArchiveErrorKind::InvalidPacketType(UNARCHIVABLE_DIALECT).into())
}

impl<W: Write> PPACWriter<W> {
    /// Write the file header. [`PacketType::Raw`] cannot be archived.
    pub fn new(writer: W, packet_type: PacketType, compress: bool) -> Result<Self> {
        Self::with_level(writer, packet_type, compress, DEFAULT_COMPRESSION_LEVEL)
    }

    pub fn with_level(
        mut writer: W,
        packet_type: PacketType,
        compress: bool,
        level: i32,
    ) -> Result<Self> {
        let dialect = archive_byte(packet_type)?;
        writer.write_all(MAGIC)?;
        writer.write_all(&[CURRENT_VERSION, dialect, compress as u8])?;
        let sink = if compress {
            Sink::Zstd(compression::encoder(writer, level)?)
        } else {
            Sink::Plain(writer)
        };
        debug!(%packet_type, compress, "created archive");
        Ok(Self {
            sink: Some(sink),
            packet_type,
        })
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    fn sink(&mut self) -> Result<&mut Sink<W>> {
        self.sink.as_mut().ok_or_else(|| {
            ProtocolError::SocketError(io::Error::other("archive writer already finished"))
        })
    }

    fn write_record(
        &mut self,
        time: Duration,
        direction: Direction,
        raw: &[u8],
        payload: &[u8],
    ) -> Result<()> {
        let dialect = archive_byte(self.packet_type)?;
        let sink = self.sink()?;
        sink.write_all(&time.as_nanos().to_le_bytes())?;
        sink.write_all(&[direction as u8, dialect])?;
        sink.write_all(&(raw.len() as u64).to_le_bytes())?;
        sink.write_all(&(payload.len() as u64).to_le_bytes())?;
        sink.write_all(raw)?;
        sink.write_all(payload)?;
        Ok(())
    }

    /// Store `data` as one record without checking its structure
    pub fn write_data_unchecked(
        &mut self,
        time: Duration,
        direction: Direction,
        data: &[u8],
    ) -> Result<()> {
        self.write_record(time, direction, data, &[])
    }

    /// Store whole frames, one record per frame.
    ///
    /// Nothing is written when `data` does not split cleanly into frames.
    pub fn write_data(&mut self, time: Duration, direction: Direction, data: &[u8]) -> Result<()> {
        let frames = split_frames(data).map_err(|e| {
            warn!(error = %e, len = data.len(), "refusing to archive malformed data");
            ProtocolError::from(ArchiveErrorKind::CorruptedPacket)
        })?;
        for frame in frames {
            self.write_record(time, direction, frame, &[])?;
        }
        Ok(())
    }

    /// Store a packet as its wire encoding plus its structured form
    pub fn write_packet(
        &mut self,
        time: Duration,
        direction: Direction,
        packet: &Packet,
    ) -> Result<()> {
        let raw = packet.try_write(self.packet_type)?;
        let payload = packet.serialize_format(SerializedFormat::MessagePackNamed)?;
        self.write_record(time, direction, &raw, &payload)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink()?.flush()?;
        Ok(())
    }

    /// Finish the compressed stream and return the underlying writer
    pub fn into_inner(mut self) -> Result<W> {
        let sink = self.sink.take().ok_or_else(|| {
            ProtocolError::SocketError(io::Error::other("archive writer already finished"))
        })?;
        Ok(sink.finish()?)
    }
}

impl<W: Write + Seek> PPACWriter<W> {
    /// Switch the dialect of subsequent records and rewrite the file header
    pub fn change_packet_type(&mut self, packet_type: PacketType) -> Result<()> {
        let dialect = archive_byte(packet_type)?;
        let file = self.sink()?.file_mut();
        let position = file.stream_position()?;
        file.seek(SeekFrom::Start(DIALECT_OFFSET))?;
        file.write_all(&[dialect])?;
        file.seek(SeekFrom::Start(position))?;
        debug!(from = %self.packet_type, to = %packet_type, "archive dialect changed");
        self.packet_type = packet_type;
        Ok(())
    }
}

impl<W: Write> Drop for PPACWriter<W> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            if let Err(e) = sink.finish() {
                warn!(error = %e, "failed to finish archive");
            }
        }
    }
}
