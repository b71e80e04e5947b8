//! PPAC reader.
//!
//! Records are read strictly in file order. A record whose raw bytes hold
//! several frames is expanded into one [`ArchiveRecord`] per frame, queued and
//! handed out before the next record is read.
//!
//! The first structural failure is terminal: the reader remembers it and
//! never touches the underlying stream again.

use super::{ArchiveRecord, Direction, OutputType, ReaderResult, CURRENT_VERSION, MAGIC};
use crate::config::{ArchiveConfig, MAX_FRAME_SIZE};
use crate::core::header::{split_frames, PacketType};
use crate::core::serialization::{MultiFormat, SerializedFormat};
use crate::error::{ArchiveErrorKind, ProtocolError, Result};
use crate::protocol::Packet;
use crate::utils::compression;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use zstd::stream::read::Decoder;

enum Source<R: Read> {
    Plain(R),
    Zstd(Decoder<'static, BufReader<R>>),
}

impl<R: Read> Read for Source<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Plain(r) => r.read(buf),
            Source::Zstd(r) => r.read(buf),
        }
    }
}

impl<R: Read> Source<R> {
    fn into_inner(self) -> R {
        match self {
            Source::Plain(r) => r,
            Source::Zstd(r) => r.finish().into_inner(),
        }
    }
}

/// Record header shared by every version
struct RecordHeader {
    time: Duration,
    direction: Direction,
    packet_type: PacketType,
}

/// Sequential reader over a PPAC archive
pub struct PPACReader<R: Read> {
    source: Source<R>,
    version: u8,
    packet_type: PacketType,
    out_type: OutputType,
    max_record_size: u64,
    pending: VecDeque<ArchiveRecord>,
    current: Option<ArchiveRecord>,
    last_error: Option<String>,
    poisoned: bool,
}

impl<R: Read> std::fmt::Debug for PPACReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PPACReader")
            .field("version", &self.version)
            .field("packet_type", &self.packet_type)
            .field("out_type", &self.out_type)
            .field("pending", &self.pending.len())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

impl PPACReader<File> {
    /// Open an archive file
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(File::open(path)?)
    }
}

impl<R: Read> PPACReader<R> {
    /// Read and validate the file header.
    ///
    /// Archives before version 3 carry no dialect and are read as NGS.
    pub fn open(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        read_header_field(&mut reader, &mut magic)?;
        if &magic != MAGIC {
            return Err(ArchiveErrorKind::InvalidFile.into());
        }
        let version = read_header_u8(&mut reader)?;
        if !(1..=CURRENT_VERSION).contains(&version) {
            return Err(ArchiveErrorKind::UnsupportedVersion(version).into());
        }
        let packet_type = if version >= 3 {
            let byte = read_header_u8(&mut reader)?;
            PacketType::from_archive_byte(byte)
                .ok_or(ArchiveErrorKind::InvalidPacketType(byte))?
        } else {
            PacketType::NGS
        };
        let source = if version >= 4 && read_header_u8(&mut reader)? != 0 {
            Source::Zstd(compression::decoder(reader)?)
        } else {
            Source::Plain(reader)
        };
        debug!(version, %packet_type, compressed = matches!(source, Source::Zstd(_)), "opened archive");

        Ok(Self {
            source,
            version,
            packet_type,
            out_type: OutputType::default(),
            max_record_size: MAX_FRAME_SIZE as u64,
            pending: VecDeque::new(),
            current: None,
            last_error: None,
            poisoned: false,
        })
    }

    /// Apply output type and record size limit from configuration
    pub fn with_config(mut self, config: &ArchiveConfig) -> Self {
        self.out_type = config.output_type;
        self.max_record_size = config.max_record_size;
        self
    }

    pub fn set_out_type(&mut self, out_type: OutputType) {
        self.out_type = out_type;
    }

    pub fn out_type(&self) -> OutputType {
        self.out_type
    }

    /// Version byte of the file header
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Dialect from the file header
    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// Message of the failure that finished this reader
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }

    /// Next record, `None` at the end of the archive.
    ///
    /// Errors are terminal: once one is returned every later call fails with
    /// [`ArchiveErrorKind::Poisoned`].
    pub fn read(&mut self) -> Result<Option<ArchiveRecord>> {
        if self.poisoned {
            return Err(ArchiveErrorKind::Poisoned.into());
        }
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }
            match self.read_record() {
                Ok(Some(records)) => self.pending.extend(records),
                Ok(None) => return Ok(None),
                Err(e) => {
                    warn!(error = %e, "archive reader failed");
                    self.poisoned = true;
                    self.last_error = Some(e.to_string());
                    return Err(e);
                }
            }
        }
    }

    /// Status based read; the record itself is fetched with
    /// [`PPACReader::get_reader_data`].
    pub fn read_packet(&mut self) -> ReaderResult {
        self.current = None;
        if self.poisoned {
            return ReaderResult::PPACError;
        }
        match self.read() {
            Ok(Some(record)) => {
                let status = if record.is_raw_only() {
                    ReaderResult::RawOnly
                } else {
                    ReaderResult::Ok
                };
                self.current = Some(record);
                status
            }
            Ok(None) => ReaderResult::ReaderEOF,
            Err(_) => ReaderResult::PPACError,
        }
    }

    /// Record produced by the last [`PPACReader::read_packet`]; handed out once
    pub fn get_reader_data(&mut self) -> Option<ArchiveRecord> {
        self.current.take()
    }

    /// Read one stored record. Empty records expand to nothing.
    fn read_record(&mut self) -> Result<Option<Vec<ArchiveRecord>>> {
        let time = if self.version == 1 {
            let mut secs = [0u8; 8];
            if !self.read_first(&mut secs)? {
                return Ok(None);
            }
            Duration::from_secs(u64::from_le_bytes(secs))
        } else {
            let mut nanos = [0u8; 16];
            if !self.read_first(&mut nanos)? {
                return Ok(None);
            }
            nanos_to_duration(u128::from_le_bytes(nanos))
        };
        let direction = Direction::try_from(self.read_u8("direction")?)?;
        let packet_type = if self.version >= 5 {
            let byte = self.read_u8("dialect")?;
            PacketType::from_archive_byte(byte)
                .ok_or(ArchiveErrorKind::InvalidPacketType(byte))?
        } else {
            self.packet_type
        };
        let raw_len = self.read_u64("length")?;
        let payload_len = if self.version >= 5 {
            self.read_u64("payload length")?
        } else {
            0
        };
        let raw = self.read_blob(raw_len, "raw data")?;
        let payload = self.read_blob(payload_len, "payload")?;

        let header = RecordHeader {
            time,
            direction,
            packet_type,
        };
        Ok(Some(self.expand(&header, raw, payload)))
    }

    /// Fill `buf` from the start of a record. `false` on a clean end of file.
    fn read_first(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.source.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(self.stream_error(e)),
            }
        }
        match filled {
            0 => Ok(false),
            n if n == buf.len() => Ok(true),
            _ => Err(ArchiveErrorKind::Truncated("timestamp").into()),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8], field: &'static str) -> Result<()> {
        self.source.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ArchiveErrorKind::Truncated(field).into(),
            _ => self.stream_error(e),
        })
    }

    fn stream_error(&self, e: io::Error) -> ProtocolError {
        match self.source {
            Source::Zstd(_) => compression::stream_error(e),
            Source::Plain(_) => ProtocolError::from(e),
        }
    }

    fn read_u8(&mut self, field: &'static str) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf, field)?;
        Ok(buf[0])
    }

    fn read_u64(&mut self, field: &'static str) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf, field)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a length-prefixed blob, checking the limit before allocating
    fn read_blob(&mut self, len: u64, field: &'static str) -> Result<Vec<u8>> {
        if len > self.max_record_size {
            return Err(ArchiveErrorKind::RecordTooLarge {
                declared: len,
                limit: self.max_record_size,
            }
            .into());
        }
        let mut data = vec![0u8; len as usize];
        self.read_exact(&mut data, field)?;
        Ok(data)
    }

    fn expand(&self, header: &RecordHeader, raw: Vec<u8>, payload: Vec<u8>) -> Vec<ArchiveRecord> {
        let record = |raw: Option<Vec<u8>>, packet: Option<Packet>, parse_error: Option<String>| {
            ArchiveRecord {
                time: header.time,
                direction: header.direction,
                packet_type: header.packet_type,
                raw,
                packet,
                parse_error,
            }
        };
        if raw.is_empty() && payload.is_empty() {
            return Vec::new();
        }

        match self.out_type {
            OutputType::Raw => split_raw(&raw)
                .into_iter()
                .map(|frame| record(Some(frame), None, None))
                .collect(),
            OutputType::Packet => {
                if let Some(packet) = decode_payload(&payload) {
                    return vec![record(None, Some(packet), None)];
                }
                match Packet::read(&raw, header.packet_type) {
                    Ok(packets) => packets
                        .into_iter()
                        .map(|packet| record(None, Some(packet), None))
                        .collect(),
                    Err(e) => {
                        debug!(error = %e, "record kept as raw");
                        vec![record(Some(raw), None, Some(e.to_string()))]
                    }
                }
            }
            OutputType::Both => {
                let frames = split_raw(&raw);
                if frames.len() == 1 {
                    if let Some(packet) = decode_payload(&payload) {
                        return vec![record(Some(raw), Some(packet), None)];
                    }
                }
                match Packet::read(&raw, header.packet_type) {
                    Ok(packets) if packets.len() == frames.len() => frames
                        .into_iter()
                        .zip(packets)
                        .map(|(frame, packet)| record(Some(frame), Some(packet), None))
                        .collect(),
                    Ok(_) => vec![record(Some(raw), None, None)],
                    Err(e) => {
                        debug!(error = %e, "record kept as raw");
                        let message = e.to_string();
                        frames
                            .into_iter()
                            .map(|frame| record(Some(frame), None, Some(message.clone())))
                            .collect()
                    }
                }
            }
        }
    }
}

impl<R: Read> Iterator for PPACReader<R> {
    type Item = Result<ArchiveRecord>;

    /// Yields records, then the terminal error once if there is one
    fn next(&mut self) -> Option<Self::Item> {
        if self.poisoned {
            return None;
        }
        self.read().transpose()
    }
}

/// Split stored bytes into frames, the whole blob when they do not split
fn split_raw(raw: &[u8]) -> Vec<Vec<u8>> {
    match split_frames(raw) {
        Ok(frames) if !frames.is_empty() => frames.into_iter().map(<[u8]>::to_vec).collect(),
        _ => vec![raw.to_vec()],
    }
}

fn decode_payload(payload: &[u8]) -> Option<Packet> {
    if payload.is_empty() {
        return None;
    }
    match Packet::deserialize_format(payload, SerializedFormat::MessagePackNamed) {
        Ok(packet) => Some(packet),
        Err(e) => {
            debug!(error = %e, "stored payload ignored");
            None
        }
    }
}

fn nanos_to_duration(nanos: u128) -> Duration {
    let secs = (nanos / 1_000_000_000).min(u64::MAX as u128) as u64;
    Duration::new(secs, (nanos % 1_000_000_000) as u32)
}

fn read_header_field(reader: &mut impl Read, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ArchiveErrorKind::InvalidFile.into(),
        _ => ProtocolError::from(e),
    })
}

fn read_header_u8(reader: &mut impl Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_header_field(reader, &mut buf)?;
    Ok(buf[0])
}
