//! # Frame Header
//!
//! Dialects and the 8-byte frame header shared by all of them.
//!
//! ## Wire Format
//! ```text
//! [Length(4, LE)] [Id(1)] [SubId(1)] [Flags(1)] [Pad(1)] [Body(N)]
//! ```
//! `Length` counts the whole frame, itself included. Recognized packets pad
//! their body so that the frame length is a multiple of 4.

use crate::error::{constants, ProtocolError, Result};
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Size of the length prefix plus the packet header
pub const HEADER_LEN: usize = 8;

/// Protocol dialect spoken on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PacketType {
    #[default]
    NGS,
    Classic,
    NA,
    JP,
    Vita,
    /// Frames are passed through undecoded
    Raw,
}

/// Whether a dialect ever negotiates a session cipher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionPolicy {
    Never,
    OnKeyExchange,
}

impl PacketType {
    pub const ALL: [PacketType; 6] = [
        PacketType::NGS,
        PacketType::Classic,
        PacketType::NA,
        PacketType::JP,
        PacketType::Vita,
        PacketType::Raw,
    ];

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            PacketType::NGS => "NGS",
            PacketType::Classic => "Classic",
            PacketType::NA => "NA",
            PacketType::JP => "JP",
            PacketType::Vita => "Vita",
            PacketType::Raw => "Raw",
        }
    }

    /// Discriminant stored in PPAC archives
    pub fn archive_byte(self) -> Option<u8> {
        match self {
            PacketType::Classic => Some(0),
            PacketType::NGS => Some(1),
            PacketType::NA => Some(2),
            PacketType::JP => Some(3),
            PacketType::Vita => Some(4),
            PacketType::Raw => None,
        }
    }

    /// Inverse of [`PacketType::archive_byte`]
    pub fn from_archive_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PacketType::Classic),
            1 => Some(PacketType::NGS),
            2 => Some(PacketType::NA),
            3 => Some(PacketType::JP),
            4 => Some(PacketType::Vita),
            _ => None,
        }
    }

    pub fn is_ngs(self) -> bool {
        self == PacketType::NGS
    }

    /// Dialects sharing the pre-NGS catalog
    pub fn is_base(self) -> bool {
        matches!(
            self,
            PacketType::Classic | PacketType::NA | PacketType::JP | PacketType::Vita
        )
    }

    pub fn encryption_policy(self) -> EncryptionPolicy {
        match self {
            PacketType::Raw => EncryptionPolicy::Never,
            _ => EncryptionPolicy::OnKeyExchange,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PacketType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        PacketType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError::ConfigError(format!("unknown packet type: {s}")))
    }
}

/// Header flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// Body uses magic-obfuscated lengths
    pub const PACKED: Flags = Flags(0x04);
    pub const FLAG10: Flags = Flags(0x10);
    pub const FULL_MOVEMENT: Flags = Flags(0x20);
    /// Body starts with an object header
    pub const OBJECT_RELATED: Flags = Flags(0x40);

    pub const fn from_bits(bits: u8) -> Self {
        Flags(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn union(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        self.union(rhs)
    }
}

/// Opcode and flags of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PacketHeader {
    pub id: u8,
    pub subid: u8,
    pub flags: Flags,
}

impl PacketHeader {
    pub const fn new(id: u8, subid: u8, flags: Flags) -> Self {
        Self { id, subid, flags }
    }

    /// Parse the 4 header bytes that follow the length prefix
    pub fn read(mut buf: &[u8]) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(ProtocolError::ParseError(
                constants::ERR_FRAME_TOO_SHORT.into(),
            ));
        }
        let id = buf.get_u8();
        let subid = buf.get_u8();
        let flags = Flags::from_bits(buf.get_u8());
        Ok(Self { id, subid, flags })
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.id);
        buf.put_u8(self.subid);
        buf.put_u8(self.flags.bits());
        buf.put_u8(0);
    }

    pub fn opcode(&self) -> (u8, u8) {
        (self.id, self.subid)
    }
}

/// Declared length of the frame starting at `data`, if the prefix is present
pub fn declared_len(data: &[u8]) -> Option<usize> {
    let prefix: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(prefix) as usize)
}

/// Split a buffer into whole frames (length prefix included).
///
/// Every byte must belong to a frame: a truncated trailing frame, a declared
/// length shorter than the header, or a length overrunning the buffer is a
/// parse error.
pub fn split_frames(mut data: &[u8]) -> Result<Vec<&[u8]>> {
    let mut frames = Vec::new();
    while !data.is_empty() {
        let len = declared_len(data).ok_or_else(|| {
            ProtocolError::ParseError(constants::ERR_FRAME_TOO_SHORT.into())
        })?;
        if len < HEADER_LEN {
            return Err(ProtocolError::ParseError(format!(
                "{} ({len} < {HEADER_LEN})",
                constants::ERR_FRAME_LENGTH_UNDERRUN
            )));
        }
        if len > data.len() {
            return Err(ProtocolError::ParseError(format!(
                "{} ({len} > {})",
                constants::ERR_FRAME_LENGTH_OVERRUN,
                data.len()
            )));
        }
        let (frame, rest) = data.split_at(len);
        frames.push(frame);
        data = rest;
    }
    Ok(frames)
}

/// Assemble a frame from header and body, patching in the length prefix.
/// With `align` the body is zero padded to a multiple of 4.
pub fn build_frame(header: &PacketHeader, body: &[u8], align: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + body.len() + 3);
    out.put_u32_le(0);
    header.write(&mut out);
    out.put_slice(body);
    if align {
        out.resize(out.len().next_multiple_of(4), 0);
    }
    let len = out.len() as u32;
    out[..4].copy_from_slice(&len.to_le_bytes());
    out
}
