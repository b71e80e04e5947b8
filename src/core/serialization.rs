//! # Serialization Formats
//!
//! External structured encodings of a [`Packet`](crate::protocol::Packet).
//!
//! ## Formats
//! - **JSON**: `{"VariantName": {"field": value, ...}}`, human-readable
//! - **MessagePack**: positional; structs become arrays in schema field order, so
//!   producer and consumer must agree on the schema version
//! - **MessagePackNamed**: like JSON, fields keyed by name
//!
//! ## Usage
//! ```ignore
//! use packetlib::core::serialization::{MultiFormat, SerializedFormat};
//!
//! let json = packet.serialize_format(SerializedFormat::JSON)?;
//! let back = Packet::deserialize_format(&json, SerializedFormat::JSON)?;
//! ```

use crate::error::{constants, ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SerializedFormat {
    /// Human-readable JSON format (default)
    #[default]
    JSON,
    /// Positional MessagePack
    MessagePack,
    /// Field-keyed MessagePack
    MessagePackNamed,
}

impl SerializedFormat {
    pub const ALL: [SerializedFormat; 3] = [
        SerializedFormat::JSON,
        SerializedFormat::MessagePack,
        SerializedFormat::MessagePackNamed,
    ];

    /// Get the format identifier byte
    pub fn format_byte(self) -> u8 {
        match self {
            SerializedFormat::JSON => 0x00,
            SerializedFormat::MessagePack => 0x01,
            SerializedFormat::MessagePackNamed => 0x02,
        }
    }

    /// Detect format from identifier byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(SerializedFormat::JSON),
            0x01 => Some(SerializedFormat::MessagePack),
            0x02 => Some(SerializedFormat::MessagePackNamed),
            _ => None,
        }
    }

    /// Whether this build can encode and decode the format
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            SerializedFormat::JSON
                | SerializedFormat::MessagePack
                | SerializedFormat::MessagePackNamed
        )
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            SerializedFormat::JSON => "JSON",
            SerializedFormat::MessagePack => "MessagePack",
            SerializedFormat::MessagePackNamed => "MessagePackNamed",
        }
    }
}

impl fmt::Display for SerializedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SerializedFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        SerializedFormat::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError::SerdeError(format!("unsupported format: {s}")))
    }
}

fn ser_err(e: impl fmt::Display) -> ProtocolError {
    ProtocolError::SerdeError(e.to_string())
}

/// Trait for types that support multiple serialization formats
pub trait MultiFormat: Serialize + for<'de> Deserialize<'de> + Sized {
    /// Serialize to bytes using the specified format
    fn serialize_format(&self, format: SerializedFormat) -> Result<Vec<u8>> {
        match format {
            SerializedFormat::JSON => serde_json::to_vec(self).map_err(ser_err),
            SerializedFormat::MessagePack => rmp_serde::to_vec(self).map_err(ser_err),
            SerializedFormat::MessagePackNamed => rmp_serde::to_vec_named(self).map_err(ser_err),
        }
    }

    /// Deserialize from bytes using the specified format.
    ///
    /// JSON input may carry one trailing NUL, as handed over by C callers.
    fn deserialize_format(data: &[u8], format: SerializedFormat) -> Result<Self> {
        if data.is_empty() {
            return Err(ProtocolError::SerdeError(constants::ERR_EMPTY_INPUT.into()));
        }
        match format {
            SerializedFormat::JSON => {
                let data = data.strip_suffix(&[0]).unwrap_or(data);
                serde_json::from_slice(data).map_err(ser_err)
            }
            SerializedFormat::MessagePack | SerializedFormat::MessagePackNamed => {
                rmp_serde::from_slice(data).map_err(ser_err)
            }
        }
    }

    /// Serialize to bytes with a leading format byte
    fn serialize_with_header(&self, format: SerializedFormat) -> Result<Vec<u8>> {
        let mut data = vec![format.format_byte()];
        data.append(&mut self.serialize_format(format)?);
        Ok(data)
    }

    /// Deserialize from bytes with a leading format byte
    fn deserialize_with_header(data: &[u8]) -> Result<(Self, SerializedFormat)> {
        let (&first, rest) = data
            .split_first()
            .ok_or_else(|| ProtocolError::SerdeError(constants::ERR_EMPTY_INPUT.into()))?;
        let format = SerializedFormat::from_byte(first)
            .ok_or_else(|| ProtocolError::SerdeError(format!("Unknown format byte: {first}")))?;
        Ok((Self::deserialize_format(rest, format)?, format))
    }
}
