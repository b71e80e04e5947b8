//! # Error Types
//!
//! Error handling for the packet engine.
//!
//! Every fallible operation in the crate returns [`ProtocolError`]. The
//! stateful objects ([`PacketWorker`](crate::protocol::worker::PacketWorker),
//! [`Connection`](crate::transport::connection::Connection),
//! [`SocketFactory`](crate::transport::socket_factory::SocketFactory) and
//! [`PPACReader`](crate::archive::PPACReader)) additionally record the rendered
//! message of their most recent failure in a last-error slot.
//!
//! ## Error Categories
//! - **Parse**: malformed or truncated frames and fields
//! - **Serde**: invalid structured values, unknown variant names
//! - **Socket**: I/O failures other than would-block
//! - **Encryption**: key exchange and cipher failures
//! - **Archive**: corrupt or unsupported PPAC headers and records
//!
//! Would-block is control flow, never an error: it surfaces as
//! [`SocketResult::Blocked`](crate::transport::SocketResult::Blocked).
//!
//! ## Example Usage
//! ```rust
//! use packetlib::error::{ErrorCategory, ProtocolError, Result};
//!
//! fn frame_len(data: &[u8]) -> Result<u32> {
//!     let bytes: [u8; 4] = data
//!         .get(..4)
//!         .and_then(|b| b.try_into().ok())
//!         .ok_or_else(|| ProtocolError::ParseError("frame shorter than 4 bytes".into()))?;
//!     Ok(u32::from_le_bytes(bytes))
//! }
//!
//! let err = frame_len(&[1, 2]).unwrap_err();
//! assert_eq!(err.category(), ErrorCategory::Parse);
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Frame errors
    pub const ERR_FRAME_TOO_SHORT: &str = "Frame shorter than its header";
    pub const ERR_FRAME_LENGTH_OVERRUN: &str = "Declared frame length exceeds available bytes";
    pub const ERR_FRAME_LENGTH_UNDERRUN: &str = "Declared frame length is smaller than the header";
    pub const ERR_TRAILING_BYTES: &str = "Packet body was not fully consumed";
    pub const ERR_UNEXPECTED_EOF: &str = "Unexpected end of packet body";
    pub const ERR_PSOTIME_UNDERFLOW: &str = "Timestamp precedes the Unix epoch";
    pub const ERR_DURATION_OVERFLOW: &str = "Duration does not fit in u32 seconds";
    pub const ERR_NOT_ASCII: &str = "Text is not ASCII";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed by peer";

    /// Serialization errors
    pub const ERR_EMPTY_INPUT: &str = "Empty serialized input";

    /// Cryptographic errors
    pub const ERR_NO_PRIVATE_KEY: &str = "Key exchange received but no private key is configured";
    pub const ERR_KEY_ALREADY_ESTABLISHED: &str = "Session key is already established";
    pub const ERR_KEY_MATERIAL_TOO_SHORT: &str = "Key material is too short";
    pub const ERR_RSA_BLOCK_TOO_LONG: &str = "RSA block is longer than the key";
    pub const ERR_ENVELOPE_TOO_SHORT: &str = "Encrypted envelope shorter than its header";
    pub const ERR_ENCRYPTION_FAILED: &str = "Encryption failed";
    pub const ERR_DECRYPTION_FAILED: &str = "Decryption failed";
    pub const ERR_NO_OUTGOING_KEYSTREAM: &str = "Cipher half has no outgoing keystream";
    pub const ERR_KEY_EXCHANGE_AFTER_SPLIT: &str = "Key exchange on a split connection";

    /// Compression errors
    pub const ERR_DECOMPRESSION_FAILED: &str = "Decompression failed";
    pub const ERR_DECOMPRESSION_LIMIT: &str = "Decompressed data exceeds the size limit";
}

/// Reasons a PPAC archive is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArchiveErrorKind {
    #[error("missing PPAC magic")]
    InvalidFile,

    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid dialect discriminant {0}")]
    InvalidPacketType(u8),

    #[error("invalid direction discriminant {0}")]
    InvalidDirection(u8),

    #[error("record declares {declared} bytes, limit is {limit}")]
    RecordTooLarge { declared: u64, limit: u64 },

    #[error("record truncated: {0}")]
    Truncated(&'static str),

    #[error("corrupted packet data")]
    CorruptedPacket,

    #[error("compressed stream is corrupt: {0}")]
    CorruptStream(&'static str),

    #[error("reader already failed")]
    Poisoned,
}

/// Coarse classification of a [`ProtocolError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Parse,
    Serde,
    Socket,
    Encryption,
    Archive,
    Config,
}

// ProtocolError is the primary error type for all engine operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serde error: {0}")]
    SerdeError(String),

    #[error("Socket error: {0}")]
    SocketError(#[from] io::Error),

    #[error("No socket")]
    NoSocket,

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Archive error: {0}")]
    ArchiveError(#[from] ArchiveErrorKind),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProtocolError::ParseError(_) | ProtocolError::OversizedPacket(_) => {
                ErrorCategory::Parse
            }
            ProtocolError::SerdeError(_) => ErrorCategory::Serde,
            ProtocolError::SocketError(_) | ProtocolError::NoSocket => ErrorCategory::Socket,
            ProtocolError::EncryptionError(_) => ErrorCategory::Encryption,
            ProtocolError::ArchiveError(_) => ErrorCategory::Archive,
            ProtocolError::ConfigError(_) => ErrorCategory::Config,
        }
    }

    /// Whether this error wraps an I/O would-block condition
    pub fn is_would_block(&self) -> bool {
        matches!(self, ProtocolError::SocketError(e) if e.kind() == io::ErrorKind::WouldBlock)
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
