//! # packetlib
//!
//! Packet engine for the PSO2 protocol family.
//!
//! ## Layers
//! - [`protocol`]: the [`Packet`] sum type, its dialect-aware catalog, the
//!   [`PacketWorker`] converter and the key exchange
//! - [`core`]: frame headers, wire primitives, the framing codec and the
//!   JSON / MessagePack renderings
//! - [`transport`]: polled [`Connection`]s, the [`SocketFactory`] and a tokio
//!   [`AsyncConnection`]
//! - [`archive`]: PPAC capture files
//! - [`utils`]: session ciphers, compression, logging, metrics and time
//!
//! ## Quick Start
//! ```rust
//! use packetlib::{Packet, PacketType, PacketWorker, SerializedFormat};
//!
//! let mut worker = PacketWorker::new(PacketType::NGS, SerializedFormat::JSON);
//! let json = worker.parse_packet(&[8, 0, 0, 0, 3, 4, 0, 0]).unwrap();
//! assert_eq!(json, br#"{"LoadLevel":{}}"#);
//! let raw = worker.create_packet(&json).unwrap();
//! assert_eq!(raw, [8, 0, 0, 0, 3, 4, 0, 0]);
//! ```

pub mod archive;
pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use archive::{ArchiveRecord, Direction, OutputType, PPACReader, PPACWriter, ReaderResult};
pub use config::PacketlibConfig;
pub use crate::core::header::{PacketHeader, PacketType};
pub use crate::core::serialization::{MultiFormat, SerializedFormat};
pub use error::{ProtocolError, Result};
pub use protocol::handshake::{PrivateKey, PublicKey};
pub use protocol::{Packet, PacketWorker};
pub use transport::{
    AsyncConnection, AsyncConnectionRead, AsyncConnectionWrite, Connection, SocketFactory,
    SocketResult,
};
