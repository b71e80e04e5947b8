//! # Core Protocol Components
//!
//! Low-level frame handling, field encoding, and external serialization.
//!
//! This module provides the foundation the packet catalog is built on.
//!
//! ## Components
//! - **Header**: dialects, flags and the 8-byte frame header
//! - **Wire**: little-endian field primitives and magic lengths
//! - **Codec**: Tokio codec for framing (and decrypting) byte streams
//! - **Serialization**: JSON and MessagePack renderings of packets
//!
//! ## Wire Format
//! ```text
//! [Length(4, LE)] [Id(1)] [SubId(1)] [Flags(1)] [Pad(1)] [Body(N)]
//! ```
//!
//! ## Security
//! - Maximum frame size: 16MB (prevents memory exhaustion)
//! - Length validation before allocation

pub mod codec;
pub mod header;
pub mod serialization;
pub mod wire;
