//! # Utility Modules
//!
//! Supporting utilities for cryptography, compression, logging, and timing.
//!
//! This module provides reusable utilities used throughout the packet engine.
//!
//! ## Components
//! - **Crypto**: RC4 and AES-256-CBC session ciphers
//! - **Compression**: Zstd with a decompression size limit
//! - **Logging**: Structured logging configuration
//! - **Time**: Wall clock and game clock conversions
//! - **Metrics**: Per-connection observability counters
//!
//! ## Security
//! - Decompression bomb protection (16MB limit)
//! - Memory zeroing for key material (zeroize crate)

pub mod compression;
pub mod crypto;
pub mod logging;
pub mod metrics;
pub mod time;

pub use metrics::{Metrics, MetricsSnapshot};
