//! # Transport Layer
//!
//! Packet connections over byte streams.
//!
//! ## Components
//! - **Connection**: polled, non-blocking connection over any `Read + Write`
//!   stream with buffered framing and the key exchange
//! - **SocketFactory**: single-slot holder for a listener and one pending
//!   stream, the place connections are created from
//! - **AsyncConnection**: tokio rendition of [`Connection`] built on `Framed`
//!
//! ## Polling
//! Nothing here spawns threads or timers. Every operation attempts the work
//! once and reports a [`SocketResult`]; on `Blocked` the caller retries later.
//! Buffered bytes are never lost between attempts.

pub mod connection;
pub mod socket_factory;
pub mod tcp;

pub use connection::Connection;
pub use socket_factory::SocketFactory;
pub use tcp::{AsyncConnection, AsyncConnectionRead, AsyncConnectionWrite};

/// Outcome of a polled socket operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketResult {
    /// Data or socket is ready
    Ready,
    /// The operation would block; state is kept for a retry
    Blocked,
    /// No socket is installed
    NoSocket,
    /// The stream failed, see `last_error`
    SocketError,
    /// A complete frame was consumed but could not be delivered
    Rejected,
}

impl SocketResult {
    pub fn is_ready(self) -> bool {
        self == SocketResult::Ready
    }
}
