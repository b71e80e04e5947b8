//! # Socket Factory
//!
//! Single-slot holder for one TCP listener and one pending stream.
//!
//! Accepting or connecting places a stream in the slot; [`SocketFactory::get_connection`]
//! consumes it. Installing a new listener or stream replaces the previous one.
//! Callers that manage sockets themselves can move them in and out of the
//! slots, as `std` sockets or on Unix as raw descriptors.

use super::{Connection, SocketResult};
use crate::config::ConnectionConfig;
use crate::core::header::PacketType;
use crate::error::{ProtocolError, Result};
use crate::protocol::handshake::{PrivateKey, PublicKey};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

/// Listener and pending stream slots
#[derive(Debug, Default)]
pub struct SocketFactory {
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    config: ConnectionConfig,
    last_error: Option<String>,
}

impl SocketFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ConnectionConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Message of the most recent failure
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        self.last_error = None;
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, "socket factory call failed");
                self.last_error = Some(e.to_string());
                None
            }
        }
    }

    /// Bind a listener on `addr` ("ip:port")
    pub fn create_listener<A: ToSocketAddrs>(&mut self, addr: A) -> bool {
        let result = TcpListener::bind(addr).map_err(ProtocolError::from);
        match self.record(result) {
            Some(listener) => {
                if let Ok(local) = listener.local_addr() {
                    info!(%local, "listening");
                }
                self.install_listener(listener);
                true
            }
            None => false,
        }
    }

    pub fn listener_nonblocking(&mut self, nonblocking: bool) -> bool {
        let result = match &self.listener {
            Some(listener) => listener.set_nonblocking(nonblocking).map_err(Into::into),
            None => Err(ProtocolError::NoSocket),
        };
        self.record(result).is_some()
    }

    /// Local address of the listener
    pub fn listener_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref()?.local_addr().ok()
    }

    /// Accept one pending connection into the stream slot
    pub fn accept_listener(&mut self) -> SocketResult {
        self.last_error = None;
        let Some(listener) = &self.listener else {
            return SocketResult::NoSocket;
        };
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted");
                self.install_stream(stream);
                SocketResult::Ready
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => SocketResult::Blocked,
            Err(e) => {
                warn!(error = %e, "accept failed");
                self.last_error = Some(ProtocolError::from(e).to_string());
                SocketResult::SocketError
            }
        }
    }

    /// Connect to `addr`, trying each resolved address.
    ///
    /// The connect itself always blocks, for at most
    /// `ConnectionConfig::connect_timeout` per resolved address. The
    /// configured non-blocking mode applies to the stream once it is
    /// connected.
    pub fn create_stream<A: ToSocketAddrs>(&mut self, addr: A) -> bool {
        let result = self.connect(addr);
        match self.record(result) {
            Some(stream) => {
                self.install_stream(stream);
                true
            }
            None => false,
        }
    }

    fn connect<A: ToSocketAddrs>(&self, addr: A) -> Result<TcpStream> {
        let mut last = None;
        for addr in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout) {
                Ok(stream) => {
                    stream.set_nonblocking(self.config.nonblocking)?;
                    debug!(%addr, nonblocking = self.config.nonblocking, "connected");
                    return Ok(stream);
                }
                Err(e) => last = Some(e),
            }
        }
        Err(last
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no address resolved"))
            .into())
    }

    pub fn stream_nonblocking(&mut self, nonblocking: bool) -> bool {
        let result = match &self.stream {
            Some(stream) => stream.set_nonblocking(nonblocking).map_err(Into::into),
            None => Err(ProtocolError::NoSocket),
        };
        self.record(result).is_some()
    }

    /// IPv4 address of the pending stream's peer
    pub fn stream_ip(&self) -> Option<Ipv4Addr> {
        match self.stream.as_ref()?.peer_addr().ok()?.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        }
    }

    /// Wrap the pending stream in a [`Connection`], emptying the slot.
    ///
    /// A second call without a new stream fails with [`ProtocolError::NoSocket`].
    pub fn get_connection(
        &mut self,
        packet_type: PacketType,
        private_key: PrivateKey,
        public_key: PublicKey,
    ) -> Result<Connection> {
        let result = self.make_connection(packet_type, private_key, public_key);
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
        }
        result
    }

    fn make_connection(
        &mut self,
        packet_type: PacketType,
        private_key: PrivateKey,
        public_key: PublicKey,
    ) -> Result<Connection> {
        let stream = self.stream.take().ok_or(ProtocolError::NoSocket)?;
        if self.config.nonblocking {
            stream.set_nonblocking(true)?;
        }
        Connection::from_config(stream, packet_type, private_key, public_key, &self.config)
    }

    /// Move the pending stream out
    pub fn take_stream(&mut self) -> Option<TcpStream> {
        self.stream.take()
    }

    pub fn take_listener(&mut self) -> Option<TcpListener> {
        self.listener.take()
    }

    /// Put a stream in the slot, replacing the current one
    pub fn install_stream(&mut self, stream: TcpStream) {
        if self.stream.replace(stream).is_some() {
            info!("pending stream replaced");
        }
    }

    /// Put a listener in the slot, replacing the current one
    pub fn install_listener(&mut self, listener: TcpListener) {
        if self.listener.replace(listener).is_some() {
            info!("listener replaced");
        }
    }
}

#[cfg(unix)]
mod fd {
    use super::*;
    use std::os::fd::{FromRawFd, IntoRawFd, RawFd};

    impl SocketFactory {
        /// Release the pending stream as a descriptor the caller now owns
        pub fn stream_into_fd(&mut self) -> Option<RawFd> {
            self.stream.take().map(IntoRawFd::into_raw_fd)
        }

        /// Release the listener as a descriptor the caller now owns
        pub fn listener_into_fd(&mut self) -> Option<RawFd> {
            self.listener.take().map(IntoRawFd::into_raw_fd)
        }

        /// Install a stream from a descriptor.
        ///
        /// # Safety
        /// `fd` must be an open TCP stream socket owned by the caller; ownership
        /// moves into the factory.
        pub unsafe fn stream_from_fd(&mut self, fd: RawFd) {
            // SAFETY: upheld by the caller
            self.install_stream(unsafe { TcpStream::from_raw_fd(fd) });
        }

        /// Install a listener from a descriptor.
        ///
        /// # Safety
        /// `fd` must be an open listening TCP socket owned by the caller;
        /// ownership moves into the factory.
        pub unsafe fn listener_from_fd(&mut self, fd: RawFd) {
            // SAFETY: upheld by the caller
            self.install_listener(unsafe { TcpListener::from_raw_fd(fd) });
        }
    }
}
