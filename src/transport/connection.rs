//! # Connection
//!
//! A polled packet connection over one duplex byte stream.
//!
//! Incoming bytes are buffered until the [`FrameCodec`] can split off a whole
//! frame; a partial frame is never delivered and never lost. Outgoing packets
//! are encoded, encrypted under the session cipher and appended to the write
//! buffer, which is flushed as far as the stream allows.
//!
//! ## Key Exchange
//! - **Server side**: with a private key, an incoming `EncryptionRequest` is
//!   unwrapped and the session cipher is installed before the next frame
//! - **Client side**: with a public key, an outgoing `EncryptionRequest`
//!   holding plain key material is sent RSA-wrapped, in plaintext, and the
//!   cipher applies to everything written after it
//!
//! ## Capture
//! [`Connection::create_ppac`] records every plaintext frame read or written
//! into a PPAC archive.

use super::SocketResult;
use crate::archive::{now, Direction, PPACWriter};
use crate::config::ConnectionConfig;
use crate::core::codec::FrameCodec;
use crate::core::header::PacketType;
use crate::core::serialization::SerializedFormat;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::handshake::{KeyExchange, PrivateKey, PublicKey};
use crate::protocol::{Packet, PacketWorker};
use crate::utils::metrics::Metrics;
use bytes::{Buf, BytesMut};
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, TcpStream};
use std::path::Path;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, trace, warn};

/// Packet connection over a `Read + Write` stream
pub struct Connection<S: Read + Write = TcpStream> {
    stream: S,
    read_buf: BytesMut,
    write_buf: BytesMut,
    codec: FrameCodec,
    worker: PacketWorker,
    key_exchange: KeyExchange,
    current: Option<Packet>,
    last_error: Option<String>,
    capture: Option<(PPACWriter<File>, Direction)>,
    metrics: Metrics,
    read_chunk_size: usize,
}

impl<S: Read + Write> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("packet_type", &self.worker.packet_type())
            .field("cipher", &self.codec.cipher().name())
            .field("key_exchange", &self.key_exchange)
            .field("read_buffered", &self.read_buf.len())
            .field("write_buffered", &self.write_buf.len())
            .field("capturing", &self.capture.is_some())
            .finish()
    }
}

impl<S: Read + Write> Connection<S> {
    /// Wrap `stream` with default settings.
    ///
    /// `private_key` unwraps incoming key exchanges, `public_key` wraps
    /// outgoing ones. Key sources are loaded here, so a bad key file fails
    /// construction rather than the handshake.
    pub fn new(
        stream: S,
        packet_type: PacketType,
        private_key: PrivateKey,
        public_key: PublicKey,
    ) -> Result<Self> {
        Self::from_config(
            stream,
            packet_type,
            private_key,
            public_key,
            &ConnectionConfig::default(),
        )
    }

    pub fn from_config(
        stream: S,
        packet_type: PacketType,
        private_key: PrivateKey,
        public_key: PublicKey,
        config: &ConnectionConfig,
    ) -> Result<Self> {
        let key_exchange = KeyExchange::new(private_key.load()?, public_key.load()?)
            .with_passthrough(config.passthrough_key_exchange);
        debug!(%packet_type, ?key_exchange, "connection created");
        Ok(Self {
            stream,
            read_buf: BytesMut::with_capacity(config.read_chunk_size),
            write_buf: BytesMut::new(),
            codec: FrameCodec::new(config.max_frame_size),
            worker: PacketWorker::new(packet_type, SerializedFormat::default()),
            key_exchange,
            current: None,
            last_error: None,
            capture: None,
            metrics: Metrics::new(),
            read_chunk_size: config.read_chunk_size.max(1),
        })
    }

    pub fn packet_type(&self) -> PacketType {
        self.worker.packet_type()
    }

    /// Switch dialect; frames already buffered decode under the new one
    pub fn change_packet_type(&mut self, packet_type: PacketType) {
        info!(from = %self.worker.packet_type(), to = %packet_type, "dialect changed");
        if let Some((writer, _)) = &mut self.capture {
            if let Err(e) = writer.change_packet_type(packet_type) {
                warn!(error = %e, "capture keeps its dialect");
            }
        }
        self.worker.set_packet_type(packet_type);
    }

    /// Negotiated secret, empty before the key exchange
    pub fn get_key(&self) -> Vec<u8> {
        self.codec.get_key().to_vec()
    }

    pub fn key_exchange(&self) -> &KeyExchange {
        &self.key_exchange
    }

    /// Message of the most recent failure
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Bytes still waiting to be written
    pub fn pending_write(&self) -> usize {
        self.write_buf.len()
    }

    /// Record traffic into a new PPAC file. `direction` is the direction of
    /// written frames; read frames are recorded the opposite way.
    pub fn create_ppac<P: AsRef<Path>>(&mut self, path: P, direction: Direction) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let writer = PPACWriter::new(file, self.worker.packet_type(), true)?;
        info!(path = %path.as_ref().display(), ?direction, "capturing traffic");
        self.capture = Some((writer, direction));
        Ok(())
    }

    /// Packet produced by the last successful [`Connection::read_packet`]; handed out once
    pub fn take_packet(&mut self) -> Option<Packet> {
        self.current.take()
    }

    /// Try to read one packet.
    ///
    /// Frames already buffered are delivered before the stream is touched.
    /// On [`SocketResult::Ready`] the packet is available from
    /// [`Connection::take_packet`].
    pub fn read_packet(&mut self) -> SocketResult {
        self.current = None;
        self.last_error = None;
        loop {
            match self.codec.decode(&mut self.read_buf) {
                Ok(Some(frame)) => return self.deliver(&frame),
                Ok(None) => {}
                Err(e) => return self.reject(e.to_string()),
            }
            match self.fill_read_buf() {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return SocketResult::Blocked,
                Err(e) => return self.socket_error(e),
            }
        }
    }

    /// Queue `packet` (if any) and flush as much as the stream accepts.
    ///
    /// `None` only flushes. On [`SocketResult::Blocked`] the packet is already
    /// buffered; call again with `None` to continue.
    pub fn write_packet(&mut self, packet: Option<&Packet>) -> SocketResult {
        self.last_error = None;
        if let Some(packet) = packet {
            if let Err(e) = self.queue_packet(packet) {
                return self.reject(e.to_string());
            }
        }
        self.flush()
    }

    /// Write buffered bytes until done or the stream would block
    pub fn flush(&mut self) -> SocketResult {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => {
                    return self.socket_error(io::Error::from(io::ErrorKind::WriteZero));
                }
                Ok(n) => {
                    self.write_buf.advance(n);
                    self.metrics.bytes_written(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return SocketResult::Blocked,
                Err(e) => return self.socket_error(e),
            }
        }
        match self.stream.flush() {
            Ok(()) => SocketResult::Ready,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => SocketResult::Blocked,
            Err(e) => self.socket_error(e),
        }
    }

    fn fill_read_buf(&mut self) -> io::Result<()> {
        let start = self.read_buf.len();
        self.read_buf.resize(start + self.read_chunk_size, 0);
        let result = loop {
            match self.stream.read(&mut self.read_buf[start..]) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other,
            }
        };
        match result {
            Ok(0) => {
                self.read_buf.truncate(start);
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    constants::ERR_CONNECTION_CLOSED,
                ))
            }
            Ok(n) => {
                self.read_buf.truncate(start + n);
                self.metrics.bytes_read(n);
                trace!(read = n, buffered = self.read_buf.len(), "socket read");
                Ok(())
            }
            Err(e) => {
                self.read_buf.truncate(start);
                Err(e)
            }
        }
    }

    fn deliver(&mut self, frame: &[u8]) -> SocketResult {
        let packet_type = self.worker.packet_type();
        if let Some((writer, direction)) = &mut self.capture {
            if let Err(e) = writer.write_data(now(), direction.reverse(), frame) {
                warn!(error = %e, "failed to capture incoming frame");
            }
        }

        let Some(mut packet) = self.worker.raw_to_packet(frame) else {
            let message = self.worker.last_error().unwrap_or_default().to_string();
            return self.reject(message);
        };
        match self.key_exchange.accept_incoming(&mut packet, packet_type) {
            Ok(Some(cipher)) => {
                self.codec.set_cipher(cipher);
                self.metrics.handshake_success();
            }
            Ok(None) => {}
            Err(e) => {
                self.metrics.handshake_failed();
                return self.reject(e.to_string());
            }
        }

        self.metrics.frame_received();
        trace!(packet = packet.name(), len = frame.len(), "packet received");
        self.current = Some(packet);
        SocketResult::Ready
    }

    fn queue_packet(&mut self, packet: &Packet) -> Result<()> {
        let packet_type = self.worker.packet_type();
        let (data, cipher) = match self.key_exchange.prepare_outgoing(packet, packet_type)? {
            Some((wrapped, cipher)) => (self.worker.try_packet_to_raw(&wrapped)?, Some(cipher)),
            None => (self.worker.try_packet_to_raw(packet)?, None),
        };
        if data.is_empty() {
            return Ok(());
        }
        self.codec.encode(data.as_slice(), &mut self.write_buf)?;
        if let Some(cipher) = cipher {
            self.codec.set_cipher(cipher);
            self.metrics.handshake_success();
        }
        if let Some((writer, direction)) = &mut self.capture {
            if let Err(e) = writer.write_data(now(), *direction, &data) {
                warn!(error = %e, "failed to capture outgoing frame");
            }
        }
        self.metrics.frame_sent();
        trace!(packet = packet.name(), len = data.len(), "packet queued");
        Ok(())
    }

    fn reject(&mut self, message: String) -> SocketResult {
        warn!(error = %message, "frame rejected");
        self.metrics.frame_rejected();
        self.last_error = Some(message);
        SocketResult::Rejected
    }

    fn socket_error(&mut self, e: io::Error) -> SocketResult {
        debug!(error = %e, "socket error");
        self.metrics.socket_error();
        self.metrics.log_metrics();
        self.last_error = Some(ProtocolError::from(e).to_string());
        SocketResult::SocketError
    }
}

impl Connection<TcpStream> {
    /// IPv4 address of the peer; IPv6 peers report `0.0.0.0`
    pub fn peer_ip(&self) -> Result<Ipv4Addr> {
        Ok(match self.stream.peer_addr()?.ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
        })
    }
}
