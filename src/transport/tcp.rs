//! # Async TCP Connection
//!
//! Tokio rendition of [`Connection`](super::Connection): a
//! `Framed<TcpStream, FrameCodec>` with the same key exchange.
//!
//! The cipher lives inside the codec, so installing it after a key exchange
//! applies to bytes already buffered by `Framed` as well as to later reads.
//!
//! [`AsyncConnection::into_split`] gives independent read and write halves for
//! full-duplex use. The halves carry the cipher state at the time of the
//! split, so split after the key exchange.

use crate::config::ConnectionConfig;
use crate::core::codec::FrameCodec;
use crate::core::header::{EncryptionPolicy, PacketType};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::handshake::{KeyExchange, PrivateKey, PublicKey};
use crate::protocol::Packet;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Framed, FramedParts};
use tracing::{debug, instrument, trace};

/// Packet connection over a tokio TCP stream
#[derive(Debug)]
pub struct AsyncConnection {
    framed: Framed<TcpStream, FrameCodec>,
    key_exchange: KeyExchange,
    packet_type: PacketType,
}

impl AsyncConnection {
    pub fn new(
        stream: TcpStream,
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
        stream: TcpStream,
        packet_type: PacketType,
        private_key: PrivateKey,
        public_key: PublicKey,
        config: &ConnectionConfig,
    ) -> Result<Self> {
        let key_exchange = KeyExchange::new(private_key.load()?, public_key.load()?)
            .with_passthrough(config.passthrough_key_exchange);
        Ok(Self {
            framed: Framed::new(stream, FrameCodec::new(config.max_frame_size)),
            key_exchange,
            packet_type,
        })
    }

    /// Connect to `addr` within the configured timeout
    #[instrument(skip(addr, private_key, public_key, config))]
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        packet_type: PacketType,
        private_key: PrivateKey,
        public_key: PublicKey,
        config: &ConnectionConfig,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                ProtocolError::SocketError(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                ))
            })??;
        debug!(peer = ?stream.peer_addr().ok(), "connected");
        Self::from_config(stream, packet_type, private_key, public_key, config)
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn change_packet_type(&mut self, packet_type: PacketType) {
        self.packet_type = packet_type;
    }

    /// Negotiated secret, empty before the key exchange
    pub fn get_key(&self) -> Vec<u8> {
        self.framed.codec().get_key().to_vec()
    }

    pub fn key_exchange(&self) -> &KeyExchange {
        &self.key_exchange
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.framed.get_ref().peer_addr()?)
    }

    /// Wait for the next packet. A closed stream is a socket error.
    pub async fn read_packet(&mut self) -> Result<Packet> {
        let frame = match self.framed.next().await {
            Some(frame) => frame?,
            None => {
                return Err(ProtocolError::SocketError(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    constants::ERR_CONNECTION_CLOSED,
                )))
            }
        };
        let mut packet = Packet::read_frame(&frame, self.packet_type)?;
        if let Some(cipher) = self
            .key_exchange
            .accept_incoming(&mut packet, self.packet_type)?
        {
            self.framed.codec_mut().set_cipher(cipher);
        }
        trace!(packet = packet.name(), len = frame.len(), "packet received");
        Ok(packet)
    }

    /// Encode, encrypt and send one packet
    pub async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        match self
            .key_exchange
            .prepare_outgoing(packet, self.packet_type)?
        {
            Some((wrapped, cipher)) => {
                self.framed.send(wrapped.try_write(self.packet_type)?).await?;
                self.framed.codec_mut().set_cipher(cipher);
            }
            None => {
                let data = packet.try_write(self.packet_type)?;
                if !data.is_empty() {
                    self.framed.send(data).await?;
                }
            }
        }
        trace!(packet = packet.name(), "packet sent");
        Ok(())
    }

    /// Split into halves that can be driven from separate tasks.
    ///
    /// Bytes already read but not yet decoded stay with the read half. A key
    /// exchange packet on either half is rejected.
    pub fn into_split(self) -> (AsyncConnectionRead, AsyncConnectionWrite) {
        let parts = self.framed.into_parts();
        let (reader, writer) = tokio::io::split(parts.io);
        let (decoder, encoder) = parts.codec.split();
        let established = self.key_exchange.is_established();
        debug!(established, cipher = decoder.cipher().name(), "splitting connection");

        let mut read_parts = FramedParts::new::<Vec<u8>>(reader, decoder);
        read_parts.read_buf = parts.read_buf;
        let mut write_parts = FramedParts::new::<Vec<u8>>(writer, encoder);
        write_parts.write_buf = parts.write_buf;
        (
            AsyncConnectionRead {
                framed: Framed::from_parts(read_parts),
                packet_type: self.packet_type,
                established,
            },
            AsyncConnectionWrite {
                framed: Framed::from_parts(write_parts),
                packet_type: self.packet_type,
                established,
            },
        )
    }
}

/// Key exchange packets cannot change the cipher of a split connection
fn reject_key_exchange(packet: &Packet, packet_type: PacketType, established: bool) -> Result<()> {
    if packet_type.encryption_policy() == EncryptionPolicy::Never
        || packet.as_enc_data().is_none()
    {
        return Ok(());
    }
    let message = if established {
        constants::ERR_KEY_ALREADY_ESTABLISHED
    } else {
        constants::ERR_KEY_EXCHANGE_AFTER_SPLIT
    };
    Err(ProtocolError::EncryptionError(message.into()))
}

/// Receiving half of a split [`AsyncConnection`]
#[derive(Debug)]
pub struct AsyncConnectionRead {
    framed: Framed<ReadHalf<TcpStream>, FrameCodec>,
    packet_type: PacketType,
    established: bool,
}

impl AsyncConnectionRead {
    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn change_packet_type(&mut self, packet_type: PacketType) {
        self.packet_type = packet_type;
    }

    /// Negotiated secret, empty for a plaintext session
    pub fn get_key(&self) -> Vec<u8> {
        self.framed.codec().get_key().to_vec()
    }

    /// Wait for the next packet. A closed stream is a socket error.
    pub async fn read_packet(&mut self) -> Result<Packet> {
        // an envelope decoded before the split may still hold frames
        let frame = match self.framed.codec_mut().take_buffered_frame()? {
            Some(frame) => frame,
            None => match self.framed.next().await {
                Some(frame) => frame?,
                None => {
                    return Err(ProtocolError::SocketError(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        constants::ERR_CONNECTION_CLOSED,
                    )))
                }
            },
        };
        let packet = Packet::read_frame(&frame, self.packet_type)?;
        reject_key_exchange(&packet, self.packet_type, self.established)?;
        trace!(packet = packet.name(), len = frame.len(), "packet received");
        Ok(packet)
    }
}

/// Sending half of a split [`AsyncConnection`]
#[derive(Debug)]
pub struct AsyncConnectionWrite {
    framed: Framed<WriteHalf<TcpStream>, FrameCodec>,
    packet_type: PacketType,
    established: bool,
}

impl AsyncConnectionWrite {
    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn change_packet_type(&mut self, packet_type: PacketType) {
        self.packet_type = packet_type;
    }

    /// Encode, encrypt and send one packet
    pub async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        reject_key_exchange(packet, self.packet_type, self.established)?;
        let data = packet.try_write(self.packet_type)?;
        if !data.is_empty() {
            self.framed.send(data).await?;
        }
        trace!(packet = packet.name(), "packet sent");
        Ok(())
    }
}
