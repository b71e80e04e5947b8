//! # Protocol Layer
//!
//! The structured packet value, its catalog, and the stateful pieces built on
//! top of it.
//!
//! ## Components
//! - **Packet**: closed sum type over the catalog plus `Unknown` and `Raw`
//! - **Catalog**: dialect-aware `(id, subid)` lookup
//! - **Worker**: raw/structured/serialized conversion with a last-error slot
//! - **Handshake**: key exchange state machine and RSA key sources
//!
//! ## Decoding
//! A buffer is split into whole frames first. Each frame is looked up in the
//! catalog of the active dialect: recognized bodies are decoded and must be
//! consumed up to the alignment padding, anything else becomes
//! [`Packet::Unknown`] with its body kept verbatim. Under
//! [`PacketType::Raw`] every frame becomes [`Packet::Raw`].

pub mod catalog;
pub mod chat;
pub mod handshake;
pub mod login;
pub mod models;
pub mod server;
pub mod worker;

#[cfg(test)]
mod tests;

use crate::core::header::{build_frame, split_frames, Flags, PacketHeader, PacketType, HEADER_LEN};
use crate::core::serialization::MultiFormat;
use crate::core::wire::{WireFormat, WireReader, WireWriter};
use crate::error::{constants, ProtocolError, Result};
use catalog::Availability;
use serde::{Deserialize, Serialize};

pub use chat::{ChatMessage, ChatMessageNGS, LobbyMonitorPacket, SystemMessagePacket};
pub use login::{
    ClientGoodbyePacket, ClientPingPacket, ClientPongPacket, EncryptionRequestPacket,
    EncryptionResponsePacket, ShipListPacket,
};
pub use server::{
    FinishLoadingPacket, InitialLoadPacket, LoadLevelPacket, ServerHelloNGSPacket,
    ServerHelloPacket, ServerPingPacket, ServerPongPacket, SetPlayerIDPacket,
    UnlockControlsPacket,
};
pub use worker::PacketWorker;

/// A packet body with a fixed opcode
pub trait PacketBody: WireFormat {
    const ID: u8;
    const SUBID: u8;
    const FLAGS: Flags = Flags::NONE;

    fn header() -> PacketHeader {
        PacketHeader::new(Self::ID, Self::SUBID, Self::FLAGS)
    }
}

/// Coarse grouping of packets by opcode family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketCategory {
    Unknown,
    Server,
    PlayerStatus,
    Chat,
    Login,
    System,
}

impl PacketCategory {
    pub fn from_id(id: u8) -> Self {
        match id {
            0x03 => PacketCategory::Server,
            0x06 => PacketCategory::PlayerStatus,
            0x07 => PacketCategory::Chat,
            0x11 => PacketCategory::Login,
            0x19 => PacketCategory::System,
            _ => PacketCategory::Unknown,
        }
    }
}

/// A frame whose opcode the active catalog does not know
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnknownPacket {
    pub header: PacketHeader,
    pub data: Vec<u8>,
}

fn decode_body<T: PacketBody>(body: &[u8], packet_type: PacketType) -> Result<T> {
    let mut reader = WireReader::new(body);
    let value = T::read(&mut reader, packet_type)?;
    // up to 3 bytes of alignment padding may follow
    if reader.remaining() >= 4 {
        return Err(ProtocolError::ParseError(format!(
            "{} ({} bytes left)",
            constants::ERR_TRAILING_BYTES,
            reader.remaining()
        )));
    }
    Ok(value)
}

fn encode_body<T: PacketBody>(value: &T, packet_type: PacketType, strict: bool) -> Result<Vec<u8>> {
    let mut writer = WireWriter::new();
    value.write(&mut writer, packet_type);
    if strict {
        writer.check()?;
    }
    Ok(build_frame(&T::header(), &writer.into_bytes(), true))
}

macro_rules! declare_packets {
    ($( $(#[$doc:meta])* $variant:ident($ty:ty) => $avail:ident, )+) => {
        /// A decoded packet.
        #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
        pub enum Packet {
            /// Empty value, encodes to zero bytes
            #[default]
            None,
            $( $(#[$doc])* $variant($ty), )+
            /// Opcode not in the active catalog
            Unknown(UnknownPacket),
            /// Whole frame, passed through undecoded
            Raw(Vec<u8>),
        }

        /// Catalog variants of [`Packet`]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum PacketKind {
            $( $variant, )+
        }

        impl PacketKind {
            pub const ALL: &'static [PacketKind] = &[$(PacketKind::$variant),+];

            pub fn opcode(self) -> (u8, u8) {
                match self {
                    $( PacketKind::$variant => (<$ty as PacketBody>::ID, <$ty as PacketBody>::SUBID), )+
                }
            }

            pub fn availability(self) -> Availability {
                match self {
                    $( PacketKind::$variant => Availability::$avail, )+
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( PacketKind::$variant => stringify!($variant), )+
                }
            }

            fn decode(self, body: &[u8], packet_type: PacketType) -> Result<Packet> {
                match self {
                    $( PacketKind::$variant => Ok(Packet::$variant(decode_body(body, packet_type)?)), )+
                }
            }
        }

        impl Packet {
            /// Catalog kind, `None` for the non-catalog variants
            pub fn kind(&self) -> Option<PacketKind> {
                match self {
                    $( Packet::$variant(_) => Some(PacketKind::$variant), )+
                    _ => None,
                }
            }

            fn encode_known(&self, packet_type: PacketType, strict: bool) -> Option<Result<Vec<u8>>> {
                match self {
                    $( Packet::$variant(body) => Some(encode_body(body, packet_type, strict)), )+
                    _ => None,
                }
            }
        }
    };
}

declare_packets! {
    InitialLoad(InitialLoadPacket) => All,
    LoadLevel(LoadLevelPacket) => All,
    ServerHello(ServerHelloPacket) => Base,
    ServerHelloNGS(ServerHelloNGSPacket) => NgsOnly,
    ServerPing(ServerPingPacket) => All,
    ServerPong(ServerPongPacket) => All,
    FinishLoading(FinishLoadingPacket) => All,
    UnlockControls(UnlockControlsPacket) => All,
    SetPlayerID(SetPlayerIDPacket) => All,
    ChatMessage(ChatMessage) => Base,
    ChatMessageNGS(ChatMessageNGS) => NgsOnly,
    /// Key exchange, RSA wrapped until a connection decrypts it
    EncryptionRequest(EncryptionRequestPacket) => All,
    EncryptionResponse(EncryptionResponsePacket) => All,
    ClientPing(ClientPingPacket) => All,
    ClientPong(ClientPongPacket) => All,
    ClientGoodbye(ClientGoodbyePacket) => All,
    ShipList(ShipListPacket) => All,
    SystemMessage(SystemMessagePacket) => All,
    LobbyMonitor(LobbyMonitorPacket) => All,
}

impl Packet {
    /// Decode every frame in `data`. Empty input yields no packets.
    pub fn read(data: &[u8], packet_type: PacketType) -> Result<Vec<Packet>> {
        split_frames(data)?
            .into_iter()
            .map(|frame| Packet::read_frame(frame, packet_type))
            .collect()
    }

    /// Decode one whole frame, length prefix included
    pub fn read_frame(frame: &[u8], packet_type: PacketType) -> Result<Packet> {
        if frame.len() < HEADER_LEN {
            return Err(ProtocolError::ParseError(
                constants::ERR_FRAME_TOO_SHORT.into(),
            ));
        }
        if packet_type == PacketType::Raw {
            return Ok(Packet::Raw(frame.to_vec()));
        }
        let header = PacketHeader::read(&frame[4..HEADER_LEN])?;
        let body = &frame[HEADER_LEN..];
        match catalog::lookup(packet_type, header.id, header.subid) {
            Some(kind) => kind.decode(body, packet_type),
            None => Ok(Packet::Unknown(UnknownPacket {
                header,
                data: body.to_vec(),
            })),
        }
    }

    /// Encode to wire bytes with the length prefix recomputed.
    ///
    /// `Unknown` bodies are written verbatim without alignment. `Raw` data is
    /// written as is with its length patched; data shorter than a header is
    /// zero filled to 8 bytes. Field values that do not fit the wire are
    /// saturated or filtered; [`Packet::try_write`] reports them instead.
    pub fn write(&self, packet_type: PacketType) -> Vec<u8> {
        self.encode(packet_type, false).unwrap_or_default()
    }

    /// Encode to wire bytes, failing when a field value does not fit the wire
    pub fn try_write(&self, packet_type: PacketType) -> Result<Vec<u8>> {
        self.encode(packet_type, true)
    }

    fn encode(&self, packet_type: PacketType, strict: bool) -> Result<Vec<u8>> {
        Ok(match self {
            Packet::None => Vec::new(),
            Packet::Unknown(unknown) => build_frame(&unknown.header, &unknown.data, false),
            Packet::Raw(data) => {
                let mut out = data.clone();
                if out.len() < HEADER_LEN {
                    out.resize(HEADER_LEN, 0);
                }
                let len = out.len() as u32;
                out[..4].copy_from_slice(&len.to_le_bytes());
                out
            }
            known => known.encode_known(packet_type, strict).transpose()?.unwrap_or_default(),
        })
    }

    /// Opcode this value is written with
    pub fn opcode(&self) -> Option<(u8, u8)> {
        match self {
            Packet::None => None,
            Packet::Unknown(unknown) => Some(unknown.header.opcode()),
            Packet::Raw(data) => match data.get(4..6) {
                Some(&[id, subid]) => Some((id, subid)),
                _ => None,
            },
            known => known.kind().map(PacketKind::opcode),
        }
    }

    pub fn category(&self) -> PacketCategory {
        self.opcode()
            .map_or(PacketCategory::Unknown, |(id, _)| PacketCategory::from_id(id))
    }

    /// Variant name as it appears in serialized form
    pub fn name(&self) -> &'static str {
        match self {
            Packet::None => "None",
            Packet::Unknown(_) => "Unknown",
            Packet::Raw(_) => "Raw",
            known => known.kind().map_or("None", PacketKind::name),
        }
    }

    /// Whether this is a key exchange packet
    pub fn is_enc_data(&self) -> bool {
        matches!(self, Packet::EncryptionRequest(_))
    }

    /// Key exchange payload
    pub fn as_enc_data(&self) -> Option<&[u8]> {
        match self {
            Packet::EncryptionRequest(request) => Some(&request.rsa_data),
            _ => None,
        }
    }

    pub fn mut_enc_data(&mut self) -> Option<&mut Vec<u8>> {
        match self {
            Packet::EncryptionRequest(request) => Some(&mut request.rsa_data),
            _ => None,
        }
    }
}

impl MultiFormat for Packet {}
