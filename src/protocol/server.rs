//! Server control packets (0x03 and 0x06 families).

use super::PacketBody;
use crate::core::header::PacketType;
use crate::core::wire::{WireFormat, WireReader, WireWriter};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Declares a packet with no fields.
macro_rules! empty_packet {
    ($(#[$meta:meta])* $name:ident, $id:expr, $subid:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
        pub struct $name {}

        impl WireFormat for $name {
            fn read(_: &mut WireReader<'_>, _: PacketType) -> Result<Self> {
                Ok(Self {})
            }

            fn write(&self, _: &mut WireWriter, _: PacketType) {}
        }

        impl PacketBody for $name {
            const ID: u8 = $id;
            const SUBID: u8 = $subid;
        }
    };
}
pub(crate) use empty_packet;

empty_packet!(
    /// (0x03, 0x03) Initial load. Sent once after login.
    InitialLoadPacket,
    0x03,
    0x03
);

empty_packet!(
    /// (0x03, 0x04) Load level. Tells the client to start loading a zone.
    LoadLevelPacket,
    0x03,
    0x04
);

empty_packet!(
    /// (0x03, 0x0B) Server ping.
    ServerPingPacket,
    0x03,
    0x0B
);

empty_packet!(
    /// (0x03, 0x0C) Server pong.
    ServerPongPacket,
    0x03,
    0x0C
);

empty_packet!(
    /// (0x03, 0x23) Client finished loading.
    FinishLoadingPacket,
    0x03,
    0x23
);

empty_packet!(
    /// (0x03, 0x2B) Unlock player controls.
    UnlockControlsPacket,
    0x03,
    0x2B
);

/// (0x03, 0x08) Server hello, first packet of every session.
///
/// Respond with an encryption request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerHelloPacket {
    /// Always 0x03 in captures
    pub unk1: u16,
    pub blockid: u16,
    pub unk2: u32,
}

impl WireFormat for ServerHelloPacket {
    fn read(reader: &mut WireReader<'_>, _: PacketType) -> Result<Self> {
        let unk1 = reader.read_u16()?;
        let blockid = reader.read_u16()?;
        reader.skip(4)?;
        let unk2 = reader.read_u32()?;
        Ok(Self {
            unk1,
            blockid,
            unk2,
        })
    }

    fn write(&self, writer: &mut WireWriter, _: PacketType) {
        writer.write_u16(self.unk1);
        writer.write_u16(self.blockid);
        writer.write_zeros(4);
        writer.write_u32(self.unk2);
    }
}

impl PacketBody for ServerHelloPacket {
    const ID: u8 = 0x03;
    const SUBID: u8 = 0x08;
}

/// (0x03, 0x08) NGS server hello.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerHelloNGSPacket {
    pub unk1: u16,
    pub blockid: u16,
    pub unk2: u32,
    pub unk3: u32,
}

impl WireFormat for ServerHelloNGSPacket {
    fn read(reader: &mut WireReader<'_>, packet_type: PacketType) -> Result<Self> {
        let base = ServerHelloPacket::read(reader, packet_type)?;
        Ok(Self {
            unk1: base.unk1,
            blockid: base.blockid,
            unk2: base.unk2,
            unk3: reader.read_u32()?,
        })
    }

    fn write(&self, writer: &mut WireWriter, packet_type: PacketType) {
        ServerHelloPacket {
            unk1: self.unk1,
            blockid: self.blockid,
            unk2: self.unk2,
        }
        .write(writer, packet_type);
        writer.write_u32(self.unk3);
    }
}

impl PacketBody for ServerHelloNGSPacket {
    const ID: u8 = 0x03;
    const SUBID: u8 = 0x08;
}

/// (0x06, 0x00) Assigns the player id for this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetPlayerIDPacket {
    pub player_id: u32,
    pub unk1: u32,
    pub unk2: u32,
}

impl WireFormat for SetPlayerIDPacket {
    fn read(reader: &mut WireReader<'_>, _: PacketType) -> Result<Self> {
        Ok(Self {
            player_id: reader.read_u32()?,
            unk1: reader.read_u32()?,
            unk2: reader.read_u32()?,
        })
    }

    fn write(&self, writer: &mut WireWriter, _: PacketType) {
        writer.write_u32(self.player_id);
        writer.write_u32(self.unk1);
        writer.write_u32(self.unk2);
    }
}

impl PacketBody for SetPlayerIDPacket {
    const ID: u8 = 0x06;
    const SUBID: u8 = 0x00;
}
