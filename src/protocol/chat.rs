//! Chat and system messaging packets (0x07 and 0x19 families).

use super::models::{ChatArea, MessageType, ObjectHeader};
use super::PacketBody;
use crate::core::header::{Flags, PacketType};
use crate::core::wire::{WireFormat, WireReader, WireWriter};
use crate::error::Result;
use serde::{Deserialize, Serialize};

const CHAT_XOR: u32 = 0x9D3F;
const CHAT_SUB: u32 = 0x44;

/// (0x07, 0x00) Chat message
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatMessage {
    /// Sender
    pub object: ObjectHeader,
    pub channel: ChatArea,
    pub unk3: u8,
    pub unk4: u16,
    pub unk5: String,
    pub message: String,
}

impl WireFormat for ChatMessage {
    fn read(reader: &mut WireReader<'_>, packet_type: PacketType) -> Result<Self> {
        Ok(Self {
            object: ObjectHeader::read(reader, packet_type)?,
            channel: ChatArea::read(reader, packet_type)?,
            unk3: reader.read_u8()?,
            unk4: reader.read_u16()?,
            unk5: reader.read_variable_string(CHAT_XOR, CHAT_SUB)?,
            message: reader.read_variable_string(CHAT_XOR, CHAT_SUB)?,
        })
    }

    fn write(&self, writer: &mut WireWriter, packet_type: PacketType) {
        self.object.write(writer, packet_type);
        self.channel.write(writer, packet_type);
        writer.write_u8(self.unk3);
        writer.write_u16(self.unk4);
        writer.write_variable_string(&self.unk5, CHAT_XOR, CHAT_SUB);
        writer.write_variable_string(&self.message, CHAT_XOR, CHAT_SUB);
    }
}

impl PacketBody for ChatMessage {
    const ID: u8 = 0x07;
    const SUBID: u8 = 0x00;
    const FLAGS: Flags = Flags::PACKED.union(Flags::OBJECT_RELATED);
}

/// (0x07, 0x00) NGS chat message, with two extra words before the text
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatMessageNGS {
    pub object: ObjectHeader,
    pub channel: ChatArea,
    pub unk3: u8,
    pub unk4: u16,
    pub unk5: u16,
    pub unk6: u16,
    pub unk7: String,
    pub message: String,
}

impl WireFormat for ChatMessageNGS {
    fn read(reader: &mut WireReader<'_>, packet_type: PacketType) -> Result<Self> {
        Ok(Self {
            object: ObjectHeader::read(reader, packet_type)?,
            channel: ChatArea::read(reader, packet_type)?,
            unk3: reader.read_u8()?,
            unk4: reader.read_u16()?,
            unk5: reader.read_u16()?,
            unk6: reader.read_u16()?,
            unk7: reader.read_variable_string(CHAT_XOR, CHAT_SUB)?,
            message: reader.read_variable_string(CHAT_XOR, CHAT_SUB)?,
        })
    }

    fn write(&self, writer: &mut WireWriter, packet_type: PacketType) {
        self.object.write(writer, packet_type);
        self.channel.write(writer, packet_type);
        writer.write_u8(self.unk3);
        writer.write_u16(self.unk4);
        writer.write_u16(self.unk5);
        writer.write_u16(self.unk6);
        writer.write_variable_string(&self.unk7, CHAT_XOR, CHAT_SUB);
        writer.write_variable_string(&self.message, CHAT_XOR, CHAT_SUB);
    }
}

impl PacketBody for ChatMessageNGS {
    const ID: u8 = 0x07;
    const SUBID: u8 = 0x00;
    const FLAGS: Flags = Flags::PACKED.union(Flags::OBJECT_RELATED);
}

/// (0x19, 0x01) System message shown to the player
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemMessagePacket {
    pub message: String,
    pub unk: String,
    pub msg_type: MessageType,
    pub msg_num: u32,
}

impl SystemMessagePacket {
    const XOR: u32 = 0x78F7;
    const SUB: u32 = 0xA2;
}

impl WireFormat for SystemMessagePacket {
    fn read(reader: &mut WireReader<'_>, packet_type: PacketType) -> Result<Self> {
        Ok(Self {
            message: reader.read_variable_string(Self::XOR, Self::SUB)?,
            unk: reader.read_variable_string(Self::XOR, Self::SUB)?,
            msg_type: MessageType::read(reader, packet_type)?,
            msg_num: reader.read_u32()?,
        })
    }

    fn write(&self, writer: &mut WireWriter, packet_type: PacketType) {
        writer.write_variable_string(&self.message, Self::XOR, Self::SUB);
        writer.write_variable_string(&self.unk, Self::XOR, Self::SUB);
        self.msg_type.write(writer, packet_type);
        writer.write_u32(self.msg_num);
    }
}

impl PacketBody for SystemMessagePacket {
    const ID: u8 = 0x19;
    const SUBID: u8 = 0x01;
    const FLAGS: Flags = Flags::PACKED;
}

/// (0x19, 0x0F) Lobby monitor video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyMonitorPacket {
    pub video_id: u32,
}

impl WireFormat for LobbyMonitorPacket {
    fn read(reader: &mut WireReader<'_>, _: PacketType) -> Result<Self> {
        Ok(Self {
            video_id: reader.read_u32()?,
        })
    }

    fn write(&self, writer: &mut WireWriter, _: PacketType) {
        writer.write_u32(self.video_id);
    }
}

impl PacketBody for LobbyMonitorPacket {
    const ID: u8 = 0x19;
    const SUBID: u8 = 0x0F;
}
